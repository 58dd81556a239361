//! Store Facade Tests
//!
//! Exercises the in-process store against the semantics the coordinator
//! relies on: list push/pop direction, pattern scans, batch atomicity,
//! and the blocking pop.

#[cfg(test)]
mod tests {
    use crate::store::{MemoryStore, Store, StoreError, StoreOp, StoreReply};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_strings_set_get_del_exists() {
        let store = MemoryStore::new();

        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(!store.exists("k").await.unwrap());

        store.set("k", "v").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));
        assert!(store.exists("k").await.unwrap());

        store.del(&["k".to_string()]).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_rpush_brpop_pops_the_tail() {
        let store = MemoryStore::new();

        store.rpush("q", "a").await.unwrap();
        store.rpush("q", "b").await.unwrap();

        let popped = store.brpop("q", Duration::from_secs(1)).await.unwrap();
        assert_eq!(popped, Some("b".to_string()));
        assert_eq!(store.llen("q").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_brpop_times_out_on_empty_list() {
        let store = MemoryStore::new();

        let popped = store
            .brpop("empty", Duration::from_millis(50))
            .await
            .unwrap();

        assert_eq!(popped, None);
    }

    #[tokio::test]
    async fn test_brpop_wakes_on_push() {
        let store = Arc::new(MemoryStore::new());

        let popper = {
            let store = store.clone();
            tokio::spawn(async move { store.brpop("q", Duration::from_secs(5)).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        store.rpush("q", "late").await.unwrap();

        let popped = popper.await.unwrap().unwrap();
        assert_eq!(popped, Some("late".to_string()));
    }

    #[tokio::test]
    async fn test_keys_matches_trailing_star() {
        let store = MemoryStore::new();
        store.set("q.start.j.a", "1").await.unwrap();
        store.set("q.start.j.b", "2").await.unwrap();
        store.set("q.alive.j.a", "").await.unwrap();
        store.rpush("q.out.j", "r").await.unwrap();

        let mut started = store.keys("q.start.j.*").await.unwrap();
        started.sort();
        assert_eq!(started, vec!["q.start.j.a", "q.start.j.b"]);

        // Exact patterns match too, and lists are part of the keyspace.
        assert_eq!(store.keys("q.out.j").await.unwrap(), vec!["q.out.j"]);
    }

    #[tokio::test]
    async fn test_mget_preserves_positions() {
        let store = MemoryStore::new();
        store.set("a", "1").await.unwrap();
        store.set("c", "3").await.unwrap();

        let values = store
            .mget(&["a".to_string(), "b".to_string(), "c".to_string()])
            .await
            .unwrap();

        assert_eq!(
            values,
            vec![Some("1".to_string()), None, Some("3".to_string())]
        );
    }

    #[tokio::test]
    async fn test_lrange_full_and_partial() {
        let store = MemoryStore::new();
        for v in ["a", "b", "c", "d"] {
            store.rpush("l", v).await.unwrap();
        }

        assert_eq!(store.lrange("l", 0, -1).await.unwrap(), ["a", "b", "c", "d"]);
        assert_eq!(store.lrange("l", 1, 2).await.unwrap(), ["b", "c"]);
        assert_eq!(store.lrange("l", 10, 20).await.unwrap(), Vec::<String>::new());
    }

    #[tokio::test]
    async fn test_batch_replies_in_submission_order() {
        let store = MemoryStore::new();
        store.rpush("l", "x").await.unwrap();

        let replies = store
            .exec_batch(vec![
                StoreOp::LRange {
                    list: "l".to_string(),
                    start: 0,
                    stop: -1,
                },
                StoreOp::Del {
                    keys: vec!["l".to_string()],
                },
                StoreOp::RPush {
                    list: "l2".to_string(),
                    value: "y".to_string(),
                },
            ])
            .await
            .unwrap();

        assert_eq!(replies.len(), 3);
        assert_eq!(replies[0], StoreReply::List(vec!["x".to_string()]));
        assert_eq!(replies[1], StoreReply::Done);
        assert_eq!(replies[2], StoreReply::Done);
        assert_eq!(store.llen("l").await.unwrap(), 0);
        assert_eq!(store.llen("l2").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_batch_snapshot_then_delete_is_atomic() {
        // The cleanup path depends on LRANGE + DEL observing one state.
        let store = MemoryStore::new();
        for v in ["1", "2", "3"] {
            store.rpush("q", v).await.unwrap();
        }

        let replies = store
            .exec_batch(vec![
                StoreOp::LRange {
                    list: "q".to_string(),
                    start: 0,
                    stop: -1,
                },
                StoreOp::Del {
                    keys: vec!["q".to_string()],
                },
            ])
            .await
            .unwrap();

        let snapshot = replies[0].clone().into_list();
        assert_eq!(snapshot, vec!["1", "2", "3"]);
        assert!(!store.exists("q").await.unwrap());
    }

    #[test]
    fn test_store_error_display() {
        let err = StoreError::ConnectionFailed("refused".to_string());
        assert!(err.to_string().contains("refused"));

        let err = StoreError::Operation("timeout".to_string());
        assert!(err.to_string().contains("timeout"));
    }
}
