//! Queue Registry Tests

#[cfg(test)]
mod tests {
    use crate::registry::{
        QueueConfig, Reduce, ReduceSpec, DEFAULT_FT_INTERVAL, DEFAULT_MAX_ENVELOPE_BYTES,
        MIN_FT_INTERVAL,
    };
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_defaults() {
        let config = QueueConfig::new("jobs");

        assert_eq!(config.queue, "jobs");
        assert_eq!(config.chunk_size, 1);
        assert!(config.export.is_empty());
        assert!(config.packages.is_empty());
        assert!(!config.reduce.is_two_level());
        assert_eq!(config.ft_interval, DEFAULT_FT_INTERVAL);
        assert_eq!(config.max_envelope_bytes, DEFAULT_MAX_ENVELOPE_BYTES);
    }

    #[test]
    fn test_chunk_size_zero_is_lifted_to_one() {
        let mut config = QueueConfig::new("jobs");

        config.set_chunk_size(0);
        assert_eq!(config.chunk_size, 1);

        config.set_chunk_size(25);
        assert_eq!(config.chunk_size, 25);
    }

    #[test]
    fn test_ft_interval_is_clamped() {
        let mut config = QueueConfig::new("jobs");

        config.set_ft_interval(Duration::from_secs(1));
        assert_eq!(config.ft_interval, MIN_FT_INTERVAL);

        config.set_ft_interval(Duration::from_secs(120));
        assert_eq!(config.ft_interval, Duration::from_secs(120));
    }

    #[test]
    fn test_reduce_variants() {
        assert!(!Reduce::None.is_two_level());
        assert!(Reduce::Same.is_two_level());

        let explicit = Reduce::Explicit(ReduceSpec {
            func: Arc::new(|acc, v| Ok(json!([acc, v]))),
            worker_blob: json!({"op": "concat"}),
        });
        assert!(explicit.is_two_level());
    }

    #[test]
    fn test_export_and_packages_setters() {
        let mut config = QueueConfig::new("jobs");

        config.set_export(["g", "a", "g"]);
        assert_eq!(config.export.len(), 2);
        assert!(config.export.contains("a"));
        assert!(config.export.contains("g"));

        config.set_packages(["stats", "utils"]);
        assert_eq!(config.packages, vec!["stats", "utils"]);
    }
}
