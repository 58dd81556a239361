//! Job Envelope Builder
//!
//! Packages everything a worker must load before executing a job's task
//! body: the opaque expression, the resolved variable bindings, the
//! package list, and (under two-level reduction) the worker-side combine.
//!
//! Binding resolution merges two sources:
//! - auto-discovered free symbols, produced by an external introspection
//!   pass over the expression; unresolvable ones are silently skipped,
//! - explicit exports (per-job plus registry-wide), which must resolve or
//!   the job fails before anything is written to the store.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;


/// Errors raised while building an envelope. Each one fails the
/// submission before any job key is written.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// An explicitly exported symbol is missing from the caller bindings.
    #[error("exported symbol `{0}` is not defined in the caller scope")]
    ExportNotFound(String),

    /// The serialized envelope exceeds the configured cap.
    #[error("serialized envelope is {size} bytes, over the {limit}-byte cap")]
    EnvelopeTooLarge { size: usize, limit: usize },

    /// Two-level reduction was requested without a worker-side combine.
    #[error("two-level reduction needs a worker-side combine blob")]
    MissingCombine,

    /// The envelope could not be serialized.
    #[error("envelope serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// The per-job context stored under `Q.env.J` and loaded by workers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    /// Pre-serialized task body; opaque to the master.
    pub expr: Value,
    /// Resolved name → value bindings seeding the worker environment.
    pub bindings: BTreeMap<String, Value>,
    /// Packages the worker loads before execution.
    pub packages: Vec<String>,
    /// Worker-side combine for two-level reduction, already stripped of
    /// master-side state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub combine: Option<Value>,
}

/// Inputs to one envelope build.
pub struct EnvelopeRequest<'a> {
    pub expr: &'a Value,
    /// The caller's variable bindings; the lookup table for resolution.
    pub bindings: &'a BTreeMap<String, Value>,
    /// Auto-discovered free symbols of the expression.
    pub free_symbols: &'a [String],
    /// Per-job explicit exports.
    pub export: &'a [String],
    /// Symbols excluded from auto-discovery.
    pub no_export: &'a [String],
    /// Registry-wide explicit exports.
    pub process_export: &'a BTreeSet<String>,
    pub packages: Vec<String>,
    pub combine: Option<Value>,
    pub max_bytes: usize,
}

/// A built envelope together with its serialized form, size-checked and
/// ready to store.
#[derive(Debug)]
pub struct SealedEnvelope {
    pub envelope: Envelope,
    pub serialized: String,
}

/// Resolves bindings and seals the envelope.
pub fn build(req: EnvelopeRequest<'_>) -> Result<SealedEnvelope, EnvelopeError> {
    let mut bindings = BTreeMap::new();

    for symbol in req.free_symbols {
        if req.no_export.iter().any(|n| n == symbol) {
            continue;
        }
        if let Some(value) = req.bindings.get(symbol) {
            bindings.insert(symbol.clone(), value.clone());
        }
    }

    let explicit: BTreeSet<&String> = req
        .export
        .iter()
        .chain(req.process_export.iter())
        .collect();
    for symbol in explicit {
        match req.bindings.get(symbol) {
            Some(value) => {
                if bindings.contains_key(symbol) {
                    tracing::warn!(
                        symbol = %symbol,
                        "explicit export overlaps an auto-discovered binding"
                    );
                }
                bindings.insert(symbol.clone(), value.clone());
            }
            None => return Err(EnvelopeError::ExportNotFound(symbol.clone())),
        }
    }

    let envelope = Envelope {
        expr: req.expr.clone(),
        bindings,
        packages: req.packages,
        combine: req.combine,
    };

    let serialized = serde_json::to_string(&envelope)?;
    if serialized.len() > req.max_bytes {
        return Err(EnvelopeError::EnvelopeTooLarge {
            size: serialized.len(),
            limit: req.max_bytes,
        });
    }

    Ok(SealedEnvelope {
        envelope,
        serialized,
    })
}
