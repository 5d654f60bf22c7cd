use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// The error taxonomy every component surfaces through. Names are a
/// contract — callers match on `kind`, not on any component's internal
/// error enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Caller/input fault. No side effects, never retried.
    Validation,
    /// Remote or inbound auth failure. Never retried.
    Authorization,
    /// Local limiter or remote 429 that outlived retries.
    RateLimited,
    /// Network, timeout, 5xx. Retried within the call's own budget.
    Transient,
    /// Remote rejected the request for semantic reasons. Never retried.
    Permanent,
    /// Invariant violation. Never contains user content.
    Internal,
}

/// The stable wire shape for any error the pipeline surfaces to a caller.
/// `context` must never carry secrets, raw API keys, or credentialed URLs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    pub message: String,
    pub retryable: bool,
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ErrorRecord {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        let retryable = matches!(kind, ErrorKind::Transient | ErrorKind::RateLimited);
        Self {
            kind,
            message: message.into(),
            retryable,
            context: HashMap::new(),
        }
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}
