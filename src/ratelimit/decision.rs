//! The decision handed back to callers, and its rejection body.

use serde::Serialize;

use super::bucket::RefillOutcome;

/// Status code a transport adapter should use for a denied request.
pub const REJECTION_STATUS: u16 = 429;

/// Message carried by every rejection body.
pub const REJECTION_MESSAGE: &str = "Too many requests. Please try again later.";

/// Which path produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DecisionSource {
    /// The shared store decided
    Remote,
    /// Store unavailable; a local fallback token was consumed
    Local,
    /// Store unavailable, fallback exhausted, fail-open
    LocalOpen,
    /// Store unavailable, fallback exhausted, fail-closed
    LocalClosed,
}

impl DecisionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionSource::Remote => "remote",
            DecisionSource::Local => "local",
            DecisionSource::LocalOpen => "local-open",
            DecisionSource::LocalClosed => "local-closed",
        }
    }

    /// Whether the shared store was bypassed.
    pub fn is_degraded(&self) -> bool {
        !matches!(self, DecisionSource::Remote)
    }
}

impl std::fmt::Display for DecisionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub allowed: bool,
    pub remaining: u64,
    pub source: DecisionSource,
}

impl Decision {
    /// A decision made by the shared store.
    pub fn remote(outcome: RefillOutcome) -> Self {
        Self {
            allowed: outcome.allowed,
            remaining: outcome.remaining,
            source: DecisionSource::Remote,
        }
    }

    /// An allow paid for by a local fallback token.
    pub fn local(remaining: u64) -> Self {
        Self {
            allowed: true,
            remaining,
            source: DecisionSource::Local,
        }
    }

    /// The body a transport adapter should send back, or `None` when allowed.
    pub fn rejection(&self) -> Option<Rejection> {
        if self.allowed {
            return None;
        }
        Some(Rejection {
            success: false,
            message: REJECTION_MESSAGE.to_string(),
            limiter: self.source,
        })
    }
}

/// Response body for a rejected request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rejection {
    pub success: bool,
    pub message: String,
    /// Passed through for diagnostics only
    pub limiter: DecisionSource,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_has_no_rejection() {
        assert!(Decision::local(3).rejection().is_none());
    }

    #[test]
    fn test_rejection_body() {
        let decision = Decision::remote(RefillOutcome {
            allowed: false,
            remaining: 0,
        });
        let body = serde_json::to_value(decision.rejection().unwrap()).unwrap();

        assert_eq!(
            body,
            serde_json::json!({
                "success": false,
                "message": "Too many requests. Please try again later.",
                "limiter": "remote",
            })
        );
    }

    #[test]
    fn test_source_serialization() {
        for source in [
            DecisionSource::Remote,
            DecisionSource::Local,
            DecisionSource::LocalOpen,
            DecisionSource::LocalClosed,
        ] {
            assert_eq!(
                serde_json::to_value(source).unwrap(),
                serde_json::Value::String(source.as_str().to_string())
            );
        }
        assert!(!DecisionSource::Remote.is_degraded());
        assert!(DecisionSource::LocalClosed.is_degraded());
    }
}
