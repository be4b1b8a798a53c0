// Error types for the resolution pipeline
//
// Three layers:
// - StrategyError: why one upstream surface failed (transient / not found / malformed)
// - ResolutionError: a StrategyError tagged with the strategy that produced it
// - ResolutionFailure: what the caller of ResolvePost sees

use serde::Serialize;
use std::fmt;

use super::models::PostId;

/// Failure of a single strategy attempt
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StrategyError {
    /// Timeout, connection reset, 5xx, rate limiting, empty body
    #[error("transient: {0}")]
    Transient(String),

    /// Upstream answered validly but the post does not exist or is private
    #[error("not found: {0}")]
    NotFound(String),

    /// Body could not be parsed or lacked a required field
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl StrategyError {
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }

    /// Malformed bodies count as transient: another surface may still answer.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Malformed(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transient(_) => "transient",
            Self::NotFound(_) => "not_found",
            Self::Malformed(_) => "malformed",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Transient(m) | Self::NotFound(m) | Self::Malformed(m) => m,
        }
    }
}

impl From<reqwest::Error> for StrategyError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            return Self::Malformed(e.to_string());
        }
        if let Some(status) = e.status() {
            if status == reqwest::StatusCode::NOT_FOUND || status == reqwest::StatusCode::GONE {
                return Self::NotFound(format!("HTTP {}", status.as_u16()));
            }
        }
        // Timeouts, connect failures, resets and everything else
        Self::Transient(e.to_string())
    }
}

impl From<serde_json::Error> for StrategyError {
    fn from(e: serde_json::Error) -> Self {
        Self::Malformed(format!("invalid JSON: {}", e))
    }
}

/// A strategy failure tagged with the strategy name
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolutionError {
    pub strategy: String,
    pub kind: &'static str,
    pub cause: String,
}

impl ResolutionError {
    pub fn new(strategy: &str, error: &StrategyError) -> Self {
        Self {
            strategy: strategy.to_string(),
            kind: error.kind(),
            cause: error.message().to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == "not_found"
    }

    pub fn is_malformed(&self) -> bool {
        self.kind == "malformed"
    }
}

impl fmt::Display for ResolutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.strategy, self.kind, self.cause)
    }
}

/// Aggregate produced when every strategy in the chain failed.
/// One entry per attempted strategy, in attempt order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChainError {
    pub attempts: Vec<ResolutionError>,
}

impl ChainError {
    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    /// Map the aggregate onto the caller-facing taxonomy.
    ///
    /// A valid "no such post" answer from any surface wins; a chain that only
    /// saw unparseable bodies is a schema problem; anything else means the
    /// upstream surfaces were unreachable.
    pub fn into_failure(self, post_id: &PostId) -> ResolutionFailure {
        if self.attempts.iter().any(ResolutionError::is_not_found) {
            return ResolutionFailure::PostNotFound {
                post_id: post_id.to_string(),
                attempts: self.attempts,
            };
        }
        if !self.attempts.is_empty() && self.attempts.iter().all(ResolutionError::is_malformed) {
            let detail = self
                .attempts
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" | ");
            return ResolutionFailure::MalformedUpstreamResponse(detail);
        }
        ResolutionFailure::UpstreamUnavailable {
            attempts: self.attempts,
        }
    }
}

impl fmt::Display for ChainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.attempts.is_empty() {
            return write!(f, "no strategies configured");
        }
        let parts: Vec<String> = self.attempts.iter().map(ToString::to_string).collect();
        write!(f, "all strategies failed: {}", parts.join("; "))
    }
}

impl std::error::Error for ChainError {}

/// Caller-facing outcome of a failed ResolvePost or delivery
#[derive(Debug, Clone, thiserror::Error)]
pub enum ResolutionFailure {
    /// No post ID could be extracted from the locator
    #[error("Invalid locator: {0}")]
    InvalidLocator(String),

    /// Every strategy failed; carries the per-strategy causes
    #[error("Upstream unavailable: {} strategy attempt(s) failed", .attempts.len())]
    UpstreamUnavailable { attempts: Vec<ResolutionError> },

    /// An upstream confirmed the post does not exist or is private
    #[error("Post not found: {post_id}")]
    PostNotFound {
        post_id: String,
        attempts: Vec<ResolutionError>,
    },

    /// A required field was missing from every payload
    #[error("Malformed upstream response: {0}")]
    MalformedUpstreamResponse(String),

    /// Raw-bytes delivery could not retrieve the chosen media
    #[error("Media fetch failed: {0}")]
    MediaFetchFailed(String),

    /// Indexed image request outside the gallery bounds
    #[error("Image index {index} out of range (post has {len} image(s))")]
    IndexOutOfRange { index: usize, len: usize },
}

impl ResolutionFailure {
    /// Client mistakes as opposed to service-side failures
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidLocator(_) | Self::PostNotFound { .. } | Self::IndexOutOfRange { .. }
        )
    }

    /// Short message that never consists of raw upstream text
    pub fn summary(&self) -> String {
        match self {
            Self::InvalidLocator(_) => "Invalid post URL: no post ID found".to_string(),
            Self::UpstreamUnavailable { attempts } => format!(
                "Could not reach the post: all {} upstream source(s) failed",
                attempts.len()
            ),
            Self::PostNotFound { post_id, .. } => {
                format!("Post {} does not exist or is private", post_id)
            }
            Self::MalformedUpstreamResponse(_) => {
                "Upstream returned data in an unexpected format".to_string()
            }
            Self::MediaFetchFailed(_) => "Could not download the selected media".to_string(),
            Self::IndexOutOfRange { index, len } => {
                format!("Image index {} is out of range (0..{})", index, len)
            }
        }
    }

    /// Upstream diagnostics retained for logs and debugging
    pub fn detail(&self) -> Option<String> {
        match self {
            Self::InvalidLocator(url) => Some(url.clone()),
            Self::UpstreamUnavailable { attempts } | Self::PostNotFound { attempts, .. } => {
                if attempts.is_empty() {
                    None
                } else {
                    Some(
                        attempts
                            .iter()
                            .map(ToString::to_string)
                            .collect::<Vec<_>>()
                            .join("; "),
                    )
                }
            }
            Self::MalformedUpstreamResponse(msg) | Self::MediaFetchFailed(msg) => Some(msg.clone()),
            Self::IndexOutOfRange { .. } => None,
        }
    }

    /// Per-strategy causes when the failure came out of the chain
    pub fn attempts(&self) -> &[ResolutionError] {
        match self {
            Self::UpstreamUnavailable { attempts } | Self::PostNotFound { attempts, .. } => attempts,
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt(strategy: &str, error: StrategyError) -> ResolutionError {
        ResolutionError::new(strategy, &error)
    }

    #[test]
    fn test_malformed_counts_as_transient() {
        assert!(StrategyError::malformed("bad").is_transient());
        assert!(StrategyError::transient("timeout").is_transient());
        assert!(!StrategyError::not_found("gone").is_transient());
    }

    #[test]
    fn test_not_found_wins_aggregate() {
        let err = ChainError {
            attempts: vec![
                attempt("web", StrategyError::transient("timeout")),
                attempt("mobile", StrategyError::not_found("deleted")),
            ],
        };
        let failure = err.into_failure(&PostId::new("123"));
        assert!(matches!(failure, ResolutionFailure::PostNotFound { .. }));
        assert!(failure.is_client_error());
        assert_eq!(failure.attempts().len(), 2);
    }

    #[test]
    fn test_transient_aggregate_is_service_error() {
        let err = ChainError {
            attempts: vec![
                attempt("web", StrategyError::transient("HTTP 503")),
                attempt("html", StrategyError::malformed("no anchor")),
            ],
        };
        let failure = err.into_failure(&PostId::new("123"));
        assert!(matches!(failure, ResolutionFailure::UpstreamUnavailable { .. }));
        assert!(!failure.is_client_error());
    }

    #[test]
    fn test_all_malformed_aggregate() {
        let err = ChainError {
            attempts: vec![attempt("web", StrategyError::malformed("missing itemStruct"))],
        };
        let failure = err.into_failure(&PostId::new("1"));
        assert!(matches!(failure, ResolutionFailure::MalformedUpstreamResponse(_)));
    }

    #[test]
    fn test_summary_hides_upstream_text() {
        let failure = ResolutionFailure::UpstreamUnavailable {
            attempts: vec![attempt("web", StrategyError::transient("<html>captcha</html>"))],
        };
        assert!(!failure.summary().contains("captcha"));
        assert!(failure.detail().unwrap_or_default().contains("captcha"));
    }
}
