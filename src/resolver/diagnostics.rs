// Upstream diagnostics - turns HTTP statuses and in-body status codes into failure kinds
//
// Upstream APIs often answer HTTP 200 with an error code inside the JSON, or
// an HTTP error with a captcha page. Both are mapped onto the same reasons so
// strategies report consistent StrategyError kinds.

use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;

use super::errors::StrategyError;

/// Why an upstream refused or could not serve a post
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BlockReason {
    /// 429 or an in-body rate limit code
    RateLimited,
    /// 401/403, captcha or verification wall
    Forbidden,
    /// 5xx
    ServerError,
    /// Post removed or never existed
    Deleted,
    /// Post or account is private
    Private,
    /// Not available in the requester's region
    RegionBlocked,
    Unknown,
}

impl BlockReason {
    /// The post itself is unavailable, independent of the surface asked
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Deleted | Self::Private)
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::RateLimited => "rate limited",
            Self::Forbidden => "access denied",
            Self::ServerError => "upstream server error",
            Self::Deleted => "post deleted or does not exist",
            Self::Private => "post is private",
            Self::RegionBlocked => "post not available in this region",
            Self::Unknown => "unknown upstream error",
        }
    }

    pub fn into_error(self, context: &str) -> StrategyError {
        let msg = if context.is_empty() {
            self.description().to_string()
        } else {
            format!("{} ({})", self.description(), context)
        };
        if self.is_permanent() {
            StrategyError::NotFound(msg)
        } else {
            StrategyError::Transient(msg)
        }
    }
}

/// Classify a non-success HTTP status
pub fn diagnose_status(status: StatusCode) -> Option<BlockReason> {
    if status.is_success() {
        return None;
    }
    let reason = match status {
        StatusCode::TOO_MANY_REQUESTS => BlockReason::RateLimited,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => BlockReason::Forbidden,
        StatusCode::NOT_FOUND | StatusCode::GONE => BlockReason::Deleted,
        StatusCode::UNAVAILABLE_FOR_LEGAL_REASONS => BlockReason::RegionBlocked,
        s if s.is_server_error() => BlockReason::ServerError,
        _ => BlockReason::Unknown,
    };
    Some(reason)
}

/// Fail with a StrategyError when the status is not a success
pub fn check_status(status: StatusCode, context: &str) -> Result<(), StrategyError> {
    match diagnose_status(status) {
        None => Ok(()),
        Some(reason) => Err(reason.into_error(&format!("{}: HTTP {}", context, status.as_u16()))),
    }
}

/// Inspect in-body status codes and messages of a JSON envelope.
///
/// Returns `None` when the body reports success (or reports nothing).
pub fn diagnose_body(body: &Value) -> Option<BlockReason> {
    // Web surface: statusCode / status_code, mobile: status_code, aggregator: code
    let code = ["statusCode", "status_code", "code"]
        .iter()
        .find_map(|k| body.get(*k))
        .and_then(as_i64);

    if let Some(code) = code {
        match code {
            0 => {}
            10204 | 10201 | 100004 | 2053 => return Some(BlockReason::Deleted),
            10216 | 10222 | 10219 => return Some(BlockReason::Private),
            10101 | 10000 | 2483 => return Some(BlockReason::Forbidden),
            10231 | 10215 => return Some(BlockReason::RegionBlocked),
            _ => {
                return Some(diagnose_message(&status_message(body)).unwrap_or(BlockReason::Unknown));
            }
        }
    }

    // Mobile surface reports removed items through filter lists
    let filter_reason = body
        .pointer("/filter_detail/filter_reason")
        .or_else(|| body.pointer("/filter_list/0/filter_reason"))
        .and_then(Value::as_str);
    if let Some(reason) = filter_reason {
        return diagnose_message(reason).or(Some(BlockReason::Deleted));
    }

    None
}

/// Best-effort classification of upstream message text
pub fn diagnose_message(message: &str) -> Option<BlockReason> {
    let lower = message.to_lowercase();
    if lower.is_empty() {
        return None;
    }

    if lower.contains("private") || lower.contains("friends only") {
        return Some(BlockReason::Private);
    }
    if lower.contains("not exist")
        || lower.contains("not found")
        || lower.contains("deleted")
        || lower.contains("removed")
        || lower.contains("video unavailable")
        || lower.contains("video is unavailable")
        || lower.contains("post unavailable")
        || lower.contains("parsing is failed")
    {
        return Some(BlockReason::Deleted);
    }
    if lower.contains("region") || lower.contains("country") {
        return Some(BlockReason::RegionBlocked);
    }
    if lower.contains("too many") || lower.contains("rate limit") || lower.contains("frequent") {
        return Some(BlockReason::RateLimited);
    }
    if lower.contains("captcha") || lower.contains("verify") || lower.contains("forbidden") {
        return Some(BlockReason::Forbidden);
    }
    None
}

fn status_message(body: &Value) -> String {
    ["statusMsg", "status_msg", "msg", "message"]
        .iter()
        .find_map(|k| body.get(*k).and_then(Value::as_str))
        .unwrap_or("")
        .to_string()
}

fn as_i64(v: &Value) -> Option<i64> {
    v.as_i64().or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_classification() {
        assert_eq!(diagnose_status(StatusCode::OK), None);
        assert_eq!(diagnose_status(StatusCode::TOO_MANY_REQUESTS), Some(BlockReason::RateLimited));
        assert_eq!(diagnose_status(StatusCode::BAD_GATEWAY), Some(BlockReason::ServerError));
        assert_eq!(diagnose_status(StatusCode::NOT_FOUND), Some(BlockReason::Deleted));
    }

    #[test]
    fn test_check_status_kinds() {
        assert!(check_status(StatusCode::OK, "web").is_ok());
        assert!(check_status(StatusCode::SERVICE_UNAVAILABLE, "web")
            .unwrap_err()
            .is_transient());
        assert!(check_status(StatusCode::NOT_FOUND, "web")
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn test_body_codes() {
        assert_eq!(diagnose_body(&json!({"statusCode": 0})), None);
        assert_eq!(diagnose_body(&json!({"statusCode": 10204})), Some(BlockReason::Deleted));
        assert_eq!(diagnose_body(&json!({"statusCode": 10216})), Some(BlockReason::Private));
        assert_eq!(
            diagnose_body(&json!({"code": -1, "msg": "Url parsing is failed! Please check url."})),
            Some(BlockReason::Deleted)
        );
        assert_eq!(
            diagnose_body(&json!({"status_code": 0, "filter_detail": {"filter_reason": "status_deleted"}})),
            Some(BlockReason::Deleted)
        );
    }

    #[test]
    fn test_service_outage_message_is_not_deleted() {
        let reason = diagnose_body(&json!({
            "status_code": 5,
            "status_msg": "Service unavailable, please try again later"
        }));
        assert_eq!(reason, Some(BlockReason::Unknown));
        assert!(reason.unwrap().into_error("").is_transient());
        assert_eq!(diagnose_message("Service temporarily unavailable"), None);
    }

    #[test]
    fn test_unavailable_post_messages_are_deleted() {
        assert_eq!(diagnose_message("Video unavailable"), Some(BlockReason::Deleted));
        assert_eq!(diagnose_message("This video is unavailable"), Some(BlockReason::Deleted));
        assert_eq!(diagnose_message("Post unavailable"), Some(BlockReason::Deleted));
    }

    #[test]
    fn test_permanent_reasons_map_to_not_found() {
        assert!(BlockReason::Private.into_error("").is_not_found());
        assert!(BlockReason::RateLimited.into_error("").is_transient());
    }
}
