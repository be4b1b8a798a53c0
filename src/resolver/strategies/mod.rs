// Resolver strategies - one per upstream surface
//
// - web:        browser-identity JSON detail endpoint
// - mobile:     app-identity feed endpoint with per-request device identifiers
// - bulk:       app-identity batch detail endpoint, asked for one ID
// - html:       rendered page, embedded state blob
// - aggregator: third-party resolver, last resort

mod aggregator;
mod bulk;
mod html;
mod mobile;
mod traits;
mod web;

pub use aggregator::AggregatorStrategy;
pub use bulk::BulkStrategy;
pub use html::HtmlStrategy;
pub use mobile::MobileStrategy;
pub use traits::{ResolverStrategy, StrategyContext};
pub use web::WebStrategy;

use rand::Rng;
use serde_json::Value;

use super::config::StrategyKind;
use super::diagnostics::{check_status, diagnose_body};
use super::errors::StrategyError;
use super::http::{read_text, send_with_retry, RequestIdentity};

/// Instantiate strategies in the configured order
pub fn build_strategies(kinds: &[StrategyKind]) -> Vec<Box<dyn ResolverStrategy>> {
    kinds
        .iter()
        .map(|kind| -> Box<dyn ResolverStrategy> {
            match kind {
                StrategyKind::Web => Box::new(WebStrategy),
                StrategyKind::Mobile => Box::new(MobileStrategy),
                StrategyKind::Bulk => Box::new(BulkStrategy),
                StrategyKind::Html => Box::new(HtmlStrategy),
                StrategyKind::Aggregator => Box::new(AggregatorStrategy),
            }
        })
        .collect()
}

/// GET a JSON document with retry, status and in-body diagnostics applied.
///
/// Cookies set by the response are absorbed into `identity`.
pub(crate) async fn fetch_json(
    ctx: StrategyContext<'_>,
    label: &str,
    url: &str,
    query: &[(&str, String)],
    identity: &mut RequestIdentity,
) -> Result<Value, StrategyError> {
    let request_identity = identity.clone();
    let resp = send_with_retry(&ctx.config.retry, label, || {
        request_identity
            .apply(ctx.client.get(url).query(query))
            .timeout(ctx.config.request_timeout())
    })
    .await?;

    check_status(resp.status(), label)?;
    identity.absorb_cookies(resp.headers());

    let text = read_text(resp).await?;
    let document: Value = serde_json::from_str(&text)?;

    if let Some(reason) = diagnose_body(&document) {
        return Err(reason.into_error(label));
    }
    Ok(document)
}

/// Synthetic app identifiers, fresh for every request
pub(crate) fn device_params() -> Vec<(&'static str, String)> {
    let mut rng = rand::thread_rng();
    let device_id: u64 = rng.gen_range(7_000_000_000_000_000_000..7_999_999_999_999_999_999);
    let iid: u64 = rng.gen_range(7_000_000_000_000_000_000..7_999_999_999_999_999_999);
    let openudid: String = (0..16)
        .map(|_| format!("{:x}", rng.gen_range(0u8..16)))
        .collect();

    vec![
        ("device_id", device_id.to_string()),
        ("iid", iid.to_string()),
        ("openudid", openudid),
        ("aid", "1233".to_string()),
        ("app_name", "musical_ly".to_string()),
        ("version_code", "300904".to_string()),
        ("device_platform", "android".to_string()),
        ("device_type", "Pixel 7".to_string()),
        ("os_version", "13".to_string()),
        ("channel", "googleplay".to_string()),
    ]
}

/// Whether an app-surface item carries the given `aweme_id`
pub(crate) fn aweme_id_matches(item: &Value, id: &str) -> bool {
    match item.get("aweme_id") {
        Some(Value::String(s)) => s == id,
        Some(Value::Number(n)) => n.to_string() == id,
        _ => false,
    }
}

/// Find the entry of `list` whose `aweme_id` equals `id`
pub(crate) fn find_by_aweme_id<'v>(list: Option<&'v Value>, id: &str) -> Option<&'v Value> {
    list?.as_array()?.iter().find(|item| aweme_id_matches(item, id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_build_in_configured_order() {
        let names: Vec<&str> = build_strategies(&[StrategyKind::Html, StrategyKind::Web])
            .iter()
            .map(|s| s.name())
            .collect();
        assert_eq!(names, vec!["html", "web"]);
    }

    #[test]
    fn test_device_params_differ_per_call() {
        let first = device_params();
        let second = device_params();
        let id = |p: &[(&str, String)]| p.iter().find(|(k, _)| *k == "device_id").map(|(_, v)| v.clone());
        assert_eq!(id(&first).map(|v| v.len()), Some(19));
        assert_ne!(id(&first), id(&second));
    }

    #[test]
    fn test_find_by_aweme_id() {
        let list = json!([{"aweme_id": "1"}, {"aweme_id": 2}]);
        assert!(find_by_aweme_id(Some(&list), "2").is_some());
        assert!(find_by_aweme_id(Some(&list), "3").is_none());
        assert!(find_by_aweme_id(None, "1").is_none());
    }
}
