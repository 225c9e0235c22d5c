//! Payload sanitization.
//!
//! Applied by transports right before a payload is serialized. Values under
//! keys that match a filter are replaced with [`FILTERED`], and containers
//! nested deeper than the configured limit are replaced with [`DEPTH`].

use serde_json::{Map, Value};

/// Replacement for filtered values.
pub const FILTERED: &str = "[FILTERED]";

/// Replacement for containers nested beyond the depth limit.
pub const DEPTH: &str = "[DEPTH]";

/// Returns `true` if `key` contains any of `filters`, ignoring ASCII case.
#[must_use]
pub fn is_filtered(key: &str, filters: &[String]) -> bool {
    let key = key.to_ascii_lowercase();
    filters
        .iter()
        .any(|filter| !filter.is_empty() && key.contains(&filter.to_ascii_lowercase()))
}

/// Sanitizes a JSON payload.
///
/// The top-level value is at depth 0. An object or array found at depth
/// `max_depth` or deeper becomes [`DEPTH`]; scalars are kept at any depth.
///
/// ```
/// use honeybadger::sanitize::sanitize;
/// use serde_json::json;
///
/// let filters = vec!["password".to_owned()];
/// let clean = sanitize(
///     json!({"user": {"name": "ann", "Password": "hunter2"}, "deep": {"a": {"b": 1}}}),
///     2,
///     &filters,
/// );
/// assert_eq!(
///     clean,
///     json!({"user": {"name": "ann", "Password": "[FILTERED]"}, "deep": {"a": "[DEPTH]"}})
/// );
/// ```
#[must_use]
pub fn sanitize(value: Value, max_depth: usize, filters: &[String]) -> Value {
    sanitize_at(value, 0, max_depth, filters)
}

fn sanitize_at(value: Value, depth: usize, max_depth: usize, filters: &[String]) -> Value {
    match value {
        Value::Object(_) | Value::Array(_) if depth >= max_depth => Value::from(DEPTH),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| {
                    let value = if is_filtered(&key, filters) {
                        Value::from(FILTERED)
                    } else {
                        sanitize_at(value, depth + 1, max_depth, filters)
                    };
                    (key, value)
                })
                .collect::<Map<_, _>>(),
        ),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| sanitize_at(item, depth + 1, max_depth, filters))
                .collect(),
        ),
        scalar => scalar,
    }
}

/// Splits a `Cookie` header into name/value pairs.
pub fn parse_cookies(header: &str) -> impl Iterator<Item = (&str, &str)> {
    header
        .split(';')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((name, value)) => (name.trim(), value.trim()),
            None => (pair, ""),
        })
}

/// Renders cookies as `name=value` pairs joined with `;`, filtering values
/// whose name matches `filters`.
///
/// ```
/// use honeybadger::sanitize::{filter_cookies, parse_cookies};
///
/// let filters = vec!["password".to_owned()];
/// let header = "expected=value; password=secret";
/// assert_eq!(
///     filter_cookies(parse_cookies(header), &filters),
///     "expected=value;password=[FILTERED]"
/// );
/// ```
#[must_use]
pub fn filter_cookies<'a>(
    cookies: impl IntoIterator<Item = (&'a str, &'a str)>,
    filters: &[String],
) -> String {
    cookies
        .into_iter()
        .map(|(name, value)| {
            if is_filtered(name, filters) {
                format!("{name}={FILTERED}")
            } else {
                format!("{name}={value}")
            }
        })
        .collect::<Vec<_>>()
        .join(";")
}
