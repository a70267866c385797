//! Query window resolution for topology collection.
//!
//! A collection request either names an explicit `[from, to]` range, falls
//! back to the configured look-back duration, or asks for an instant query.

use chrono::{DateTime, Duration, TimeZone, Utc};
use tracing::debug;

use meshctx_shared::{MeshCtxError, Result, TimeWindow};

/// Resolve the query window for a collection request, measured from now.
///
/// See [`resolve_window_at`].
pub fn resolve_window(
    explicit_from: Option<&str>,
    explicit_to: Option<&str>,
    default_minutes: Option<u32>,
) -> Result<Option<TimeWindow>> {
    resolve_window_at(explicit_from, explicit_to, default_minutes, Utc::now())
}

/// Resolve the query window relative to `now`.
///
/// - Both bounds given: parsed and checked for `from <= to`.
/// - Exactly one bound given: `InvalidInput`.
/// - Neither given: `[now - default_minutes, now]` when a default is
///   configured, otherwise `None` (instant query).
///
/// Empty strings count as absent.
pub fn resolve_window_at(
    explicit_from: Option<&str>,
    explicit_to: Option<&str>,
    default_minutes: Option<u32>,
    now: DateTime<Utc>,
) -> Result<Option<TimeWindow>> {
    let explicit_from = explicit_from.filter(|s| !s.is_empty());
    let explicit_to = explicit_to.filter(|s| !s.is_empty());

    match (explicit_from, explicit_to) {
        (Some(from), Some(to)) => {
            let from = parse_bound("from_timestamp", from)?;
            let to = parse_bound("to_timestamp", to)?;
            TimeWindow::new(from, to).map(Some)
        }
        (Some(from), None) => {
            parse_bound("from_timestamp", from)?;
            Err(one_sided())
        }
        (None, Some(to)) => {
            parse_bound("to_timestamp", to)?;
            Err(one_sided())
        }
        (None, None) => match default_minutes {
            Some(minutes) => {
                let from = now - Duration::minutes(i64::from(minutes));
                debug!(minutes, "using configured default window");
                TimeWindow::new(from, now).map(Some)
            }
            None => Ok(None),
        },
    }
}

/// Parse an RFC 3339 date-time, or failing that, integer seconds since the epoch.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    value
        .parse::<i64>()
        .ok()
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
}

fn parse_bound(param: &str, value: &str) -> Result<DateTime<Utc>> {
    parse_timestamp(value).ok_or_else(|| {
        MeshCtxError::invalid_input(format!(
            "invalid {param} '{value}': use RFC3339 or a Unix timestamp in seconds"
        ))
    })
}

fn one_sided() -> MeshCtxError {
    MeshCtxError::invalid_input(
        "both from_timestamp and to_timestamp must be provided together, or neither",
    )
}
