mod error;
mod http;
mod models;

use std::time::Duration;

use futures::future::BoxFuture;
use time::{OffsetDateTime, PrimitiveDateTime, format_description};

use crate::state::event::{EventRecord, ServerDescriptor};

pub use self::error::{FetchError, FetchResult};
pub use self::http::HttpEventSource;

/// Delay used when a 429 carries no usable `Retry-After`.
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(10);
/// Shortest delay honoured for a 429.
pub const MIN_RETRY_AFTER: Duration = Duration::from_secs(1);
/// Longest delay honoured for a 429.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(60 * 60);

/// IMF-fixdate, the preferred HTTP-date form.
const HTTP_DATE_FORMAT: &str =
    "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT";

/// Fetch interface to the third-party event API.
pub trait EventSource: Send + Sync {
    /// Current event record of `server_id`.
    fn fetch_events(&self, server_id: &str) -> BoxFuture<'static, FetchResult<EventRecord>>;
    /// Directory of known servers.
    fn fetch_servers(&self) -> BoxFuture<'static, FetchResult<Vec<ServerDescriptor>>>;
}

/// Turn a `Retry-After` header value into a delay.
///
/// Accepts delta-seconds or an HTTP-date. Missing or unparseable values fall
/// back to [`DEFAULT_RETRY_AFTER`]; the result is clamped to
/// [`MIN_RETRY_AFTER`]..=[`MAX_RETRY_AFTER`].
pub fn parse_retry_after(value: Option<&str>, now: OffsetDateTime) -> Duration {
    let parsed = value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .and_then(|value| {
            delay_from_seconds(value).or_else(|| delay_from_http_date(value, now))
        });

    parsed
        .unwrap_or(DEFAULT_RETRY_AFTER)
        .clamp(MIN_RETRY_AFTER, MAX_RETRY_AFTER)
}

fn delay_from_seconds(value: &str) -> Option<Duration> {
    let seconds: f64 = value.parse().ok()?;
    Duration::try_from_secs_f64(seconds).ok()
}

fn delay_from_http_date(value: &str, now: OffsetDateTime) -> Option<Duration> {
    let format = format_description::parse(HTTP_DATE_FORMAT).ok()?;
    let at = PrimitiveDateTime::parse(value, &format).ok()?.assume_utc();
    let remaining = at - now;
    // Dates in the past mean "now"; the floor applies afterwards.
    Some(Duration::try_from(remaining).unwrap_or(Duration::ZERO))
}
