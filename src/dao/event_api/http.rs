use std::{sync::Arc, time::Duration};

use futures::future::BoxFuture;
use reqwest::{Client, StatusCode, header::RETRY_AFTER};
use time::OffsetDateTime;
use tracing::debug;

use crate::state::event::{EventRecord, ServerDescriptor};

use super::{
    EventSource,
    error::{FetchError, FetchResult},
    models::{ErrorBody, RawEventRecord, ServersResponse},
    parse_retry_after,
};

const EVENTS_PATH: &str = "events";
const SERVERS_PATH: &str = "servers";

/// [`EventSource`] talking to the real API over HTTP.
#[derive(Clone)]
pub struct HttpEventSource {
    client: Client,
    base_url: Arc<str>,
}

impl HttpEventSource {
    /// Build a client for `base_url` with a per-request timeout.
    pub fn new(base_url: &str, timeout: Duration) -> FetchResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| FetchError::ClientBuilder { source })?;

        Ok(Self {
            client,
            base_url: Arc::from(base_url.trim_end_matches('/')),
        })
    }

    /// GET `path` and return the raw body of a successful response.
    async fn get_body(&self, path: &str, query: &[(&str, &str)]) -> FetchResult<Vec<u8>> {
        let url = format!("{}/{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|source| FetchError::Transport {
                path: path.to_string(),
                source,
            })?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);

        let body = response
            .bytes()
            .await
            .map_err(|source| FetchError::Transport {
                path: path.to_string(),
                source,
            })?;

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = parse_retry_after(retry_after.as_deref(), OffsetDateTime::now_utc());
            debug!(path, ?retry_after, "event API asked us to back off");
            return Err(FetchError::RateLimited {
                retry_after,
                message: ErrorBody::message_from(&body),
            });
        }

        if !status.is_success() {
            return Err(FetchError::Status {
                path: path.to_string(),
                status,
                message: ErrorBody::message_from(&body),
            });
        }

        Ok(body.to_vec())
    }
}

impl EventSource for HttpEventSource {
    fn fetch_events(&self, server_id: &str) -> BoxFuture<'static, FetchResult<EventRecord>> {
        let source = self.clone();
        let server_id = server_id.to_string();
        Box::pin(async move {
            let body = source
                .get_body(EVENTS_PATH, &[("server", server_id.as_str())])
                .await?;
            let raw: RawEventRecord =
                serde_json::from_slice(&body).map_err(|source| FetchError::Decode {
                    path: EVENTS_PATH.to_string(),
                    source,
                })?;
            raw.try_into_record()
                .map_err(|reason| FetchError::InvalidRecord {
                    path: EVENTS_PATH.to_string(),
                    reason,
                })
        })
    }

    fn fetch_servers(&self) -> BoxFuture<'static, FetchResult<Vec<ServerDescriptor>>> {
        let source = self.clone();
        Box::pin(async move {
            let body = source.get_body(SERVERS_PATH, &[]).await?;
            let payload: ServersResponse =
                serde_json::from_slice(&body).map_err(|source| FetchError::Decode {
                    path: SERVERS_PATH.to_string(),
                    source,
                })?;
            Ok(payload.servers.into_iter().map(Into::into).collect())
        })
    }
}
