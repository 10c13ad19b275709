use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::{Client, Method, StatusCode, Url};
use serde::{Serialize, de::DeserializeOwned};
use tracing::debug;

use crate::dao::{
    state_store::{PersistedState, StateStore, state_key},
    storage::StorageResult,
};

use super::{
    config::CouchConfig,
    error::{CouchDaoError, CouchResult},
    models::{CouchStateDocument, RevisionOnly},
};

/// Attempts of a save racing other writers of the same document.
const SAVE_ATTEMPTS: usize = 3;

/// State store keeping one CouchDB document per server.
#[derive(Clone)]
pub struct CouchStateStore {
    client: Client,
    database_url: Arc<Url>,
    auth: Option<(Arc<str>, Arc<str>)>,
}

impl CouchStateStore {
    /// Establish a connection to CouchDB and ensure the database exists.
    pub async fn connect(config: CouchConfig) -> CouchResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| CouchDaoError::ClientBuilder { source })?;

        let base = parse_base_url(&config.base_url)?;
        let auth = config
            .username
            .zip(config.password)
            .map(|(u, p)| (Arc::<str>::from(u), Arc::<str>::from(p)));

        let store = Self {
            client,
            database_url: Arc::new(endpoint(&base, &[&config.database])),
            auth,
        };

        store.ensure_database().await?;
        Ok(store)
    }

    fn request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.auth {
            Some((user, pass)) => builder.basic_auth(user.as_ref(), Some(pass.as_ref())),
            None => builder,
        }
    }

    fn database(&self) -> String {
        self.database_url.to_string()
    }

    async fn ensure_database(&self) -> CouchResult<()> {
        let url = (*self.database_url).clone();
        let response = self
            .request(Method::GET, url.clone())
            .send()
            .await
            .map_err(|source| CouchDaoError::DatabaseQuery {
                database: self.database(),
                source,
            })?;

        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::NOT_FOUND => {
                debug!(database = %url, "creating CouchDB database");
                let create = self.request(Method::PUT, url).send().await.map_err(|source| {
                    CouchDaoError::DatabaseCreate {
                        database: self.database(),
                        source,
                    }
                })?;
                if create.status().is_success() {
                    Ok(())
                } else {
                    Err(CouchDaoError::DatabaseStatus {
                        database: self.database(),
                        status: create.status(),
                    })
                }
            }
            other => Err(CouchDaoError::DatabaseStatus {
                database: self.database(),
                status: other,
            }),
        }
    }

    async fn get_document<T>(&self, doc_id: &str) -> CouchResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        let url = endpoint(&self.database_url, &[doc_id]);
        let response = self
            .request(Method::GET, url)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                response.json::<T>().await.map(Some).map_err(|source| {
                    CouchDaoError::DecodeResponse {
                        path: doc_id.to_string(),
                        source,
                    }
                })
            }
            other => Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status: other,
            }),
        }
    }

    async fn put_document<T>(&self, doc_id: &str, document: &T) -> CouchResult<()>
    where
        T: ?Sized + Serialize,
    {
        let url = endpoint(&self.database_url, &[doc_id]);
        let response = self
            .request(Method::PUT, url)
            .json(document)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::CONFLICT => Err(CouchDaoError::Conflict {
                path: doc_id.to_string(),
            }),
            other => Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status: other,
            }),
        }
    }

    /// Overwrite the state document, re-reading its revision when another
    /// writer got there first.
    async fn write_state(&self, server_id: &str, state: PersistedState) -> CouchResult<()> {
        let doc_id = state_key(server_id);
        let mut attempt = 1;
        loop {
            let rev = self
                .get_document::<RevisionOnly>(&doc_id)
                .await?
                .map(|existing| existing.rev);
            let doc = CouchStateDocument::new(server_id, state.clone(), rev);
            match self.put_document(&doc_id, &doc).await {
                Err(CouchDaoError::Conflict { .. }) if attempt < SAVE_ATTEMPTS => {
                    debug!(server_id, attempt, "revision conflict; retrying save");
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

/// Validate `COUCH_BASE_URL`; documents are addressed as path segments below it.
fn parse_base_url(raw: &str) -> CouchResult<Url> {
    let url = Url::parse(raw).map_err(|err| CouchDaoError::InvalidBaseUrl {
        url: raw.to_string(),
        reason: err.to_string(),
    })?;
    if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") {
        return Err(CouchDaoError::InvalidBaseUrl {
            url: raw.to_string(),
            reason: "expected an http(s) URL".into(),
        });
    }
    Ok(url)
}

/// `base` extended with percent-encoded path `segments`.
fn endpoint(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}

impl StateStore for CouchStateStore {
    fn load(&self, server_id: &str) -> BoxFuture<'static, StorageResult<Option<PersistedState>>> {
        let store = self.clone();
        let doc_id = state_key(server_id);
        Box::pin(async move {
            let maybe_doc = store.get_document::<CouchStateDocument>(&doc_id).await?;
            Ok(maybe_doc.map(|doc| doc.state))
        })
    }

    fn save(&self, server_id: &str, state: PersistedState) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        let server_id = server_id.to_string();
        Box::pin(async move { store.write_state(&server_id, state).await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let response = store
                .request(Method::GET, (*store.database_url).clone())
                .send()
                .await
                .map_err(|source| CouchDaoError::RequestSend {
                    path: store.database(),
                    source,
                })?;

            if response.status().is_success() {
                Ok(())
            } else {
                Err(CouchDaoError::RequestStatus {
                    path: store.database(),
                    status: response.status(),
                }
                .into())
            }
        })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ensure_database().await.map_err(Into::into) })
    }
}
