use serde::{Deserialize, Serialize};

use crate::dao::state_store::{PersistedState, state_key};

/// Document stored per server; the id is the namespaced state key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchStateDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(flatten)]
    pub state: PersistedState,
}

impl CouchStateDocument {
    pub fn new(server_id: &str, state: PersistedState, rev: Option<String>) -> Self {
        Self {
            id: state_key(server_id),
            rev,
            state,
        }
    }
}

/// Minimal projection used to fetch the current revision of a document.
#[derive(Debug, Deserialize)]
pub struct RevisionOnly {
    #[serde(rename = "_rev")]
    pub rev: String,
}
