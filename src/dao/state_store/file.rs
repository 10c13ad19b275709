use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};

use futures::future::BoxFuture;
use tokio::fs;
use uuid::Uuid;

use crate::dao::{
    state_store::{PersistedState, StateStore, state_key},
    storage::{StorageError, StorageResult},
};

/// Store writing one JSON document per server into a directory.
#[derive(Clone)]
pub struct FileStateStore {
    dir: Arc<Path>,
}

impl FileStateStore {
    /// Open the store, creating `dir` when missing.
    pub async fn open(dir: impl Into<PathBuf>) -> StorageResult<Self> {
        let dir: PathBuf = dir.into();
        fs::create_dir_all(&dir).await.map_err(|source| {
            StorageError::unavailable(format!("cannot create `{}`", dir.display()), source)
        })?;
        Ok(Self {
            dir: Arc::from(dir.as_path()),
        })
    }

    fn path_for(&self, server_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(&state_key(server_id))))
    }
}

/// Map a key onto a portable file name, percent-encoding anything unusual.
fn file_stem(key: &str) -> String {
    let mut stem = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            stem.push(byte as char);
        } else {
            stem.push_str(&format!("%{byte:02X}"));
        }
    }
    stem
}

impl StateStore for FileStateStore {
    fn load(&self, server_id: &str) -> BoxFuture<'static, StorageResult<Option<PersistedState>>> {
        let path = self.path_for(server_id);
        let key = state_key(server_id);
        Box::pin(async move {
            let contents = match fs::read(&path).await {
                Ok(contents) => contents,
                Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
                Err(err) => {
                    return Err(StorageError::unavailable(
                        format!("cannot read `{}`", path.display()),
                        err,
                    ));
                }
            };

            serde_json::from_slice(&contents)
                .map(Some)
                .map_err(|source| StorageError::Corrupt { key, source })
        })
    }

    fn save(&self, server_id: &str, state: PersistedState) -> BoxFuture<'static, StorageResult<()>> {
        let path = self.path_for(server_id);
        let key = state_key(server_id);
        Box::pin(async move {
            let contents = serde_json::to_vec(&state)
                .map_err(|source| StorageError::Corrupt { key, source })?;

            // Write then rename so a crash never leaves a truncated document.
            // Each save owns its temp file; overlapping saves of one server race
            // only on the final rename.
            let tmp = path.with_extension(format!("json.{}.tmp", Uuid::new_v4().simple()));
            fs::write(&tmp, contents).await.map_err(|source| {
                StorageError::unavailable(format!("cannot write `{}`", tmp.display()), source)
            })?;
            if let Err(source) = fs::rename(&tmp, &path).await {
                let _ = fs::remove_file(&tmp).await;
                return Err(StorageError::unavailable(
                    format!("cannot replace `{}`", path.display()),
                    source,
                ));
            }
            Ok(())
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let dir = self.dir.clone();
        Box::pin(async move {
            let metadata = fs::metadata(&*dir).await.map_err(|source| {
                StorageError::unavailable(format!("cannot stat `{}`", dir.display()), source)
            })?;
            if metadata.is_dir() {
                Ok(())
            } else {
                Err(StorageError::unavailable(
                    format!("`{}` is not a directory", dir.display()),
                    std::io::Error::from(ErrorKind::NotADirectory),
                ))
            }
        })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let dir = self.dir.clone();
        Box::pin(async move {
            fs::create_dir_all(&*dir).await.map_err(|source| {
                StorageError::unavailable(format!("cannot create `{}`", dir.display()), source)
            })
        })
    }
}
