use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use serde_json::{Map, Value};

use crate::config::{ClientConfig, DEFAULT_TOKEN_KEY};
use crate::error::Error;
use crate::traits::SessionStore;
use crate::types::SessionToken;

/// In-process token holder. Lost when the process exits.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    token: RwLock<Option<SessionToken>>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with a token already present, as after a previous login.
    #[must_use]
    pub fn with_token(token: SessionToken) -> Self {
        Self {
            token: RwLock::new(Some(token)),
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self) -> Result<Option<SessionToken>, Error> {
        self.token
            .read()
            .map(|t| t.clone())
            .map_err(|_| Error::Storage("session lock poisoned".into()))
    }

    fn set(&self, token: SessionToken) -> Result<(), Error> {
        let mut slot = self
            .token
            .write()
            .map_err(|_| Error::Storage("session lock poisoned".into()))?;
        *slot = Some(token);
        Ok(())
    }

    fn clear(&self) -> Result<(), Error> {
        let mut slot = self
            .token
            .write()
            .map_err(|_| Error::Storage("session lock poisoned".into()))?;
        *slot = None;
        Ok(())
    }
}

/// Token persisted in a small JSON key/value file.
///
/// The token lives under a fixed key (default `"token"`); other keys in the
/// document are preserved. Writes go through a temporary file and a rename.
#[derive(Debug)]
pub struct FileSessionStore {
    path: PathBuf,
    key: String,
    write_lock: Mutex<()>,
}

impl FileSessionStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            key: DEFAULT_TOKEN_KEY.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Store at `path` under the key named by `config`.
    #[must_use]
    pub fn from_config(path: impl Into<PathBuf>, config: &ClientConfig) -> Self {
        Self::new(path).with_key(config.token_key())
    }

    /// Override the key the token is stored under.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(&self) -> Result<Map<String, Value>, Error> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(storage_error(&self.path, e)),
        };
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Ok(Map::new());
        }
        serde_json::from_slice(&raw).map_err(|e| storage_error(&self.path, e))
    }

    fn write_document(&self, doc: &Map<String, Value>) -> Result<(), Error> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| storage_error(parent, e))?;
        }
        let body = serde_json::to_vec_pretty(doc).map_err(|e| storage_error(&self.path, e))?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, body).map_err(|e| storage_error(&tmp, e))?;
        fs::rename(&tmp, &self.path).map_err(|e| storage_error(&self.path, e))
    }

    fn update(&self, apply: impl FnOnce(&mut Map<String, Value>)) -> Result<(), Error> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| Error::Storage("session lock poisoned".into()))?;
        let mut doc = self.read_document()?;
        apply(&mut doc);
        self.write_document(&doc)
    }
}

impl SessionStore for FileSessionStore {
    fn get(&self) -> Result<Option<SessionToken>, Error> {
        let doc = self.read_document()?;
        Ok(doc
            .get(&self.key)
            .and_then(Value::as_str)
            .map(SessionToken::new))
    }

    fn set(&self, token: SessionToken) -> Result<(), Error> {
        let key = self.key.clone();
        self.update(|doc| {
            doc.insert(key, Value::String(token.into()));
        })
    }

    fn clear(&self) -> Result<(), Error> {
        if !self.path.exists() {
            return Ok(());
        }
        let key = self.key.clone();
        self.update(|doc| {
            doc.remove(&key);
        })
    }
}

fn storage_error(path: &Path, e: impl std::fmt::Display) -> Error {
    Error::Storage(format!("{}: {e}", path.display()))
}
