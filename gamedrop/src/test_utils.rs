//! Test helpers: an in-memory remote store and preconfigured application builders.

use async_trait::async_trait;
use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use crate::{
    Application,
    config::Config,
    relay::{Protocol, RemoteConnector, RemotePath, RemoteSession, TransferError},
};

/// One call the relay made against a [`MemoryStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    Connect,
    CreateDir(String),
    CheckDir(String),
    WriteFile(String),
    Close,
}

#[derive(Default)]
struct StoreState {
    dirs: BTreeSet<String>,
    files: BTreeMap<String, Vec<u8>>,
    events: Vec<StoreEvent>,
    fail_connect: Option<String>,
    fail_create_dir: HashMap<String, String>,
    fail_write: HashMap<String, String>,
    bare_exists_replies: bool,
    connect_timeouts: Vec<Duration>,
}

/// Remote store kept in memory.
///
/// Behaves like a strict server: a directory can only be created inside an existing one, and a
/// file can only be written into an existing directory. Creating an existing directory fails
/// with `550 <dir>: File exists`. Failures can be injected per path.
#[derive(Clone)]
pub struct MemoryStore {
    protocol: Protocol,
    state: Arc<Mutex<StoreState>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_protocol(Protocol::Ftp)
    }

    pub fn with_protocol(protocol: Protocol) -> Self {
        Self {
            protocol,
            state: Arc::default(),
        }
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().expect("memory store lock poisoned")
    }

    /// Pretend `dir` and all its parents already exist.
    pub fn seed_dir(&self, dir: &str) {
        let path = RemotePath::from_base(dir);
        let mut state = self.state();
        for prefix in path.prefixes() {
            state.dirs.insert(prefix.to_string());
        }
    }

    pub fn fail_connect(&self, message: &str) {
        self.state().fail_connect = Some(message.to_string());
    }

    pub fn fail_create_dir(&self, dir: &str, message: &str) {
        self.state().fail_create_dir.insert(dir.to_string(), message.to_string());
    }

    /// Answer a create of an existing directory with a generic 550 that does not say why.
    pub fn bare_exists_replies(&self) {
        self.state().bare_exists_replies = true;
    }

    pub fn fail_write(&self, path: &str, message: &str) {
        self.state().fail_write.insert(path.to_string(), message.to_string());
    }

    pub fn events(&self) -> Vec<StoreEvent> {
        self.state().events.clone()
    }

    /// Contents of a written file.
    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.state().files.get(path).cloned()
    }

    /// Paths of all written files, sorted.
    pub fn files(&self) -> Vec<String> {
        self.state().files.keys().cloned().collect()
    }

    pub fn connects(&self) -> usize {
        self.count(|e| *e == StoreEvent::Connect)
    }

    pub fn closes(&self) -> usize {
        self.count(|e| *e == StoreEvent::Close)
    }

    /// Timeouts passed to each connect call, in order.
    pub fn connect_timeouts(&self) -> Vec<Duration> {
        self.state().connect_timeouts.clone()
    }

    fn count(&self, pred: impl Fn(&StoreEvent) -> bool) -> usize {
        self.state().events.iter().filter(|e| pred(e)).count()
    }
}

#[async_trait]
impl RemoteConnector for MemoryStore {
    fn protocol(&self) -> Protocol {
        self.protocol
    }

    async fn connect(&self, timeout: Duration) -> Result<Box<dyn RemoteSession>, TransferError> {
        let mut state = self.state();
        state.connect_timeouts.push(timeout);
        if let Some(message) = &state.fail_connect {
            return Err(TransferError::classified(None, message.clone()));
        }
        state.events.push(StoreEvent::Connect);
        Ok(Box::new(MemorySession { store: self.clone() }))
    }
}

struct MemorySession {
    store: MemoryStore,
}

fn parent_exists(state: &StoreState, path: &RemotePath) -> bool {
    match path.parent() {
        Some(parent) if !parent.is_root() => state.dirs.contains(&parent.to_string()),
        _ => true,
    }
}

#[async_trait]
impl RemoteSession for MemorySession {
    async fn create_dir(&mut self, dir: &RemotePath) -> Result<(), TransferError> {
        let key = dir.to_string();
        let mut state = self.store.state();
        state.events.push(StoreEvent::CreateDir(key.clone()));

        if let Some(message) = state.fail_create_dir.get(&key) {
            return Err(TransferError::classified(None, message.clone()));
        }
        if state.dirs.contains(&key) {
            let message = if state.bare_exists_replies {
                "550 Create directory operation failed.".to_string()
            } else {
                format!("550 {key}: File exists")
            };
            return Err(TransferError::classified(None, message));
        }
        if !parent_exists(&state, dir) {
            return Err(TransferError::classified(None, format!("550 {key}: No such file or directory")));
        }
        state.dirs.insert(key);
        Ok(())
    }

    async fn dir_exists(&mut self, dir: &RemotePath) -> Result<bool, TransferError> {
        let key = dir.to_string();
        let mut state = self.store.state();
        state.events.push(StoreEvent::CheckDir(key.clone()));
        Ok(state.dirs.contains(&key))
    }

    async fn write_file(&mut self, path: &RemotePath, content: &[u8]) -> Result<(), TransferError> {
        let key = path.to_string();
        let mut state = self.store.state();
        state.events.push(StoreEvent::WriteFile(key.clone()));

        if let Some(message) = state.fail_write.get(&key) {
            return Err(TransferError::classified(None, message.clone()));
        }
        if !parent_exists(&state, path) {
            return Err(TransferError::classified(None, format!("553 Could not create file {key}")));
        }
        state.files.insert(key, content.to_vec());
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), TransferError> {
        self.store.state().events.push(StoreEvent::Close);
        Ok(())
    }
}

/// Configuration with a remote host and user filled in and everything else at defaults.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.remote.host = "files.example.com".to_string();
    config.remote.username = "deploy".to_string();
    config.remote.password = "secret".to_string();
    config
}

/// Application wired to `store` instead of a real FTP/SFTP server.
pub fn create_test_app(config: Config, store: &MemoryStore) -> Application {
    Application::with_connector(config, Arc::new(store.clone())).expect("Failed to create test application")
}
