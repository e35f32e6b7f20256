//! Transfer relay: moves one request's files to the remote store.
//!
//! Each operation opens exactly one session, creates the directories it needs depth-first,
//! writes the files one after another in request order and closes the session again, on the
//! error path as well. Nothing is retried; the first failure ends the batch.
//!
//! ```text
//! UploadRequest ──► plan (pure path resolution) ──► connect ──► ensure dirs ──► write files ──► close
//! ```

mod error;
mod ftp;
pub mod paths;
mod sftp;
pub mod store;

use bytes::Bytes;
use serde::Serialize;
use std::{collections::HashSet, fmt, sync::Arc, time::Duration};
use tracing::{debug, info, instrument, warn};

pub use error::{TransferError, TransferErrorKind, classify_message};
pub use paths::RemotePath;
pub use store::{RemoteConnector, RemoteSession, create_connector};

use crate::config::Config;
use paths::{DEFAULT_FILE_NAME, DEFAULT_PREVIEW_NAME, flat_file_path, sanitize_file_name, structured_directory};
use store::create_dir_if_missing;

/// Wire protocol of the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    Ftp,
    Sftp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Ftp => f.write_str("FTP"),
            Protocol::Sftp => f.write_str("SFTP"),
        }
    }
}

/// One uploaded file held in memory.
#[derive(Debug, Clone)]
pub struct InputFile {
    /// Original file name as sent by the client (may be empty)
    pub name: String,
    pub content: Bytes,
}

/// Files and placement metadata for a game upload.
#[derive(Debug, Clone, Default)]
pub struct GameUpload {
    pub category: String,
    pub game_name: String,
    pub files: Vec<InputFile>,
    /// Positionally aligned with `files`; only consulted in flat mode
    pub relative_paths: Option<Vec<Option<String>>>,
}

/// Where a game upload will go, resolved before any connection is made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GamePlan {
    /// Directory reported back to the client and created before the first file
    pub directory: RemotePath,
    /// Target path of each file, in request order
    pub files: Vec<RemotePath>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameUploadOutcome {
    pub uploaded: usize,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewUploadOutcome {
    pub filename: String,
    pub path: String,
}

/// A configured base directory, as written in the configuration and as segments.
#[derive(Debug, Clone)]
struct BaseDir {
    configured: String,
    path: RemotePath,
}

impl BaseDir {
    fn new(configured: &str) -> Self {
        Self {
            configured: configured.to_string(),
            path: RemotePath::from_base(configured),
        }
    }

    /// `path` as reported to clients: the configured base verbatim, then the segments below it.
    fn display(&self, path: &RemotePath) -> String {
        let below = path.segments().get(self.path.segments().len()..).unwrap_or_default();
        if below.is_empty() {
            self.configured.clone()
        } else {
            format!("{}/{}", self.configured, below.join("/"))
        }
    }
}

/// Performs uploads against one configured remote store.
#[derive(Clone)]
pub struct Relay {
    connector: Arc<dyn RemoteConnector>,
    games_base: BaseDir,
    preview_base: BaseDir,
    flat: bool,
    connect_timeout: Duration,
    test_connect_timeout: Duration,
}

impl Relay {
    pub fn new(connector: Arc<dyn RemoteConnector>, config: &Config) -> Self {
        Self {
            connector,
            games_base: BaseDir::new(&config.paths.games),
            preview_base: BaseDir::new(&config.paths.preview_images),
            flat: config.upload.flat,
            connect_timeout: config.remote.connect_timeout,
            test_connect_timeout: config.remote.test_connect_timeout,
        }
    }

    pub fn protocol(&self) -> Protocol {
        self.connector.protocol()
    }

    /// Resolve every target path for a game upload.
    pub fn plan_game(&self, upload: &GameUpload) -> GamePlan {
        if self.flat {
            let files = upload
                .files
                .iter()
                .enumerate()
                .map(|(i, file)| {
                    let relative = upload
                        .relative_paths
                        .as_ref()
                        .and_then(|paths| paths.get(i))
                        .and_then(|p| p.as_deref());
                    self.games_base.path.concat(&flat_file_path(relative, &file.name))
                })
                .collect();
            GamePlan {
                directory: self.games_base.path.clone(),
                files,
            }
        } else {
            let directory = structured_directory(&self.games_base.path, &upload.category, &upload.game_name);
            let files = upload
                .files
                .iter()
                .map(|file| directory.join(sanitize_file_name(&file.name, DEFAULT_FILE_NAME)))
                .collect();
            GamePlan { directory, files }
        }
    }

    /// Upload a batch of game files in one session.
    #[instrument(skip_all, fields(protocol = %self.protocol(), files = upload.files.len(), flat = self.flat))]
    pub async fn upload_game(&self, upload: &GameUpload) -> Result<GameUploadOutcome, TransferError> {
        let plan = self.plan_game(upload);
        let mut session = self.connector.connect(self.connect_timeout).await?;

        let result = write_batch(session.as_mut(), &plan, &upload.files).await;
        let result = release(session, result).await;

        result.map(|()| {
            let path = self.games_base.display(&plan.directory);
            info!(path = %path, uploaded = upload.files.len(), "Game files uploaded");
            GameUploadOutcome {
                uploaded: upload.files.len(),
                path,
            }
        })
    }

    /// Upload a single preview image below the preview base path.
    #[instrument(skip_all, fields(protocol = %self.protocol()))]
    pub async fn upload_preview(&self, file: &InputFile) -> Result<PreviewUploadOutcome, TransferError> {
        let filename = sanitize_file_name(&file.name, DEFAULT_PREVIEW_NAME);
        let target = self.preview_base.path.join(filename.clone());
        let plan = GamePlan {
            directory: self.preview_base.path.clone(),
            files: vec![target.clone()],
        };

        let mut session = self.connector.connect(self.connect_timeout).await?;
        let result = write_batch(session.as_mut(), &plan, std::slice::from_ref(file)).await;
        release(session, result).await?;

        let path = self.preview_base.display(&target);
        info!(path = %path, "Preview image uploaded");
        Ok(PreviewUploadOutcome { filename, path })
    }

    /// Open a session and close it straight away.
    #[instrument(skip_all, fields(protocol = %self.protocol()))]
    pub async fn test_connection(&self) -> Result<(), TransferError> {
        let session = self.connector.connect(self.test_connect_timeout).await?;
        session.close().await
    }
}

/// Create `plan.directory`, then write each file after making sure its parent exists.
async fn write_batch(session: &mut dyn RemoteSession, plan: &GamePlan, files: &[InputFile]) -> Result<(), TransferError> {
    let mut created = DirectoryCache::default();
    created.ensure(session, &plan.directory).await?;

    for (target, file) in plan.files.iter().zip(files) {
        if let Some(parent) = target.parent() {
            created.ensure(session, &parent).await?;
        }
        session.write_file(target, &file.content).await?;
        debug!(path = %target, bytes = file.content.len(), "File written");
    }
    Ok(())
}

/// Directories known to exist in the current session.
#[derive(Default)]
struct DirectoryCache {
    known: HashSet<RemotePath>,
}

impl DirectoryCache {
    /// Create `dir` one segment at a time, skipping prefixes already handled in this session.
    async fn ensure(&mut self, session: &mut dyn RemoteSession, dir: &RemotePath) -> Result<(), TransferError> {
        for prefix in dir.prefixes() {
            if self.known.contains(&prefix) {
                continue;
            }
            create_dir_if_missing(session, &prefix).await?;
            self.known.insert(prefix);
        }
        Ok(())
    }
}

/// Close the session whatever happened. A transfer error outranks a close error.
async fn release<T>(session: Box<dyn RemoteSession>, result: Result<T, TransferError>) -> Result<T, TransferError> {
    match (result, session.close().await) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(value), Err(close_err)) => {
            warn!(error = %close_err, "Transfer finished but the session did not close cleanly");
            Ok(value)
        }
        (Err(err), Err(close_err)) => {
            warn!(error = %close_err, "Failed to close session after transfer error");
            Err(err)
        }
        (Err(err), Ok(())) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{MemoryStore, StoreEvent, test_config};

    fn file(name: &str, content: &str) -> InputFile {
        InputFile {
            name: name.to_string(),
            content: Bytes::from(content.to_string()),
        }
    }

    fn relay(store: &MemoryStore, flat: bool) -> Relay {
        let mut config = test_config();
        config.upload.flat = flat;
        Relay::new(Arc::new(store.clone()), &config)
    }

    #[tokio::test]
    async fn test_structured_upload_paths() {
        let store = MemoryStore::new();
        let relay = relay(&store, false);

        let outcome = relay
            .upload_game(&GameUpload {
                category: "Arcade".to_string(),
                game_name: "Space Invaders".to_string(),
                files: vec![file("index.html", "<html>"), file("main game.js", "let x;")],
                relative_paths: None,
            })
            .await
            .unwrap();

        assert_eq!(outcome.uploaded, 2);
        assert_eq!(outcome.path, "public_html/games/Arcade/Space_Invaders");
        assert_eq!(
            store.file("public_html/games/Arcade/Space_Invaders/index.html").as_deref(),
            Some(&b"<html>"[..])
        );
        assert!(store.file("public_html/games/Arcade/Space_Invaders/main_game.js").is_some());

        // one session, directories created depth-first exactly once
        assert_eq!(
            store.events(),
            vec![
                StoreEvent::Connect,
                StoreEvent::CreateDir("public_html".into()),
                StoreEvent::CreateDir("public_html/games".into()),
                StoreEvent::CreateDir("public_html/games/Arcade".into()),
                StoreEvent::CreateDir("public_html/games/Arcade/Space_Invaders".into()),
                StoreEvent::WriteFile("public_html/games/Arcade/Space_Invaders/index.html".into()),
                StoreEvent::WriteFile("public_html/games/Arcade/Space_Invaders/main_game.js".into()),
                StoreEvent::Close,
            ]
        );
    }

    #[tokio::test]
    async fn test_structured_mode_ignores_relative_paths() {
        let store = MemoryStore::new();
        let plan = relay(&store, false).plan_game(&GameUpload {
            category: "Puzzle".to_string(),
            game_name: "Tiles".to_string(),
            files: vec![file("../evil.js", "")],
            relative_paths: Some(vec![Some("deep/dir/evil.js".to_string())]),
        });

        assert_eq!(plan.files[0].to_string(), "public_html/games/Puzzle/Tiles/__evil.js");
    }

    #[tokio::test]
    async fn test_flat_upload_creates_nested_directories_first() {
        let store = MemoryStore::new();
        let relay = relay(&store, true);

        let outcome = relay
            .upload_game(&GameUpload {
                category: "Arcade".to_string(),
                game_name: "Pong".to_string(),
                files: vec![file("bg.png", "png")],
                relative_paths: Some(vec![Some("assets/bg.png".to_string())]),
            })
            .await
            .unwrap();

        assert_eq!(outcome.path, "public_html/games");
        assert!(store.file("public_html/games/assets/bg.png").is_some());

        let events = store.events();
        let dir_pos = events
            .iter()
            .position(|e| *e == StoreEvent::CreateDir("public_html/games/assets".into()))
            .unwrap();
        let write_pos = events
            .iter()
            .position(|e| *e == StoreEvent::WriteFile("public_html/games/assets/bg.png".into()))
            .unwrap();
        assert!(dir_pos < write_pos);
    }

    #[tokio::test]
    async fn test_flat_upload_mixes_relative_paths_and_names() {
        let store = MemoryStore::new();
        let relay = relay(&store, true);

        relay
            .upload_game(&GameUpload {
                category: "c".to_string(),
                game_name: "g".to_string(),
                files: vec![
                    file("a.js", "a"),
                    file("b c.js", "b"),
                    file("d.js", "d"),
                    file("e.js", "e"),
                ],
                relative_paths: Some(vec![
                    Some("src\\lib\\a.js".to_string()),
                    None,
                    Some("src/lib/../d.js".to_string()),
                ]),
            })
            .await
            .unwrap();

        assert_eq!(
            store.files(),
            vec![
                "public_html/games/b_c.js".to_string(),
                "public_html/games/e.js".to_string(),
                "public_html/games/src/lib/a.js".to_string(),
                "public_html/games/src/lib/d.js".to_string(),
            ]
        );

        // src and src/lib are only created once even though two files live there
        let creates = store
            .events()
            .into_iter()
            .filter(|e| *e == StoreEvent::CreateDir("public_html/games/src/lib".into()))
            .count();
        assert_eq!(creates, 1);
    }

    #[tokio::test]
    async fn test_existing_directories_are_not_an_error() {
        let store = MemoryStore::new();
        store.seed_dir("public_html/games/Arcade/Pong");
        let relay = relay(&store, false);

        let upload = GameUpload {
            category: "Arcade".to_string(),
            game_name: "Pong".to_string(),
            files: vec![file("pong.js", "1")],
            relative_paths: None,
        };

        relay.upload_game(&upload).await.unwrap();
        // and again across requests
        relay.upload_game(&upload).await.unwrap();

        assert_eq!(store.file("public_html/games/Arcade/Pong/pong.js").as_deref(), Some(&b"1"[..]));
        assert_eq!(store.connects(), 2);
        assert_eq!(store.closes(), 2);
        // "File exists" replies are enough, no directory was checked separately
        assert!(!store.events().iter().any(|e| matches!(e, StoreEvent::CheckDir(_))));
    }

    #[tokio::test]
    async fn test_existing_directory_found_after_generic_failure() {
        let store = MemoryStore::new();
        store.seed_dir("public_html/games/Arcade/Pong");
        store.bare_exists_replies();
        let relay = relay(&store, false);

        relay
            .upload_game(&GameUpload {
                category: "Arcade".to_string(),
                game_name: "Pong".to_string(),
                files: vec![file("pong.js", "1")],
                relative_paths: None,
            })
            .await
            .unwrap();

        assert!(store.file("public_html/games/Arcade/Pong/pong.js").is_some());
        assert!(
            store
                .events()
                .contains(&StoreEvent::CheckDir("public_html/games/Arcade/Pong".into()))
        );
    }

    #[tokio::test]
    async fn test_response_paths_keep_configured_base() {
        let store = MemoryStore::new();
        let mut config = test_config();
        config.paths.games = "/srv/games".to_string();
        config.paths.preview_images = "/srv/previews".to_string();
        let relay = Relay::new(Arc::new(store.clone()), &config);

        let game = relay
            .upload_game(&GameUpload {
                category: "Arcade".to_string(),
                game_name: "Pong".to_string(),
                files: vec![file("pong.js", "1")],
                relative_paths: None,
            })
            .await
            .unwrap();
        assert_eq!(game.path, "/srv/games/Arcade/Pong");

        let preview = relay.upload_preview(&file("p.jpg", "jpeg")).await.unwrap();
        assert_eq!(preview.path, "/srv/previews/p.jpg");

        // the store itself still sees paths relative to the session anchor
        assert!(store.file("srv/games/Arcade/Pong/pong.js").is_some());
        assert!(store.file("srv/previews/p.jpg").is_some());
    }

    #[tokio::test]
    async fn test_flat_response_path_is_configured_base() {
        let store = MemoryStore::new();
        let mut config = test_config();
        config.upload.flat = true;
        config.paths.games = "/srv/games".to_string();
        let relay = Relay::new(Arc::new(store.clone()), &config);

        let outcome = relay
            .upload_game(&GameUpload {
                files: vec![file("a.js", "a")],
                relative_paths: Some(vec![Some("js/a.js".to_string())]),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(outcome.path, "/srv/games");
    }

    #[tokio::test]
    async fn test_failed_write_aborts_batch_and_closes_session() {
        let store = MemoryStore::new();
        store.fail_write("public_html/games/Arcade/Pong/2.js", "451 Requested action aborted: local error");
        let relay = relay(&store, false);

        let err = relay
            .upload_game(&GameUpload {
                category: "Arcade".to_string(),
                game_name: "Pong".to_string(),
                files: vec![file("1.js", "1"), file("2.js", "2"), file("3.js", "3")],
                relative_paths: None,
            })
            .await
            .unwrap_err();

        assert_eq!(err.raw(), "451 Requested action aborted: local error");
        assert!(store.file("public_html/games/Arcade/Pong/1.js").is_some());
        assert!(store.file("public_html/games/Arcade/Pong/3.js").is_none());
        assert_eq!(store.events().last(), Some(&StoreEvent::Close));
    }

    #[tokio::test]
    async fn test_directory_failure_propagates() {
        let store = MemoryStore::new();
        store.fail_create_dir("public_html/games/Arcade", "550 Permission denied");
        let relay = relay(&store, false);

        let err = relay
            .upload_game(&GameUpload {
                category: "Arcade".to_string(),
                game_name: "Pong".to_string(),
                files: vec![file("1.js", "1")],
                relative_paths: None,
            })
            .await
            .unwrap_err();

        assert_eq!(err.raw(), "550 Permission denied");
        assert_eq!(err.kind(), TransferErrorKind::RemotePathNotFound);
        assert!(store.files().is_empty());
        assert!(store.events().contains(&StoreEvent::CheckDir("public_html/games/Arcade".into())));
        assert_eq!(store.closes(), 1);
    }

    #[tokio::test]
    async fn test_connect_failure_opens_nothing() {
        let store = MemoryStore::new();
        store.fail_connect("connect ECONNREFUSED 10.1.1.1:21");
        let relay = relay(&store, false);

        let err = relay.test_connection().await.unwrap_err();
        assert_eq!(err.kind(), TransferErrorKind::ConnectionFailed);
        assert_eq!(store.closes(), 0);
    }

    #[tokio::test]
    async fn test_preview_upload() {
        let store = MemoryStore::new();
        let relay = relay(&store, true);

        let outcome = relay.upload_preview(&file("cover art.jpg", "jpeg")).await.unwrap();
        assert_eq!(outcome.filename, "cover_art.jpg");
        assert_eq!(outcome.path, "public_html/assets/previewImages/cover_art.jpg");
        assert!(store.file("public_html/assets/previewImages/cover_art.jpg").is_some());

        let unnamed = relay.upload_preview(&file("", "jpeg")).await.unwrap();
        assert_eq!(unnamed.filename, "preview.jpg");
    }

    #[tokio::test]
    async fn test_connection_test_closes_session() {
        let store = MemoryStore::new();
        relay(&store, false).test_connection().await.unwrap();
        assert_eq!(store.events(), vec![StoreEvent::Connect, StoreEvent::Close]);
    }
}
