//! Application configuration management.
//!
//! Configuration is loaded from an optional YAML file with environment variable overrides. The
//! configuration file path defaults to `config.yaml` but can be specified via `-f` flag or
//! `GAMEDROP_CONFIG` environment variable.
//!
//! ## Loading Priority
//!
//! Configuration sources are merged in the following order (later sources override earlier ones):
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`, may be absent)
//! 2. **Environment variables** - Variables prefixed with `GAMEDROP_` override YAML values
//! 3. **Legacy variables** - The flat `FTP_*`, `GAMES_BASE_PATH`, `PREVIEW_IMAGES_BASE_PATH`,
//!    `FTP_FLAT_UPLOAD` and `PORT` variables used by existing `.env` files
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `GAMEDROP_REMOTE__PORT=22` sets the `remote.port` field.
//!
//! ## Environment Variable Examples
//!
//! ```bash
//! # SFTP on the standard port
//! FTP_HOST=files.example.com
//! FTP_PORT=22
//! FTP_USER=deploy
//! FTP_PASSWORD=secret
//! FTP_USE_SFTP=true
//!
//! # Keep the client's folder layout instead of category/gameName
//! FTP_FLAT_UPLOAD=yes
//!
//! # Same thing through the prefixed form
//! GAMEDROP_UPLOAD__FLAT=true
//! ```

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Deserializer, Serialize, de};
use std::{fmt, time::Duration};
use url::Url;

use crate::relay::Protocol;

/// Legacy flat environment variables and the config keys they populate.
const LEGACY_ENV: &[(&str, &str)] = &[
    ("PORT", "port"),
    ("FTP_HOST", "remote.host"),
    ("FTP_PORT", "remote.port"),
    ("FTP_USER", "remote.username"),
    ("FTP_PASSWORD", "remote.password"),
    ("FTP_USE_SFTP", "remote.use_sftp"),
    ("FTP_SECURE", "remote.secure"),
    ("GAMES_BASE_PATH", "paths.games"),
    ("PREVIEW_IMAGES_BASE_PATH", "paths.preview_images"),
    ("FTP_FLAT_UPLOAD", "upload.flat"),
];

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "GAMEDROP_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
///
/// Loaded once at startup and handed to the application by value; nothing reads the
/// environment after this point.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Connection settings for the remote file store
    pub remote: RemoteConfig,
    /// Base directories on the remote store
    pub paths: PathsConfig,
    /// Upload placement and request limits
    pub upload: UploadConfig,
    /// Cross-origin settings for browser clients
    pub cors: CorsConfig,
    /// Enable OpenTelemetry OTLP export for distributed tracing
    pub enable_otel_export: bool,
}

/// Remote FTP/SFTP server settings.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct RemoteConfig {
    /// Host name only; a scheme or trailing path is stripped on load
    pub host: String,
    pub port: u16,
    #[serde(deserialize_with = "deserialize_text")]
    pub username: String,
    #[serde(skip_serializing, deserialize_with = "deserialize_text")]
    pub password: String,
    /// Use SFTP instead of FTP
    #[serde(deserialize_with = "deserialize_flag")]
    pub use_sftp: bool,
    /// Upgrade FTP control and data channels to TLS (explicit FTPS)
    #[serde(deserialize_with = "deserialize_flag")]
    pub secure: bool,
    /// Upper bound on connecting and authenticating for an upload session
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Upper bound on connecting and authenticating for `/test-connection`
    #[serde(with = "humantime_serde")]
    pub test_connect_timeout: Duration,
}

// Hand-written so the password never ends up in logs.
impl fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("use_sftp", &self.use_sftp)
            .field("secure", &self.secure)
            .field("connect_timeout", &self.connect_timeout)
            .field("test_connect_timeout", &self.test_connect_timeout)
            .finish()
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 21,
            username: String::new(),
            password: String::new(),
            use_sftp: false,
            secure: false,
            connect_timeout: Duration::from_secs(60),
            test_connect_timeout: Duration::from_secs(10),
        }
    }
}

impl RemoteConfig {
    pub fn protocol(&self) -> Protocol {
        if self.use_sftp { Protocol::Sftp } else { Protocol::Ftp }
    }

    /// Host and username are the minimum needed to open a session.
    pub fn is_configured(&self) -> bool {
        !self.host.is_empty() && !self.username.is_empty()
    }

    /// SFTP pointed at the conventional FTP port is almost always a misconfiguration.
    pub fn sftp_on_ftp_port(&self) -> bool {
        self.use_sftp && self.port == 21
    }
}

/// Base directories on the remote store, without trailing slashes.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathsConfig {
    /// Root for game uploads
    pub games: String,
    /// Root for preview images
    pub preview_images: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            games: "public_html/games".to_string(),
            preview_images: "public_html/assets/previewImages".to_string(),
        }
    }
}

/// Upload placement mode and request limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct UploadConfig {
    /// Place files by their client-supplied relative paths instead of `category/gameName`
    #[serde(deserialize_with = "deserialize_flag")]
    pub flat: bool,
    /// Maximum number of `files` parts accepted in one request
    pub max_files: usize,
    /// Maximum size of a whole multipart request body, in bytes
    pub max_body_size: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            flat: false,
            max_files: 500,
            max_body_size: 512 * 1024 * 1024,
        }
    }
}

/// CORS configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorsConfig {
    /// Allowed origins. Empty means any origin is echoed back.
    pub allowed_origins: Vec<CorsOrigin>,
    /// Cache preflight requests for this many seconds
    pub max_age: Option<u64>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: Vec::new(),
            max_age: Some(3600),
        }
    }
}

/// CORS origin specification.
///
/// Can be either a wildcard (`*`) to allow all origins, or a specific URL.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum CorsOrigin {
    /// Allow all origins (`*`)
    #[serde(deserialize_with = "parse_wildcard")]
    Wildcard,
    /// Specific origin URL (e.g., `https://games.example.com`)
    #[serde(deserialize_with = "parse_url")]
    Url(Url),
}

fn parse_wildcard<'de, D>(deserializer: D) -> Result<(), D::Error>
where
    D: Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    if s == "*" {
        Ok(())
    } else {
        Err(de::Error::custom("Expected '*'"))
    }
}

fn parse_url<'de, D>(deserializer: D) -> Result<Url, D::Error>
where
    D: Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    Url::parse(&s).map_err(de::Error::custom)
}

/// Accepts real booleans as well as the `1|true|yes` strings (any case) that existing `.env`
/// files use. Anything else is `false`.
fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    struct FlagVisitor;

    impl de::Visitor<'_> for FlagVisitor {
        type Value = bool;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a boolean or one of 1, true, yes")
        }

        fn visit_bool<E: de::Error>(self, v: bool) -> Result<bool, E> {
            Ok(v)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<bool, E> {
            Ok(v == 1)
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<bool, E> {
            Ok(v == 1)
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<bool, E> {
            Ok(parse_flag(v))
        }
    }

    deserializer.deserialize_any(FlagVisitor)
}

/// Environment values that look numeric arrive as numbers; credentials must stay text.
fn deserialize_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    struct TextVisitor;

    impl de::Visitor<'_> for TextVisitor {
        type Value = String;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a string")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_bool<E: de::Error>(self, v: bool) -> Result<String, E> {
            Ok(v.to_string())
        }
    }

    deserializer.deserialize_any(TextVisitor)
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}

/// Reduce whatever was pasted into the host setting to a bare host name:
/// `https://files.example.com/public_html` becomes `files.example.com`.
pub fn normalize_host(raw: &str) -> String {
    let trimmed = raw.trim();
    let lower = trimmed.to_ascii_lowercase();
    let without_scheme = if lower.starts_with("https://") {
        &trimmed[8..]
    } else if lower.starts_with("http://") {
        &trimmed[7..]
    } else {
        trimmed
    };
    let host = without_scheme.split('/').next().unwrap_or_default();
    host.trim().to_string()
}

fn normalize_base_path(raw: &str) -> String {
    raw.trim_end_matches('/').to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3010,
            remote: RemoteConfig::default(),
            paths: PathsConfig::default(),
            upload: UploadConfig::default(),
            cors: CorsConfig::default(),
            enable_otel_export: false,
        }
    }
}

/// Reasons a loaded configuration is rejected.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config validation: {0}")]
    Invalid(String),
}

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let mut config: Self = Self::figment(args).extract()?;
        config.normalize();
        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    /// Strip scheme/path noise from the host and trailing slashes from the base paths.
    pub fn normalize(&mut self) {
        self.remote.host = normalize_host(&self.remote.host);
        self.paths.games = normalize_base_path(&self.paths.games);
        self.paths.preview_images = normalize_base_path(&self.paths.preview_images);
    }

    /// Validate the configuration for consistency.
    ///
    /// Missing remote credentials are deliberately not an error here: the gateway starts and
    /// reports the problem on each request instead.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.remote.port == 0 {
            return Err(ConfigError::Invalid("remote.port cannot be 0".to_string()));
        }

        if self.upload.max_files == 0 {
            return Err(ConfigError::Invalid(
                "upload.max_files cannot be 0. Set a positive integer value (default: 500).".to_string(),
            ));
        }

        if self.upload.max_body_size == 0 {
            return Err(ConfigError::Invalid("upload.max_body_size cannot be 0".to_string()));
        }

        let has_wildcard = self.cors.allowed_origins.iter().any(|o| matches!(o, CorsOrigin::Wildcard));
        if has_wildcard && self.cors.allowed_origins.len() > 1 {
            return Err(ConfigError::Invalid(
                "cors.allowed_origins cannot mix '*' with explicit origins".to_string(),
            ));
        }

        Ok(())
    }

    pub fn figment(args: &Args) -> Figment {
        // An empty `KEY=` line in .env leaves the default in place
        let legacy: Vec<&str> = LEGACY_ENV
            .iter()
            .map(|(name, _)| *name)
            .filter(|name| std::env::var(name).is_ok_and(|value| !value.trim().is_empty()))
            .collect();

        Figment::new()
            // Load base config file
            .merge(Yaml::file(&args.config))
            // Environment variables can still override specific values; GAMEDROP_CONFIG names the file
            .merge(Env::prefixed("GAMEDROP_").ignore(&["CONFIG"]).split("__"))
            // Flat variables from the original .env layout
            .merge(Env::raw().only(&legacy).map(|key| {
                LEGACY_ENV
                    .iter()
                    .find(|(name, _)| key == *name)
                    .map(|(_, path)| (*path).into())
                    .unwrap_or_else(|| key.as_str().to_string().into())
            }))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    fn args(config: &str) -> Args {
        Args {
            config: config.to_string(),
            validate: false,
        }
    }

    #[test]
    fn test_defaults_without_config_file() {
        Jail::expect_with(|_jail| {
            let config = Config::load(&args("missing.yaml"))?;

            assert_eq!(config.port, 3010);
            assert_eq!(config.remote.port, 21);
            assert_eq!(config.remote.protocol(), Protocol::Ftp);
            assert!(!config.remote.is_configured());
            assert_eq!(config.paths.games, "public_html/games");
            assert_eq!(config.paths.preview_images, "public_html/assets/previewImages");
            assert!(!config.upload.flat);
            assert_eq!(config.upload.max_files, 500);
            assert_eq!(config.remote.connect_timeout, Duration::from_secs(60));
            assert_eq!(config.remote.test_connect_timeout, Duration::from_secs(10));

            Ok(())
        });
    }

    #[test]
    fn test_yaml_and_prefixed_env_override() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
port: 8080
remote:
  host: files.example.com
  username: deploy
  connect_timeout: 30s
paths:
  games: srv/games/
"#,
            )?;

            jail.set_env("GAMEDROP_CONFIG", "test.yaml");
            jail.set_env("GAMEDROP_REMOTE__PORT", "22");
            jail.set_env("GAMEDROP_REMOTE__USE_SFTP", "true");

            let config = Config::load(&args("test.yaml"))?;

            assert_eq!(config.port, 8080);
            assert_eq!(config.remote.host, "files.example.com");
            assert_eq!(config.remote.port, 22);
            assert_eq!(config.remote.protocol(), Protocol::Sftp);
            assert_eq!(config.remote.connect_timeout, Duration::from_secs(30));
            // trailing slash removed
            assert_eq!(config.paths.games, "srv/games");
            assert!(config.remote.is_configured());

            Ok(())
        });
    }

    #[test]
    fn test_legacy_env_variables() {
        Jail::expect_with(|jail| {
            jail.set_env("PORT", "4000");
            jail.set_env("FTP_HOST", "https://cloud.example.com/public_html/");
            jail.set_env("FTP_PORT", "22");
            jail.set_env("FTP_USER", "games");
            jail.set_env("FTP_PASSWORD", "123456");
            jail.set_env("FTP_USE_SFTP", "YES");
            jail.set_env("FTP_SECURE", "1");
            jail.set_env("GAMES_BASE_PATH", "www/games///");
            jail.set_env("PREVIEW_IMAGES_BASE_PATH", "www/previews/");
            jail.set_env("FTP_FLAT_UPLOAD", "true");

            let config = Config::load(&args("missing.yaml"))?;

            assert_eq!(config.port, 4000);
            assert_eq!(config.remote.host, "cloud.example.com");
            assert_eq!(config.remote.port, 22);
            assert_eq!(config.remote.username, "games");
            assert_eq!(config.remote.password, "123456");
            assert!(config.remote.use_sftp);
            assert!(config.remote.secure);
            assert_eq!(config.paths.games, "www/games");
            assert_eq!(config.paths.preview_images, "www/previews");
            assert!(config.upload.flat);

            Ok(())
        });
    }

    #[test]
    fn test_empty_legacy_variables_keep_defaults() {
        Jail::expect_with(|jail| {
            jail.set_env("PORT", "");
            jail.set_env("FTP_PORT", "");
            jail.set_env("FTP_HOST", "files.example.com");
            jail.set_env("GAMES_BASE_PATH", "");
            jail.set_env("PREVIEW_IMAGES_BASE_PATH", " ");
            jail.set_env("FTP_FLAT_UPLOAD", "");

            let config = Config::load(&args("missing.yaml"))?;

            assert_eq!(config.port, 3010);
            assert_eq!(config.remote.port, 21);
            assert_eq!(config.remote.host, "files.example.com");
            assert_eq!(config.paths.games, "public_html/games");
            assert_eq!(config.paths.preview_images, "public_html/assets/previewImages");
            assert!(!config.upload.flat);

            Ok(())
        });
    }

    #[test]
    fn test_legacy_flags_reject_other_values() {
        Jail::expect_with(|jail| {
            jail.set_env("FTP_USE_SFTP", "on");
            jail.set_env("FTP_FLAT_UPLOAD", "0");

            let config = Config::load(&args("missing.yaml"))?;

            assert!(!config.remote.use_sftp);
            assert!(!config.upload.flat);

            Ok(())
        });
    }

    #[test]
    fn test_zero_max_files_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
upload:
  max_files: 0
"#,
            )?;

            let result = Config::load(&args("test.yaml"));
            assert!(result.is_err());
            assert!(result.unwrap_err().to_string().contains("max_files"));

            Ok(())
        });
    }

    #[test]
    fn test_normalize_host() {
        assert_eq!(normalize_host("cloud.example.com"), "cloud.example.com");
        assert_eq!(normalize_host("  HTTPS://cloud.example.com/x/y "), "cloud.example.com");
        assert_eq!(normalize_host("http://cloud.example.com"), "cloud.example.com");
        assert_eq!(normalize_host("cloud.example.com/public_html"), "cloud.example.com");
        assert_eq!(normalize_host(""), "");
    }

    #[test]
    fn test_sftp_on_ftp_port() {
        let mut remote = RemoteConfig {
            use_sftp: true,
            ..Default::default()
        };
        assert!(remote.sftp_on_ftp_port());

        remote.port = 22;
        assert!(!remote.sftp_on_ftp_port());

        remote.use_sftp = false;
        remote.port = 21;
        assert!(!remote.sftp_on_ftp_port());
    }

    #[test]
    fn test_password_not_in_debug_output() {
        let remote = RemoteConfig {
            password: "hunter2".to_string(),
            ..Default::default()
        };
        assert!(!format!("{remote:?}").contains("hunter2"));
    }
}
