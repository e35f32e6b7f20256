//! Remote path construction.
//!
//! Two levels of cleaning apply to caller-supplied names:
//!
//! - [`sanitize_segment`] for anything that must stay a single path segment (category, game name,
//!   original file names). Separators, `..` and shell/filesystem metacharacters are neutralised.
//! - [`normalize_relative_path`] for flat uploads, where nested directories must survive. Only
//!   empty and `..` segments are dropped; everything else is kept verbatim.
//!
//! Neither can produce a path that climbs above the base directory it is joined to.

use std::fmt;

/// Longest sanitized segment, in characters.
pub const MAX_SEGMENT_LEN: usize = 200;

/// Fallback when sanitizing leaves nothing.
pub const UNNAMED: &str = "unnamed";

/// Fallback file name for game files without a usable name.
pub const DEFAULT_FILE_NAME: &str = "file";

/// Fallback file name for a preview image without a usable name.
pub const DEFAULT_PREVIEW_NAME: &str = "preview.jpg";

/// A path on the remote store, as segments relative to the session's anchor directory.
///
/// Sessions decide what the anchor is (the FTP login directory, `/` for SFTP); this type never
/// carries a leading slash and never contains empty or `..` segments when built through the
/// constructors in this module.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct RemotePath {
    segments: Vec<String>,
}

impl RemotePath {
    /// The anchor itself.
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse a configured base path such as `public_html/games` or `/srv/games/`.
    pub fn from_base(base: &str) -> Self {
        Self {
            segments: base
                .split('/')
                .filter(|s| !s.is_empty() && *s != "..")
                .map(str::to_string)
                .collect(),
        }
    }

    pub fn join(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self { segments }
    }

    pub fn concat(&self, other: &RemotePath) -> Self {
        let mut segments = self.segments.clone();
        segments.extend(other.segments.iter().cloned());
        Self { segments }
    }

    pub fn parent(&self) -> Option<RemotePath> {
        let (_, rest) = self.segments.split_last()?;
        Some(Self { segments: rest.to_vec() })
    }

    pub fn file_name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Every non-root prefix, shortest first: `a`, `a/b`, `a/b/c`.
    pub fn prefixes(&self) -> impl Iterator<Item = RemotePath> + '_ {
        (1..=self.segments.len()).map(|n| Self {
            segments: self.segments[..n].to_vec(),
        })
    }

    /// Render as an absolute path below `anchor`.
    pub fn under(&self, anchor: &str) -> String {
        let anchor = anchor.trim_end_matches('/');
        if self.segments.is_empty() {
            return if anchor.is_empty() { "/".to_string() } else { anchor.to_string() };
        }
        format!("{}/{}", anchor, self.segments.join("/"))
    }
}

impl fmt::Display for RemotePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("/"))
    }
}

/// Make `raw` safe to use as exactly one path segment.
///
/// `/ \ * ? " < > |` and control characters become `_`, every `..` becomes `_`, runs of
/// whitespace collapse to a single `_`, and the result is cut to [`MAX_SEGMENT_LEN`] characters.
/// An empty result becomes [`UNNAMED`].
pub fn sanitize_segment(raw: &str) -> String {
    let replaced: String = raw
        .chars()
        .map(|c| match c {
            '/' | '\\' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() && !c.is_whitespace() => '_',
            c => c,
        })
        .collect();
    let replaced = replaced.replace("..", "_");

    let mut out = String::with_capacity(replaced.len());
    let mut in_whitespace = false;
    for c in replaced.chars() {
        if c.is_whitespace() {
            if !in_whitespace {
                out.push('_');
            }
            in_whitespace = true;
        } else {
            out.push(c);
            in_whitespace = false;
        }
    }

    let truncated: String = out.chars().take(MAX_SEGMENT_LEN).collect();
    if truncated.is_empty() { UNNAMED.to_string() } else { truncated }
}

/// Sanitized file name, using `default` when the client sent none.
pub fn sanitize_file_name(original: &str, default: &str) -> String {
    if original.is_empty() {
        sanitize_segment(default)
    } else {
        sanitize_segment(original)
    }
}

/// Keep a client-supplied relative path as-is apart from separators and traversal:
/// backslashes become `/`, empty and `..` segments are dropped. A path with nothing left
/// becomes [`DEFAULT_FILE_NAME`].
pub fn normalize_relative_path(raw: &str) -> RemotePath {
    if raw.trim().is_empty() {
        return RemotePath::root().join(DEFAULT_FILE_NAME);
    }

    let normalized = raw.replace('\\', "/");
    let segments: Vec<String> = normalized
        .split('/')
        .filter(|s| !s.is_empty() && *s != "..")
        .map(str::to_string)
        .collect();

    if segments.is_empty() {
        RemotePath::root().join(DEFAULT_FILE_NAME)
    } else {
        RemotePath { segments }
    }
}

/// Structured layout: `<base>/<category>/<gameName>`.
pub fn structured_directory(base: &RemotePath, category: &str, game_name: &str) -> RemotePath {
    base.join(sanitize_segment(category)).join(sanitize_segment(game_name))
}

/// Flat layout for one file, relative to the games base: the aligned relative path when one
/// was supplied, otherwise the sanitized original name.
pub fn flat_file_path(relative_path: Option<&str>, original_name: &str) -> RemotePath {
    match relative_path {
        Some(rel) if !rel.is_empty() => normalize_relative_path(rel),
        _ => RemotePath::root().join(sanitize_file_name(original_name, DEFAULT_FILE_NAME)),
    }
}
