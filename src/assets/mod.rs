//! Embedded-assets virtual filesystem, used by the router as its not-found fallback.
//!
//! An [`AssetSource`] is a read-only tree of files addressed by slash-separated relative
//! paths. [`MemoryAssets`] holds files in memory (fill it from `include_bytes!` to embed a
//! build directory into the binary); [`DirAssets`] reads from a directory on disk.
//! [`sub_assets`] roots a source at one of its subdirectories, and [`SubAssets::serve`]
//! turns a request path into a response.

use std::collections::BTreeMap;
use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;

use crate::{Response, StatusCode};

/// File served for `/` and for paths ending in `/`.
const INDEX_FILE: &str = "index.html";

/// Errors raised while rooting an asset source.
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("invalid asset path `{0}`")]
    InvalidPath(String),

    #[error("asset directory `{0}` does not exist")]
    NotFound(String),
}

/// Future returned by [`AssetSource::open`].
pub type OpenFuture<'a> = Pin<Box<dyn Future<Output = io::Result<Option<Bytes>>> + Send + 'a>>;

/// A read-only tree of files.
///
/// Paths are relative, slash-separated and never contain `.` or `..` segments; `"."`
/// names the root itself.
pub trait AssetSource: Send + Sync {
    /// Returns `true` if `path` names a directory.
    fn is_dir(&self, path: &str) -> bool;

    /// Reads the file at `path`, or `None` if no such file exists.
    fn open<'a>(&'a self, path: &'a str) -> OpenFuture<'a>;
}

/// An in-memory asset tree.
///
/// # Examples
///
/// ```
/// use autoroute::assets::MemoryAssets;
///
/// let assets = MemoryAssets::new()
///     .with_file("dist/index.html", "<h1>hi</h1>")
///     .with_file("dist/app.js", "console.log(1)");
/// # let _ = assets;
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryAssets {
    files: BTreeMap<String, Bytes>,
}

impl MemoryAssets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file; leading slashes in `path` are ignored.
    #[must_use]
    pub fn with_file(mut self, path: &str, contents: impl Into<Bytes>) -> Self {
        self.files
            .insert(path.trim_start_matches('/').to_owned(), contents.into());
        self
    }
}

impl AssetSource for MemoryAssets {
    fn is_dir(&self, path: &str) -> bool {
        if path == "." {
            return true;
        }
        let prefix = format!("{path}/");
        self.files
            .range(prefix.clone()..)
            .next()
            .is_some_and(|(name, _)| name.starts_with(&prefix))
    }

    fn open<'a>(&'a self, path: &'a str) -> OpenFuture<'a> {
        Box::pin(async move { Ok(self.files.get(path).cloned()) })
    }
}

/// Assets read from a directory on disk.
#[derive(Debug, Clone)]
pub struct DirAssets {
    root: PathBuf,
}

impl DirAssets {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        path.split('/')
            .filter(|segment| *segment != ".")
            .fold(self.root.clone(), |acc, segment| acc.join(segment))
    }
}

impl AssetSource for DirAssets {
    fn is_dir(&self, path: &str) -> bool {
        self.resolve(path).is_dir()
    }

    fn open<'a>(&'a self, path: &'a str) -> OpenFuture<'a> {
        Box::pin(async move {
            let file = self.resolve(path);
            match tokio::fs::metadata(&file).await {
                Ok(meta) if meta.is_file() => tokio::fs::read(&file).await.map(|b| Some(b.into())),
                Ok(_) => Ok(None),
                Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
                Err(err) => Err(err),
            }
        })
    }
}

/// An asset source rooted at one of its subdirectories.
#[derive(Clone)]
pub struct SubAssets {
    source: Arc<dyn AssetSource>,
    root: String,
}

impl std::fmt::Debug for SubAssets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubAssets").field("root", &self.root).finish_non_exhaustive()
    }
}

/// Roots `source` at `dir`.
///
/// # Errors
///
/// - [`AssetError::InvalidPath`]: `dir` is absolute, empty, or contains `.`/`..` segments
///   (a lone `"."` is allowed and means the root).
/// - [`AssetError::NotFound`]: `dir` does not exist in `source`.
pub fn sub_assets(source: Arc<dyn AssetSource>, dir: &str) -> Result<SubAssets, AssetError> {
    if !is_valid_path(dir) {
        return Err(AssetError::InvalidPath(dir.to_owned()));
    }
    if !source.is_dir(dir) {
        return Err(AssetError::NotFound(dir.to_owned()));
    }
    Ok(SubAssets {
        source,
        root: dir.to_owned(),
    })
}

impl SubAssets {
    /// Looks up the asset for a request path and renders it as a `200 OK` response.
    ///
    /// `/` and paths ending in `/` resolve to `index.html`. Returns `Ok(None)` when no
    /// asset matches, including for paths with `.` or `..` segments.
    pub async fn serve(&self, request_path: &str) -> io::Result<Option<Response>> {
        let Some(relative) = asset_path(request_path) else {
            return Ok(None);
        };
        let full = if self.root == "." {
            relative
        } else {
            format!("{}/{relative}", self.root)
        };

        let Some(contents) = self.source.open(&full).await? else {
            return Ok(None);
        };
        Ok(Some(
            Response::new(StatusCode::Ok)
                .header("Content-Type", content_type(&full))
                .body_bytes(contents.to_vec()),
        ))
    }
}

fn is_valid_path(path: &str) -> bool {
    if path == "." {
        return true;
    }
    !path.is_empty()
        && path
            .split('/')
            .all(|segment| !segment.is_empty() && segment != "." && segment != "..")
}

fn asset_path(request_path: &str) -> Option<String> {
    let trimmed = request_path.trim_start_matches('/');
    let path = if trimmed.is_empty() || trimmed.ends_with('/') {
        format!("{trimmed}{INDEX_FILE}")
    } else {
        trimmed.to_owned()
    };
    is_valid_path(&path).then_some(path)
}

fn content_type(path: &str) -> &'static str {
    let extension = path.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("");
    match extension.to_ascii_lowercase().as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "text/javascript; charset=utf-8",
        "json" | "map" => "application/json",
        "txt" => "text/plain; charset=utf-8",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "ico" => "image/x-icon",
        "webp" => "image/webp",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "wasm" => "application/wasm",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dist() -> Arc<dyn AssetSource> {
        Arc::new(
            MemoryAssets::new()
                .with_file("dist/index.html", "<h1>home</h1>")
                .with_file("dist/js/app.js", "run()")
                .with_file("dist/docs/index.html", "docs")
                .with_file("secret.txt", "nope"),
        )
    }

    #[test]
    fn memory_dirs_are_derived_from_files() {
        let assets = dist();
        assert!(assets.is_dir("."));
        assert!(assets.is_dir("dist"));
        assert!(assets.is_dir("dist/js"));
        assert!(!assets.is_dir("dis"));
        assert!(!assets.is_dir("dist/index.html"));
    }

    #[test]
    fn sub_rejects_missing_and_invalid_dirs() {
        assert!(matches!(sub_assets(dist(), "build"), Err(AssetError::NotFound(_))));
        assert!(matches!(sub_assets(dist(), "../dist"), Err(AssetError::InvalidPath(_))));
        assert!(matches!(sub_assets(dist(), "/dist"), Err(AssetError::InvalidPath(_))));
        assert!(sub_assets(dist(), "dist").is_ok());
        assert!(sub_assets(dist(), ".").is_ok());
    }

    #[tokio::test]
    async fn serves_files_with_content_type() {
        let sub = sub_assets(dist(), "dist").unwrap();
        let res = sub.serve("/js/app.js").await.unwrap().unwrap();
        assert_eq!(res.status(), StatusCode::Ok);
        assert_eq!(res.headers().get("content-type"), Some("text/javascript; charset=utf-8"));
        assert_eq!(res.body_ref(), b"run()");
    }

    #[tokio::test]
    async fn directories_resolve_to_index() {
        let sub = sub_assets(dist(), "dist").unwrap();
        assert_eq!(sub.serve("/").await.unwrap().unwrap().body_ref(), b"<h1>home</h1>");
        assert_eq!(sub.serve("/docs/").await.unwrap().unwrap().body_ref(), b"docs");
    }

    #[tokio::test]
    async fn cannot_escape_the_root() {
        let sub = sub_assets(dist(), "dist").unwrap();
        assert!(sub.serve("/../secret.txt").await.unwrap().is_none());
        assert!(sub.serve("/missing.css").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reads_from_disk() {
        let root = std::env::temp_dir().join(format!("autoroute-assets-{}", std::process::id()));
        std::fs::create_dir_all(root.join("public")).unwrap();
        std::fs::write(root.join("public/style.css"), "body{}").unwrap();

        let source: Arc<dyn AssetSource> = Arc::new(DirAssets::new(&root));
        assert!(matches!(sub_assets(source.clone(), "private"), Err(AssetError::NotFound(_))));

        let sub = sub_assets(source, "public").unwrap();
        let res = sub.serve("/style.css").await.unwrap().unwrap();
        assert_eq!(res.headers().get("content-type"), Some("text/css; charset=utf-8"));
        assert_eq!(res.body_ref(), b"body{}");
        assert!(sub.serve("/").await.unwrap().is_none());

        std::fs::remove_dir_all(&root).unwrap();
    }
}
