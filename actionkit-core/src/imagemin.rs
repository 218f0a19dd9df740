//! Image minification: external optimisers and a content-addressed cache.

use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::{debug, info};

use crate::command::run_filter;
use crate::contract::{FileRecord, ImageMinifier, PipelineError};

/// Dispatches on extension to the usual lossless optimisers:
/// `gifsicle --interlace`, `jpegtran -progressive -optimize` and `optipng -o5`.
/// Other formats pass through untouched.
#[derive(Debug, Clone, Default)]
pub struct CommandMinifier;

impl CommandMinifier {
    pub fn new() -> Self {
        Self
    }

    async fn optipng(&self, file: &FileRecord) -> Result<Vec<u8>, PipelineError> {
        // optipng only works on files, never on pipes
        let scratch = tempfile::Builder::new()
            .suffix(".png")
            .tempfile()
            .map_err(|e| PipelineError::io(&file.path, e))?;
        fs::write(scratch.path(), &file.contents)
            .await
            .map_err(|e| PipelineError::io(scratch.path(), e))?;
        let args = vec![
            "-o5".to_string(),
            "-quiet".to_string(),
            scratch.path().to_string_lossy().into_owned(),
        ];
        run_filter("optipng", &args, &[], None, &file.path).await?;
        fs::read(scratch.path())
            .await
            .map_err(|e| PipelineError::io(scratch.path(), e))
    }
}

#[async_trait]
impl ImageMinifier for CommandMinifier {
    async fn minify(&self, mut file: FileRecord) -> Result<FileRecord, PipelineError> {
        let before = file.contents.len();
        let output = match file.extension().as_deref() {
            Some("gif") => {
                let args = vec!["--interlace".to_string()];
                run_filter("gifsicle", &args, &file.contents, None, &file.path).await?
            }
            Some("jpg") | Some("jpeg") => {
                let args = vec!["-progressive".to_string(), "-optimize".to_string()];
                run_filter("jpegtran", &args, &file.contents, None, &file.path).await?
            }
            Some("png") => self.optipng(&file).await?,
            _ => {
                debug!(path = %file.path.display(), "Not an optimisable image, passed through");
                return Ok(file);
            }
        };

        // keep the original when an optimiser makes things worse
        if output.len() < before {
            file.contents = output;
        }
        let after = file.contents.len();
        info!(
            path = %file.path.display(),
            before,
            after,
            saved = before - after,
            "Minified image"
        );
        Ok(file)
    }
}

/// Wraps a minifier with an on-disk cache keyed by the SHA-256 of the input
/// bytes and extension, so unchanged images are not optimised twice.
pub struct CachedMinifier {
    inner: Arc<dyn ImageMinifier>,
    dir: PathBuf,
}

impl CachedMinifier {
    pub fn new(inner: Arc<dyn ImageMinifier>, dir: impl Into<PathBuf>) -> Self {
        Self {
            inner,
            dir: dir.into(),
        }
    }

    pub fn cache_key(file: &FileRecord) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&file.contents);
        hasher.update(file.extension().unwrap_or_default().as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[async_trait]
impl ImageMinifier for CachedMinifier {
    async fn minify(&self, mut file: FileRecord) -> Result<FileRecord, PipelineError> {
        let entry = self.dir.join(Self::cache_key(&file));
        match fs::read(&entry).await {
            Ok(cached) => {
                file.contents = cached;
                debug!(path = %file.path.display(), cache = %entry.display(), "Minified image served from cache");
                return Ok(file);
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(PipelineError::io(&entry, e)),
        }

        let minified = self.inner.minify(file).await?;
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| PipelineError::io(&self.dir, e))?;
        fs::write(&entry, &minified.contents)
            .await
            .map_err(|e| PipelineError::io(&entry, e))?;
        Ok(minified)
    }
}
