#![allow(unused)]

//! # contract: the collaborators actions delegate to
//!
//! Actions never touch the filesystem or external tools directly. They read
//! and write through a [`Pipeline`] and hand file contents to plugins:
//! [`Compiler`] (templates, stylesheets), [`ImageMinifier`] and [`Archiver`].
//!
//! ## Interface & Extensibility
//! - Every trait is async, `Send + Sync`, and held behind an `Arc` in
//!   [`crate::toolkit::Toolkit`], so one toolkit serves parallel task groups.
//! - Default implementations live in [`crate::fs_pipeline`],
//!   [`crate::compile`], [`crate::imagemin`] and [`crate::archive`].
//! - All failures are reported as [`PipelineError`] and surface unchanged
//!   through the action that triggered them.
//!
//! ## Mocking & Testing
//! - The traits are annotated for `mockall`; the generated `Mock*` types are
//!   exported under the `test-export-mocks` feature (on by default).

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;

use mockall::{automock, predicate::*};

use crate::config::{ArchiveOptions, Selector, SrcOptions};

/// One file travelling through a pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Directory that relative output paths are computed from (the glob
    /// parent of the selector that matched this file).
    pub base: PathBuf,
    /// Current location of the file; changed by rename rules and compilers.
    pub path: PathBuf,
    pub contents: Vec<u8>,
}

impl FileRecord {
    pub fn new(base: impl Into<PathBuf>, path: impl Into<PathBuf>, contents: Vec<u8>) -> Self {
        Self {
            base: base.into(),
            path: path.into(),
            contents,
        }
    }

    /// Path of the file as seen from `base`; this is what destinations
    /// reproduce. A file outside `base` gets leading `..` segments.
    pub fn relative(&self) -> PathBuf {
        relative_path(&self.base, &self.path)
    }

    pub fn set_relative(&mut self, relative: impl AsRef<Path>) {
        self.path = self.base.join(relative);
    }

    pub fn set_extension(&mut self, extension: &str) {
        self.path.set_extension(extension);
    }

    pub fn extension(&self) -> Option<String> {
        self.path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
    }

    pub fn text(&self) -> Result<&str, PipelineError> {
        std::str::from_utf8(&self.contents).map_err(|_| PipelineError::NotUtf8(self.path.clone()))
    }
}

/// Resolves `.` and `..` segments without touching the filesystem.
pub fn lexical_normalise(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other),
        }
    }
    out
}

/// `path` relative to `base`, with `..` segments where `path` is not below
/// `base`. Falls back to `path` when one is absolute and the other is not.
pub fn relative_path(base: &Path, path: &Path) -> PathBuf {
    let base = lexical_normalise(base);
    let path = lexical_normalise(path);
    if let Ok(below) = path.strip_prefix(&base) {
        return below.to_path_buf();
    }
    if base.has_root() != path.has_root() {
        return path;
    }
    let base_parts: Vec<Component> = base.components().collect();
    let path_parts: Vec<Component> = path.components().collect();
    let shared = base_parts
        .iter()
        .zip(&path_parts)
        .take_while(|(a, b)| a == b)
        .count();
    let mut relative = PathBuf::new();
    for _ in shared..base_parts.len() {
        relative.push("..");
    }
    for part in &path_parts[shared..] {
        relative.push(part);
    }
    relative
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Glob pattern error: {0}")]
    Glob(#[from] globset::Error),

    #[error("Directory walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("File not found with singular glob: {0}")]
    NotFound(String),

    #[error("File is not valid UTF-8: {0}")]
    NotUtf8(PathBuf),

    #[error("Invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{tool} failed on {path}: {message}")]
    Tool {
        tool: String,
        path: PathBuf,
        message: String,
    },

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("{0}")]
    Other(String),
}

impl PipelineError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Reads, writes and deletes files for actions.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Pipeline: Send + Sync {
    /// Read every file matched by `selector`.
    async fn src(
        &self,
        selector: &Selector,
        opts: &SrcOptions,
    ) -> Result<Vec<FileRecord>, PipelineError>;

    /// Write `files` below `dir`, each at its relative path. Returns the
    /// written paths.
    async fn dest(&self, files: &[FileRecord], dir: &Path) -> Result<Vec<PathBuf>, PipelineError>;

    /// Write `files` back below their own base directories.
    async fn dest_in_place(&self, files: &[FileRecord]) -> Result<Vec<PathBuf>, PipelineError>;

    /// Delete every file and directory matched by `selector`. Returns the
    /// deleted paths.
    async fn remove(&self, selector: &Selector) -> Result<Vec<PathBuf>, PipelineError>;

    /// Create `path` and any missing parents.
    async fn mkdirp(&self, path: &Path) -> Result<PathBuf, PipelineError>;
}

/// Turns one source file into one output file (template or stylesheet).
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Compiler: Send + Sync {
    async fn compile(&self, file: FileRecord, options: &Value) -> Result<FileRecord, PipelineError>;
}

/// Losslessly shrinks an image file.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ImageMinifier: Send + Sync {
    async fn minify(&self, file: FileRecord) -> Result<FileRecord, PipelineError>;
}

/// Packs files into a single archive file named `name`.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Archiver: Send + Sync {
    async fn archive(
        &self,
        files: &[FileRecord],
        name: &str,
        options: &ArchiveOptions,
    ) -> Result<FileRecord, PipelineError>;
}
