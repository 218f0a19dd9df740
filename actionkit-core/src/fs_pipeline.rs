//! Filesystem-backed [`Pipeline`]: glob selection with `globset`, directory
//! traversal with `walkdir`.
//!
//! Globs are resolved against the pipeline root. The part of a glob before
//! its first wildcard component is its base; traversal starts there and
//! records keep paths relative to it, so `src/**/*.js` written to `dist`
//! lands in `dist/<path below src>`.
//!
//! Writes never leave their destination directory (or, when writing back
//! over sources, the root), and deletion is limited to paths below the root.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use globset::{Glob, GlobBuilder, GlobMatcher, GlobSet, GlobSetBuilder};
use tokio::fs;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::{Selector, SrcOptions};
use crate::contract::{lexical_normalise, FileRecord, Pipeline, PipelineError};

const GLOB_META: &[char] = &['*', '?', '[', ']', '{', '}'];

pub struct FsPipeline {
    root: PathBuf,
}

impl FsPipeline {
    /// Relative roots are resolved against the process working directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root = if root.is_absolute() {
            root
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(&root))
                .unwrap_or(root)
        };
        Self {
            root: lexical_normalise(&root),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    fn split(&self, selector: &Selector) -> Result<(Vec<Pattern>, GlobSet), PipelineError> {
        let mut positive = Vec::new();
        let mut negative = GlobSetBuilder::new();
        for raw in selector.globs() {
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            if let Some(excluded) = raw.strip_prefix('!') {
                negative.add(glob(&self.normalise(excluded))?);
            } else {
                positive.push(Pattern::new(&self.normalise(raw))?);
            }
        }
        Ok((positive, negative.build()?))
    }

    /// Absolute glob text with `/` separators and no `./` segments.
    fn normalise(&self, pattern: &str) -> String {
        let pattern = pattern.trim_start_matches("./");
        let joined = if Path::new(pattern).is_absolute() {
            pattern.to_string()
        } else {
            format!("{}/{}", slash(&self.root), pattern)
        };
        joined.replace("/./", "/")
    }
}

/// A positive glob with its base directory split off.
struct Pattern {
    text: String,
    base: PathBuf,
    literal: bool,
    matcher: GlobMatcher,
}

impl Pattern {
    fn new(text: &str) -> Result<Self, PipelineError> {
        let literal = !text.contains(GLOB_META);
        let base = if literal {
            Path::new(text)
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default()
        } else {
            glob_parent(text)
        };
        Ok(Self {
            text: text.to_string(),
            base,
            literal,
            matcher: glob(text)?.compile_matcher(),
        })
    }
}

fn glob(pattern: &str) -> Result<Glob, PipelineError> {
    Ok(GlobBuilder::new(pattern).literal_separator(true).build()?)
}

fn slash(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Leading components of a glob that contain no wildcard.
pub fn glob_parent(pattern: &str) -> PathBuf {
    let mut base = PathBuf::new();
    let mut components = Path::new(pattern).components().peekable();
    while let Some(component) = components.next() {
        if component.as_os_str().to_string_lossy().contains(GLOB_META) {
            break;
        }
        // the final component of a wildcard-free pattern is the file itself
        if components.peek().is_none() {
            break;
        }
        base.push(component);
    }
    base
}

fn has_hidden_component(relative: &Path) -> bool {
    relative.components().any(|c| match c {
        Component::Normal(name) => name.to_string_lossy().starts_with('.'),
        _ => false,
    })
}

async fn read_record(base: &Path, path: PathBuf) -> Result<FileRecord, PipelineError> {
    let contents = fs::read(&path)
        .await
        .map_err(|e| PipelineError::io(&path, e))?;
    Ok(FileRecord::new(base, path, contents))
}

async fn write_record(target: &Path, contents: &[u8]) -> Result<(), PipelineError> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| PipelineError::io(parent, e))?;
    }
    fs::write(target, contents)
        .await
        .map_err(|e| PipelineError::io(target, e))
}

async fn remove_path(path: &Path) -> Result<(), PipelineError> {
    let real_dir = fs::symlink_metadata(path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false);
    let result = if real_dir {
        fs::remove_dir_all(path).await
    } else {
        fs::remove_file(path).await
    };
    result.map_err(|e| PipelineError::io(path, e))
}

async fn is_file(path: &Path) -> bool {
    fs::metadata(path).await.map(|m| m.is_file()).unwrap_or(false)
}

async fn is_dir(path: &Path) -> bool {
    fs::metadata(path).await.map(|m| m.is_dir()).unwrap_or(false)
}

/// Every target, normalised, provided all of them lie below `dir`.
fn targets_within(dir: &Path, targets: Vec<PathBuf>) -> Result<Vec<PathBuf>, PipelineError> {
    let dir = lexical_normalise(dir);
    targets
        .into_iter()
        .map(|target| {
            let target = lexical_normalise(&target);
            if target.starts_with(&dir) && target != dir {
                Ok(target)
            } else {
                warn!(target = %target.display(), dir = %dir.display(), "Write outside destination refused");
                Err(PipelineError::Other(format!(
                    "Refusing to write {} outside {}",
                    target.display(),
                    dir.display()
                )))
            }
        })
        .collect()
}

#[async_trait]
impl Pipeline for FsPipeline {
    async fn src(
        &self,
        selector: &Selector,
        opts: &SrcOptions,
    ) -> Result<Vec<FileRecord>, PipelineError> {
        let (patterns, excluded) = self.split(selector)?;
        let mut seen = HashSet::new();
        let mut records = Vec::new();

        for pattern in &patterns {
            let base = match &opts.base {
                Some(b) => self.resolve(b),
                None => pattern.base.clone(),
            };

            if pattern.literal {
                let path = PathBuf::from(&pattern.text);
                if !is_file(&path).await {
                    if opts.allow_empty {
                        debug!(path = %path.display(), "Literal source missing, skipped");
                        continue;
                    }
                    return Err(PipelineError::NotFound(pattern.text.clone()));
                }
                if !excluded.is_match(&pattern.text) && seen.insert(path.clone()) {
                    records.push(read_record(&base, path).await?);
                }
                continue;
            }

            if !is_dir(&pattern.base).await {
                debug!(base = %pattern.base.display(), "Glob base does not exist");
                continue;
            }

            let before = records.len();
            for entry in WalkDir::new(&pattern.base).sort_by_file_name() {
                let entry = entry?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let path = entry.path();
                let text = slash(path);
                if !pattern.matcher.is_match(&text) || excluded.is_match(&text) {
                    continue;
                }
                let below_base = path.strip_prefix(&pattern.base).unwrap_or(path);
                if !opts.dot && has_hidden_component(below_base) {
                    continue;
                }
                if seen.insert(path.to_path_buf()) {
                    records.push(read_record(&base, path.to_path_buf()).await?);
                }
            }
            debug!(
                glob = %pattern.text,
                matched = records.len() - before,
                "Glob resolved"
            );
        }

        Ok(records)
    }

    async fn dest(&self, files: &[FileRecord], dir: &Path) -> Result<Vec<PathBuf>, PipelineError> {
        let dir = self.resolve(dir);
        let targets = targets_within(&dir, files.iter().map(|f| dir.join(f.relative())).collect())?;
        for (file, target) in files.iter().zip(&targets) {
            write_record(target, &file.contents).await?;
            debug!(path = %target.display(), size = file.contents.len(), "Wrote file");
        }
        Ok(targets)
    }

    async fn dest_in_place(&self, files: &[FileRecord]) -> Result<Vec<PathBuf>, PipelineError> {
        let targets = targets_within(
            &self.root,
            files
                .iter()
                .map(|f| self.resolve(&f.base).join(f.relative()))
                .collect(),
        )?;
        for (file, target) in files.iter().zip(&targets) {
            write_record(target, &file.contents).await?;
            debug!(path = %target.display(), size = file.contents.len(), "Overwrote file");
        }
        Ok(targets)
    }

    async fn remove(&self, selector: &Selector) -> Result<Vec<PathBuf>, PipelineError> {
        let (patterns, excluded) = self.split(selector)?;
        let root = fs::canonicalize(&self.root)
            .await
            .unwrap_or_else(|_| self.root.clone());
        let mut doomed: Vec<PathBuf> = Vec::new();

        for pattern in &patterns {
            if pattern.literal {
                let path = PathBuf::from(&pattern.text);
                if fs::symlink_metadata(&path).await.is_ok() && !excluded.is_match(&pattern.text) {
                    doomed.push(path);
                }
                continue;
            }
            if !is_dir(&pattern.base).await {
                continue;
            }
            for entry in WalkDir::new(&pattern.base).min_depth(1) {
                let entry = entry?;
                let text = slash(entry.path());
                if pattern.matcher.is_match(&text) && !excluded.is_match(&text) {
                    doomed.push(entry.path().to_path_buf());
                }
            }
        }

        // children first so that directory removal never races its contents
        doomed.sort_by(|a, b| {
            b.components()
                .count()
                .cmp(&a.components().count())
                .then_with(|| a.cmp(b))
        });
        doomed.dedup();

        // nothing is deleted unless every path passes
        for path in &doomed {
            let resolved = match fs::canonicalize(path).await {
                Ok(resolved) => resolved,
                // dangling links
                Err(_) => lexical_normalise(path),
            };
            if resolved == root {
                warn!(path = %path.display(), "Refusing to delete the working directory");
                return Err(PipelineError::Other(format!(
                    "Cannot delete the current working directory: {}",
                    path.display()
                )));
            }
            if !resolved.starts_with(&root) {
                warn!(path = %path.display(), "Refusing to delete outside the working directory");
                return Err(PipelineError::Other(format!(
                    "Cannot delete files/directories outside the current working directory: {}",
                    path.display()
                )));
            }
        }

        let mut removed = Vec::new();
        for path in doomed {
            if fs::symlink_metadata(&path).await.is_err() {
                continue;
            }
            remove_path(&path).await?;
            info!(path = %path.display(), "Deleted");
            removed.push(path);
        }
        Ok(removed)
    }

    async fn mkdirp(&self, path: &Path) -> Result<PathBuf, PipelineError> {
        let target = self.resolve(path);
        fs::create_dir_all(&target)
            .await
            .map_err(|e| PipelineError::io(&target, e))?;
        Ok(target)
    }
}
