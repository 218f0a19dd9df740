//! Rename rules applied to a file's path relative to its base.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Either a whole new relative path, or a set of parts to replace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Rename {
    Path(String),
    Parts(RenameParts),
}

/// Individual path parts. `extname` includes the leading dot (`.min.js`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenameParts {
    pub dirname: Option<String>,
    pub basename: Option<String>,
    pub prefix: Option<String>,
    pub suffix: Option<String>,
    pub extname: Option<String>,
}

impl From<&str> for Rename {
    fn from(value: &str) -> Self {
        Rename::Path(value.to_string())
    }
}

impl From<RenameParts> for Rename {
    fn from(value: RenameParts) -> Self {
        Rename::Parts(value)
    }
}

impl Rename {
    /// The plain file name, when this rule is a single path.
    pub fn as_file_name(&self) -> Option<&str> {
        match self {
            Rename::Path(p) if !p.is_empty() => Some(p),
            _ => None,
        }
    }

    pub fn apply(&self, relative: &Path) -> PathBuf {
        match self {
            Rename::Path(p) => PathBuf::from(p),
            Rename::Parts(parts) => parts.apply(relative),
        }
    }
}

impl RenameParts {
    fn apply(&self, relative: &Path) -> PathBuf {
        let dirname = match &self.dirname {
            Some(d) => PathBuf::from(d),
            None => relative.parent().map(Path::to_path_buf).unwrap_or_default(),
        };
        let stem = relative
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extname = relative
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();

        let basename = self.basename.clone().unwrap_or(stem);
        let file_name = format!(
            "{}{}{}{}",
            self.prefix.as_deref().unwrap_or(""),
            basename,
            self.suffix.as_deref().unwrap_or(""),
            self.extname.as_deref().unwrap_or(&extname),
        );
        dirname.join(file_name)
    }
}
