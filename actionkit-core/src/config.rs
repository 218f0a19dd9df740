//! # config: the loosely-typed input an action is built from
//!
//! [`ActionSpec`] is the bag of optional parameters every builder in
//! [`crate::action`] receives. It deserialises from the YAML/JSON shape used by
//! task files, and callers working in Rust fill it with the `with_*` methods,
//! which is also the only way to attach closures ([`Hooks`]).
//!
//! Required parameters are checked by the builders, not here.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::contract::FileRecord;
use crate::rename::Rename;

/// Either a single string or a list of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(s) => vec![s],
            OneOrMany::Many(v) => v,
        }
    }
}

/// Glob selection of source files. Entries starting with `!` exclude.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "OneOrMany", into = "OneOrMany")]
pub struct Selector(Vec<String>);

impl Selector {
    pub fn new<I, S>(globs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(globs.into_iter().map(Into::into).collect())
    }

    pub fn globs(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|g| g.trim().is_empty())
    }
}

impl From<OneOrMany> for Selector {
    fn from(value: OneOrMany) -> Self {
        Self(value.into_vec())
    }
}

impl From<Selector> for OneOrMany {
    fn from(value: Selector) -> Self {
        OneOrMany::Many(value.0)
    }
}

impl From<&str> for Selector {
    fn from(value: &str) -> Self {
        Self(vec![value.to_string()])
    }
}

impl From<Vec<&str>> for Selector {
    fn from(value: Vec<&str>) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join(", "))
    }
}

/// One or more destination directories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "OneOrMany", into = "OneOrMany")]
pub struct Destination(Vec<PathBuf>);

impl Destination {
    pub fn dirs(&self) -> &[PathBuf] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<OneOrMany> for Destination {
    fn from(value: OneOrMany) -> Self {
        Self(value.into_vec().into_iter().map(PathBuf::from).collect())
    }
}

impl From<Destination> for OneOrMany {
    fn from(value: Destination) -> Self {
        OneOrMany::Many(
            value
                .0
                .into_iter()
                .map(|p| p.to_string_lossy().into_owned())
                .collect(),
        )
    }
}

impl From<&str> for Destination {
    fn from(value: &str) -> Self {
        Self(vec![PathBuf::from(value)])
    }
}

impl From<Vec<&str>> for Destination {
    fn from(value: Vec<&str>) -> Self {
        Self(value.into_iter().map(PathBuf::from).collect())
    }
}

/// Options for reading sources.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SrcOptions {
    /// A literal (non-glob) source that does not exist is skipped instead of
    /// failing the read.
    pub allow_empty: bool,
    /// Overrides the glob parent as the base of relative output paths.
    pub base: Option<PathBuf>,
    /// Lets wildcards match names starting with a dot.
    pub dot: bool,
}

impl SrcOptions {
    /// Reads options from a raw config value; `null` means defaults.
    pub fn from_value(value: &Value) -> Result<Self, serde_json::Error> {
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(value.clone())
    }
}

/// Archive writer options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveOptions {
    pub compress: bool,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self { compress: true }
    }
}

/// A regex replacement applied by declarative `transform` actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replacement {
    pub pattern: String,
    #[serde(default)]
    pub with: String,
}

pub type Callback = Arc<dyn Fn() + Send + Sync>;
pub type ContentFn = Arc<dyn Fn(&str, &FileRecord) -> String + Send + Sync>;
pub type JsonFn = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// Closures attached to a spec from Rust code.
#[derive(Clone, Default)]
pub struct Hooks {
    /// Runs synchronously before the action touches any file.
    pub callback: Option<Callback>,
    /// Content rewrite for `transform`.
    pub content: Option<ContentFn>,
    /// Document rewrite for `json`.
    pub json: Option<JsonFn>,
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("callback", &self.callback.is_some())
            .field("content", &self.content.is_some())
            .field("json", &self.json.is_some())
            .finish()
    }
}

/// Parameters of a single action before validation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ActionSpec {
    /// Display name; every action has a default.
    pub name: Option<String>,
    pub src: Option<Selector>,
    pub dest: Option<Destination>,
    /// Raw source options, see [`SrcOptions`].
    pub opts: Value,
    /// Rename rule, or the archive file name for `zip`.
    pub fname: Option<Rename>,
    pub marker: Option<String>,
    /// Cache minified images by content hash.
    pub cache: bool,
    /// Log every file handed to a compiler.
    pub debug: bool,
    /// Directory to create for `mkdirp`.
    pub path: Option<PathBuf>,
    /// Options passed to the template compiler.
    pub template: Value,
    /// Options passed to the stylesheet compiler.
    pub stylesheet: Value,
    pub zip: ArchiveOptions,
    /// Declarative content rewrite for `transform`.
    pub replace: Vec<Replacement>,
    /// Declarative document patch for `json`, deep merged into each file.
    pub merge: Option<Value>,
    #[serde(skip)]
    pub hooks: Hooks,
}

impl ActionSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_src(mut self, src: impl Into<Selector>) -> Self {
        self.src = Some(src.into());
        self
    }

    pub fn with_dest(mut self, dest: impl Into<Destination>) -> Self {
        self.dest = Some(dest.into());
        self
    }

    pub fn with_opts(mut self, opts: Value) -> Self {
        self.opts = opts;
        self
    }

    pub fn with_rename(mut self, rename: impl Into<Rename>) -> Self {
        self.fname = Some(rename.into());
        self
    }

    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.marker = Some(marker.into());
        self
    }

    pub fn with_cache(mut self, cache: bool) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_template_options(mut self, options: Value) -> Self {
        self.template = options;
        self
    }

    pub fn with_stylesheet_options(mut self, options: Value) -> Self {
        self.stylesheet = options;
        self
    }

    pub fn with_archive_options(mut self, options: ArchiveOptions) -> Self {
        self.zip = options;
        self
    }

    pub fn with_replacement(mut self, pattern: impl Into<String>, with: impl Into<String>) -> Self {
        self.replace.push(Replacement {
            pattern: pattern.into(),
            with: with.into(),
        });
        self
    }

    pub fn with_merge(mut self, patch: Value) -> Self {
        self.merge = Some(patch);
        self
    }

    pub fn with_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.hooks.callback = Some(Arc::new(callback));
        self
    }

    pub fn with_content_fn<F>(mut self, transform: F) -> Self
    where
        F: Fn(&str, &FileRecord) -> String + Send + Sync + 'static,
    {
        self.hooks.content = Some(Arc::new(transform));
        self
    }

    pub fn with_json_fn<F>(mut self, transform: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.hooks.json = Some(Arc::new(transform));
        self
    }

    pub fn trace_loaded(&self) {
        debug!(
            name = self.name.as_deref().unwrap_or("<default>"),
            src = ?self.src,
            dest = ?self.dest,
            "Loaded action spec"
        );
    }
}
