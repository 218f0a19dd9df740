//! # action: uniform build steps over a file pipeline
//!
//! Each builder (`Action::copy`, `Action::clean`, ...) takes an
//! [`ActionSpec`], checks the parameters that action cannot run without and
//! returns an [`Action`]: a display name, an optional pre-run callback, an
//! optional rename rule and a tagged plan. Nothing touches the filesystem
//! until [`Action::execute`] is awaited; `execute` consumes the action, so
//! each one runs at most once.
//!
//! # Catalogue
//! | key | required | does |
//! |---|---|---|
//! | `copy` | src, dest | read, rename, write to every dest |
//! | `clean` | src | delete matching files and directories |
//! | `minifyimg` | src | optimise images, optionally through a cache |
//! | `del` | src, marker | strip `//{DEL MARKER}` blocks |
//! | `template` | src, dest | compile with the template compiler |
//! | `stylesheet` | src, dest | compile with the stylesheet compiler |
//! | `transform` | src, cb | rewrite contents with a callback |
//! | `json` | src, cb | rewrite a parsed JSON document with a callback |
//! | `zip` | src, fname | pack sources into one archive |
//! | `mkdirp` | path | create a directory tree |
//!
//! Actions with an optional `dest` write back over their sources when none
//! is given; `zip` writes to the working directory instead.
//!
//! # Error Handling
//! Construction errors ([`ActionError::MissingParameter`] and friends) are
//! raised before any I/O. Collaborator failures come back unchanged as
//! [`ActionError::Pipeline`].

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::{
    ActionSpec, ArchiveOptions, Callback, ContentFn, Destination, JsonFn, Selector, SrcOptions,
};
use crate::contract::{FileRecord, ImageMinifier, PipelineError};
use crate::imagemin::CachedMinifier;
use crate::markers::MarkerStripper;
use crate::merge::{merge, merged};
use crate::rename::Rename;
use crate::toolkit::Toolkit;

#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("Required parameter of action.{action} not specified ({required})")]
    MissingParameter {
        action: &'static str,
        required: &'static str,
    },

    #[error("Invalid parameter of action.{action}: {message}")]
    InvalidParameter {
        action: &'static str,
        message: String,
    },

    #[error("Invalid marker name '{0}': only digits, uppercase letters and '_' are allowed")]
    InvalidMarker(String),

    #[error("Invalid replacement pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Invalid source options: {0}")]
    Options(#[source] serde_json::Error),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("{0}")]
    Failed(String),
}

/// The ten action types, keyed the way task files name them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Copy,
    Clean,
    #[serde(rename = "minifyimg", alias = "minify_images")]
    MinifyImages,
    #[serde(rename = "del", alias = "delete_markers")]
    DeleteMarkers,
    #[serde(alias = "pug")]
    Template,
    #[serde(alias = "sass")]
    Stylesheet,
    Transform,
    Json,
    Zip,
    Mkdirp,
}

impl ActionKind {
    pub const ALL: [ActionKind; 10] = [
        ActionKind::Copy,
        ActionKind::Clean,
        ActionKind::MinifyImages,
        ActionKind::DeleteMarkers,
        ActionKind::Template,
        ActionKind::Stylesheet,
        ActionKind::Transform,
        ActionKind::Json,
        ActionKind::Zip,
        ActionKind::Mkdirp,
    ];

    pub fn key(self) -> &'static str {
        match self {
            ActionKind::Copy => "copy",
            ActionKind::Clean => "clean",
            ActionKind::MinifyImages => "minifyimg",
            ActionKind::DeleteMarkers => "del",
            ActionKind::Template => "template",
            ActionKind::Stylesheet => "stylesheet",
            ActionKind::Transform => "transform",
            ActionKind::Json => "json",
            ActionKind::Zip => "zip",
            ActionKind::Mkdirp => "mkdirp",
        }
    }

    fn required(self) -> &'static str {
        match self {
            ActionKind::Copy | ActionKind::Template | ActionKind::Stylesheet => "src, dest",
            ActionKind::Clean | ActionKind::MinifyImages => "src",
            ActionKind::DeleteMarkers => "src, marker",
            ActionKind::Transform | ActionKind::Json => "src, cb",
            ActionKind::Zip => "src, fname",
            ActionKind::Mkdirp => "path",
        }
    }

    fn missing(self) -> ActionError {
        ActionError::MissingParameter {
            action: self.key(),
            required: self.required(),
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompileTarget {
    Template,
    Stylesheet,
}

/// Validated per-kind parameters.
enum Plan {
    Copy {
        src: Selector,
        dest: Destination,
        opts: SrcOptions,
    },
    Clean {
        src: Selector,
    },
    MinifyImages {
        src: Selector,
        dest: Option<Destination>,
        opts: SrcOptions,
        cache: bool,
    },
    DeleteMarkers {
        src: Selector,
        dest: Option<Destination>,
        opts: SrcOptions,
        stripper: MarkerStripper,
    },
    Compile {
        target: CompileTarget,
        src: Selector,
        dest: Destination,
        opts: SrcOptions,
        options: Value,
        debug: bool,
    },
    Transform {
        src: Selector,
        dest: Option<Destination>,
        opts: SrcOptions,
        content: ContentFn,
    },
    Json {
        src: Selector,
        dest: Option<Destination>,
        opts: SrcOptions,
        edit: JsonFn,
    },
    Zip {
        src: Selector,
        dest: Option<Destination>,
        opts: SrcOptions,
        archive: String,
        options: ArchiveOptions,
    },
    Mkdirp {
        path: PathBuf,
    },
}

impl Plan {
    fn kind(&self) -> ActionKind {
        match self {
            Plan::Copy { .. } => ActionKind::Copy,
            Plan::Clean { .. } => ActionKind::Clean,
            Plan::MinifyImages { .. } => ActionKind::MinifyImages,
            Plan::DeleteMarkers { .. } => ActionKind::DeleteMarkers,
            Plan::Compile {
                target: CompileTarget::Template,
                ..
            } => ActionKind::Template,
            Plan::Compile {
                target: CompileTarget::Stylesheet,
                ..
            } => ActionKind::Stylesheet,
            Plan::Transform { .. } => ActionKind::Transform,
            Plan::Json { .. } => ActionKind::Json,
            Plan::Zip { .. } => ActionKind::Zip,
            Plan::Mkdirp { .. } => ActionKind::Mkdirp,
        }
    }

    fn default_name(&self) -> String {
        match self {
            Plan::Copy { .. } => "Copy".into(),
            Plan::Clean { .. } => "Clean".into(),
            Plan::MinifyImages { .. } => "Minify Images".into(),
            Plan::DeleteMarkers { stripper, .. } => {
                format!("Delete markers {{{}}}", stripper.marker())
            }
            Plan::Compile {
                target: CompileTarget::Template,
                ..
            } => "Template".into(),
            Plan::Compile {
                target: CompileTarget::Stylesheet,
                ..
            } => "Stylesheet".into(),
            Plan::Transform { .. } => "Transform".into(),
            Plan::Json { .. } => "Json".into(),
            Plan::Zip { .. } => "Zip".into(),
            Plan::Mkdirp { .. } => "Create Directory".into(),
        }
    }
}

/// What an executed action did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionOutcome {
    pub name: String,
    /// `None` for bare callables run as task steps.
    pub kind: Option<ActionKind>,
    /// Number of source files (or deleted entries) handled.
    pub files: usize,
    /// Paths written, deleted or created.
    pub paths: Vec<PathBuf>,
}

/// A validated, ready-to-run build step.
pub struct Action {
    name: String,
    callback: Option<Callback>,
    rename: Option<Rename>,
    plan: Plan,
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("name", &self.name)
            .field("kind", &self.kind())
            .field("callback", &self.callback.is_some())
            .field("rename", &self.rename)
            .finish()
    }
}

fn required_src(spec: &ActionSpec) -> Option<Selector> {
    spec.src.clone().filter(|s| !s.is_empty())
}

fn optional_dest(spec: &ActionSpec) -> Option<Destination> {
    spec.dest.clone().filter(|d| !d.is_empty())
}

fn src_options(raw: &Value) -> Result<SrcOptions, ActionError> {
    SrcOptions::from_value(raw).map_err(ActionError::Options)
}

fn content_fn(spec: &ActionSpec) -> Result<Option<ContentFn>, ActionError> {
    if let Some(f) = &spec.hooks.content {
        return Ok(Some(f.clone()));
    }
    if spec.replace.is_empty() {
        return Ok(None);
    }
    let rules = spec
        .replace
        .iter()
        .map(|r| Ok((Regex::new(&r.pattern)?, r.with.clone())))
        .collect::<Result<Vec<_>, regex::Error>>()?;
    let f: ContentFn = Arc::new(move |content: &str, _file: &FileRecord| {
        rules.iter().fold(content.to_string(), |acc, (re, with)| {
            re.replace_all(&acc, with.as_str()).into_owned()
        })
    });
    Ok(Some(f))
}

fn json_fn(spec: &ActionSpec) -> Option<JsonFn> {
    if let Some(f) = &spec.hooks.json {
        return Some(f.clone());
    }
    let patch = spec.merge.clone()?;
    let f: JsonFn = Arc::new(move |mut doc: Value| {
        merge(&mut doc, &patch);
        doc
    });
    Some(f)
}

impl Action {
    fn assemble(spec: ActionSpec, plan: Plan) -> Self {
        let kind = plan.kind();
        let name = spec.name.clone().unwrap_or_else(|| plan.default_name());
        // for transform and json the callback is the transform itself
        let callback = match kind {
            ActionKind::Transform | ActionKind::Json => None,
            _ => spec.hooks.callback.clone(),
        };
        let rename = match kind {
            ActionKind::Zip | ActionKind::Clean | ActionKind::Mkdirp => None,
            _ => spec.fname.clone(),
        };
        spec.trace_loaded();
        debug!(action = %kind, name = %name, "Built action");
        Self {
            name,
            callback,
            rename,
            plan,
        }
    }

    /// Builds the action named by `kind`.
    pub fn build(kind: ActionKind, spec: ActionSpec) -> Result<Self, ActionError> {
        match kind {
            ActionKind::Copy => Self::copy(spec),
            ActionKind::Clean => Self::clean(spec),
            ActionKind::MinifyImages => Self::minify_images(spec),
            ActionKind::DeleteMarkers => Self::delete_markers(spec),
            ActionKind::Template => Self::template(spec),
            ActionKind::Stylesheet => Self::stylesheet(spec),
            ActionKind::Transform => Self::transform(spec),
            ActionKind::Json => Self::json(spec),
            ActionKind::Zip => Self::zip(spec),
            ActionKind::Mkdirp => Self::mkdirp(spec),
        }
    }

    /// Copies files. Source options default to `allow_empty: true`.
    pub fn copy(spec: ActionSpec) -> Result<Self, ActionError> {
        let (Some(src), Some(dest)) = (required_src(&spec), optional_dest(&spec)) else {
            return Err(ActionKind::Copy.missing());
        };
        let opts = src_options(&merged(&json!({ "allow_empty": true }), &spec.opts))?;
        Ok(Self::assemble(spec, Plan::Copy { src, dest, opts }))
    }

    /// Deletes matching files and directories.
    pub fn clean(spec: ActionSpec) -> Result<Self, ActionError> {
        let Some(src) = required_src(&spec) else {
            return Err(ActionKind::Clean.missing());
        };
        Ok(Self::assemble(spec, Plan::Clean { src }))
    }

    /// Optimises images, overwriting them when no `dest` is given.
    pub fn minify_images(spec: ActionSpec) -> Result<Self, ActionError> {
        let Some(src) = required_src(&spec) else {
            return Err(ActionKind::MinifyImages.missing());
        };
        let plan = Plan::MinifyImages {
            src,
            dest: optional_dest(&spec),
            opts: src_options(&spec.opts)?,
            cache: spec.cache,
        };
        Ok(Self::assemble(spec, plan))
    }

    /// Strips `//{DEL MARKER} ... //{DEL}` blocks.
    pub fn delete_markers(spec: ActionSpec) -> Result<Self, ActionError> {
        let (Some(src), Some(marker)) = (required_src(&spec), spec.marker.clone()) else {
            return Err(ActionKind::DeleteMarkers.missing());
        };
        if marker.is_empty() {
            return Err(ActionKind::DeleteMarkers.missing());
        }
        let plan = Plan::DeleteMarkers {
            src,
            dest: optional_dest(&spec),
            opts: src_options(&spec.opts)?,
            stripper: MarkerStripper::new(&marker)?,
        };
        Ok(Self::assemble(spec, plan))
    }

    pub fn template(spec: ActionSpec) -> Result<Self, ActionError> {
        Self::compile(CompileTarget::Template, spec)
    }

    pub fn stylesheet(spec: ActionSpec) -> Result<Self, ActionError> {
        Self::compile(CompileTarget::Stylesheet, spec)
    }

    fn compile(target: CompileTarget, spec: ActionSpec) -> Result<Self, ActionError> {
        let kind = match target {
            CompileTarget::Template => ActionKind::Template,
            CompileTarget::Stylesheet => ActionKind::Stylesheet,
        };
        let (Some(src), Some(dest)) = (required_src(&spec), optional_dest(&spec)) else {
            return Err(kind.missing());
        };
        let options = match target {
            CompileTarget::Template => spec.template.clone(),
            CompileTarget::Stylesheet => spec.stylesheet.clone(),
        };
        let plan = Plan::Compile {
            target,
            src,
            dest,
            opts: src_options(&spec.opts)?,
            options,
            debug: spec.debug,
        };
        Ok(Self::assemble(spec, plan))
    }

    /// Rewrites file contents with the content callback, or with the
    /// declarative `replace` rules.
    pub fn transform(spec: ActionSpec) -> Result<Self, ActionError> {
        let Some(src) = required_src(&spec) else {
            return Err(ActionKind::Transform.missing());
        };
        let Some(content) = content_fn(&spec)? else {
            return Err(ActionKind::Transform.missing());
        };
        let plan = Plan::Transform {
            src,
            dest: optional_dest(&spec),
            opts: src_options(&spec.opts)?,
            content,
        };
        Ok(Self::assemble(spec, plan))
    }

    /// Rewrites JSON documents with the document callback, or deep merges
    /// the declarative `merge` patch into them. Output is compact.
    pub fn json(spec: ActionSpec) -> Result<Self, ActionError> {
        let (Some(src), Some(edit)) = (required_src(&spec), json_fn(&spec)) else {
            return Err(ActionKind::Json.missing());
        };
        let plan = Plan::Json {
            src,
            dest: optional_dest(&spec),
            opts: src_options(&spec.opts)?,
            edit,
        };
        Ok(Self::assemble(spec, plan))
    }

    /// Packs sources into the archive named by `fname`.
    pub fn zip(spec: ActionSpec) -> Result<Self, ActionError> {
        let Some(src) = required_src(&spec) else {
            return Err(ActionKind::Zip.missing());
        };
        let archive = match &spec.fname {
            None => return Err(ActionKind::Zip.missing()),
            Some(rule) => match rule.as_file_name() {
                Some(name) => name.to_string(),
                None => {
                    return Err(ActionError::InvalidParameter {
                        action: ActionKind::Zip.key(),
                        message: "fname must be the archive file name".into(),
                    })
                }
            },
        };
        let plan = Plan::Zip {
            src,
            dest: optional_dest(&spec),
            opts: src_options(&spec.opts)?,
            archive,
            options: spec.zip.clone(),
        };
        Ok(Self::assemble(spec, plan))
    }

    /// Creates a directory and its parents.
    pub fn mkdirp(spec: ActionSpec) -> Result<Self, ActionError> {
        let Some(path) = spec.path.clone().filter(|p| !p.as_os_str().is_empty()) else {
            return Err(ActionKind::Mkdirp.missing());
        };
        Ok(Self::assemble(spec, Plan::Mkdirp { path }))
    }

    /// Name used in logs and reports.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ActionKind {
        self.plan.kind()
    }

    /// Runs the action against `toolkit`.
    pub async fn execute(self, toolkit: &Toolkit) -> Result<ActionOutcome, ActionError> {
        let span = info_span!("action", name = %self.name);
        async move {
            let started = Instant::now();
            let name = self.name.clone();
            info!("Starting '{}'...", name);
            let result = self.run(toolkit).await;
            match &result {
                Ok(outcome) => info!(
                    files = outcome.files,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Finished '{}'",
                    name
                ),
                Err(e) => error!(error = %e, "'{}' errored", name),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn run(self, toolkit: &Toolkit) -> Result<ActionOutcome, ActionError> {
        let Action {
            name,
            callback,
            rename,
            plan,
        } = self;
        let kind = plan.kind();

        if let Some(callback) = &callback {
            callback();
        }

        let (files, paths) = match plan {
            Plan::Copy { src, dest, opts } => {
                let mut files = read(toolkit, &src, &opts).await?;
                apply_rename(&mut files, rename.as_ref());
                let paths = write(toolkit, &files, Some(&dest)).await?;
                (files.len(), paths)
            }
            Plan::Clean { src } => {
                info!(globs = %src, "source:");
                let removed = toolkit.pipeline.remove(&src).await?;
                (removed.len(), removed)
            }
            Plan::MinifyImages {
                src,
                dest,
                opts,
                cache,
            } => {
                let files = read(toolkit, &src, &opts).await?;
                let minifier: Arc<dyn ImageMinifier> = if cache {
                    warn!("cache is used!");
                    Arc::new(CachedMinifier::new(
                        toolkit.images.clone(),
                        toolkit.cache_dir.clone(),
                    ))
                } else {
                    toolkit.images.clone()
                };
                let mut minified = Vec::with_capacity(files.len());
                for file in files {
                    minified.push(minifier.minify(file).await?);
                }
                apply_rename(&mut minified, rename.as_ref());
                let paths = write(toolkit, &minified, dest.as_ref()).await?;
                (minified.len(), paths)
            }
            Plan::DeleteMarkers {
                src,
                dest,
                opts,
                stripper,
            } => {
                let mut files = read(toolkit, &src, &opts).await?;
                for file in files.iter_mut() {
                    let (stripped, removed) = stripper.strip_counted(file.text()?);
                    for _ in 0..removed {
                        info!(path = %file.path.display(), "DEL {} at:", stripper.marker());
                    }
                    file.contents = stripped.into_bytes();
                }
                apply_rename(&mut files, rename.as_ref());
                let paths = write(toolkit, &files, dest.as_ref()).await?;
                (files.len(), paths)
            }
            Plan::Compile {
                target,
                src,
                dest,
                opts,
                options,
                debug,
            } => {
                let compiler = match target {
                    CompileTarget::Template => &toolkit.templates,
                    CompileTarget::Stylesheet => &toolkit.stylesheets,
                };
                let files = read(toolkit, &src, &opts).await?;
                let mut compiled = Vec::with_capacity(files.len());
                for file in files {
                    if debug {
                        info!(path = %file.path.display(), "Compiling:");
                    }
                    compiled.push(compiler.compile(file, &options).await?);
                }
                apply_rename(&mut compiled, rename.as_ref());
                let paths = write(toolkit, &compiled, Some(&dest)).await?;
                (compiled.len(), paths)
            }
            Plan::Transform {
                src,
                dest,
                opts,
                content,
            } => {
                let mut files = read(toolkit, &src, &opts).await?;
                for file in files.iter_mut() {
                    let next = content(file.text()?, &*file);
                    file.contents = next.into_bytes();
                }
                apply_rename(&mut files, rename.as_ref());
                let paths = write(toolkit, &files, dest.as_ref()).await?;
                (files.len(), paths)
            }
            Plan::Json {
                src,
                dest,
                opts,
                edit,
            } => {
                let mut files = read(toolkit, &src, &opts).await?;
                for file in files.iter_mut() {
                    let doc: Value =
                        serde_json::from_str(file.text()?).map_err(|e| PipelineError::Json {
                            path: file.path.clone(),
                            source: e,
                        })?;
                    let next = edit(doc);
                    file.contents = serde_json::to_vec(&next).map_err(|e| PipelineError::Json {
                        path: file.path.clone(),
                        source: e,
                    })?;
                }
                apply_rename(&mut files, rename.as_ref());
                let paths = write(toolkit, &files, dest.as_ref()).await?;
                (files.len(), paths)
            }
            Plan::Zip {
                src,
                dest,
                opts,
                archive,
                options,
            } => {
                let files = read(toolkit, &src, &opts).await?;
                let packed = toolkit.archiver.archive(&files, &archive, &options).await?;
                let dest = dest.unwrap_or_else(|| Destination::from("./"));
                let paths = write(toolkit, std::slice::from_ref(&packed), Some(&dest)).await?;
                (files.len(), paths)
            }
            Plan::Mkdirp { path } => {
                info!(path = %path.display(), "Creating directory:");
                let created = toolkit.pipeline.mkdirp(&path).await?;
                (0, vec![created])
            }
        };

        Ok(ActionOutcome {
            name,
            kind: Some(kind),
            files,
            paths,
        })
    }
}

async fn read(
    toolkit: &Toolkit,
    src: &Selector,
    opts: &SrcOptions,
) -> Result<Vec<FileRecord>, ActionError> {
    info!(globs = %src, "source:");
    let files = toolkit.pipeline.src(src, opts).await?;
    debug!(count = files.len(), "Read sources");
    Ok(files)
}

async fn write(
    toolkit: &Toolkit,
    files: &[FileRecord],
    dest: Option<&Destination>,
) -> Result<Vec<PathBuf>, ActionError> {
    match dest {
        Some(dest) => {
            let mut paths = Vec::new();
            for dir in dest.dirs() {
                info!(dir = %dir.display(), "destination:");
                paths.extend(toolkit.pipeline.dest(files, dir).await?);
            }
            Ok(paths)
        }
        None => {
            info!("overwriting sources");
            Ok(toolkit.pipeline.dest_in_place(files).await?)
        }
    }
}

fn apply_rename(files: &mut [FileRecord], rename: Option<&Rename>) {
    let Some(rule) = rename else {
        return;
    };
    for file in files.iter_mut() {
        let renamed = rule.apply(&file.relative());
        file.set_relative(renamed);
    }
}
