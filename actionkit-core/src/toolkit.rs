use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::archive::FileArchiver;
use crate::compile::CommandCompiler;
use crate::contract::{Archiver, Compiler, ImageMinifier, Pipeline};
use crate::fs_pipeline::FsPipeline;
use crate::imagemin::CommandMinifier;

/// The collaborators an action executes against.
///
/// Cloning is cheap; every collaborator sits behind an `Arc`.
#[derive(Clone)]
pub struct Toolkit {
    pub pipeline: Arc<dyn Pipeline>,
    pub templates: Arc<dyn Compiler>,
    pub stylesheets: Arc<dyn Compiler>,
    pub images: Arc<dyn ImageMinifier>,
    pub archiver: Arc<dyn Archiver>,
    /// Where cached image minification results are kept.
    pub cache_dir: PathBuf,
}

impl Toolkit {
    /// Filesystem pipeline rooted at `root`, `pug`/`sass` compilers, the
    /// command line image optimisers and the zip/tar archiver.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            pipeline: Arc::new(FsPipeline::new(root.as_ref())),
            templates: Arc::new(CommandCompiler::pug()),
            stylesheets: Arc::new(CommandCompiler::sass()),
            images: Arc::new(CommandMinifier::new()),
            archiver: Arc::new(FileArchiver::new()),
            cache_dir: std::env::temp_dir().join("actionkit-imagemin-cache"),
        }
    }

    pub fn with_pipeline(mut self, pipeline: Arc<dyn Pipeline>) -> Self {
        self.pipeline = pipeline;
        self
    }

    pub fn with_template_compiler(mut self, compiler: Arc<dyn Compiler>) -> Self {
        self.templates = compiler;
        self
    }

    pub fn with_stylesheet_compiler(mut self, compiler: Arc<dyn Compiler>) -> Self {
        self.stylesheets = compiler;
        self
    }

    pub fn with_image_minifier(mut self, minifier: Arc<dyn ImageMinifier>) -> Self {
        self.images = minifier;
        self
    }

    pub fn with_archiver(mut self, archiver: Arc<dyn Archiver>) -> Self {
        self.archiver = archiver;
        self
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }
}

impl Default for Toolkit {
    fn default() -> Self {
        Self::new(".")
    }
}
