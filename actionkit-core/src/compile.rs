//! [`Compiler`] backed by an external command line compiler.
//!
//! The source is piped to the tool's stdin and the compiled output read from
//! its stdout. Compiler options are forwarded as long flags: `true` becomes
//! `--key`, scalars become `--key=value`, arrays repeat the flag, and `false`
//! or `null` are dropped. Nested objects are not expressible as flags and are
//! skipped with a warning.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};

use crate::command::run_filter;
use crate::contract::{Compiler, FileRecord, PipelineError};

#[derive(Debug, Clone)]
pub struct CommandCompiler {
    program: String,
    args: Vec<String>,
    output_extension: String,
}

impl CommandCompiler {
    pub fn new(program: impl Into<String>, output_extension: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            output_extension: output_extension.into(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// The `pug` CLI; reads a template on stdin and prints HTML.
    pub fn pug() -> Self {
        Self::new("pug", "html")
    }

    /// Dart Sass; `--stdin` reads SCSS and prints CSS.
    pub fn sass() -> Self {
        Self::new("sass", "css").with_args(["--stdin"])
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

/// Converts a compiler options object into command line flags.
pub fn option_flags(options: &Value) -> Vec<String> {
    let Value::Object(map) = options else {
        return Vec::new();
    };
    let mut flags = Vec::new();
    for (key, value) in map {
        let flag = format!("--{}", key.replace('_', "-"));
        match value {
            Value::Bool(true) => flags.push(flag),
            Value::Bool(false) | Value::Null => {}
            Value::String(s) => flags.push(format!("{flag}={s}")),
            Value::Number(n) => flags.push(format!("{flag}={n}")),
            Value::Array(items) => {
                for item in items {
                    match item {
                        Value::String(s) => flags.push(format!("{flag}={s}")),
                        other => flags.push(format!("{flag}={other}")),
                    }
                }
            }
            Value::Object(_) => warn!(option = %key, "Nested compiler option ignored"),
        }
    }
    flags
}

#[async_trait]
impl Compiler for CommandCompiler {
    async fn compile(
        &self,
        mut file: FileRecord,
        options: &Value,
    ) -> Result<FileRecord, PipelineError> {
        let mut args = self.args.clone();
        args.extend(option_flags(options));

        let cwd = file.path.parent().map(|p| p.to_path_buf());
        let output = run_filter(&self.program, &args, &file.contents, cwd.as_deref(), &file.path).await?;

        info!(
            compiler = %self.program,
            path = %file.path.display(),
            size = output.len(),
            "Compiled"
        );
        file.contents = output;
        file.set_extension(&self.output_extension);
        Ok(file)
    }
}
