///
/// This module implements the CLI interface for actionkit: command parsing,
/// the async entrypoint, and user-visible output.
///
/// All action semantics live in the [`actionkit-core`] crate; this module only
/// loads task files, builds the actions and runs them.
///
/// ## How To Use
/// - From the command line: `actionkit run --config tasks.yaml build`.
/// - Programmatically and in integration tests: call [`run`] with a [`Cli`].
///
/// [`actionkit-core`]: ../../actionkit-core/
use crate::load_config::load_config;
use actionkit_core::{Task, Toolkit};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// CLI for actionkit: run declarative file-pipeline build tasks.
#[derive(Parser)]
#[clap(
    name = "actionkit",
    version,
    about = "Run copy/clean/compile/minify/zip build tasks described in a YAML file"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run tasks from the config file, in the order given (all tasks when none are named)
    Run {
        /// Path to the YAML task file
        #[clap(long, env = "ACTIONKIT_CONFIG")]
        config: PathBuf,
        /// Run the actions inside each task concurrently
        #[clap(long)]
        parallel: bool,
        /// Task names
        tasks: Vec<String>,
    },
    /// List tasks and their actions
    List {
        /// Path to the YAML task file
        #[clap(long, env = "ACTIONKIT_CONFIG")]
        config: PathBuf,
    },
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Run {
            config,
            parallel,
            tasks,
        } => {
            let mut loaded = load_config(&config)?;
            let mut toolkit = Toolkit::new(&loaded.root);
            if let Some(dir) = loaded.cache_dir.clone() {
                toolkit = toolkit.with_cache_dir(dir);
            }

            // every action is validated before the first one runs
            let built: Vec<Task> = loaded
                .take_tasks(&tasks)?
                .into_iter()
                .map(|definition| definition.build(parallel))
                .collect::<Result<_>>()?;

            for task in built {
                let name = task.name().to_string();
                tracing::info!(command = "run", task = %name, "Starting task");
                let report = task
                    .run(&toolkit)
                    .await
                    .with_context(|| format!("Task '{name}' failed"))?;
                println!(
                    "Finished '{}': {} action(s), {} file(s)",
                    report.name,
                    report.outcomes.len(),
                    report.files()
                );
                tracing::info!(command = "run", task = %name, ?report, "Task complete");
            }
            Ok(())
        }
        Commands::List { config } => {
            let loaded = load_config(&config)?;
            for definition in loaded.tasks {
                let name = definition.name.clone();
                println!("{name}");
                let task = definition.build(false)?;
                for step in task.steps() {
                    println!("  - {}", step.name());
                }
            }
            Ok(())
        }
    }
}
