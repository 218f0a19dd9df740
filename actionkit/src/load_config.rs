/// `load_config` module: reads a YAML task file and turns it into buildable actions.
///
/// This module is the only place where untrusted YAML is parsed and mapped to
/// the typed [`ActionSpec`]s of `actionkit-core`.
///
/// # Accepted shape
/// ```yaml
/// root: .                 # optional, relative to the task file
/// cache_dir: .cache       # optional, image minification cache
/// defaults:               # optional, per action type
///   copy:
///     opts: { dot: true }
/// tasks:
///   build:
///     - type: clean
///       src: dist
///     - type: copy
///       src: "src/**/*.html"
///       dest: dist
/// ```
///
/// # Defaults
/// Each action's own keys are deep merged over `defaults.<type>` before the
/// spec is deserialised, so nested option objects combine key by key and the
/// action wins on conflicts.
///
/// # Errors
/// All errors use `anyhow::Error` with the file, task and action index in
/// context, and are surfaced at the CLI boundary.
use actionkit_core::merge::merged;
use actionkit_core::{Action, ActionKind, ActionSpec, Step, Task};
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// One action entry: its type plus the spec keys.
#[derive(Debug, Deserialize)]
pub struct ActionEntry {
    #[serde(rename = "type")]
    pub kind: ActionKind,
    #[serde(flatten)]
    pub spec: ActionSpec,
}

impl ActionEntry {
    pub fn build(self) -> Result<Action> {
        let kind = self.kind;
        Ok(Action::build(kind, self.spec)?)
    }
}

/// A named, ordered list of actions.
#[derive(Debug)]
pub struct TaskDefinition {
    pub name: String,
    pub actions: Vec<ActionEntry>,
}

impl TaskDefinition {
    /// Builds every action of the task. Fails on the first invalid entry,
    /// before anything runs.
    pub fn build(self, parallel: bool) -> Result<Task> {
        let name = self.name;
        let mut steps: Vec<Step> = Vec::with_capacity(self.actions.len());
        for (index, entry) in self.actions.into_iter().enumerate() {
            let kind = entry.kind;
            let action = entry
                .build()
                .with_context(|| format!("task '{name}', action #{index} ({kind})"))?;
            steps.push(action.into());
        }
        let task = if parallel {
            Task::parallel(steps)
        } else {
            Task::series(steps)
        };
        Ok(task.named(name))
    }
}

#[derive(Debug)]
pub struct CliConfig {
    /// Directory globs and destinations are resolved against.
    pub root: PathBuf,
    pub cache_dir: Option<PathBuf>,
    pub tasks: Vec<TaskDefinition>,
}

impl CliConfig {
    pub fn task_names(&self) -> Vec<&str> {
        self.tasks.iter().map(|t| t.name.as_str()).collect()
    }

    /// Removes and returns the named tasks in the requested order, or all
    /// tasks in file order when `names` is empty.
    pub fn take_tasks(&mut self, names: &[String]) -> Result<Vec<TaskDefinition>> {
        if names.is_empty() {
            return Ok(std::mem::take(&mut self.tasks));
        }
        let mut selected = Vec::with_capacity(names.len());
        for name in names {
            let Some(pos) = self.tasks.iter().position(|t| &t.name == name) else {
                anyhow::bail!(
                    "Unknown task '{}' (available: {})",
                    name,
                    self.task_names().join(", ")
                );
            };
            selected.push(self.tasks.remove(pos));
        }
        Ok(selected)
    }
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    root: Option<PathBuf>,
    #[serde(default)]
    cache_dir: Option<PathBuf>,
    #[serde(default)]
    defaults: Value,
    tasks: serde_yaml::Mapping,
}

/// Loads a YAML task file. Returns tasks in file order with defaults applied.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => {
            info!(config_path = ?path_ref, "Config file read successfully");
            content
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow!("Failed to read config file {:?}: {}", path_ref, e));
        }
    };

    let raw: RawConfig = match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    let config_dir = path_ref
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let root = match raw.root {
        Some(root) if root.is_absolute() => root,
        Some(root) => config_dir.join(root),
        None => config_dir.clone(),
    };
    let cache_dir = raw.cache_dir.map(|dir| {
        if dir.is_absolute() {
            dir
        } else {
            root.join(dir)
        }
    });

    let mut tasks = Vec::with_capacity(raw.tasks.len());
    for (key, value) in raw.tasks {
        let name = key
            .as_str()
            .ok_or_else(|| anyhow!("Task names must be strings, got {:?}", key))?
            .to_string();
        let entries: Vec<Value> = serde_json::to_value(value)
            .and_then(serde_json::from_value)
            .with_context(|| format!("task '{name}' must be a list of actions"))?;

        let mut actions = Vec::with_capacity(entries.len());
        for (index, entry) in entries.into_iter().enumerate() {
            let with_defaults = apply_defaults(&raw.defaults, &entry);
            let action: ActionEntry = serde_json::from_value(with_defaults)
                .with_context(|| format!("task '{name}', action #{index}: invalid action"))?;
            debug!(task = %name, index, kind = %action.kind, "Parsed action entry");
            actions.push(action);
        }
        info!(task = %name, actions = actions.len(), "Loaded task");
        tasks.push(TaskDefinition { name, actions });
    }

    info!(
        root = %root.display(),
        tasks = tasks.len(),
        "Config loaded successfully"
    );

    Ok(CliConfig {
        root,
        cache_dir,
        tasks,
    })
}

/// Lays an action entry over the defaults for its `type`.
pub fn apply_defaults(defaults: &Value, entry: &Value) -> Value {
    let kind = entry.get("type").and_then(Value::as_str).unwrap_or_default();
    match defaults.get(kind) {
        Some(base) => merged(base, entry),
        None => entry.clone(),
    }
}
