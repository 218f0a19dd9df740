//! Composition of actions into tasks.
//!
//! [`set`] turns a mixed list of actions, bare async callables and nested
//! tasks into uniform [`Step`]s; [`Task::series`] runs them one after another
//! and stops at the first failure, [`Task::parallel`] starts them all at once
//! and fails as soon as any of them does.

use std::fmt;
use std::future::Future;
use std::time::Instant;

use futures::future::{try_join_all, BoxFuture};
use futures::FutureExt;
use tracing::{error, info};

use crate::action::{Action, ActionError, ActionOutcome};
use crate::toolkit::Toolkit;

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("Step '{step}' failed: {source}")]
    Step {
        step: String,
        #[source]
        source: ActionError,
    },
}

impl TaskError {
    pub fn step(&self) -> &str {
        match self {
            TaskError::Step { step, .. } => step,
        }
    }
}

type CallFn = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), ActionError>> + Send>;

/// One unit of a task.
pub enum Step {
    Action(Action),
    /// A bare async callable, run as-is.
    Call { name: String, func: CallFn },
    Group(Task),
}

impl Step {
    pub fn call<F, Fut>(name: impl Into<String>, func: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), ActionError>> + Send + 'static,
    {
        Step::Call {
            name: name.into(),
            func: Box::new(move || func().boxed()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Step::Action(action) => action.name(),
            Step::Call { name, .. } => name,
            Step::Group(task) => task.name(),
        }
    }

    fn run(self, toolkit: &Toolkit) -> BoxFuture<'_, Result<Vec<ActionOutcome>, TaskError>> {
        async move {
            match self {
                Step::Action(action) => {
                    let step = action.name().to_string();
                    action
                        .execute(toolkit)
                        .await
                        .map(|outcome| vec![outcome])
                        .map_err(|source| TaskError::Step { step, source })
                }
                Step::Call { name, func } => {
                    let started = Instant::now();
                    info!("Starting '{}'...", name);
                    match func().await {
                        Ok(()) => {
                            info!(
                                elapsed_ms = started.elapsed().as_millis() as u64,
                                "Finished '{}'",
                                name
                            );
                            Ok(vec![ActionOutcome {
                                name,
                                kind: None,
                                files: 0,
                                paths: Vec::new(),
                            }])
                        }
                        Err(source) => {
                            error!(error = %source, "'{}' errored", name);
                            Err(TaskError::Step { step: name, source })
                        }
                    }
                }
                Step::Group(task) => task.run(toolkit).await.map(|report| report.outcomes),
            }
        }
        .boxed()
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Action(action) => f.debug_tuple("Action").field(action).finish(),
            Step::Call { name, .. } => f.debug_struct("Call").field("name", name).finish(),
            Step::Group(task) => f.debug_tuple("Group").field(task).finish(),
        }
    }
}

impl From<Action> for Step {
    fn from(action: Action) -> Self {
        Step::Action(action)
    }
}

impl From<Task> for Step {
    fn from(task: Task) -> Self {
        Step::Group(task)
    }
}

/// Normalises actions, callables and tasks into steps.
pub fn set<I, S>(steps: I) -> Vec<Step>
where
    I: IntoIterator<Item = S>,
    S: Into<Step>,
{
    steps.into_iter().map(Into::into).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Series,
    Parallel,
}

#[derive(Debug)]
pub struct Task {
    name: String,
    mode: Mode,
    steps: Vec<Step>,
}

/// Outcomes of every action a task ran, in step order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TaskReport {
    pub name: String,
    pub outcomes: Vec<ActionOutcome>,
}

impl TaskReport {
    pub fn files(&self) -> usize {
        self.outcomes.iter().map(|o| o.files).sum()
    }
}

impl Task {
    pub fn series<I, S>(steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Step>,
    {
        Self {
            name: "series".into(),
            mode: Mode::Series,
            steps: set(steps),
        }
    }

    pub fn parallel<I, S>(steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Step>,
    {
        Self {
            name: "parallel".into(),
            mode: Mode::Parallel,
            steps: set(steps),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn run(self, toolkit: &Toolkit) -> BoxFuture<'_, Result<TaskReport, TaskError>> {
        async move {
            let Task { name, mode, steps } = self;
            info!(task = %name, ?mode, steps = steps.len(), "Running task");
            let mut outcomes = Vec::new();
            match mode {
                Mode::Series => {
                    for step in steps {
                        outcomes.extend(step.run(toolkit).await?);
                    }
                }
                Mode::Parallel => {
                    let all = try_join_all(steps.into_iter().map(|step| step.run(toolkit))).await?;
                    outcomes.extend(all.into_iter().flatten());
                }
            }
            Ok(TaskReport { name, outcomes })
        }
        .boxed()
    }
}
