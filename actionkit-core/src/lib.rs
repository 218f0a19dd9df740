#![doc = "actionkit-core: build actions over a file pipeline."]

//! Uniform build actions (copy, clean, image minification, marker stripping,
//! template and stylesheet compilation, content and JSON transforms, archive
//! packaging, directory creation), the task composition that sequences them,
//! and the two pieces of standalone logic they rely on: a recursive
//! configuration merge and the `//{DEL ...}` marker stripper.
//!
//! # Usage
//! Build [`action::Action`]s from [`config::ActionSpec`]s, compose them with
//! [`task::Task`], and run against a [`toolkit::Toolkit`].

pub mod action;
pub mod archive;
pub mod command;
pub mod compile;
pub mod config;
pub mod contract;
pub mod fs_pipeline;
pub mod imagemin;
pub mod markers;
pub mod merge;
pub mod rename;
pub mod task;
pub mod toolkit;

pub use action::{Action, ActionError, ActionKind, ActionOutcome};
pub use config::ActionSpec;
pub use markers::strip_markers;
pub use merge::merge;
pub use task::{set, Step, Task, TaskError, TaskReport};
pub use toolkit::Toolkit;
