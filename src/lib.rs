#![forbid(unsafe_code)]
#![doc = include_str!("../README.md")]

pub mod actions;
pub mod adapter;
mod assemble;
pub mod banner;
mod blueprint;
pub mod config;
mod core;
mod engine;
mod error;
pub mod package;
pub mod recipe;
pub mod release;
mod sourcemap;
pub mod store;
mod utils;
#[cfg(feature = "live")]
mod watch;

pub use crate::assemble::{assemble, assemble_files};
pub use crate::blueprint::{Blueprint, Pipeline, TaskDef};
pub use crate::config::{CONFIG_FILE, Config, Project};
pub use crate::core::{Hash32, Outcome, Session, TaskContext};
pub use crate::engine::{Action, Diagnostics, Plan, Registry, Task, TaskExecution, action};
pub use crate::error::*;
pub use crate::package::{BumpPolicy, Package};
pub use crate::sourcemap::{Mapping, SourceMap};
pub use crate::store::{Artifact, ArtifactStore, Loc, Role};
pub use crate::utils::as_overhead;
#[cfg(feature = "logging")]
pub use crate::utils::init_logging;
