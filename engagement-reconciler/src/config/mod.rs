//! Configuration module for the engagement reconciler.
//! Reads settings from the environment and wires up the dependencies.
mod dependencies;
mod settings;

pub use dependencies::Dependencies;
pub use settings::{ConnectionMode, LogFormat, ReconcilerConfig, RunMode};
