//! Configuration, tick orchestration and the run loop for the Warband
//! battle engine.
//!
//! # Modules
//!
//! - [`config`] -- Configuration loading from `warband-config.yaml` into
//!   strongly-typed structs.
//! - [`tick`] -- One world tick: load, locate, resolve in parallel, commit
//!   per battle.
//! - [`runner`] -- Bounded tick loop with [`TickCallback`] hooks.
//!
//! [`TickCallback`]: runner::TickCallback

pub mod config;
pub mod runner;
pub mod tick;
