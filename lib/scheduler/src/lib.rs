//! Delay scheduling for chatflow.
//!
//! This crate provides:
//!
//! - **Schedule**: due-time computation for the three timing modes
//! - **Timers**: the per-(conversation, node) timer state machine
//! - **Delay Scheduler**: arm, reset, cancel and fire with one owner per timer
//! - **Timer Driver**: a tokio loop that fires due timers into a sink

pub mod config;
pub mod driver;
pub mod error;
pub mod manager;
pub mod schedule;
pub mod timer;

pub use config::SchedulerConfig;
pub use driver::{ResumptionSink, TimerDriver};
pub use error::{DeliveryError, SchedulerError, TimerStateError};
pub use manager::{
    DelayOutcome, DelayScheduler, FireOutcome, IgnoreReason, TimerEvent, TimerEventKind,
};
pub use timer::{Resumption, Timer, TimerState};
