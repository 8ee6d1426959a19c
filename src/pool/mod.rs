//! Worker threads, their controller and its configuration

pub mod config;
pub mod controller;
pub mod worker;

pub use config::ControllerConfig;
pub use controller::{ControllerSnapshot, WorkerThreadController};
pub use worker::{JobHistory, WorkerOptions, WorkerSnapshot, WorkerState, WorkerThread};
