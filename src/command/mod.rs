//! Command execution pipeline
//!
//! This module handles:
//! - Resolving a device selection to dispatch targets
//! - Running a task on every target through a bounded worker pool
//! - Folding per-device outcomes into the caller-facing response

pub mod aggregator;
pub mod dispatcher;
mod executor;
pub mod resolver;

pub use aggregator::{
    aggregate, aggregate_command, BatchReport, CommandReport, DeviceReport, DeviceResult,
    DispatchResponse, ResponseBody,
};
pub use dispatcher::{Dispatcher, OutcomeStream};
pub use resolver::resolve;
