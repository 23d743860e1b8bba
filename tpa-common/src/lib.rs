//! # TPA Common Library
//!
//! Shared code for the Transfer Path Analysis services:
//! - Error type used across crates
//! - Configuration loading and root folder resolution
//! - Analysis job status shared by persistence and events
//! - Event types and the in-process EventBus

pub mod config;
pub mod error;
pub mod events;
pub mod job_status;

pub use error::{Error, Result};
pub use job_status::JobStatus;
