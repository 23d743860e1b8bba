//! Test Helper Utilities
//!
//! Shared utilities for testing tpa-service

#![allow(dead_code)]

pub mod db_utils;
pub mod hdf5_writer;
pub mod mat_writer;
pub mod tabular_writer;

// Re-export commonly used items
pub use db_utils::{
    create_test_db, create_test_state, test_settings, wait_for_terminal, FailingEngine,
    NonFiniteEngine, StallingEngine,
};
pub use hdf5_writer::{Hdf5Builder, H5Data, H5Node};
pub use mat_writer::Mat5Writer;
pub use tabular_writer::{write_csv, write_xlsx};
