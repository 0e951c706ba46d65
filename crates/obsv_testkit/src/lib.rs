//! # obsv Testkit
//!
//! Test utilities for obsv.
//!
//! This crate provides:
//! - Recording fixtures for events and sessions
//! - Property-based test generators using proptest
//! - Stress testing utilities for concurrent readers and writers
//! - Cross-module integration scenarios
//!
//! ## Usage
//!
//! ```rust,ignore
//! use obsv_testkit::prelude::*;
//!
//! #[test]
//! fn batches_are_one_session() {
//!     let map = ObservableMap::new();
//!     let sessions = SessionRecorder::attach(&map);
//!     map.put_all([(1, "one"), (2, "two")]);
//!     assert_eq!(sessions.begins(), 1);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod integration;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
    pub use obsv_core::{
        ObservableGraph, ObservableMap, ObservableMultiMap, ObservableValue, Transactable,
    };
}

pub use fixtures::*;
pub use generators::*;
pub use integration::*;
pub use stress::*;
