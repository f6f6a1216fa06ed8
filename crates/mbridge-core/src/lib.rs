//! mbridge-core - Core types for the device-control bridge
//!
//! This crate provides the vocabulary shared by the correlation layer, the
//! device stack implementations and the REST API: node identifiers, item
//! paths, tagged values, result items and typed stack commands.

pub mod error;
pub mod models;

pub use error::{StackError, StackResult};
pub use models::*;
