//! HTTP request handlers
//!
//! Each handler parses its JSON body, runs one controller operation and maps
//! the outcome onto a response.

pub mod attributes;
pub mod commands;
pub mod commissioning;
pub mod events;
pub mod groups;
pub mod help;
pub mod subscriptions;
