//! snowsample - provision warehouse drivers and pull a bounded Snowflake
//! sample into a local table.
//!
//! This library exposes the pipeline stages for use by the binary and the
//! integration tests.

pub mod cli;
pub mod config;
pub mod error;
pub mod frame;
pub mod logging;
pub mod pipeline;
pub mod provision;
pub mod query;
pub mod secrets;
pub mod session;
pub mod source;
