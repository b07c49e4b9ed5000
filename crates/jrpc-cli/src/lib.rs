//! jrpc command-line driver
//!
//! Argument handling and the repeated-call loop behind the `jrpc` binary,
//! exposed as a library for testing.

pub mod cli;
pub mod driver;
pub mod error;

pub use cli::Args;
pub use driver::Invocation;
pub use error::ConfigurationError;
