//! meshsync controller process
//!
//! - `cli` - command line arguments
//! - `settings` - layered configuration loading
//! - `logging` - tracing subscriber setup
//! - `signal` - process signal handling
//! - `app` - component assembly and lifecycle

pub mod app;
pub mod cli;
pub mod logging;
pub mod settings;
pub mod signal;

pub use app::{App, Components};
pub use cli::Cli;
