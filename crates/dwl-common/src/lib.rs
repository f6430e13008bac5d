//! DWL Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared error handling and logging for the data warehouse loader workspace.
//!
//! # Overview
//!
//! - **Error Handling**: [`DwlError`] for configuration and identifier checks
//! - **Logging**: [`logging::LogConfig`] and [`logging::init_logging`], a thin
//!   layer over `tracing-subscriber` with console/file/JSON output
//!
//! # Example
//!
//! ```no_run
//! use dwl_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = LogConfig::from_env()?;
//!     init_logging(&config)?;
//!     tracing::info!("Logging ready");
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::DwlError;
