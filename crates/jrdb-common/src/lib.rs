//! JRDB Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared utilities for the JRDB loader workspace.
//!
//! # Overview
//!
//! - **Text**: the Shift_JIS legacy codec every JRDB file is written in
//! - **Logging**: structured `tracing` setup shared by all binaries
//! - **Error Handling**: common error and result types
//!
//! # Example
//!
//! ```no_run
//! use jrdb_common::text;
//!
//! fn main() -> jrdb_common::Result<()> {
//!     let name = text::decode_cell(b"\x83\x65\x83\x58\x83\x67")?;
//!     assert_eq!(name, "テスト");
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;
pub mod text;

// Re-export commonly used types
pub use error::{CommonError, Result};
