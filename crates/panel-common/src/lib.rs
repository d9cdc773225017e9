//! Panel Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the panel database tools.
//!
//! # Overview
//!
//! - **Error Handling**: [`PanelError`] and the crate-wide [`Result`] alias
//! - **Logging**: tracing subscriber setup shared by every binary
//! - **Versions**: semantic ordering of catalog panel versions
//! - **Checksums**: fingerprints for emitted fixture files
//!
//! # Example
//!
//! ```no_run
//! use panel_common::{PanelVersion, Result};
//!
//! fn newest(tags: &[&str]) -> Result<Option<PanelVersion>> {
//!     panel_common::version::latest_version(tags.iter().copied())
//! }
//! ```

pub mod checksum;
pub mod error;
pub mod logging;
pub mod version;

// Re-export commonly used types
pub use error::{PanelError, Result};
pub use version::PanelVersion;
