//! # Degate - core
//!
//! Shared building blocks for the Degate IC reverse engineering engine:
//!
//! - [`errors`] - error type, error kinds and result alias
//! - [`config`] - runtime configuration (tile cache budget, tile size, temp directory)
//! - [`common`] - lock helpers, the worker pool used for asynchronous tile loads, constants
//!
//! The spatial index lives in `degate-spatial` and the tiled image cache in
//! `degate-tiles`; both report failures through [`errors::DegateError`].

pub mod common;
pub mod config;
pub mod errors;

pub use config::{DegateConfig, TileStorage};
pub use errors::{DegateError, DegateResult, ErrorKind};
