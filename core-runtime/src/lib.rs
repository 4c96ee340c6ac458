//! # Core Runtime Module
//!
//! Ambient infrastructure shared by the catalog crates:
//! - Logging and tracing setup
//! - Validated configuration
//! - The broadcast event bus
//!
//! ## Overview
//!
//! Nothing here knows about catalog data. The crate only fixes how the other
//! crates log, how a host configures them, and how they announce progress.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
