//! # Catalog Library
//!
//! Owns the local mirror of the user's remote music catalog and the typed
//! access layer over it.
//!
//! ## Overview
//!
//! This crate provides:
//! - Object store backends: embedded SQLite, in-memory, and a no-op sink
//!   for when persistence is disabled (`adapters`)
//! - The data model and its table layout (`models`, `schema`)
//! - Deterministic two-key join tables (`relation`)
//! - Repositories with reference-counted cascading deletes (`repositories`)
//! - The [`Catalog`] aggregate: imports and targeted queries

pub mod adapters;
pub mod catalog;
pub mod error;
pub mod models;
pub mod relation;
pub mod repositories;
pub mod schema;

pub use catalog::Catalog;
pub use error::{LibraryError, Result};
pub use schema::{all_schemas, Entity, Join, STORE_VERSION};
