//! Watermap Core - Domain models, format readers, and configuration
//!
//! This crate contains the CRS and feature-collection models, the vector and
//! tabular readers, and the layered configuration used by the processing crate.

pub mod config;
pub mod error;
pub mod formats;
pub mod models;

pub use error::{Result, WatermapError};
