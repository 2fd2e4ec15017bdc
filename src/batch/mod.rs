//! Batch downloads driven by scraper manifests

pub mod manifest;
pub mod runner;

pub use manifest::*;
pub use runner::*;
