//! Utility functions for multidl

pub mod filename;
pub mod url;

pub use filename::*;
pub use url::*;
