//! Presentation layer

pub mod form;

pub use form::*;
