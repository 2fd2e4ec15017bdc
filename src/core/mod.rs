//! Core types shared by handlers, the batch runner and the form

pub mod downloader;
pub mod options;
pub mod progress;
pub mod source;

pub use downloader::*;
pub use options::*;
pub use progress::*;
pub use source::*;
