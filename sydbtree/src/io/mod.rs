//! File based persistence
//!

pub(crate) mod file;
