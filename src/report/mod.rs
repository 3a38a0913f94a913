//! Report generation and export.
//!
//! Text rendering for the console and the versioned JSON document that
//! `analyze` reads back.

pub mod export;
pub mod generator;

pub use export::{read_export, write_export};
pub use generator::*;
