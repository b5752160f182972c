//! Abstract syntax tree for the shell command language.

pub mod types;

pub use types::*;
