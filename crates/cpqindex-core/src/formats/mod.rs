//! # Formats Module
//!
//! Bit-level encoding used by the binary canonical form.
//!
//! Fields are packed MSB-first into a byte buffer sized up front, with no
//! padding between fields. File I/O and JSON output live in the app layer.

mod bits;

pub use bits::*;
