//! # Canonical Form Engine
//!
//! Turns a query into an isomorphism-invariant encoding.
//!
//! 1. Retract the query graph to its core.
//! 2. Move edge labels onto nodes and color the nodes ([`ColoredGraph`]).
//! 3. Hand adjacency and colors to a [`CanonicalLabeler`] on the
//!    [`LabelingPool`]; the submission returns a handle immediately.
//! 4. Apply the returned relabeling ([`CanonForm`]).
//!
//! Two queries whose cores are isomorphic, with source, target and labels
//! fixed, produce byte-identical binary forms.

mod colored;
mod engine;
mod form;
mod labeler;
mod pool;

pub use colored::*;
pub use engine::*;
pub use form::*;
pub use labeler::*;
pub use pool::*;
