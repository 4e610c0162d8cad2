//! The "Factory Floor": composes the kernels into complete codecs.
//!
//! `detector` decides what an input is, `numeric` runs the embeddings
//! pipeline, `metadata` is the record that makes an embeddings payload
//! self-describing, and `orchestrator` ties them to the container.

pub mod detector;
pub mod metadata;
pub mod numeric;
pub mod orchestrator;

#[cfg(test)]
mod orchestrator_tests;
