//! Utility functions for request payloads.

pub mod payload;

pub use payload::{clean_payload, object_from_pairs, prepare_drug_submission};
