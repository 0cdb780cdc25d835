//! Shared objects for ChainIntel.
//!
//! These are the serde-facing types exchanged between the ingestion core,
//! the server's ops endpoints and any external client.

pub mod objects;
