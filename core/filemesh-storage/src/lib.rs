//! Local storage layer for filemesh.
//!
//! A node keeps its files in one flat directory and one metadata record per
//! file in a JSON document next to it.
//!
//! # Architecture
//!
//! - [`hash`] computes content identities, streaming files in fixed chunks
//! - [`MetadataStore`] is the durable filename → record map, rewritten
//!   atomically on every mutation
//! - [`FileStore`] owns the directory and keeps files and records in
//!   lockstep: staged writes, lazy hashing of files placed there by other
//!   tools, pruning of records whose file is gone
//!
//! Everything here is blocking; async callers go through
//! `tokio::task::spawn_blocking`.

mod error;
pub mod hash;
mod metadata;
mod store;

pub use error::{StorageError, StorageResult};
pub use hash::{ContentHasher, content_id, hash_file, hash_reader};
pub use metadata::MetadataStore;
pub use store::FileStore;
