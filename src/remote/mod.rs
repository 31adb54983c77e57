//! Remote content store
//!
//! The configuration document and each page's rendered output live in a
//! version-controlled repository. Writes are compare-and-swap on the file's
//! fingerprint; a successful write triggers the site build pipeline, whose
//! runs are observable here.

mod codec;
mod github;
mod memory;
mod store;
mod types;

pub use codec::{from_transport, to_transport};
pub use github::GitHubContentClient;
pub use memory::{MemoryContentStore, MemoryStats};
pub use store::ContentStore;
pub use types::{
    Fingerprint, PipelineRun, RunConclusion, RunStatus, StoredContent, WriteReceipt,
};

pub use crate::error::RemoteError;
