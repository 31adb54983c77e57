//! Content store trait

use async_trait::async_trait;

use crate::error::RemoteError;

use super::types::{Fingerprint, PipelineRun, StoredContent, WriteReceipt};

/// Version-controlled file store with an attached build pipeline
///
/// Every call takes the token explicitly so the caller stays the single owner
/// of credentials. Calls are attempted once; retrying is the caller's choice.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Short provider name for logs
    fn name(&self) -> &'static str;

    /// Read a file; `Ok(None)` when it does not exist
    ///
    /// A file whose body cannot be decoded is `RemoteError::Corrupt`, which
    /// still carries the fingerprint needed to overwrite it.
    async fn fetch(
        &self,
        token: &str,
        path: &str,
        git_ref: &str,
    ) -> Result<Option<StoredContent>, RemoteError>;

    /// Write a file guarded by the fingerprint last seen
    ///
    /// `expected` is `None` only when the file is known not to exist.
    async fn write(
        &self,
        token: &str,
        path: &str,
        bytes: &[u8],
        message: &str,
        expected: Option<&Fingerprint>,
        branch: &str,
    ) -> Result<WriteReceipt, RemoteError>;

    /// Delete a file at a known version
    async fn delete(
        &self,
        token: &str,
        path: &str,
        expected: &Fingerprint,
        message: &str,
        branch: &str,
    ) -> Result<(), RemoteError>;

    /// Most recent pipeline runs, newest first
    async fn list_pipeline_runs(
        &self,
        token: &str,
        limit: u32,
    ) -> Result<Vec<PipelineRun>, RemoteError>;
}
