use std::future::Future;

use crate::error::LookupError;
use crate::models::MpIdentity;

/// External source of party and term data for a speaker name.
///
/// `Ok(None)` means the source has no entry for the name. Errors are
/// transient failures; the resolver caches a negative result for both.
pub trait IdentityLookup: Send + Sync {
    fn lookup(&self, name: &str) -> impl Future<Output = Result<Option<MpIdentity>, LookupError>> + Send;
}

/// Offline mode: every unknown name resolves to an empty identity
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLookup;

impl IdentityLookup for NoLookup {
    async fn lookup(&self, _name: &str) -> Result<Option<MpIdentity>, LookupError> {
        Ok(None)
    }
}
