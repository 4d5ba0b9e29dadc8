// Social client trait: the two API operations the cycle needs.
//
// The cycle holds an `Arc<dyn SocialClient>` so tests can substitute a fake
// without a network.

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

use crate::db::models::{AccountId, StatusId};

/// The authenticated account.
#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub id: AccountId,
    pub display_name: String,
}

/// Why a boost was refused.
///
/// The first two are expected in normal operation: the mirror can lag behind
/// the instance, and some posts can't be boosted by anyone but their author.
#[derive(Debug, Error)]
pub enum RepostError {
    #[error("status {0} has already been boosted by this account")]
    AlreadyReblogged(StatusId),

    #[error("boosting status {0} is not allowed")]
    NotAllowed(StatusId),

    #[error("boosting status {id} failed: {cause:#}")]
    Other { id: StatusId, cause: anyhow::Error },
}

#[async_trait]
pub trait SocialClient: Send + Sync {
    /// Look up the account the access token belongs to.
    async fn verify_credentials(&self) -> Result<Account>;

    /// Boost a status as the authenticated account.
    async fn reblog(&self, id: StatusId) -> Result<(), RepostError>;
}
