// Boost the selected posts, one at a time.
//
// Each boost is independent: a rejection or failure is logged and the next
// id is tried. Nothing is retried within a cycle; a post whose boost failed
// stays eligible and may be picked again on a later tick.

use tracing::{error, info, warn};

use crate::db::models::StatusId;
use crate::mastodon::{RepostError, SocialClient};

/// Outcome counts for one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepostSummary {
    pub reblogged: usize,
    pub already_reblogged: usize,
    pub not_allowed: usize,
    pub failed: usize,
}

impl RepostSummary {
    pub fn attempted(&self) -> usize {
        self.reblogged + self.already_reblogged + self.not_allowed + self.failed
    }
}

/// Boost every id in order.
pub async fn repost_all(client: &dyn SocialClient, ids: &[StatusId]) -> RepostSummary {
    let mut summary = RepostSummary::default();

    for &id in ids {
        info!(status_id = %id, "Boosting status #{id}");

        match client.reblog(id).await {
            Ok(()) => summary.reblogged += 1,
            Err(RepostError::AlreadyReblogged(_)) => {
                warn!(
                    status_id = %id,
                    "Tried to boost #{id} but it had already been boosted by this account"
                );
                summary.already_reblogged += 1;
            }
            Err(RepostError::NotAllowed(_)) => {
                warn!(
                    status_id = %id,
                    "Tried to boost #{id} but the action was not allowed"
                );
                summary.not_allowed += 1;
            }
            Err(e) => {
                error!(status_id = %id, error = %e, "Boost failed");
                summary.failed += 1;
            }
        }
    }

    summary
}
