use crate::metrics_defs::RANK_UPDATES;
use crate::types::{GroupId, UserId};
use crate::upstream::{GroupsApi, UpdateReceipt, UpstreamError};
use shared::counter;
use std::sync::Arc;

/// Applies a resolved role to a membership.
///
/// Exactly one mutating call is made per invocation; failures are returned to
/// the caller and never retried here.
#[derive(Clone)]
pub struct RankUpdater {
    api: Arc<dyn GroupsApi>,
}

impl RankUpdater {
    pub fn new(api: Arc<dyn GroupsApi>) -> Self {
        RankUpdater { api }
    }

    pub async fn update_rank(
        &self,
        group_id: GroupId,
        membership_id: &str,
        user_id: UserId,
        role_id: &str,
    ) -> Result<UpdateReceipt, UpstreamError> {
        let result = self
            .api
            .update_membership(group_id, membership_id, user_id, role_id)
            .await;

        let outcome = if result.is_ok() { "success" } else { "failure" };
        counter!(RANK_UPDATES, "result" => outcome).increment(1);

        result
    }
}
