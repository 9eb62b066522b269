use crate::page_token::PageToken;
use crate::types::{GroupId, UserId};
use crate::upstream::{
    GroupsApi, MembershipResource, RoleResource, RolesPage, UpdateReceipt, UpstreamError,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::StatusCode;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// In-memory groups API that counts every call it receives.
///
/// Roles are served in the configured pages; continuation tokens are
/// `page-{n}` and the last page carries no token.
#[derive(Default)]
pub struct MockGroupsApi {
    memberships: Mutex<HashMap<(GroupId, UserId), MembershipResource>>,
    role_pages: Mutex<HashMap<GroupId, Vec<Vec<RoleResource>>>>,
    lookup_failure: Mutex<Option<StatusCode>>,
    update_failure: Mutex<Option<StatusCode>>,
    requested_tokens: Mutex<Vec<Option<String>>>,
    updates: Mutex<Vec<(GroupId, String, UserId, String)>>,
    membership_calls: AtomicUsize,
    role_page_calls: AtomicUsize,
}

impl MockGroupsApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a membership whose `user` reference points at `user_id`.
    pub fn add_membership(&self, group_id: GroupId, user_id: UserId, membership_id: &str) {
        self.add_raw_membership(
            group_id,
            user_id,
            MembershipResource {
                path: format!("groups/{group_id}/memberships/{membership_id}"),
                user: format!("users/{user_id}"),
                role: None,
            },
        );
    }

    /// Registers a membership resource verbatim, for malformed reference tests.
    pub fn add_raw_membership(
        &self,
        group_id: GroupId,
        user_id: UserId,
        resource: MembershipResource,
    ) {
        self.memberships.lock().insert((group_id, user_id), resource);
    }

    pub fn set_role_pages(&self, group_id: GroupId, pages: Vec<Vec<RoleResource>>) {
        self.role_pages.lock().insert(group_id, pages);
    }

    pub fn fail_lookups(&self, status: StatusCode) {
        *self.lookup_failure.lock() = Some(status);
    }

    pub fn fail_updates(&self, status: StatusCode) {
        *self.update_failure.lock() = Some(status);
    }

    pub fn membership_calls(&self) -> usize {
        self.membership_calls.load(Ordering::SeqCst)
    }

    pub fn role_page_calls(&self) -> usize {
        self.role_page_calls.load(Ordering::SeqCst)
    }

    pub fn upstream_calls(&self) -> usize {
        self.membership_calls() + self.role_page_calls()
    }

    /// Tokens passed to each role page call, in call order.
    pub fn requested_tokens(&self) -> Vec<Option<String>> {
        self.requested_tokens.lock().clone()
    }

    pub fn updates(&self) -> Vec<(GroupId, String, UserId, String)> {
        self.updates.lock().clone()
    }

    fn lookup_error(&self) -> Option<UpstreamError> {
        self.lookup_failure
            .lock()
            .map(|status| UpstreamError::Status {
                status,
                message: "mock lookup failure".into(),
            })
    }
}

pub fn role(id: &str, display_name: &str, rank: u32) -> RoleResource {
    RoleResource {
        id: id.into(),
        display_name: display_name.into(),
        rank,
    }
}

#[async_trait]
impl GroupsApi for MockGroupsApi {
    async fn fetch_membership(
        &self,
        group_id: GroupId,
        user_id: UserId,
    ) -> Result<Option<MembershipResource>, UpstreamError> {
        self.membership_calls.fetch_add(1, Ordering::SeqCst);
        // Give concurrent callers a chance to interleave, as a real request would.
        tokio::task::yield_now().await;
        if let Some(err) = self.lookup_error() {
            return Err(err);
        }
        Ok(self.memberships.lock().get(&(group_id, user_id)).cloned())
    }

    async fn fetch_roles_page(
        &self,
        group_id: GroupId,
        page_token: Option<&PageToken>,
    ) -> Result<RolesPage, UpstreamError> {
        self.role_page_calls.fetch_add(1, Ordering::SeqCst);
        self.requested_tokens
            .lock()
            .push(page_token.map(|t| t.as_str().to_string()));
        tokio::task::yield_now().await;
        if let Some(err) = self.lookup_error() {
            return Err(err);
        }

        let index = match page_token {
            None => 0,
            Some(token) => token
                .as_str()
                .strip_prefix("page-")
                .and_then(|n| n.parse::<usize>().ok())
                .ok_or_else(|| UpstreamError::Status {
                    status: StatusCode::BAD_REQUEST,
                    message: format!("unknown page token {token}"),
                })?,
        };

        let pages = self.role_pages.lock();
        let pages = pages.get(&group_id).map(Vec::as_slice).unwrap_or_default();
        let group_roles = pages.get(index).cloned().unwrap_or_default();
        let next_page_token = if index + 1 < pages.len() {
            PageToken::new(format!("page-{}", index + 1))
        } else {
            None
        };

        Ok(RolesPage {
            group_roles,
            next_page_token,
        })
    }

    async fn update_membership(
        &self,
        group_id: GroupId,
        membership_id: &str,
        user_id: UserId,
        role_id: &str,
    ) -> Result<UpdateReceipt, UpstreamError> {
        self.updates.lock().push((
            group_id,
            membership_id.to_string(),
            user_id,
            role_id.to_string(),
        ));

        if let Some(status) = *self.update_failure.lock() {
            return Err(UpstreamError::Status {
                status,
                message: "mock update failure".into(),
            });
        }

        Ok(UpdateReceipt {
            path: Some(format!("groups/{group_id}/memberships/{membership_id}")),
            user: Some(format!("users/{user_id}")),
            role: Some(format!("groups/{group_id}/roles/{role_id}")),
        })
    }
}
