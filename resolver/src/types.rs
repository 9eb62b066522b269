pub type GroupId = u64;
pub type UserId = u64;
pub type Rank = u8;

/// Cache key for a user's membership in a group.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MembershipKey {
    pub group_id: GroupId,
    pub user_id: UserId,
}

/// Cache key for the role holding a rank in a group.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RoleKey {
    pub group_id: GroupId,
    pub rank: Rank,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MembershipRecord {
    pub group_id: GroupId,
    pub user_id: UserId,
    pub membership_id: String,
}

impl MembershipRecord {
    pub fn key(&self) -> MembershipKey {
        MembershipKey {
            group_id: self.group_id,
            user_id: self.user_id,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoleRecord {
    pub group_id: GroupId,
    pub rank: Rank,
    pub role_id: String,
    pub display_name: String,
}

impl RoleRecord {
    pub fn key(&self) -> RoleKey {
        RoleKey {
            group_id: self.group_id,
            rank: self.rank,
        }
    }
}

/// Identifiers needed to move a user to the role holding the requested rank.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resolution {
    pub membership_id: String,
    pub role_id: String,
    pub role_display_name: String,
}
