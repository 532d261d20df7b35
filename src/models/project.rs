use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Serialize, Deserialize, Default, Clone)]
pub struct Project {
    /// UUID of the project
    pub id: Uuid,
    /// Name of the project
    pub name: String,
    /// Optional markdown description
    pub description: Option<String>,
    /// Owner's user id. The owner is not required to appear in the member list
    pub owner_id: String,
    /// Created at timestamp of the project
    pub created_at: Timestamp,
}

/// Membership row. Owner rights are derived from `Project::owner_id`,
/// never from one of these.
#[derive(Serialize, Deserialize, Default, Clone)]
pub struct ProjectMember {
    /// UUID of the membership row
    pub id: Uuid,
    /// Project this membership belongs to
    pub project_id: Uuid,
    /// User id of the member
    pub user_id: String,
    /// Project-level role. Currently always "Member"
    pub role: String,
}

impl ProjectMember {
    pub const DEFAULT_ROLE: &'static str = "Member";
}
