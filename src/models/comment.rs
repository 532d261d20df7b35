use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Serialize, Deserialize, Default, Clone)]
pub struct TaskComment {
    /// UUID to identify the comment
    pub id: Uuid,
    /// The task this comment belongs to
    pub task_item_id: Uuid,
    /// User id of the comment's author
    pub author_id: String,
    /// Markdown body
    pub body_markdown: String,
    /// Parent comment, if this is a reply. Always a comment on the same task
    pub parent_comment_id: Option<Uuid>,
    /// When the comment was created
    pub created_at: Timestamp,
    /// Set on every edit. No history of prior bodies is kept
    pub edited_at: Option<Timestamp>,
}

/// One node of an assembled reply tree. Children are kept in creation order
/// (oldest reply first).
pub struct CommentNode {
    pub comment: TaskComment,
    /// Author's email, falling back to the raw user id
    pub author_label: String,
    pub children: Vec<CommentNode>,
}
