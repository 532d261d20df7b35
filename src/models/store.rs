use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{
    attachment::TaskAttachment,
    comment::TaskComment,
    project::{Project, ProjectMember},
    task::TaskItem,
    user::User,
};

/// Current schema version
pub const CURRENT_VERSION: u32 = 1;

/// Flat entity tables. All cross-entity structure (ownership, membership,
/// reply trees) is id references resolved through the lookups below.
#[derive(Serialize, Deserialize)]
pub struct Store {
    pub version: u32,
    pub users: Vec<User>,
    pub projects: Vec<Project>,
    pub members: Vec<ProjectMember>,
    pub tasks: Vec<TaskItem>,
    pub comments: Vec<TaskComment>,
    pub attachments: Vec<TaskAttachment>,
}

impl Default for Store {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            users: vec![],
            projects: vec![],
            members: vec![],
            tasks: vec![],
            comments: vec![],
            attachments: vec![],
        }
    }
}

impl Store {
    // ---- users ----

    pub fn get_user(&self, user_id: &str) -> Option<&User> {
        self.users.iter().find(|u| u.id == user_id)
    }

    pub fn get_user_by_email(&self, email: &str) -> Option<&User> {
        self.users
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email))
    }

    /// Display label for a user id: the email, or the raw id when the
    /// identity record is gone.
    pub fn author_label(&self, user_id: &str) -> String {
        self.get_user(user_id)
            .map(|u| u.email.clone())
            .unwrap_or_else(|| user_id.to_string())
    }

    pub fn add_user(&mut self, user: User) {
        self.users.push(user);
    }

    // ---- projects & membership ----

    pub fn get_project(&self, project_id: Uuid) -> Option<&Project> {
        self.projects.iter().find(|p| p.id == project_id)
    }

    pub fn get_project_mut(&mut self, project_id: Uuid) -> Option<&mut Project> {
        self.projects.iter_mut().find(|p| p.id == project_id)
    }

    pub fn add_project(&mut self, project: Project) {
        self.projects.push(project);
    }

    pub fn get_members_for_project(&self, project_id: Uuid) -> impl Iterator<Item = &ProjectMember> {
        self.members.iter().filter(move |m| m.project_id == project_id)
    }

    /// Existence check for a (project, user) membership row
    pub fn has_member(&self, project_id: Uuid, user_id: &str) -> bool {
        self.members
            .iter()
            .any(|m| m.project_id == project_id && m.user_id == user_id)
    }

    pub fn get_member(&self, member_id: Uuid) -> Option<&ProjectMember> {
        self.members.iter().find(|m| m.id == member_id)
    }

    pub fn add_member(&mut self, member: ProjectMember) {
        self.members.push(member);
    }

    pub fn remove_member(&mut self, member_id: Uuid) {
        self.members.retain(|m| m.id != member_id);
    }

    // ---- tasks ----

    pub fn get_task(&self, task_id: Uuid) -> Option<&TaskItem> {
        self.tasks.iter().find(|t| t.id == task_id)
    }

    pub fn get_task_mut(&mut self, task_id: Uuid) -> Option<&mut TaskItem> {
        self.tasks.iter_mut().find(|t| t.id == task_id)
    }

    pub fn get_tasks_for_project(&self, project_id: Uuid) -> impl Iterator<Item = &TaskItem> {
        self.tasks.iter().filter(move |t| t.project_id == project_id)
    }

    pub fn add_task(&mut self, task: TaskItem) {
        self.tasks.push(task);
    }

    pub fn remove_task(&mut self, task_id: Uuid) {
        self.tasks.retain(|t| t.id != task_id);
    }

    // ---- comments ----

    pub fn get_comment(&self, comment_id: Uuid) -> Option<&TaskComment> {
        self.comments.iter().find(|c| c.id == comment_id)
    }

    pub fn get_comment_mut(&mut self, comment_id: Uuid) -> Option<&mut TaskComment> {
        self.comments.iter_mut().find(|c| c.id == comment_id)
    }

    pub fn get_comments_for_task(&self, task_id: Uuid) -> impl Iterator<Item = &TaskComment> {
        self.comments.iter().filter(move |c| c.task_item_id == task_id)
    }

    /// Ordered scan of a task's comments, creation time ascending
    pub fn comments_for_task_sorted(&self, task_id: Uuid) -> Vec<&TaskComment> {
        let mut comments: Vec<_> = self.get_comments_for_task(task_id).collect();
        comments.sort_by_key(|c| c.created_at);
        comments
    }

    pub fn add_comment(&mut self, comment: TaskComment) {
        self.comments.push(comment);
    }

    /// Batch delete. `ordered_ids` must list children before their parents
    /// so a referential-integrity-enforcing store would accept the same order.
    pub fn remove_comments(&mut self, ordered_ids: &[Uuid]) {
        for id in ordered_ids {
            self.comments.retain(|c| c.id != *id);
        }
    }

    // ---- attachments ----

    pub fn get_attachment(&self, attachment_id: Uuid) -> Option<&TaskAttachment> {
        self.attachments.iter().find(|a| a.id == attachment_id)
    }

    /// Point lookup scoped to a task, for the download path where the caller
    /// names both ids
    pub fn get_attachment_for_task(
        &self,
        task_id: Uuid,
        attachment_id: Uuid,
    ) -> Option<&TaskAttachment> {
        self.attachments
            .iter()
            .find(|a| a.id == attachment_id && a.task_item_id == task_id)
    }

    pub fn get_attachments_for_task(&self, task_id: Uuid) -> impl Iterator<Item = &TaskAttachment> {
        self.attachments
            .iter()
            .filter(move |a| a.task_item_id == task_id)
    }

    pub fn add_attachment(&mut self, attachment: TaskAttachment) {
        self.attachments.push(attachment);
    }

    pub fn remove_attachment(&mut self, attachment_id: Uuid) {
        self.attachments.retain(|a| a.id != attachment_id);
    }
}
