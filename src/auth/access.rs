//! Access predicate layer: pure boolean checks over already-loaded entities.
//!
//! Predicates never fail and never touch I/O. A dangling reference (task
//! pointing at a removed project, attachment at a removed task) answers
//! `false`; absence of the resource itself is the caller's concern.

use uuid::Uuid;

use crate::auth::Resource;
use crate::models::{comment::TaskComment, store::Store, task::TaskItem};

/// Owner or listed member of the project
pub fn is_project_member(store: &Store, user_id: &str, project_id: Uuid) -> bool {
    match store.get_project(project_id) {
        Some(project) => project.owner_id == user_id || store.has_member(project_id, user_id),
        None => false,
    }
}

/// User id equals the project's owner id
pub fn is_project_owner(store: &Store, user_id: &str, project_id: Uuid) -> bool {
    match store.get_project(project_id) {
        Some(project) => project.owner_id == user_id,
        None => false,
    }
}

/// Task author, or owner of the task's project
pub fn can_modify_task(store: &Store, user_id: &str, task: &TaskItem) -> bool {
    task.author_id == user_id || is_project_owner(store, user_id, task.project_id)
}

/// User id equals the comment's author id
pub fn is_comment_author(user_id: &str, comment: &TaskComment) -> bool {
    comment.author_id == user_id
}

// Handler registry entries. Each one applies to exactly one resource type
// and resolves the lookup path specific to it.

pub(super) fn member_for_project(store: &Store, user_id: &str, resource: Resource<'_>) -> Option<bool> {
    match resource {
        Resource::Project(project) => Some(is_project_member(store, user_id, project.id)),
        _ => None,
    }
}

pub(super) fn member_for_task(store: &Store, user_id: &str, resource: Resource<'_>) -> Option<bool> {
    match resource {
        Resource::Task(task) => Some(is_project_member(store, user_id, task.project_id)),
        _ => None,
    }
}

pub(super) fn member_for_attachment(
    store: &Store,
    user_id: &str,
    resource: Resource<'_>,
) -> Option<bool> {
    match resource {
        Resource::Attachment(attachment) => Some(
            store
                .get_task(attachment.task_item_id)
                .is_some_and(|task| is_project_member(store, user_id, task.project_id)),
        ),
        _ => None,
    }
}

pub(super) fn owner_for_project(store: &Store, user_id: &str, resource: Resource<'_>) -> Option<bool> {
    match resource {
        Resource::Project(project) => Some(is_project_owner(store, user_id, project.id)),
        _ => None,
    }
}

pub(super) fn owner_for_task(store: &Store, user_id: &str, resource: Resource<'_>) -> Option<bool> {
    match resource {
        Resource::Task(task) => Some(is_project_owner(store, user_id, task.project_id)),
        _ => None,
    }
}

pub(super) fn modify_for_task(store: &Store, user_id: &str, resource: Resource<'_>) -> Option<bool> {
    match resource {
        Resource::Task(task) => Some(can_modify_task(store, user_id, task)),
        _ => None,
    }
}

pub(super) fn modify_for_attachment(
    store: &Store,
    user_id: &str,
    resource: Resource<'_>,
) -> Option<bool> {
    match resource {
        Resource::Attachment(attachment) => Some(
            store
                .get_task(attachment.task_item_id)
                .is_some_and(|task| can_modify_task(store, user_id, task)),
        ),
        _ => None,
    }
}

pub(super) fn author_for_comment(_store: &Store, user_id: &str, resource: Resource<'_>) -> Option<bool> {
    match resource {
        Resource::Comment(comment) => Some(is_comment_author(user_id, comment)),
        _ => None,
    }
}
