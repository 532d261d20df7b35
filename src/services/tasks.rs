use jiff::Timestamp;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    auth::{self, Policy, Principal, Resource},
    files::FileStore,
    models::{
        store::Store,
        task::{TaskItem, TaskStatus},
    },
    storage::{Storage, StorageError},
};

#[derive(Debug, Error)]
pub enum CreateTaskError {
    #[error("Project not found")]
    ProjectNotFound,

    #[error("Not allowed")]
    NotAllowed,

    #[error("Task title must be at least 2 characters long")]
    TitleTooShort,

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

pub struct CreateTaskParameters {
    pub project_id: Uuid,
    pub title: String,
    pub description_markdown: Option<String>,
    pub status: TaskStatus,
}

pub fn create_task(
    store: &mut Store,
    storage: &impl Storage,
    principal: &Principal,
    parameters: CreateTaskParameters,
) -> Result<TaskItem, CreateTaskError> {
    let title = parameters.title.trim().to_string();
    if title.chars().count() < 2 {
        return Err(CreateTaskError::TitleTooShort);
    }

    let project = store
        .get_project(parameters.project_id)
        .cloned()
        .ok_or(CreateTaskError::ProjectNotFound)?;

    if !auth::authorize(
        store,
        principal,
        Policy::IsProjectMember,
        Resource::Project(&project),
    ) {
        return Err(CreateTaskError::NotAllowed);
    }

    // authorize() already rejected unauthenticated principals
    let author_id = principal.user_id().unwrap_or_default().to_string();

    let description_markdown = parameters
        .description_markdown
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty());

    let task = TaskItem {
        id: Uuid::new_v4(),
        project_id: project.id,
        title,
        description_markdown,
        status: parameters.status,
        author_id,
        created_at: Timestamp::now(),
    };

    store.add_task(task.clone());
    storage.save(store)?;

    Ok(task)
}

#[derive(Debug, Error)]
pub enum UpdateTaskError {
    #[error("Task not found")]
    NotFound,

    #[error("Not allowed")]
    NotAllowed,

    #[error("Task title must be at least 2 characters long")]
    TitleTooShort,

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

pub struct UpdateTaskParameters {
    pub task_id: Uuid,
    pub title: String,
    pub description_markdown: Option<String>,
}

/// Title/description edits are content edits: task author or project owner only
pub fn update_task(
    store: &mut Store,
    storage: &impl Storage,
    principal: &Principal,
    parameters: UpdateTaskParameters,
) -> Result<TaskItem, UpdateTaskError> {
    let title = parameters.title.trim().to_string();
    if title.chars().count() < 2 {
        return Err(UpdateTaskError::TitleTooShort);
    }

    let task = store
        .get_task(parameters.task_id)
        .cloned()
        .ok_or(UpdateTaskError::NotFound)?;

    if !auth::authorize(store, principal, Policy::CanModifyTask, Resource::Task(&task)) {
        return Err(UpdateTaskError::NotAllowed);
    }

    let description_markdown = parameters
        .description_markdown
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty());

    let mut updated_task = task;
    updated_task.title = title;
    updated_task.description_markdown = description_markdown;

    if let Some(task) = store.get_task_mut(updated_task.id) {
        *task = updated_task.clone();
    }
    storage.save(store)?;

    Ok(updated_task)
}

#[derive(Debug, Error)]
pub enum DeleteTaskError {
    #[error("Task not found")]
    NotFound,

    #[error("Not allowed")]
    NotAllowed,

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

pub struct DeleteTaskParameters {
    pub task_id: Uuid,
}

pub struct DeleteTaskResult {
    pub task: TaskItem,
    pub cascaded_comments_count: usize,
    pub cascaded_attachments_count: usize,
}

/// Deletes a task with its comments and attachment rows. Blob deletion runs
/// after the rows are persisted away and is best-effort.
pub fn delete_task(
    store: &mut Store,
    storage: &impl Storage,
    files: &impl FileStore,
    principal: &Principal,
    parameters: DeleteTaskParameters,
) -> Result<DeleteTaskResult, DeleteTaskError> {
    let task = store
        .get_task(parameters.task_id)
        .cloned()
        .ok_or(DeleteTaskError::NotFound)?;

    if !auth::authorize(store, principal, Policy::CanModifyTask, Resource::Task(&task)) {
        return Err(DeleteTaskError::NotAllowed);
    }

    let comment_ids: Vec<Uuid> = store.get_comments_for_task(task.id).map(|c| c.id).collect();
    let cascaded_comments_count = comment_ids.len();
    store.remove_comments(&comment_ids);

    let attachments: Vec<(Uuid, String)> = store
        .get_attachments_for_task(task.id)
        .map(|a| (a.id, a.stored_path.clone()))
        .collect();
    let cascaded_attachments_count = attachments.len();
    for (attachment_id, _) in &attachments {
        store.remove_attachment(*attachment_id);
    }

    store.remove_task(task.id);
    storage.save(store)?;

    for (_, stored_path) in attachments {
        if let Err(e) = files.delete(&stored_path) {
            tracing::warn!(path = %stored_path, error = %e, "failed to delete attachment blob during task cascade");
        }
    }

    Ok(DeleteTaskResult {
        task,
        cascaded_comments_count,
        cascaded_attachments_count,
    })
}

#[derive(Debug, Error)]
pub enum ChangeStatusError {
    #[error("Task not found")]
    NotFound,

    #[error("Not allowed")]
    NotAllowed,

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

pub struct ChangeStatusParameters {
    pub task_id: Uuid,
    pub status: TaskStatus,
}

/// Moving a card is a collaboration action, not a content edit, so the guard
/// is membership rather than task-modify. Any status is reachable from any
/// other; moving to the current status is an idempotent success that skips
/// the persist call.
pub fn change_status(
    store: &mut Store,
    storage: &impl Storage,
    principal: &Principal,
    parameters: ChangeStatusParameters,
) -> Result<TaskItem, ChangeStatusError> {
    let task = store
        .get_task(parameters.task_id)
        .cloned()
        .ok_or(ChangeStatusError::NotFound)?;

    if !auth::authorize(
        store,
        principal,
        Policy::IsProjectMember,
        Resource::Task(&task),
    ) {
        return Err(ChangeStatusError::NotAllowed);
    }

    if task.status == parameters.status {
        return Ok(task);
    }

    let mut updated_task = task;
    updated_task.status = parameters.status;

    if let Some(task) = store.get_task_mut(updated_task.id) {
        *task = updated_task.clone();
    }
    storage.save(store)?;

    Ok(updated_task)
}

/// One kanban card: the task plus its author's display label
pub struct BoardCard {
    pub task: TaskItem,
    pub author_label: String,
}

pub struct BoardColumn {
    pub status: TaskStatus,
    pub cards: Vec<BoardCard>,
}

pub struct Board {
    pub project_name: String,
    pub columns: Vec<BoardColumn>,
}

/// Assemble the board for a project: fixed column order, newest card first
/// in each column. Missing project and failed membership both yield `None`.
pub fn kanban_board(store: &Store, principal: &Principal, project_id: Uuid) -> Option<Board> {
    let project = store.get_project(project_id)?;

    if !auth::authorize(
        store,
        principal,
        Policy::IsProjectMember,
        Resource::Project(project),
    ) {
        return None;
    }

    let mut tasks: Vec<&TaskItem> = store.get_tasks_for_project(project_id).collect();
    tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let columns = TaskStatus::COLUMNS
        .into_iter()
        .map(|status| BoardColumn {
            status,
            cards: tasks
                .iter()
                .filter(|t| t.status == status)
                .map(|t| BoardCard {
                    task: (*t).clone(),
                    author_label: store.author_label(&t.author_id),
                })
                .collect(),
        })
        .collect();

    Some(Board {
        project_name: project.name.clone(),
        columns,
    })
}
