use std::io::Read;
use std::path::Path;

use jiff::Timestamp;
use slug::slugify;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    auth::{self, Policy, Principal, Resource},
    files::{FileStore, FileStoreError, UploadLimits},
    models::{attachment::TaskAttachment, store::Store},
    storage::{Storage, StorageError},
};

#[derive(Debug, Error)]
pub enum AddAttachmentError {
    #[error("Task not found")]
    TaskNotFound,

    #[error("Not allowed")]
    NotAllowed,

    #[error("File is too large ({size_bytes} bytes, limit {limit_bytes})")]
    FileTooLarge { size_bytes: u64, limit_bytes: u64 },

    #[error("Content type '{0}' is not allowed")]
    ContentTypeNotAllowed(String),

    #[error("File store error: {0}")]
    Files(#[from] FileStoreError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

pub struct AddAttachmentParameters<'a> {
    pub task_id: Uuid,
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub content: &'a mut dyn Read,
}

/// Upload is a two-step saga against two resources with no shared
/// transaction: save the blob first, then insert the row and persist. If the
/// persist fails the orphaned blob is best-effort deleted; the inverse
/// ordering would leave rows pointing at files that were never written.
pub fn add_attachment(
    store: &mut Store,
    storage: &impl Storage,
    files: &impl FileStore,
    limits: &UploadLimits,
    principal: &Principal,
    parameters: AddAttachmentParameters<'_>,
) -> Result<TaskAttachment, AddAttachmentError> {
    if parameters.size_bytes > limits.max_file_size_bytes {
        return Err(AddAttachmentError::FileTooLarge {
            size_bytes: parameters.size_bytes,
            limit_bytes: limits.max_file_size_bytes,
        });
    }
    if !limits.allows_content_type(&parameters.content_type) {
        return Err(AddAttachmentError::ContentTypeNotAllowed(
            parameters.content_type,
        ));
    }

    let task = store
        .get_task(parameters.task_id)
        .cloned()
        .ok_or(AddAttachmentError::TaskNotFound)?;

    if !auth::authorize(store, principal, Policy::CanModifyTask, Resource::Task(&task)) {
        return Err(AddAttachmentError::NotAllowed);
    }

    let attachment_id = Uuid::new_v4();
    let stored_path = format!(
        "uploads/{}/{}/{}_{}",
        task.project_id,
        task.id,
        attachment_id,
        sanitize_file_name(&parameters.file_name)
    );

    files.save(parameters.content, &stored_path)?;

    let attachment = TaskAttachment {
        id: attachment_id,
        task_item_id: task.id,
        file_name: parameters.file_name,
        stored_path: stored_path.clone(),
        size_bytes: parameters.size_bytes,
        content_type: parameters.content_type,
        uploader_id: principal.user_id().unwrap_or_default().to_string(),
        uploaded_at: Timestamp::now(),
    };

    store.add_attachment(attachment.clone());
    if let Err(e) = storage.save(store) {
        // Roll the saga back: drop the row again and reclaim the blob
        store.remove_attachment(attachment.id);
        if let Err(cleanup) = files.delete(&stored_path) {
            tracing::error!(path = %stored_path, error = %cleanup, "orphaned attachment blob left behind after failed persist");
        }
        return Err(e.into());
    }

    Ok(attachment)
}

/// Stored file names keep their extension but the stem is slugified, so the
/// path key never carries shell- or traversal-hostile characters.
fn sanitize_file_name(file_name: &str) -> String {
    let path = Path::new(file_name);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let slug = slugify(&stem);
    let slug = if slug.is_empty() {
        String::from("file")
    } else {
        slug
    };

    match path.extension() {
        Some(ext) => format!("{}.{}", slug, slugify(&ext.to_string_lossy())),
        None => slug,
    }
}

#[derive(Debug, Error)]
pub enum OpenAttachmentError {
    #[error("Attachment not found")]
    NotFound,

    #[error("Not allowed")]
    NotAllowed,

    #[error("File store error: {0}")]
    Files(#[from] FileStoreError),
}

/// How the presentation layer should serve the bytes
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Disposition {
    Inline,
    Download,
}

pub struct AttachmentDownload {
    pub content: Box<dyn Read>,
    pub file_name: String,
    pub content_type: String,
    pub disposition: Disposition,
}

/// Download contract: the attachment must belong to the named task, the
/// requester must be a project member, and the stored content type and file
/// name travel with the stream.
pub fn open_attachment(
    store: &Store,
    files: &impl FileStore,
    principal: &Principal,
    task_id: Uuid,
    attachment_id: Uuid,
    inline: bool,
) -> Result<AttachmentDownload, OpenAttachmentError> {
    let attachment = store
        .get_attachment_for_task(task_id, attachment_id)
        .ok_or(OpenAttachmentError::NotFound)?;

    if !auth::authorize(
        store,
        principal,
        Policy::IsProjectMember,
        Resource::Attachment(attachment),
    ) {
        return Err(OpenAttachmentError::NotAllowed);
    }

    let content = files.open_read(&attachment.stored_path)?;

    Ok(AttachmentDownload {
        content,
        file_name: attachment.file_name.clone(),
        content_type: attachment.content_type.clone(),
        disposition: if inline {
            Disposition::Inline
        } else {
            Disposition::Download
        },
    })
}

#[derive(Debug, Error)]
pub enum DeleteAttachmentError {
    #[error("Attachment not found")]
    NotFound,

    #[error("Not allowed")]
    NotAllowed,

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

pub struct DeleteAttachmentParameters {
    pub task_id: Uuid,
    pub attachment_id: Uuid,
}

/// Row first, blob second: once the row is durably gone an orphaned blob is
/// the only possible inconsistency, and that side is recoverable by sweeping
/// the uploads tree.
pub fn delete_attachment(
    store: &mut Store,
    storage: &impl Storage,
    files: &impl FileStore,
    principal: &Principal,
    parameters: DeleteAttachmentParameters,
) -> Result<TaskAttachment, DeleteAttachmentError> {
    let attachment = store
        .get_attachment_for_task(parameters.task_id, parameters.attachment_id)
        .cloned()
        .ok_or(DeleteAttachmentError::NotFound)?;

    if !auth::authorize(
        store,
        principal,
        Policy::CanModifyTask,
        Resource::Attachment(&attachment),
    ) {
        return Err(DeleteAttachmentError::NotAllowed);
    }

    store.remove_attachment(attachment.id);
    storage.save(store)?;

    if let Err(e) = files.delete(&attachment.stored_path) {
        tracing::warn!(path = %attachment.stored_path, error = %e, "failed to delete attachment blob");
    }

    Ok(attachment)
}
