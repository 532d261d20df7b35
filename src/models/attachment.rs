use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Serialize, Deserialize, Default, Clone)]
pub struct TaskAttachment {
    /// UUID to identify the attachment
    pub id: Uuid,
    /// The task this attachment belongs to
    pub task_item_id: Uuid,
    /// Original file name, as uploaded
    pub file_name: String,
    /// Relative key into the file store. The bytes themselves live there
    pub stored_path: String,
    /// Size of the stored file
    pub size_bytes: u64,
    /// MIME type recorded at upload time
    pub content_type: String,
    /// User id of the uploader
    pub uploader_id: String,
    /// When the file was uploaded
    pub uploaded_at: Timestamp,
}
