pub mod attachments;
pub mod comments;
pub mod projects;
pub mod tasks;
pub mod users;
