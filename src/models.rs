pub mod attachment;
pub mod comment;
pub mod project;
pub mod store;
pub mod task;
pub mod user;
