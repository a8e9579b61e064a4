pub mod health_service;
pub mod lifecycle_service;
pub mod note_service;
pub mod note_store;
pub mod notification;
