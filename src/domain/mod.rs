pub mod auth;
pub mod clock;
pub mod note;
pub mod projection;
