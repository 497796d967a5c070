pub mod guard;
pub mod handlers;
