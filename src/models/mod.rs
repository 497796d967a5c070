pub mod access_token;
pub mod auth_code;
pub mod client;
pub mod user;
