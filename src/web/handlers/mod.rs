pub mod apps;
pub mod authorize;
pub mod revoke;
pub mod token;
pub mod userinfo;
