pub mod assignment;
pub mod auth;
pub mod department;
pub mod permission;
pub mod role;
pub mod user;
