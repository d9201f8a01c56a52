pub mod auth;
pub mod file_upload;
pub mod health;
pub mod request;
pub mod review;
pub mod search;
pub mod skills;
pub mod user;
pub mod worker;
