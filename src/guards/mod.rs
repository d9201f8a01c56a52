pub mod account;
pub mod auth;

pub use account::{UserGuard, WorkerGuard};
pub use auth::{AuthGuard, GuardFailure};
