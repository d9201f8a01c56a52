pub mod account;
pub mod common;
pub mod request;
pub mod review;
pub mod search;
pub mod user;
pub mod worker;

pub use account::*;
pub use common::*;
pub use request::*;
pub use review::*;
pub use search::*;
pub use user::*;
pub use worker::*;
