pub mod accounts;
pub mod blob;
pub mod cascade;
pub mod geocoder;
pub mod jwt;
pub mod requests;
pub mod reviews;
pub mod search;
pub mod skills;

pub use accounts::AccountService;
pub use cascade::CascadeService;
pub use jwt::JwtService;
pub use requests::RequestService;
pub use reviews::ReviewService;
pub use search::SearchService;
pub use skills::SkillService;
