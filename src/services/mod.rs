// Services module - OAuth, database and cache services

pub mod cache;
pub mod db;
pub mod oauth;

pub use cache::CacheService;
pub use db::DatabaseService;
pub use oauth::OAuthService;
