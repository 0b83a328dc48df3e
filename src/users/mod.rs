// src/users/mod.rs
pub mod handlers;
pub mod routes;

pub use routes::users_routes;
