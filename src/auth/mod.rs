// src/auth/mod.rs
pub mod extractors;
pub mod handlers;
pub mod jwt;
pub mod models;
pub mod routes;

#[cfg(test)]
mod tests;

pub use routes::auth_routes;
