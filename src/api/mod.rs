pub mod auth;
pub mod rest;

pub use rest::router;
