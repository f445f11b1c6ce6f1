pub mod auth;
pub mod client;
pub mod error;
pub mod realtime;
pub mod rest;

pub use client::BackendClient;
pub use error::Error;
