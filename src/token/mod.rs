//! Token Management
//!
//! Storage of per-API OAuth credentials.

pub mod store;

pub use store::{InMemoryTokenStore, JsonFileTokenStore, TokenStore};

#[cfg(test)]
pub use store::MockTokenStore;
