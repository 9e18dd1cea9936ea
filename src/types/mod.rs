//! MTD Types
//!
//! Data model for the HMRC connection flows.

pub mod callback;
pub mod config;
pub mod endpoint;
pub mod outcome;
pub mod token;
pub mod tracker;

pub use callback::*;
pub use config::*;
pub use endpoint::*;
pub use outcome::*;
pub use token::*;
pub use tracker::*;
