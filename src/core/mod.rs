//! MTD Core Components
//!
//! Core infrastructure shared by the flows.

pub mod clock;
pub mod transport;

pub use clock::*;
pub use transport::*;
