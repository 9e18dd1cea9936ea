//! MTD Flows
//!
//! The authorization-code flow against HMRC: endpoint calls, authorization,
//! code exchange and token refresh.

pub mod authorization;
pub mod engine;

pub use authorization::build_authorization_url;
pub use engine::{FlowRun, FlowState, MtdFlowEngine};
