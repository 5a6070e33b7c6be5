//! Application layer for gemchat.
//!
//! - [`SetupFlow`]: credential capture, restore and reset
//! - [`SessionController`]: the send pipeline for one user turn
//! - [`AppContext`]: explicit wiring of client, setup and session

pub mod app_context;
pub mod session_controller;
pub mod setup_flow;

#[cfg(test)]
mod test_support;

pub use app_context::AppContext;
pub use session_controller::{PendingInput, SendOutcome, SessionController, failure_content};
pub use setup_flow::{SetupFlow, SetupState};
