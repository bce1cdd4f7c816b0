//! CardGenius Advisor
//!
//! A conversational spending profiler for credit card recommendations:
//! - Extracts per-category spend from free-text chat turns
//! - Merges each turn into a running spending record
//! - Decides when enough is known to ask for recommendations
//! - Forwards the finalized record to the recommendation service
//!
//! TURN:
//! MESSAGE → CACHE? → EXTRACT → MERGE → READY? → RECOMMEND → RESPOND

pub mod agent;
pub mod api;
pub mod cache;
pub mod completion;
pub mod config;
pub mod conversation;
pub mod error;
pub mod extraction;
pub mod gateway;
pub mod models;
pub mod readiness;
pub mod spending;

pub use error::{AdvisorError, Result};

// Re-export common types
pub use agent::CardAgent;
pub use config::AppConfig;
pub use conversation::{ConversationTurn, Role};
pub use models::*;
pub use spending::{SpendingCategory, SpendingRecord};
