//! Sales Compensation Agent
//!
//! Routes a free-text sales compensation request to the right handler:
//! - Classifies the request (policy, commission, contest, ticket, clarify)
//! - Routes the label to a handler, or rejects unknown labels
//! - Answers policy questions grounded in retrieved passages
//! - Runs one clarification round with a ticket offer when the request is unclear
//!
//! TURN:
//! CLASSIFY → ROUTE → HANDLE (→ CLARIFY → RECLASSIFY → HANDLE?) → RESPOND

pub mod agent;
pub mod api;
pub mod audit;
pub mod clarifier;
pub mod classifier;
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod oracle;
pub mod router;

pub use error::Result;

// Re-export common types
pub use agent::Orchestrator;
pub use config::AgentConfig;
pub use models::*;
