//! Shared contracts for the Waypoint router
//!
//! Conversation types and the two external collaborators the router
//! drives: an embedder and an agent executor.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod agent;
pub mod conversation;
pub mod embed;
pub mod error;

pub use agent::{DISCOVER_TOOLS, AgentError, AgentExecutor, AgentOutcome, AgentRequest, DiscoveryRequest, ToolInvocation};
pub use conversation::{ConversationTurn, Role};
pub use embed::{EmbedError, Embedder};
pub use error::UserFacingError;
