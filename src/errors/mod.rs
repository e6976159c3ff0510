//! Centralized error handling for the signage agent
//!
//! This module provides a hierarchical error system that unifies error
//! types across the agent's layers and keeps the failure taxonomy of the
//! workers explicit.
//!
//! # Error Categories
//!
//! - **Api Errors**: campaign fetch and media download failures
//! - **Player Errors**: child process spawn and IPC channel failures
//! - **State Errors**: persisted document read/write failures
//!
//! # Usage
//!
//! ```rust
//! use signage_agent::errors::{AgentError, AgentResult};
//!
//! async fn example_function() -> AgentResult<String> {
//!     // Function can return any error type that converts to AgentError
//!     Ok("success".to_string())
//! }
//! ```

pub mod types;

pub use types::*;

/// Convenience type alias for Results using AgentError
pub type AgentResult<T> = Result<T, AgentError>;

/// Convenience type alias for Api Results
pub type ApiResult<T> = Result<T, ApiError>;

/// Convenience type alias for State Results
pub type StateResult<T> = Result<T, StateError>;
