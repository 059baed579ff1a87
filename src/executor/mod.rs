//! Executor agent
//!
//! Turns one tracker issue into a change request: clone the repository into a
//! temporary working copy, let the model edit and test through tools, push
//! the branch, open the change request, and label it for review.

mod agent;
mod tools;
mod webhook;
mod worker;

pub use agent::{ExecutionResult, Executor};
pub use tools::{execute_tool, tool_definitions, ToolOutcome};
pub use webhook::WebhookServer;
pub use worker::{build_cr_body, Worker};
