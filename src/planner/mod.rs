//! Planner agent
//!
//! A stage-gated conversational assistant living in chat threads. Each thread
//! is a session that moves from brainstorming through a PRD and acceptance
//! criteria to a set of tracker issues, created through tools. Stage
//! transitions are driven by prompt guidance; the only mechanical transition
//! is `finish_planning` → done.

mod agent;
mod session;
mod tools;

pub use agent::Planner;
pub use session::{LinkedIssue, Session, SessionStore, Stage};
pub use tools::{build_issue_body, execute_tool, tool_definitions};
