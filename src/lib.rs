//! autocrew - a label-driven multi-agent development workflow
//!
//! Three cooperating services move work through an issue tracker using labels
//! as the only coordination primitive: a Slack-facing planner turns a
//! conversation into well-formed issues, an executor turns a labeled issue
//! into a change request, and a reviewer adjudicates the change request
//! against the issue it closes.

pub mod chat;
pub mod config;
pub mod executor;
pub mod llm;
pub mod planner;
pub mod reviewer;
pub mod vcs;
pub mod webhook;
pub mod workspace;
