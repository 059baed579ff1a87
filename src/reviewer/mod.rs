//! Reviewer agent
//!
//! Adjudicates one change request against its originating issue with a
//! single structured completion, posts exactly one review per webhook
//! delivery, and moves the workflow forward through labels: `agent:revision`
//! sends the issue back to the executor, `agent:approved` plus an
//! out-of-band notification hands it to a human.

mod agent;
mod notifier;
mod webhook;
mod worker;

pub use agent::Reviewer;
pub use notifier::{CrReadyMessage, Notifier, SlackNotifier};
pub use webhook::WebhookServer;
pub use worker::Worker;
