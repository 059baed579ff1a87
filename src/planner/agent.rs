//! The planner's conversational loop.

use super::session::{Session, SessionStore, Stage};
use super::tools::{execute_tool, tool_definitions};
use crate::chat::{IncomingMessage, MessageHandler};
use crate::llm::{ChatMessage, CompletionClient, ToolResultBlock};
use crate::vcs::Factory;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::sync::Arc;

const MAX_ITERATIONS: usize = 10;

pub struct Planner {
    sessions: Arc<SessionStore>,
    llm: Arc<dyn CompletionClient>,
    factory: Arc<Factory>,
}

impl Planner {
    pub fn new(
        sessions: Arc<SessionStore>,
        llm: Arc<dyn CompletionClient>,
        factory: Arc<Factory>,
    ) -> Self {
        Self {
            sessions,
            llm,
            factory,
        }
    }

    /// One conversational turn: tool-use rounds run on a working copy of the
    /// history; the session itself records the user message and the final
    /// assistant reply.
    async fn run_loop(&self, session: &mut Session) -> Result<String> {
        let mut messages = session.messages.clone();

        for iteration in 0..MAX_ITERATIONS {
            let response = self
                .llm
                .complete_with_tools(&system_prompt(session), &messages, &tool_definitions())
                .await
                .with_context(|| format!("completion (iteration {iteration})"))?;

            let calls = response.tool_calls();
            if calls.is_empty() {
                return Ok(response.text());
            }

            tracing::info!(count = calls.len(), iteration, "executing planner tools");

            let mut results = Vec::with_capacity(calls.len());
            for call in &calls {
                let content = execute_tool(&call.name, &call.input, session, &self.factory)
                    .await
                    .with_context(|| format!("execute tool {:?}", call.name))?;
                tracing::info!(tool = %call.name, result = %content, "tool executed");
                results.push(ToolResultBlock {
                    tool_use_id: call.id.clone(),
                    content,
                });
            }

            messages.push(ChatMessage::assistant_blocks(response.content));
            messages.push(ChatMessage::tool_results(results));
        }

        bail!("planner tool loop exceeded {MAX_ITERATIONS} iterations")
    }
}

#[async_trait]
impl MessageHandler for Planner {
    async fn handle(&self, msg: IncomingMessage) -> Result<String> {
        let session = self
            .sessions
            .get_or_create(&msg.thread_id, &msg.channel_id)
            .await;
        let mut session = session.lock().await;

        session.append(ChatMessage::user(msg.text));

        let reply = self.run_loop(&mut session).await?;

        session.append(ChatMessage::assistant_text(reply.clone()));
        Ok(reply)
    }
}

fn system_prompt(session: &Session) -> String {
    let mut prompt = String::from(
        "You are a technical project planning assistant embedded in Slack.\n\
         Your job is to help the user plan software projects and features by working through:\n\
         1. Understanding the problem and goals (brainstorm)\n\
         2. Writing a clear Product Requirements Document (PRD)\n\
         3. Defining acceptance criteria\n\
         4. Breaking the work into discrete tracker issues\n\
         \n\
         Guidelines:\n\
         - Ask clarifying questions before writing any documents.\n\
         - Be concise in Slack — use bullet points, avoid walls of text.\n\
         - When writing PRDs or acceptance criteria, be specific and testable.\n\
         - Only move to the next stage when the user confirms they're happy.\n\
         - When creating issues, make each one small enough for a single engineer to complete in a day or two.\n\
         - Always include the 'agent:ready' label when creating issues.\n",
    );

    prompt.push_str(match session.stage {
        Stage::Brainstorm => {
            "\nCurrent stage: BRAINSTORM\n\
             Help the user articulate what they're building and why. Ask about:\n\
             - The problem being solved\n\
             - Who the users are\n\
             - What success looks like\n\
             - Any known constraints or dependencies\n\
             When you have enough context, suggest moving to writing the PRD."
        }
        Stage::Prd => {
            "\nCurrent stage: PRD\n\
             Write a structured PRD with these sections:\n\
             - Overview\n\
             - Problem Statement\n\
             - Goals & Non-goals\n\
             - User Stories\n\
             - Technical Approach (high level)\n\
             - Open Questions\n\
             Present it in full, then ask the user for feedback."
        }
        Stage::Criteria => {
            "\nCurrent stage: ACCEPTANCE CRITERIA\n\
             Based on the PRD, write clear, testable acceptance criteria.\n\
             Format each as: \"Given [context], when [action], then [outcome]\".\n\
             Group them by feature area if there are many."
        }
        Stage::Issues => {
            "\nCurrent stage: ISSUE BREAKDOWN\n\
             Break the work into tracker issues. For each issue:\n\
             - Present the full list to the user first and ask for approval.\n\
             - Only call create_issue AFTER the user says they're happy with the breakdown.\n\
             - Call create_issue once per issue, not in bulk.\n\
             - Call finish_planning after all issues are created."
        }
        Stage::Done => {
            "\nCurrent stage: DONE\n\
             All issues have been created. Help the user review or answer questions."
        }
    });

    if !session.prd_draft.is_empty() {
        prompt.push_str("\n\nCurrent PRD draft:\n");
        prompt.push_str(&session.prd_draft);
    }

    if !session.issues.is_empty() {
        prompt.push_str("\n\nIssues created so far:");
        for issue in &session.issues {
            prompt.push_str(&format!(
                "\n- #{} {} ({})",
                issue.number, issue.title, issue.url
            ));
        }
    }

    prompt
}
