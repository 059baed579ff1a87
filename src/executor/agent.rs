//! The executor's agentic loop.

use super::tools::{execute_tool, tool_definitions, ToolOutcome};
use crate::llm::{ChatMessage, CompletionClient, ToolResultBlock};
use crate::vcs::{Issue, Provider};
use crate::workspace::{branch_name, Workspace};
use anyhow::{bail, Context, Result};
use std::sync::Arc;

const MAX_ITERATIONS: usize = 50;

#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub branch: String,
    pub title: String,
    pub summary: String,
    pub issue_url: String,
}

pub struct Executor {
    llm: Arc<dyn CompletionClient>,
}

impl Executor {
    pub fn new(llm: Arc<dyn CompletionClient>) -> Self {
        Self { llm }
    }

    /// Run the full job for one issue: clone, branch, loop, push. The
    /// working copy is dropped (and its directory removed) on every exit
    /// path, success or failure.
    pub async fn run(
        &self,
        issue: &Issue,
        provider: &dyn Provider,
        token: &str,
    ) -> Result<ExecutionResult> {
        let workspace = Workspace::clone(provider.repo_url(), token)
            .await
            .context("clone")?;

        let branch = branch_name(issue.number, &issue.title);
        workspace
            .create_branch(&branch)
            .await
            .context("create branch")?;

        tracing::info!(issue = issue.number, branch = %branch, "executor started");

        let outcome = self.run_loop(&workspace, issue).await?;

        workspace.push().await.context("push")?;

        Ok(ExecutionResult {
            branch,
            title: outcome.cr_title,
            summary: outcome.cr_summary,
            issue_url: issue.url.clone(),
        })
    }

    async fn run_loop(&self, workspace: &Workspace, issue: &Issue) -> Result<ToolOutcome> {
        let mut messages = vec![ChatMessage::user(initial_prompt(issue))];
        let definitions = tool_definitions();

        for iteration in 0..MAX_ITERATIONS {
            let response = self
                .llm
                .complete_with_tools(SYSTEM_PROMPT, &messages, &definitions)
                .await
                .with_context(|| format!("completion (iteration {iteration})"))?;

            let calls = response.tool_calls();
            if calls.is_empty() {
                bail!(
                    "executor stopped without submit_work: {}",
                    response.text()
                );
            }

            let mut results = Vec::with_capacity(calls.len());
            let mut finished: Option<ToolOutcome> = None;

            for call in &calls {
                let outcome = execute_tool(&call.name, &call.input, workspace)
                    .await
                    .with_context(|| format!("execute tool {:?}", call.name))?;

                tracing::info!(
                    tool = %call.name,
                    iteration,
                    preview = %preview(&outcome.content, 120),
                    "tool executed"
                );

                results.push(ToolResultBlock {
                    tool_use_id: call.id.clone(),
                    content: outcome.content.clone(),
                });
                if outcome.done {
                    finished = Some(outcome);
                }
            }

            messages.push(ChatMessage::assistant_blocks(response.content));
            messages.push(ChatMessage::tool_results(results));

            if let Some(outcome) = finished {
                tracing::info!(
                    issue = issue.number,
                    iterations = iteration + 1,
                    "executor completed"
                );
                return Ok(outcome);
            }
        }

        bail!("executor exceeded {MAX_ITERATIONS} iterations without completing")
    }
}

const SYSTEM_PROMPT: &str = "You are an expert software engineer working autonomously on a code repository.\n\
You have been assigned a tracker issue to complete.\n\
\n\
Your workflow:\n\
1. Use list_files to understand the project structure\n\
2. Use read_file to read relevant existing code\n\
3. Plan your changes before writing anything\n\
4. Use write_file to implement changes\n\
5. Use run_command to run tests, linters, and build checks\n\
6. Fix any issues found by tests or linters\n\
7. Use commit_changes to commit logical groups of changes\n\
8. Once all tests pass and the work is complete, call submit_work\n\
\n\
Rules:\n\
- Never commit broken or untested code\n\
- Make the smallest change that satisfies the acceptance criteria\n\
- Follow existing code style and conventions — read existing files first\n\
- If you encounter something ambiguous in the requirements, make a reasonable decision and note it in the summary\n\
- Do not modify files unrelated to the issue\n\
- Always run tests before submitting";

fn initial_prompt(issue: &Issue) -> String {
    format!(
        "Please complete the following issue.\n\
         \n\
         Issue #{}: {}\n\
         URL: {}\n\
         \n\
         Issue body:\n\
         ---\n\
         {}\n\
         ---\n\
         \n\
         Start by listing the repository structure so you understand the codebase, \
         then plan your approach before making any changes.\n\
         When you are done and all tests pass, call submit_work.",
        issue.number, issue.title, issue.url, issue.body
    )
}

fn preview(s: &str, limit: usize) -> String {
    let flat = s.replace('\n', " ");
    if flat.chars().count() > limit {
        let cut: String = flat.chars().take(limit).collect();
        format!("{cut}…")
    } else {
        flat
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_flattens_and_bounds() {
        assert_eq!(preview("one\ntwo", 120), "one two");
        let long = "x".repeat(200);
        let p = preview(&long, 120);
        assert_eq!(p.chars().count(), 121);
        assert!(p.ends_with('…'));
    }

    #[test]
    fn initial_prompt_renders_full_issue() {
        let issue = Issue {
            number: 7,
            title: "Add /healthz".into(),
            body: "## Description\n\nExpose a liveness endpoint.".into(),
            url: "https://github.com/org/repo/issues/7".into(),
            labels: vec![],
        };
        let prompt = initial_prompt(&issue);
        assert!(prompt.contains("Issue #7: Add /healthz"));
        assert!(prompt.contains("Expose a liveness endpoint."));
        assert!(prompt.contains("call submit_work"));
    }
}
