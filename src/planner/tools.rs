//! Planner tools: bind a repository, create issues, finish the session.
//!
//! Tool failures the model should react to (bad URL, no repo bound, tracker
//! rejection) are returned as result text, not errors; only malformed tool
//! input aborts the turn.

use super::session::{LinkedIssue, Session, Stage};
use crate::llm::ToolDefinition;
use crate::vcs::{labels, Factory, IssueInput};
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use serde_json::{json, Value};

pub fn tool_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "set_repo".to_string(),
            description: "Validates and stores the repository URL for this planning session. \
                          Call this as soon as the user provides a repo URL, before creating any issues."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "repo_url": {
                        "type": "string",
                        "description": "Full URL of the repository. E.g. https://github.com/myorg/myrepo or https://gitlab.mycompany.com/group/myrepo"
                    }
                },
                "required": ["repo_url"]
            }),
        },
        ToolDefinition {
            name: "create_issue".to_string(),
            description: "Creates an issue in the configured repository for a discrete unit of work. \
                          Requires set_repo to have been called first. Call once per issue after the user approves the breakdown."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "title": {
                        "type": "string",
                        "description": "Short, action-oriented issue title."
                    },
                    "description": {
                        "type": "string",
                        "description": "2-3 sentence description of what needs to be done and why."
                    },
                    "acceptance_criteria": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Testable acceptance criteria for this issue."
                    },
                    "labels": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Labels to apply. Always include 'agent:ready'."
                    }
                },
                "required": ["title", "description", "acceptance_criteria", "labels"]
            }),
        },
        ToolDefinition {
            name: "finish_planning".to_string(),
            description: "Marks the planning session as complete after all issues have been created."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "summary": {
                        "type": "string",
                        "description": "Brief summary of what was planned and how many issues were created."
                    }
                },
                "required": ["summary"]
            }),
        },
    ]
}

#[derive(Debug, Deserialize)]
struct SetRepoInput {
    repo_url: String,
}

#[derive(Debug, Deserialize)]
struct CreateIssueInput {
    title: String,
    description: String,
    acceptance_criteria: Vec<String>,
    #[serde(default)]
    labels: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct FinishPlanningInput {
    #[allow(dead_code)]
    summary: String,
}

pub async fn execute_tool(
    name: &str,
    input: &Value,
    session: &mut Session,
    factory: &Factory,
) -> Result<String> {
    match name {
        "set_repo" => exec_set_repo(input, session, factory),
        "create_issue" => exec_create_issue(input, session).await,
        "finish_planning" => exec_finish_planning(input, session),
        _ => bail!("unknown tool: {name}"),
    }
}

fn exec_set_repo(input: &Value, session: &mut Session, factory: &Factory) -> Result<String> {
    let input: SetRepoInput =
        serde_json::from_value(input.clone()).context("unmarshal set_repo input")?;

    match factory.provider_for(&input.repo_url) {
        Ok((provider, info)) => {
            let reply = format!(
                "Repo configured: {} ({}) — owner: {:?}, repo: {:?}",
                info.raw_url, info.platform, info.owner, info.repo
            );
            session.repo = Some(info);
            session.provider = Some(provider);
            Ok(reply)
        }
        // Soft error so the model can tell the user what went wrong.
        Err(err) => Ok(format!("error: {err}")),
    }
}

async fn exec_create_issue(input: &Value, session: &mut Session) -> Result<String> {
    let Some(provider) = session.provider.clone() else {
        return Ok(
            "error: no repository configured — ask the user for a repo URL first".to_string(),
        );
    };

    let mut input: CreateIssueInput =
        serde_json::from_value(input.clone()).context("unmarshal create_issue input")?;
    if !input.labels.iter().any(|l| l == labels::READY) {
        input.labels.push(labels::READY.to_string());
    }

    let created = provider
        .create_issue(IssueInput {
            title: input.title,
            body: build_issue_body(&input.description, &input.acceptance_criteria),
            labels: input.labels,
        })
        .await;

    match created {
        Ok(issue) => {
            session.issues.push(LinkedIssue {
                number: issue.number,
                title: issue.title.clone(),
                url: issue.url.clone(),
            });
            Ok(format!(
                "Created issue #{}: {}\n{}",
                issue.number, issue.title, issue.url
            ))
        }
        Err(err) => Ok(format!("error creating issue: {err}")),
    }
}

fn exec_finish_planning(input: &Value, session: &mut Session) -> Result<String> {
    let _input: FinishPlanningInput =
        serde_json::from_value(input.clone()).context("unmarshal finish_planning input")?;

    if session.stage == Stage::Done {
        return Ok("Planning session is already complete.".to_string());
    }
    session.stage = Stage::Done;
    Ok("Planning session marked as complete.".to_string())
}

/// Issue body read later by the executor: a description section and an
/// acceptance-criteria checklist.
pub fn build_issue_body(description: &str, acceptance_criteria: &[String]) -> String {
    let mut body = format!("## Description\n\n{description}\n\n## Acceptance Criteria\n");
    for criterion in acceptance_criteria {
        body.push_str(&format!("- [ ] {criterion}\n"));
    }
    body.push_str("\n---\n*Created by the Planner Agent*");
    body
}
