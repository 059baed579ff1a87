//! Executor tools over the working copy.
//!
//! Failures the model can recover from (missing files, failing commands,
//! nothing to commit) come back as tool-result text. `submit_work` is the
//! terminal tool: it carries the change-request title and summary and ends
//! the loop.

use crate::llm::ToolDefinition;
use crate::workspace::Workspace;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use serde_json::{json, Value};

/// Result of one tool execution. `done` is set only by `submit_work`.
#[derive(Debug, Clone, Default)]
pub struct ToolOutcome {
    pub content: String,
    pub done: bool,
    pub cr_title: String,
    pub cr_summary: String,
}

impl ToolOutcome {
    fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }
}

pub fn tool_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "list_files".to_string(),
            description: "List files in the repository, optionally scoped to a subdirectory. \
                          Use this to understand the project structure before making changes."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "subdir": {
                        "type": "string",
                        "description": "Subdirectory to list relative to repo root. Use '.' for the full repo."
                    }
                },
                "required": ["subdir"]
            }),
        },
        ToolDefinition {
            name: "read_file".to_string(),
            description: "Read the contents of a file in the repository.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Path to the file relative to the repo root. E.g. 'src/auth/handler.rs'"
                    }
                },
                "required": ["path"]
            }),
        },
        ToolDefinition {
            name: "write_file".to_string(),
            description: "Write or overwrite a file in the repository. Creates intermediate directories as needed."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Path to the file relative to the repo root."
                    },
                    "content": {
                        "type": "string",
                        "description": "Full file content to write."
                    }
                },
                "required": ["path", "content"]
            }),
        },
        ToolDefinition {
            name: "run_command".to_string(),
            description: "Run a shell command in the repository root. Use for building, testing, \
                          linting, and installing dependencies. Non-zero exit codes are returned as output, not errors."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "command": {
                        "type": "string",
                        "description": "Shell command to run. E.g. 'cargo test' or 'npm run lint'"
                    }
                },
                "required": ["command"]
            }),
        },
        ToolDefinition {
            name: "commit_changes".to_string(),
            description: "Stage all changes and create a git commit. Call this after a coherent \
                          set of changes is complete — not after every file write."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "message": {
                        "type": "string",
                        "description": "Commit message. Use the imperative mood. E.g. 'Add user authentication endpoint'"
                    }
                },
                "required": ["message"]
            }),
        },
        ToolDefinition {
            name: "submit_work".to_string(),
            description: "Push the branch and open a change request. Call this only when all \
                          work is complete and tests pass."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "title": {
                        "type": "string",
                        "description": "Change request title. Should reference the issue."
                    },
                    "summary": {
                        "type": "string",
                        "description": "Description of what was done and any relevant notes for the reviewer."
                    }
                },
                "required": ["title", "summary"]
            }),
        },
    ]
}

#[derive(Debug, Deserialize)]
struct ListFilesInput {
    subdir: String,
}

#[derive(Debug, Deserialize)]
struct ReadFileInput {
    path: String,
}

#[derive(Debug, Deserialize)]
struct WriteFileInput {
    path: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct RunCommandInput {
    command: String,
}

#[derive(Debug, Deserialize)]
struct CommitChangesInput {
    message: String,
}

#[derive(Debug, Deserialize)]
struct SubmitWorkInput {
    title: String,
    summary: String,
}

pub async fn execute_tool(name: &str, input: &Value, workspace: &Workspace) -> Result<ToolOutcome> {
    match name {
        "list_files" => {
            let input: ListFilesInput =
                serde_json::from_value(input.clone()).context("unmarshal list_files input")?;
            Ok(match workspace.list_files(&input.subdir) {
                Ok(listing) => ToolOutcome::text(listing),
                Err(err) => ToolOutcome::text(format!("error: {err}")),
            })
        }
        "read_file" => {
            let input: ReadFileInput =
                serde_json::from_value(input.clone()).context("unmarshal read_file input")?;
            Ok(match workspace.read_file(&input.path) {
                Ok(content) => ToolOutcome::text(content),
                Err(err) => ToolOutcome::text(format!("error: {err:#}")),
            })
        }
        "write_file" => {
            let input: WriteFileInput =
                serde_json::from_value(input.clone()).context("unmarshal write_file input")?;
            Ok(match workspace.write_file(&input.path, &input.content) {
                Ok(()) => ToolOutcome::text(format!("wrote {}", input.path)),
                Err(err) => ToolOutcome::text(format!("error: {err:#}")),
            })
        }
        "run_command" => {
            let input: RunCommandInput =
                serde_json::from_value(input.clone()).context("unmarshal run_command input")?;
            Ok(ToolOutcome::text(workspace.run_shell(&input.command).await))
        }
        "commit_changes" => {
            let input: CommitChangesInput =
                serde_json::from_value(input.clone()).context("unmarshal commit_changes input")?;
            if let Err(err) = workspace.stage_all().await {
                return Ok(ToolOutcome::text(format!("error staging: {err:#}")));
            }
            Ok(match workspace.commit(&input.message).await {
                Ok(true) => ToolOutcome::text(format!("committed: {}", input.message)),
                Ok(false) => ToolOutcome::text("nothing to commit — no changes detected"),
                Err(err) => ToolOutcome::text(format!("error committing: {err:#}")),
            })
        }
        "submit_work" => {
            let input: SubmitWorkInput =
                serde_json::from_value(input.clone()).context("unmarshal submit_work input")?;
            Ok(ToolOutcome {
                content: "work submitted".to_string(),
                done: true,
                cr_title: input.title,
                cr_summary: input.summary,
            })
        }
        _ => bail!("unknown tool: {name}"),
    }
}
