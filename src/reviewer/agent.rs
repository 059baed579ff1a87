//! Single-shot structured review.

use crate::llm::{ChatMessage, CompletionClient, ToolDefinition};
use crate::vcs::{ChangeRequest, Issue, Review, ReviewComment, Side, Verdict};
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

const DESCRIPTION_LIMIT: usize = 1000;
const DIFF_LIMIT: usize = 20000;

pub struct Reviewer {
    llm: Arc<dyn CompletionClient>,
}

impl Reviewer {
    pub fn new(llm: Arc<dyn CompletionClient>) -> Self {
        Self { llm }
    }

    pub async fn review(&self, cr: &ChangeRequest, issue: &Issue) -> Result<Review> {
        let messages = vec![ChatMessage::user(build_review_prompt(cr, issue))];

        let response = self
            .llm
            .complete_with_tools(SYSTEM_PROMPT, &messages, &[submit_review_tool()])
            .await
            .context("review completion")?;

        for call in response.tool_calls() {
            if call.name == "submit_review" {
                return parse_review(&call.input);
            }
        }

        // Graceful degradation: a plain-text reply becomes a comment.
        tracing::warn!("reviewer responded with text instead of submit_review — using as comment");
        Ok(Review {
            verdict: Verdict::Comment,
            summary: response.text(),
            comments: Vec::new(),
        })
    }
}

fn submit_review_tool() -> ToolDefinition {
    ToolDefinition {
        name: "submit_review".to_string(),
        description: "Submit the completed code review. Always call this — never respond with plain text."
            .to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "verdict": {
                    "type": "string",
                    "enum": ["approve", "request_changes", "comment"],
                    "description": "approve if all acceptance criteria are met and the code is correct. \
                                    request_changes if there are issues that must be fixed. \
                                    comment for minor observations that don't block merging."
                },
                "summary": {
                    "type": "string",
                    "description": "Overall review summary. Be specific about what's good and what needs fixing."
                },
                "comments": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "path": {
                                "type": "string",
                                "description": "File path relative to repo root."
                            },
                            "line": {
                                "type": "integer",
                                "description": "Line number in the diff to attach this comment to."
                            },
                            "body": {
                                "type": "string",
                                "description": "Comment text. Be specific and actionable."
                            }
                        },
                        "required": ["path", "line", "body"]
                    },
                    "description": "Inline comments on specific lines. Only include comments for genuine issues, not style nits."
                }
            },
            "required": ["verdict", "summary", "comments"]
        }),
    }
}

#[derive(Debug, Deserialize)]
struct SubmitReviewInput {
    verdict: String,
    summary: String,
    #[serde(default)]
    comments: Vec<SubmitReviewComment>,
}

#[derive(Debug, Deserialize)]
struct SubmitReviewComment {
    path: String,
    line: u64,
    body: String,
}

fn parse_review(input: &Value) -> Result<Review> {
    let input: SubmitReviewInput =
        serde_json::from_value(input.clone()).context("unmarshal review")?;

    let verdict = match input.verdict.as_str() {
        "approve" => Verdict::Approve,
        "request_changes" => Verdict::RequestChanges,
        _ => Verdict::Comment,
    };

    Ok(Review {
        verdict,
        summary: input.summary,
        comments: input
            .comments
            .into_iter()
            .map(|c| ReviewComment {
                path: c.path,
                line: c.line,
                body: c.body,
                side: Side::New,
            })
            .collect(),
    })
}

const SYSTEM_PROMPT: &str = "You are an expert code reviewer. You will be given a change-request diff and the\n\
original issue it addresses. Your job is to review the changes and decide whether they\n\
should be approved, require changes, or need a comment.\n\
\n\
Review criteria — check all of these:\n\
- Does the implementation satisfy every acceptance criterion in the issue?\n\
- Are there any bugs, logic errors, or edge cases not handled?\n\
- Does the code follow the patterns and conventions visible in the surrounding codebase?\n\
- Are there missing tests or inadequate test coverage for the changes?\n\
- Is error handling present and appropriate?\n\
- Are there any security concerns (injection, auth bypass, data exposure)?\n\
\n\
Be direct and specific. When requesting changes, tell the executor exactly what to fix.\n\
Do not request stylistic changes that don't affect correctness or maintainability.\n\
Always respond by calling submit_review — never with plain text.";

fn build_review_prompt(cr: &ChangeRequest, issue: &Issue) -> String {
    format!(
        "Please review the following change request.\n\
         \n\
         ## Original Issue\n\
         \n\
         Title: {}\n\
         URL: {}\n\
         \n\
         ## Change Request\n\
         \n\
         Title: {}\n\
         Branch: {} → {}\n\
         \n\
         {}\n\
         \n\
         ## Diff\n\
         \n\
         {}",
        issue.title,
        issue.url,
        cr.title,
        cr.head_branch,
        cr.base_branch,
        truncate_chars(&cr.description, DESCRIPTION_LIMIT),
        truncate_chars(&cr.diff, DIFF_LIMIT),
    )
}

fn truncate_chars(s: &str, limit: usize) -> String {
    let total = s.chars().count();
    if total <= limit {
        return s.to_string();
    }
    let cut: String = s.chars().take(limit).collect();
    format!("{cut}\n... (truncated, {total} chars total)")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_submit_review_payload() {
        let review = parse_review(&json!({
            "verdict": "request_changes",
            "summary": "Missing tests.",
            "comments": [
                {"path": "src/api.rs", "line": 42, "body": "Handle the empty case."}
            ]
        }))
        .unwrap();
        assert_eq!(review.verdict, Verdict::RequestChanges);
        assert_eq!(review.comments.len(), 1);
        assert_eq!(review.comments[0].side, Side::New);
    }

    #[test]
    fn unknown_verdict_degrades_to_comment() {
        let review = parse_review(&json!({
            "verdict": "maybe",
            "summary": "Unsure.",
            "comments": []
        }))
        .unwrap();
        assert_eq!(review.verdict, Verdict::Comment);
    }

    #[test]
    fn review_prompt_truncates_long_inputs() {
        let cr = ChangeRequest {
            title: "Big change".into(),
            description: "d".repeat(1500),
            diff: "x".repeat(25000),
            head_branch: "feature".into(),
            base_branch: "main".into(),
            ..ChangeRequest::default()
        };
        let issue = Issue::default();
        let prompt = build_review_prompt(&cr, &issue);
        assert!(prompt.contains("... (truncated, 1500 chars total)"));
        assert!(prompt.contains("... (truncated, 25000 chars total)"));
    }

    #[test]
    fn short_inputs_carry_no_marker() {
        assert_eq!(truncate_chars("short", 1000), "short");
    }
}
