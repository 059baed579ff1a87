//! End-to-end planner turns against a scripted model.

mod common;

use autocrew::chat::{IncomingMessage, MessageHandler};
use autocrew::planner::{Planner, SessionStore, Stage};
use autocrew::vcs::Factory;
use common::{text_response, tool_response, RecordingProvider, ScriptedClient};
use serde_json::json;
use std::sync::Arc;

fn message(thread: &str, text: &str) -> IncomingMessage {
    IncomingMessage {
        thread_id: thread.to_string(),
        channel_id: "C01".to_string(),
        user_id: "U01".to_string(),
        text: text.to_string(),
        is_dm: false,
    }
}

fn planner_with(
    sessions: Arc<SessionStore>,
    llm: ScriptedClient,
) -> Planner {
    Planner::new(
        sessions,
        Arc::new(llm),
        Arc::new(Factory::new(Some("token".to_string()), None)),
    )
}

#[tokio::test]
async fn fresh_thread_gets_a_text_reply() {
    let sessions = Arc::new(SessionStore::new());
    let planner = planner_with(
        sessions.clone(),
        ScriptedClient::new(vec![text_response(
            "What problem is the rate limiting solving?",
        )]),
    );

    let reply = planner
        .handle(message(
            "1700000000.1",
            "Let's plan a feature that adds rate limiting",
        ))
        .await
        .unwrap();

    assert_eq!(reply, "What problem is the rate limiting solving?");

    let session = sessions.get("1700000000.1").await.unwrap();
    let session = session.lock().await;
    assert_eq!(session.stage, Stage::Brainstorm);
    assert_eq!(session.messages.len(), 2);
    assert!(session.issues.is_empty());
}

#[tokio::test]
async fn approved_breakdown_creates_issues_and_finishes() {
    let sessions = Arc::new(SessionStore::new());
    let provider = Arc::new(RecordingProvider::new("https://github.com/org/repo"));

    // A session mid-breakdown with a repository already bound.
    {
        let session = sessions.get_or_create("1700000000.2", "C01").await;
        let mut session = session.lock().await;
        session.stage = Stage::Issues;
        session.provider = Some(provider.clone());
    }

    let planner = planner_with(
        sessions.clone(),
        ScriptedClient::new(vec![
            tool_response(&[
                (
                    "tu_1",
                    "create_issue",
                    json!({
                        "title": "Add token bucket",
                        "description": "Implement the limiter core.",
                        "acceptance_criteria": ["Requests over the limit get 429", "Bucket size is configurable"],
                        "labels": ["agent:ready", "backend"]
                    }),
                ),
                (
                    "tu_2",
                    "create_issue",
                    json!({
                        "title": "Wire limiter into the API",
                        "description": "Apply the limiter to public routes.",
                        "acceptance_criteria": ["Limited routes return Retry-After"],
                        // Label enforcement: agent:ready is appended when missing.
                        "labels": ["backend"]
                    }),
                ),
                ("tu_3", "finish_planning", json!({"summary": "2 issues created"})),
            ]),
            text_response("Created 2 issues and wrapped up planning."),
        ]),
    );

    let reply = planner
        .handle(message("1700000000.2", "Looks good, go ahead"))
        .await
        .unwrap();
    assert_eq!(reply, "Created 2 issues and wrapped up planning.");

    let created = provider.created_issues.lock().unwrap();
    assert_eq!(created.len(), 2);
    for input in created.iter() {
        assert_eq!(input.body.matches("## Description").count(), 1);
        assert_eq!(input.body.matches("## Acceptance Criteria").count(), 1);
        assert!(input.body.ends_with("*Created by the Planner Agent*"));
        assert!(input.labels.iter().any(|l| l == "agent:ready"));
    }
    assert_eq!(created[0].body.matches("- [ ] ").count(), 2);
    assert_eq!(created[1].body.matches("- [ ] ").count(), 1);
    drop(created);

    let session = sessions.get("1700000000.2").await.unwrap();
    let session = session.lock().await;
    assert_eq!(session.stage, Stage::Done);
    assert_eq!(session.issues.len(), 2);
    assert_eq!(session.issues[0].title, "Add token bucket");
}

#[tokio::test]
async fn runaway_tool_loop_hits_the_cap() {
    let sessions = Arc::new(SessionStore::new());
    let planner = planner_with(
        sessions.clone(),
        ScriptedClient::repeating(tool_response(&[(
            "tu_loop",
            "finish_planning",
            json!({"summary": "again"}),
        )])),
    );

    let err = planner
        .handle(message("1700000000.3", "plan something"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("exceeded 10 iterations"));

    // The session survives the failed turn and keeps the user message.
    let session = sessions.get("1700000000.3").await.unwrap();
    let session = session.lock().await;
    assert_eq!(session.messages.len(), 1);
}
