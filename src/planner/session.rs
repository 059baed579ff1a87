//! Planner sessions: one per chat thread, in memory for the process lifetime.

use crate::llm::ChatMessage;
use crate::vcs::{Provider, RepoInfo};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Brainstorm,
    Prd,
    Criteria,
    Issues,
    Done,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Brainstorm => "brainstorm",
            Stage::Prd => "prd",
            Stage::Criteria => "criteria",
            Stage::Issues => "issues",
            Stage::Done => "done",
        };
        f.write_str(s)
    }
}

/// An issue created during this session.
#[derive(Debug, Clone)]
pub struct LinkedIssue {
    pub number: u64,
    pub title: String,
    pub url: String,
}

pub struct Session {
    pub thread_id: String,
    pub channel_id: String,
    pub stage: Stage,
    pub messages: Vec<ChatMessage>,

    pub repo: Option<RepoInfo>,
    pub provider: Option<Arc<dyn Provider>>,

    pub prd_draft: String,
    pub criteria: Vec<String>,
    pub issues: Vec<LinkedIssue>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub(crate) fn new(thread_id: String, channel_id: String) -> Self {
        let now = Utc::now();
        Self {
            thread_id,
            channel_id,
            stage: Stage::Brainstorm,
            messages: Vec::new(),
            repo: None,
            provider: None,
            prd_draft: String::new(),
            criteria: Vec::new(),
            issues: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn append(&mut self, message: ChatMessage) {
        self.messages.push(message);
        self.updated_at = Utc::now();
    }
}

/// Thread-keyed session store. The outer lock is held only for lookup; each
/// session carries its own mutex, held for the duration of one conversational
/// turn (the transport delivers one event at a time per thread).
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Arc<Mutex<Session>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get_or_create(&self, thread_id: &str, channel_id: &str) -> Arc<Mutex<Session>> {
        if let Some(session) = self.sessions.read().await.get(thread_id) {
            return session.clone();
        }
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(thread_id.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(Session::new(
                    thread_id.to_string(),
                    channel_id.to_string(),
                )))
            })
            .clone()
    }

    pub async fn get(&self, thread_id: &str) -> Option<Arc<Mutex<Session>>> {
        self.sessions.read().await.get(thread_id).cloned()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}
