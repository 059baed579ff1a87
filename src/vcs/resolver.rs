//! Repository URL parsing and provider selection
//!
//! The platform is detected from the host, never from global configuration: a
//! `github.com` host selects the GitHub family, any host containing `gitlab`
//! selects the GitLab family (self-hosted included). A provider is only
//! constructible when its token is configured.

use super::{github::GitHubProvider, gitlab::GitLabProvider, Provider, ProviderResolver};
use anyhow::{bail, Context, Result};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    GitHub,
    GitLab,
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Platform::GitHub => f.write_str("github"),
            Platform::GitLab => f.write_str("gitlab"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoInfo {
    pub platform: Platform,
    /// e.g. "github.com" or "gitlab.mycompany.com"
    pub host: String,
    /// GitLab owners may span subgroups, e.g. "group/subgroup".
    pub owner: String,
    pub repo: String,
    pub raw_url: String,
}

pub fn parse_repo_url(raw_url: &str) -> Result<RepoInfo> {
    let raw_url = raw_url.trim();

    let normalized = if raw_url.starts_with("git@") {
        normalize_ssh(raw_url)
    } else {
        raw_url.to_string()
    };

    let url = reqwest::Url::parse(&normalized)
        .with_context(|| format!("invalid repository URL {raw_url:?}"))?;
    let host = url
        .host_str()
        .with_context(|| format!("repository URL {raw_url:?} has no host"))?
        .to_ascii_lowercase();

    let platform = detect_platform(&host)?;

    let path = url
        .path()
        .trim_matches('/')
        .trim_end_matches(".git")
        .trim_end_matches('/');
    let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();

    match platform {
        Platform::GitHub => {
            if parts.len() < 2 {
                bail!("github URL must have owner and repo: {raw_url:?}");
            }
            Ok(RepoInfo {
                platform,
                host,
                owner: parts[0].to_string(),
                repo: parts[1].to_string(),
                raw_url: raw_url.to_string(),
            })
        }
        Platform::GitLab => {
            if parts.len() < 2 {
                bail!("gitlab URL must have at least namespace and repo: {raw_url:?}");
            }
            Ok(RepoInfo {
                platform,
                host,
                owner: parts[..parts.len() - 1].join("/"),
                repo: parts[parts.len() - 1].to_string(),
                raw_url: raw_url.to_string(),
            })
        }
    }
}

fn detect_platform(host: &str) -> Result<Platform> {
    if host == "github.com" || host.ends_with(".github.com") {
        Ok(Platform::GitHub)
    } else if host == "gitlab.com" || host.contains("gitlab") {
        Ok(Platform::GitLab)
    } else {
        bail!("cannot determine platform from host {host:?} — expected a github.com or gitlab domain")
    }
}

/// `git@host:owner/repo.git` → `https://host/owner/repo.git`
fn normalize_ssh(url: &str) -> String {
    let rest = url.trim_start_matches("git@");
    format!("https://{}", rest.replacen(':', "/", 1))
}

/// Builds a provider for a repository URL, gated on token availability.
pub struct Factory {
    github_token: Option<String>,
    gitlab_token: Option<String>,
    gitlab_base_url: String,
}

impl Factory {
    pub fn new(github_token: Option<String>, gitlab_token: Option<String>) -> Self {
        Self {
            github_token,
            gitlab_token,
            gitlab_base_url: "https://gitlab.com".to_string(),
        }
    }

    pub fn with_gitlab_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.gitlab_base_url = base_url.into();
        self
    }

    pub fn provider_for(&self, repo_url: &str) -> Result<(Arc<dyn Provider>, RepoInfo)> {
        let info = parse_repo_url(repo_url)?;

        match info.platform {
            Platform::GitHub => {
                let token = self
                    .github_token
                    .as_ref()
                    .context("no GitHub token configured")?;
                let provider = GitHubProvider::new(token.clone(), info.clone());
                Ok((Arc::new(provider), info))
            }
            Platform::GitLab => {
                let token = self
                    .gitlab_token
                    .as_ref()
                    .context("no GitLab token configured")?;
                // Self-hosted instances use the repo URL's own scheme + host.
                let base_url = if info.host == "gitlab.com" {
                    self.gitlab_base_url.clone()
                } else {
                    let url = reqwest::Url::parse(info.raw_url.trim())
                        .or_else(|_| reqwest::Url::parse(&normalize_ssh(info.raw_url.trim())))
                        .with_context(|| format!("invalid gitlab URL {:?}", info.raw_url))?;
                    format!("{}://{}", url.scheme(), info.host)
                };
                let provider = GitLabProvider::new(token.clone(), base_url, info.clone());
                Ok((Arc::new(provider), info))
            }
        }
    }
}

impl ProviderResolver for Factory {
    fn provider_for(&self, repo_url: &str) -> Result<(Arc<dyn Provider>, RepoInfo)> {
        Factory::provider_for(self, repo_url)
    }
}
