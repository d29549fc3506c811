//! Catalog of released n8n versions
//!
//! Backed by the GitHub releases API. A cold start walks every page; later
//! refreshes read only the first page and prepend what is new. The list is
//! kept in memory with a TTL and optionally mirrored to a JSON file so a
//! restart does not trigger a full crawl.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::header::{ACCEPT, LINK, USER_AGENT};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

/// GitHub caps `per_page` at 100
const PAGE_SIZE: u32 = 100;

/// Stop a cold crawl after this many pages
const MAX_PAGES: usize = 50;

lazy_static! {
    static ref LINK_ENTRY: Regex = Regex::new(r#"<([^>]+)>;\s*rel="([^"]+)""#).expect("valid link regex");
    static ref RELEASE_TAG: Regex = Regex::new(r"^\d+\.\d+\.\d+").expect("valid tag regex");
}

#[derive(Debug, Deserialize)]
struct GithubRelease {
    tag_name: String,
    #[serde(default)]
    draft: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CatalogState {
    versions: Vec<String>,
    last_check: Option<DateTime<Utc>>,
}

impl CatalogState {
    fn is_fresh(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        match (self.last_check, chrono::Duration::from_std(ttl)) {
            (Some(checked), Ok(ttl)) => !self.versions.is_empty() && now - checked < ttl,
            _ => false,
        }
    }
}

pub struct ReleaseCatalog {
    http: reqwest::Client,
    releases_url: String,
    ttl: Duration,
    cache_file: Option<PathBuf>,
    state: RwLock<CatalogState>,
    /// Held by the one caller refreshing from the API
    refresh: Mutex<()>,
}

impl ReleaseCatalog {
    pub fn new(releases_url: &str, ttl: Duration, cache_file: Option<PathBuf>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            releases_url: releases_url.to_string(),
            ttl,
            cache_file,
            state: RwLock::new(CatalogState::default()),
            refresh: Mutex::new(()),
        })
    }

    /// Released versions, newest first.
    ///
    /// Serves the cache while it is fresh. Only one caller refreshes at a
    /// time and the state lock is not held during the fetch; callers that
    /// already have a list get the stale one meanwhile. When a refresh fails
    /// the stale list is returned instead of an error.
    pub async fn available_versions(&self) -> Vec<String> {
        let stale = {
            let state = self.state.read().await;
            if state.is_fresh(self.ttl, Utc::now()) {
                return state.versions.clone();
            }
            state.versions.clone()
        };

        let _refresh = match self.refresh.try_lock() {
            Ok(guard) => guard,
            Err(_) if !stale.is_empty() => {
                debug!("Release catalog refresh in progress, serving cached list");
                return stale;
            }
            Err(_) => self.refresh.lock().await,
        };

        // Another caller may have refreshed while we waited
        let known = {
            let mut state = self.state.write().await;
            if state.versions.is_empty() {
                if let Some(cached) = self.load_cache_file().await {
                    *state = cached;
                }
            }
            if state.is_fresh(self.ttl, Utc::now()) {
                return state.versions.clone();
            }
            state.versions.clone()
        };

        match self.fetch_versions(&known).await {
            Ok(versions) => {
                let updated = CatalogState {
                    versions,
                    last_check: Some(Utc::now()),
                };
                self.save_cache_file(&updated).await;
                let mut state = self.state.write().await;
                *state = updated;
                state.versions.clone()
            }
            Err(e) => {
                warn!(error = %e, "Failed to refresh release catalog, serving cached list");
                known
            }
        }
    }

    #[instrument(skip_all, fields(known = known.len()))]
    async fn fetch_versions(&self, known: &[String]) -> Result<Vec<String>> {
        let first_page = format!("{}?per_page={}", self.releases_url, PAGE_SIZE);

        let Some(newest) = known.first() else {
            let mut versions = Vec::new();
            let mut next = Some(first_page);
            let mut pages = 0;
            while let Some(url) = next.take() {
                let (page, link) = self.fetch_page(&url).await?;
                versions.extend(page);
                pages += 1;
                if pages >= MAX_PAGES {
                    warn!(pages, "Release crawl stopped at page limit");
                    break;
                }
                next = link;
            }
            info!(count = versions.len(), pages, "Fetched release catalog");
            return Ok(versions);
        };

        let (page, _) = self.fetch_page(&first_page).await?;
        let mut versions: Vec<String> = page.into_iter().take_while(|v| v != newest).collect();
        debug!(new = versions.len(), "Refreshed release catalog");
        versions.extend_from_slice(known);
        Ok(versions)
    }

    async fn fetch_page(&self, url: &str) -> Result<(Vec<String>, Option<String>)> {
        debug!(url = %url, "Fetching releases page");

        let response = self
            .http
            .get(url)
            .header(ACCEPT, "application/vnd.github+json")
            .header(USER_AGENT, concat!("n8n-versions/", env!("CARGO_PKG_VERSION")))
            .send()
            .await
            .context("Failed to reach releases API")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Releases API returned {}: {}", status, body);
        }

        let next = response
            .headers()
            .get(LINK)
            .and_then(|h| h.to_str().ok())
            .and_then(next_page_link);

        let releases: Vec<GithubRelease> = response
            .json()
            .await
            .context("Failed to decode releases")?;

        let versions = releases
            .into_iter()
            .filter(|r| !r.draft)
            .filter_map(|r| extract_version(&r.tag_name))
            .collect();

        Ok((versions, next))
    }

    async fn load_cache_file(&self) -> Option<CatalogState> {
        let path = self.cache_file.as_ref()?;
        let raw = tokio::fs::read_to_string(path).await.ok()?;
        match serde_json::from_str(&raw) {
            Ok(state) => {
                debug!(path = %path.display(), "Loaded release cache");
                Some(state)
            }
            Err(e) => {
                warn!(error = %e, path = %path.display(), "Ignoring corrupt release cache");
                None
            }
        }
    }

    async fn save_cache_file(&self, state: &CatalogState) {
        let Some(path) = &self.cache_file else {
            return;
        };
        let result = match serde_json::to_string_pretty(state) {
            Ok(json) => tokio::fs::write(path, json).await.map_err(anyhow::Error::from),
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            warn!(error = %e, path = %path.display(), "Failed to write release cache");
        }
    }
}

/// `rel="next"` target from an RFC 8288 `Link` header
pub fn next_page_link(header: &str) -> Option<String> {
    LINK_ENTRY
        .captures_iter(header)
        .find(|caps| &caps[2] == "next")
        .map(|caps| caps[1].to_string())
}

/// Normalize a release tag (`n8n@1.2.3`, `v1.2.3`, `1.2.3`) to a version
pub fn extract_version(tag: &str) -> Option<String> {
    let version = tag.strip_prefix("n8n@").unwrap_or(tag);
    let version = version.trim_start_matches('v');
    RELEASE_TAG.is_match(version).then(|| version.to_string())
}
