//! OpenSubtitles.com REST API (v1).
//!
//! - search: `GET /subtitles?moviehash=<osdb hash>&languages=<lang>`
//! - fetch: `POST /download {file_id}` for a temporary link, then `GET` it
//!
//! Every call needs an `Api-Key` header. With a nick and password the
//! engine also logs in once and sends the bearer token, which raises the
//! daily download quota.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::json;

use super::transport::{HttpClient, HttpRequest, TransportError};
use super::{Candidate, EngineError, EngineMeta, EngineResult, MovieFingerprint, SubtitleEngine};
use crate::config::EngineCredentials;

const META: EngineMeta = EngineMeta {
    name: "OpenSubtitles",
    description: "Multilingual subtitle database, hash and name based search",
    site_url: "https://www.opensubtitles.com",
};

pub const API_URL: &str = "https://api.opensubtitles.com/api/v1";

pub struct OpenSubtitlesEngine {
    http: Arc<dyn HttpClient>,
    credentials: EngineCredentials,
    base_url: String,
    token: Mutex<Option<String>>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    attributes: SearchAttributes,
}

#[derive(Debug, Deserialize)]
struct SearchAttributes {
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    release: Option<String>,
    #[serde(default)]
    moviehash_match: bool,
    #[serde(default)]
    files: Vec<SearchFile>,
}

#[derive(Debug, Deserialize)]
struct SearchFile {
    file_id: u64,
    #[serde(default)]
    file_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DownloadResponse {
    link: String,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: String,
}

impl OpenSubtitlesEngine {
    pub fn new(http: Arc<dyn HttpClient>, credentials: EngineCredentials) -> Self {
        Self {
            http,
            credentials,
            base_url: API_URL.to_string(),
            token: Mutex::new(None),
        }
    }

    fn api_key(&self) -> Option<&str> {
        let key = self.credentials.api_key.trim();
        (!key.is_empty()).then_some(key)
    }

    fn authorized(&self, request: HttpRequest, api_key: &str) -> HttpRequest {
        let request = request
            .header("Api-Key", api_key)
            .header("Accept", "application/json");
        match self.token.lock().as_deref() {
            Some(token) => request.header("Authorization", format!("Bearer {}", token)),
            None => request,
        }
    }

    /// Log in once when credentials are configured. Failure is not fatal:
    /// anonymous downloads still work within the anonymous quota.
    fn ensure_login(&self, api_key: &str) {
        if self.credentials.nick.is_empty() || self.token.lock().is_some() {
            return;
        }

        let url = format!("{}/login", self.base_url);
        let request = HttpRequest::post(&url)
            .header("Api-Key", api_key)
            .json(json!({
                "username": self.credentials.nick,
                "password": self.credentials.password,
            }));

        match self
            .http
            .execute(request)
            .and_then(|r| r.error_for_status(&url))
            .and_then(|r| r.json::<LoginResponse>(&url))
        {
            Ok(login) => *self.token.lock() = Some(login.token),
            Err(e) => tracing::warn!("OpenSubtitles login failed: {}", e),
        }
    }

    fn download_link(&self, api_key: &str, file_id: &str) -> Result<String, TransportError> {
        let url = format!("{}/download", self.base_url);
        let file_id: serde_json::Value = match file_id.parse::<u64>() {
            Ok(id) => json!(id),
            Err(_) => json!(file_id),
        };
        let request = self.authorized(HttpRequest::post(&url).json(json!({ "file_id": file_id })), api_key);
        let response = self.http.execute(request)?.error_for_status(&url)?;
        Ok(response.json::<DownloadResponse>(&url)?.link)
    }
}

impl SubtitleEngine for OpenSubtitlesEngine {
    fn meta(&self) -> EngineMeta {
        META
    }

    fn search(&self, movie: &MovieFingerprint, language: &str) -> EngineResult<Vec<Candidate>> {
        let api_key = self
            .api_key()
            .ok_or_else(|| EngineError::unavailable(META.name, "no API key configured"))?;

        let url = format!("{}/subtitles", self.base_url);
        let language = language.to_ascii_lowercase();
        let request = self.authorized(
            HttpRequest::get(&url)
                .query("moviehash", movie.osdb_hash.as_str())
                .query("languages", language.as_str()),
            api_key,
        );

        let response = self
            .http
            .execute(request)
            .and_then(|r| r.error_for_status(&url))
            .and_then(|r| r.json::<SearchResponse>(&url))
            .map_err(|e| EngineError::from_search(META.name, e))?;

        let mut candidates: Vec<(bool, Candidate)> = Vec::new();
        for item in response.data {
            let attrs = item.attributes;
            for file in attrs.files {
                let name = attrs
                    .release
                    .clone()
                    .or(file.file_name)
                    .unwrap_or_else(|| movie.file_name.clone());
                candidates.push((
                    attrs.moviehash_match,
                    Candidate {
                        engine: META.name.to_string(),
                        name,
                        language: attrs.language.clone().unwrap_or_else(|| language.clone()),
                        size: None,
                        reference: file.file_id.to_string(),
                        checksum: None,
                        content_hash: None,
                    },
                ));
            }
        }

        // Exact hash matches first, API order otherwise
        candidates.sort_by_key(|(exact, _)| !exact);
        Ok(candidates.into_iter().map(|(_, c)| c).collect())
    }

    fn fetch(&self, candidate: &Candidate) -> EngineResult<Vec<u8>> {
        let api_key = self
            .api_key()
            .ok_or_else(|| EngineError::fetch_failed(META.name, "no API key configured"))?;

        self.ensure_login(api_key);

        let link = self
            .download_link(api_key, &candidate.reference)
            .map_err(|e| EngineError::from_fetch(META.name, e))?;

        let response = self
            .http
            .execute(HttpRequest::get(&link))
            .and_then(|r| r.error_for_status(&link))
            .map_err(|e| EngineError::from_fetch(META.name, e))?;

        Ok(response.body)
    }
}
