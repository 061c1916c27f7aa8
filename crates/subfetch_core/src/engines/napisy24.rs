//! Napisy24 (napisy24.pl), `CheckSubAgent` API. Polish only.
//!
//! A POST form identifies the movie by OpenSubtitles hash, size, MD5 and
//! file name. The answer is a status line followed by the payload:
//!
//! ```text
//! OK-2|key:value|key:value||<zip bytes>
//! ```
//!
//! `OK-2` means subtitles were found; any other `OK-n` means nothing
//! matched. Like NapiProjekt there is no separate download call.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use super::transport::{HttpClient, HttpRequest};
use super::{Candidate, EngineError, EngineMeta, EngineResult, MovieFingerprint, SubtitleEngine};
use crate::config::EngineCredentials;

const META: EngineMeta = EngineMeta {
    name: "Napisy24",
    description: "Polish subtitle database",
    site_url: "https://napisy24.pl",
};

pub const API_URL: &str = "http://napisy24.pl/run/CheckSubAgent.php";
const DEFAULT_USER: &str = "tantalosus";
const DEFAULT_PASSWORD: &str = "susolatnat";
const FOUND: &str = "OK-2";

pub struct Napisy24Engine {
    http: Arc<dyn HttpClient>,
    credentials: EngineCredentials,
}

#[derive(Debug, PartialEq)]
struct AgentResponse {
    status: String,
    fields: BTreeMap<String, String>,
    payload: Vec<u8>,
}

impl Napisy24Engine {
    pub fn new(http: Arc<dyn HttpClient>, credentials: EngineCredentials) -> Self {
        Self { http, credentials }
    }

    fn request(&self, movie: &MovieFingerprint) -> HttpRequest {
        let (user, password) = if self.credentials.nick.is_empty() {
            (DEFAULT_USER, DEFAULT_PASSWORD)
        } else {
            (self.credentials.nick.as_str(), self.credentials.password.as_str())
        };

        let size = movie.size.to_string();
        HttpRequest::post(API_URL).form([
            ("postAction", "CheckSub"),
            ("ua", user),
            ("ap", password),
            ("fh", movie.osdb_hash.as_str()),
            ("fs", size.as_str()),
            ("md", movie.md5_10mb.as_str()),
            ("fn", movie.file_name.as_str()),
            ("nl", "PL"),
        ])
    }

    fn query(&self, movie: &MovieFingerprint) -> Result<AgentResponse, String> {
        let response = self
            .http
            .execute(self.request(movie))
            .and_then(|r| r.error_for_status(API_URL))
            .map_err(|e| e.to_string())?;
        parse_response(&response.body)
    }
}

fn parse_response(body: &[u8]) -> Result<AgentResponse, String> {
    let (header, payload) = match find(body, b"||") {
        Some(pos) => (&body[..pos], body[pos + 2..].to_vec()),
        None => (body, Vec::new()),
    };

    let header = String::from_utf8_lossy(header);
    let mut parts = header.trim().split('|');
    let status = parts.next().unwrap_or_default().trim().to_string();
    if !status.starts_with("OK-") {
        return Err(format!("unexpected response '{}'", truncate(&status, 40)));
    }

    let fields = parts
        .filter_map(|p| p.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect();

    Ok(AgentResponse {
        status,
        fields,
        payload,
    })
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

impl SubtitleEngine for Napisy24Engine {
    fn meta(&self) -> EngineMeta {
        META
    }

    fn search(&self, movie: &MovieFingerprint, language: &str) -> EngineResult<Vec<Candidate>> {
        if !language.eq_ignore_ascii_case("pl") {
            return Ok(Vec::new());
        }

        let response = self
            .query(movie)
            .map_err(|e| EngineError::unavailable(META.name, e))?;

        if response.status != FOUND {
            return Ok(Vec::new());
        }

        let name = response
            .fields
            .get("title")
            .cloned()
            .unwrap_or_else(|| movie.file_name.clone());

        Ok(vec![Candidate {
            engine: META.name.to_string(),
            name,
            language: "pl".to_string(),
            size: Some(response.payload.len() as u64),
            reference: movie.path.to_string_lossy().into_owned(),
            checksum: None,
            content_hash: None,
        }])
    }

    fn fetch(&self, candidate: &Candidate) -> EngineResult<Vec<u8>> {
        let movie = MovieFingerprint::compute(Path::new(&candidate.reference))
            .map_err(|e| EngineError::fetch_failed(META.name, format!("cannot hash movie: {}", e)))?;

        let response = self
            .query(&movie)
            .map_err(|e| EngineError::fetch_failed(META.name, e))?;

        if response.status != FOUND || response.payload.is_empty() {
            return Err(EngineError::fetch_failed(META.name, "subtitles no longer available"));
        }
        Ok(response.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::transport::fake::FakeHttp;
    use crate::engines::transport::HttpResponse;
    use std::fs;
    use tempfile::tempdir;

    fn found_body() -> Vec<u8> {
        let mut body = b"OK-2|title:Film PL|fps:23.976||".to_vec();
        body.extend_from_slice(b"PK\x03\x04zipdata");
        body
    }

    #[test]
    fn parses_status_fields_and_payload() {
        let parsed = parse_response(&found_body()).unwrap();
        assert_eq!(parsed.status, "OK-2");
        assert_eq!(parsed.fields.get("fps").map(String::as_str), Some("23.976"));
        assert!(parsed.payload.starts_with(b"PK\x03\x04"));

        let none = parse_response(b"OK-0").unwrap();
        assert!(none.payload.is_empty());
        assert!(parse_response(b"<html>").is_err());
    }

    #[test]
    fn search_and_fetch() {
        let dir = tempdir().unwrap();
        let movie_path = dir.path().join("Film.avi");
        fs::write(&movie_path, vec![0u8; 4096]).unwrap();
        let movie = MovieFingerprint::compute(&movie_path).unwrap();

        let http = Arc::new(FakeHttp::new(|_| Ok(HttpResponse::ok(found_body()))));
        let engine = Napisy24Engine::new(http.clone(), EngineCredentials::default());

        let found = engine.search(&movie, "pl").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Film PL");

        let payload = engine.fetch(&found[0]).unwrap();
        assert!(payload.starts_with(b"PK"));

        let requests = http.requests.lock();
        assert_eq!(requests[0].form_value("ua"), Some(DEFAULT_USER));
        assert_eq!(requests[0].form_value("fs"), Some("4096"));
        assert_eq!(requests[0].form_value("fh"), Some(movie.osdb_hash.as_str()));
    }

    #[test]
    fn other_languages_and_misses_are_empty() {
        let http = Arc::new(FakeHttp::new(|_| Ok(HttpResponse::ok("OK-1"))));
        let engine = Napisy24Engine::new(http.clone(), EngineCredentials::default());
        let movie = MovieFingerprint {
            path: "/m/x.avi".into(),
            file_name: "x.avi".to_string(),
            size: 1,
            md5_10mb: String::new(),
            osdb_hash: String::new(),
        };

        assert!(engine.search(&movie, "en").unwrap().is_empty());
        assert_eq!(http.request_count(), 0);
        assert!(engine.search(&movie, "pl").unwrap().is_empty());
        assert_eq!(http.request_count(), 1);
    }
}
