//! NapiProjekt (napiprojekt.pl), API v3.
//!
//! One POST form request identifies the movie by the MD5 of its first
//! 10 MiB. The XML answer carries a status, the subtitle hash and the
//! subtitle text in base64:
//!
//! ```text
//! <result>
//!   <status>success</status>
//!   <subtitles>
//!     <subs_hash>...</subs_hash>
//!     <filesize>1234</filesize>
//!     <content><![CDATA[base64]]></content>
//!   </subtitles>
//! </result>
//! ```
//!
//! The API has no separate search call, so `search` and `fetch` issue the
//! same request; `fetch` keeps the content.

use std::sync::Arc;

use base64::Engine as _;

use super::transport::{HttpClient, HttpRequest};
use super::{Candidate, EngineError, EngineMeta, EngineResult, MovieFingerprint, SubtitleEngine};
use crate::config::EngineCredentials;

const META: EngineMeta = EngineMeta {
    name: "NapiProjekt",
    description: "Polish subtitle database keyed by movie checksum",
    site_url: "https://www.napiprojekt.pl",
};

pub const API_URL: &str = "https://napiprojekt.pl/api/api-napiprojekt3.php";
const CLIENT: &str = "NapiProjekt";
const CLIENT_VERSION: &str = "2.2.0.2399";

pub struct NapiProjektEngine {
    http: Arc<dyn HttpClient>,
    credentials: EngineCredentials,
}

#[derive(Debug, Default, PartialEq)]
struct NapiResponse {
    status: String,
    subs_hash: Option<String>,
    filesize: Option<u64>,
    content: Option<String>,
}

impl NapiResponse {
    fn found(&self) -> bool {
        self.status == "success"
    }
}

impl NapiProjektEngine {
    pub fn new(http: Arc<dyn HttpClient>, credentials: EngineCredentials) -> Self {
        Self { http, credentials }
    }

    fn request(&self, md5: &str, language: &str) -> HttpRequest {
        HttpRequest::post(API_URL).form([
            ("mode", "1"),
            ("client", CLIENT),
            ("client_ver", CLIENT_VERSION),
            ("user_nick", self.credentials.nick.as_str()),
            ("user_password", self.credentials.password.as_str()),
            ("downloaded_subtitles_id", md5),
            ("downloaded_subtitles_lang", language),
            ("downloaded_subtitles_txt", "1"),
        ])
    }

    fn query(&self, md5: &str, language: &str) -> Result<NapiResponse, String> {
        let response = self
            .http
            .execute(self.request(md5, language))
            .and_then(|r| r.error_for_status(API_URL))
            .map_err(|e| e.to_string())?;
        parse_response(&response.text())
    }
}

/// API language code for an ISO 639-1 code.
fn language_code(language: &str) -> Option<&'static str> {
    match language.to_ascii_lowercase().as_str() {
        "pl" => Some("PL"),
        "en" => Some("ENG"),
        _ => None,
    }
}

fn parse_response(xml: &str) -> Result<NapiResponse, String> {
    let doc = roxmltree::Document::parse(xml.trim()).map_err(|e| format!("XML parse error: {}", e))?;

    let root = doc.root_element();
    if root.tag_name().name() != "result" {
        return Err("Root element must be <result>".to_string());
    }

    let mut response = NapiResponse::default();
    for child in root.children().filter(|n| n.is_element()) {
        match child.tag_name().name() {
            "status" => response.status = child.text().unwrap_or_default().trim().to_string(),
            "subtitles" => {
                for field in child.children().filter(|n| n.is_element()) {
                    let text = field.text().map(|t| t.trim().to_string());
                    match field.tag_name().name() {
                        "subs_hash" => response.subs_hash = text.filter(|t| !t.is_empty()),
                        "filesize" => response.filesize = text.and_then(|t| t.parse().ok()),
                        "content" => response.content = text,
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }

    Ok(response)
}

impl SubtitleEngine for NapiProjektEngine {
    fn meta(&self) -> EngineMeta {
        META
    }

    fn search(&self, movie: &MovieFingerprint, language: &str) -> EngineResult<Vec<Candidate>> {
        let Some(code) = language_code(language) else {
            tracing::debug!("NapiProjekt: language '{}' not offered", language);
            return Ok(Vec::new());
        };

        let response = self
            .query(&movie.md5_10mb, code)
            .map_err(|e| EngineError::unavailable(META.name, e))?;

        if !response.found() {
            return Ok(Vec::new());
        }

        Ok(vec![Candidate {
            engine: META.name.to_string(),
            name: movie.file_name.clone(),
            language: language.to_ascii_lowercase(),
            size: response.filesize,
            reference: format!("{}|{}", movie.md5_10mb, code),
            checksum: None,
            content_hash: response.subs_hash,
        }])
    }

    fn fetch(&self, candidate: &Candidate) -> EngineResult<Vec<u8>> {
        let (md5, code) = candidate
            .reference
            .split_once('|')
            .ok_or_else(|| EngineError::fetch_failed(META.name, "malformed reference"))?;

        let response = self
            .query(md5, code)
            .map_err(|e| EngineError::fetch_failed(META.name, e))?;

        if !response.found() {
            return Err(EngineError::fetch_failed(META.name, "subtitles no longer available"));
        }

        let content = response
            .content
            .ok_or_else(|| EngineError::fetch_failed(META.name, "response has no content"))?;
        let cleaned: String = content.chars().filter(|c| !c.is_whitespace()).collect();

        base64::engine::general_purpose::STANDARD
            .decode(cleaned.as_bytes())
            .map_err(|e| EngineError::fetch_failed(META.name, format!("invalid base64: {}", e)))
    }
}
