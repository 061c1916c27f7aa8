//! Catalog of download engines.

use std::sync::Arc;

use super::napiprojekt::NapiProjektEngine;
use super::napisy24::Napisy24Engine;
use super::opensubtitles::OpenSubtitlesEngine;
use super::transport::HttpClient;
use super::{EngineError, EngineMeta, EngineResult, SubtitleEngine};
use crate::config::EngineSettings;

/// Read-only catalog of engines, in registration order.
#[derive(Default, Clone)]
pub struct EngineRegistry {
    engines: Vec<Arc<dyn SubtitleEngine>>,
}

impl EngineRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in engine, configured from `settings`.
    pub fn with_defaults(settings: &EngineSettings, http: Arc<dyn HttpClient>) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(NapiProjektEngine::new(
            http.clone(),
            settings.credentials_for("NapiProjekt"),
        )));
        registry.register(Arc::new(OpenSubtitlesEngine::new(
            http.clone(),
            settings.credentials_for("OpenSubtitles"),
        )));
        registry.register(Arc::new(Napisy24Engine::new(
            http,
            settings.credentials_for("Napisy24"),
        )));
        registry
    }

    /// Add an engine, replacing one registered under the same name.
    pub fn register(&mut self, engine: Arc<dyn SubtitleEngine>) {
        match self
            .engines
            .iter()
            .position(|e| e.name().eq_ignore_ascii_case(engine.name()))
        {
            Some(i) => self.engines[i] = engine,
            None => self.engines.push(engine),
        }
    }

    /// Engine names in registration order.
    pub fn names(&self) -> Vec<&'static str> {
        self.engines.iter().map(|e| e.name()).collect()
    }

    pub fn metas(&self) -> Vec<EngineMeta> {
        self.engines.iter().map(|e| e.meta()).collect()
    }

    /// Look up an engine by name (ASCII case-insensitive).
    pub fn get(&self, name: &str) -> EngineResult<Arc<dyn SubtitleEngine>> {
        self.engines
            .iter()
            .find(|e| e.name().eq_ignore_ascii_case(name.trim()))
            .cloned()
            .ok_or_else(|| EngineError::UnknownEngine(name.to_string()))
    }

    /// Engines for an allow-list, in allow-list order.
    ///
    /// Fails on the first name that is not registered; duplicates are
    /// returned once.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> EngineResult<Vec<Arc<dyn SubtitleEngine>>> {
        let mut out: Vec<Arc<dyn SubtitleEngine>> = Vec::new();
        for name in names {
            let engine = self.get(name.as_ref())?;
            if !out.iter().any(|e| e.name() == engine.name()) {
                out.push(engine);
            }
        }
        Ok(out)
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }
}
