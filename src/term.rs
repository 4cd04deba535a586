use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;

use crate::compactor;
use crate::engine::Engine;
use crate::limits::*;
use crate::notify::NotifyHub;

/// Manages per-term engines. A term is one timetable document (e.g.
/// `2026-t2`); each gets its own Engine + WAL + compactor. The term name
/// is the database name of the pgwire connection.
pub struct TermManager {
    engines: DashMap<String, Arc<Engine>>,
    data_dir: PathBuf,
    compact_threshold: u64,
}

impl TermManager {
    pub fn new(data_dir: PathBuf, compact_threshold: u64) -> Self {
        Self {
            engines: DashMap::new(),
            data_dir,
            compact_threshold,
        }
    }

    /// Get or lazily create an engine for the given term.
    pub fn get_or_create(&self, term: &str) -> std::io::Result<Arc<Engine>> {
        if let Some(engine) = self.engines.get(term) {
            return Ok(engine.value().clone());
        }
        if term.len() > MAX_TERM_NAME_LEN {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "term name too long",
            ));
        }
        if self.engines.len() >= MAX_TERMS {
            return Err(std::io::Error::other("too many terms"));
        }

        // Sanitize term name to prevent path traversal
        let safe_name: String = term
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
            .collect();
        if safe_name.is_empty() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "empty term name",
            ));
        }

        let wal_path = self.data_dir.join(format!("{safe_name}.wal"));
        let notify = Arc::new(NotifyHub::new());
        let engine = Arc::new(Engine::new(wal_path, notify)?);

        // Spawn the WAL compactor for this term
        let compactor_engine = engine.clone();
        let threshold = self.compact_threshold;
        tokio::spawn(async move {
            compactor::run_compactor(compactor_engine, threshold).await;
        });

        self.engines.insert(term.to_string(), engine.clone());
        metrics::gauge!(crate::observability::TERMS_ACTIVE).set(self.engines.len() as f64);
        Ok(engine)
    }
}
