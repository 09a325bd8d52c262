//! Persisted registry of watched pairs.
//!
//! One record per line, `"<address>,<lastKnownValue>\n"`, in watch order.
//! Values are a best-effort cache; the chain is re-read every cycle.

use alloy::primitives::Address;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::RegistryResult;

#[derive(Debug, Clone, PartialEq)]
struct RegistryEntry {
    pair: Address,
    last_value: f64,
}

/// Ordered `pair → last value` mapping backed by a file.
#[derive(Debug, Clone)]
pub struct PositionRegistry {
    path: PathBuf,
    entries: Vec<RegistryEntry>,
}

impl PositionRegistry {
    /// Empty registry that will be saved to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: Vec::new(),
        }
    }

    /// Load `path`; a missing file is an empty registry.
    pub fn load(path: impl Into<PathBuf>) -> RegistryResult<Self> {
        let mut registry = Self::new(path);
        let content = match std::fs::read_to_string(&registry.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %registry.path.display(), "No registry file yet");
                return Ok(registry);
            }
            Err(e) => return Err(e.into()),
        };

        for (line_no, line) in content.lines().enumerate() {
            match parse_line(line) {
                Some((pair, last_value)) => registry.upsert(pair, last_value),
                None if line.trim().is_empty() => {}
                None => warn!(
                    line = line_no + 1,
                    content = line,
                    "Skipping malformed registry line"
                ),
            }
        }

        debug!(
            path = %registry.path.display(),
            entries = registry.len(),
            "Registry loaded"
        );
        Ok(registry)
    }

    /// Rewrite the whole file from the in-memory entries.
    pub fn save(&self) -> RegistryResult<()> {
        std::fs::write(&self.path, self.render())?;
        Ok(())
    }

    fn render(&self) -> String {
        self.entries
            .iter()
            .map(|e| format!("{},{}\n", e.pair, e.last_value))
            .collect()
    }

    /// Insert a pair or update its value, keeping its position in the order.
    pub fn upsert(&mut self, pair: Address, last_value: f64) {
        match self.entries.iter_mut().find(|e| e.pair == pair) {
            Some(entry) => entry.last_value = last_value,
            None => self.entries.push(RegistryEntry { pair, last_value }),
        }
    }

    pub fn remove(&mut self, pair: &Address) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| &e.pair != pair);
        self.entries.len() != before
    }

    pub fn contains(&self, pair: &Address) -> bool {
        self.entries.iter().any(|e| &e.pair == pair)
    }

    pub fn last_value(&self, pair: &Address) -> Option<f64> {
        self.entries
            .iter()
            .find(|e| &e.pair == pair)
            .map(|e| e.last_value)
    }

    /// Pairs in watch order.
    pub fn pairs(&self) -> Vec<Address> {
        self.entries.iter().map(|e| e.pair).collect()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// `None` for lines without a separator or with an unparsable address. An
/// unparsable value loads as 0.0 since values are only a cache.
fn parse_line(line: &str) -> Option<(Address, f64)> {
    let (address, value) = line.trim().split_once(',')?;
    let pair = address.trim().parse::<Address>().ok()?;
    let last_value = value.trim().parse::<f64>().unwrap_or(0.0);
    Some((pair, last_value))
}
