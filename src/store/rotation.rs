//! Bounded history of the domains that recently supplied items.
//! Ring-buffer semantics: pushing past capacity evicts the oldest entry.

use std::collections::VecDeque;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use super::write_atomic;

#[derive(Debug, Default, Serialize, Deserialize)]
struct RotationFile {
    #[serde(default)]
    recent: Vec<String>,
}

#[derive(Debug)]
pub struct RotationHistory {
    path: PathBuf,
    capacity: usize,
    recent: VecDeque<String>,
}

impl RotationHistory {
    pub fn open(path: impl Into<PathBuf>, capacity: usize) -> Self {
        let path = path.into();
        let capacity = capacity.max(1);
        let items = match fs::read_to_string(&path) {
            Ok(s) => match serde_json::from_str::<RotationFile>(&s) {
                Ok(f) => f.recent,
                Err(e) => {
                    error!(target: "store", error = %e, path = %path.display(), "rotation history unreadable; starting empty");
                    Vec::new()
                }
            },
            Err(_) => Vec::new(),
        };

        let mut hist = Self {
            path,
            capacity,
            recent: VecDeque::with_capacity(capacity),
        };
        for d in items {
            hist.push_mem(d);
        }
        hist
    }

    fn push_mem(&mut self, domain: String) {
        if self.recent.len() == self.capacity {
            self.recent.pop_front();
        }
        self.recent.push_back(domain);
    }

    /// Ring-buffer insert (in memory only; call [`Self::persist`] to save).
    pub fn push(&mut self, domain: impl Into<String>) {
        self.push_mem(domain.into());
    }

    pub fn contains(&self, domain: &str) -> bool {
        self.recent.iter().any(|d| d == domain)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.recent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recent.is_empty()
    }

    /// Oldest first.
    pub fn entries(&self) -> Vec<String> {
        self.recent.iter().cloned().collect()
    }

    /// Best-effort save; failures are logged only.
    pub fn persist(&self) {
        let file = RotationFile {
            recent: self.entries(),
        };
        match serde_json::to_vec_pretty(&file) {
            Ok(body) => {
                if let Err(e) = write_atomic(&self.path, &body) {
                    error!(target: "store", error = %e, "rotation history save failed");
                }
            }
            Err(e) => warn!(target: "store", error = %e, "rotation history serialize failed"),
        }
    }
}
