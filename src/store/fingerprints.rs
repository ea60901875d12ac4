//! Append-only, line-oriented set of delivered fingerprints.

use std::collections::{HashSet, VecDeque};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{error, info, warn};

use super::write_atomic;
use crate::normalize::Fingerprint;

#[derive(Debug)]
pub struct FingerprintStore {
    path: PathBuf,
    retention: usize,
    /// Insertion order, oldest first.
    order: VecDeque<Fingerprint>,
    set: HashSet<Fingerprint>,
}

impl FingerprintStore {
    /// Load the most recent `retention` entries from `path`. Missing or
    /// unreadable files start empty; malformed lines are skipped.
    pub fn open(path: impl Into<PathBuf>, retention: usize) -> Self {
        let path = path.into();
        let retention = retention.max(1);
        let mut store = Self {
            path,
            retention,
            order: VecDeque::new(),
            set: HashSet::new(),
        };

        match fs::read_to_string(&store.path) {
            Ok(content) => {
                let lines: Vec<&str> = content.lines().collect();
                let start = lines.len().saturating_sub(retention);
                for line in &lines[start..] {
                    if let Some(fp) = Fingerprint::parse(line) {
                        store.insert_mem(fp);
                    }
                }
                info!(target: "store", loaded = store.len(), path = %store.path.display(), "fingerprints loaded");
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                error!(target: "store", error = %e, path = %store.path.display(), "fingerprint load failed; starting empty");
            }
        }
        store
    }

    fn insert_mem(&mut self, fp: Fingerprint) -> bool {
        if !self.set.insert(fp.clone()) {
            return false;
        }
        self.order.push_back(fp);
        true
    }

    pub fn contains(&self, fp: &Fingerprint) -> bool {
        self.set.contains(fp)
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record a delivered fingerprint. Returns `false` if it was already known.
    /// The append is best-effort: a write failure is logged and the entry
    /// stays in memory for the rest of the cycle.
    pub fn record(&mut self, fp: Fingerprint) -> bool {
        if !self.insert_mem(fp.clone()) {
            return false;
        }
        if let Err(e) = self.append_line(&fp) {
            error!(target: "store", error = %e, id = fp.short(), "fingerprint append failed");
        }
        true
    }

    fn append_line(&self, fp: &Fingerprint) -> std::io::Result<()> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(f, "{}", fp)
    }

    /// Bounded-retention trim: keep the most recent `retention` entries in
    /// memory and rewrite the file to match. Returns how many were dropped.
    pub fn trim_to_retention(&mut self) -> usize {
        let excess = self.order.len().saturating_sub(self.retention);
        for _ in 0..excess {
            if let Some(old) = self.order.pop_front() {
                self.set.remove(&old);
            }
        }

        // The file may hold more lines than memory (we only load the tail).
        let on_disk = fs::read_to_string(&self.path)
            .map(|c| c.lines().count())
            .unwrap_or(0);
        if excess == 0 && on_disk <= self.retention {
            return 0;
        }

        let mut body = String::with_capacity(self.order.len() * 65);
        for fp in &self.order {
            body.push_str(fp.as_str());
            body.push('\n');
        }
        if let Err(e) = write_atomic(&self.path, body.as_bytes()) {
            warn!(target: "store", error = %e, "fingerprint trim rewrite failed");
        }
        excess.max(on_disk.saturating_sub(self.order.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::fingerprint;

    fn fp(i: usize) -> Fingerprint {
        fingerprint(&format!("https://e.com/{i}"), "t")
    }

    #[test]
    fn missing_file_is_cold_start() {
        let tmp = tempfile::tempdir().unwrap();
        let s = FingerprintStore::open(tmp.path().join("nope.txt"), 10);
        assert!(s.is_empty());
    }

    #[test]
    fn record_persists_across_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join("fp.txt");
        let mut s = FingerprintStore::open(&p, 10);
        assert!(s.record(fp(1)));
        assert!(!s.record(fp(1)));
        drop(s);

        let s2 = FingerprintStore::open(&p, 10);
        assert!(s2.contains(&fp(1)));
        assert_eq!(s2.len(), 1);
    }

    #[test]
    fn open_keeps_only_recent_tail_and_skips_garbage() {
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join("fp.txt");
        let mut body = String::from("not-a-digest\n");
        for i in 0..5 {
            body.push_str(fp(i).as_str());
            body.push('\n');
        }
        fs::write(&p, body).unwrap();

        let s = FingerprintStore::open(&p, 3);
        assert_eq!(s.len(), 3);
        assert!(!s.contains(&fp(1)));
        assert!(s.contains(&fp(4)));
    }

    #[test]
    fn trim_rewrites_file() {
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join("fp.txt");
        let mut s = FingerprintStore::open(&p, 2);
        for i in 0..4 {
            s.record(fp(i));
        }
        let dropped = s.trim_to_retention();
        assert_eq!(dropped, 2);
        assert_eq!(s.len(), 2);
        assert!(s.contains(&fp(3)));
        assert_eq!(fs::read_to_string(&p).unwrap().lines().count(), 2);
    }
}
