//! Persistent device nicknames, keyed by serial

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Process-wide serial -> nickname map, stored as a flat text file.
///
/// Loaded once on construction and written back on every mutation. An absent
/// or unreadable file is treated as an empty map, never as an error; a blank
/// nickname removes the key entirely. Concurrent writers race at the storage
/// layer and the last write wins, which is acceptable for rare,
/// user-initiated edits.
pub struct NicknameStore {
    path: PathBuf,
    names: BTreeMap<String, String>,
}

impl NicknameStore {
    /// Open the store at the default per-user location
    pub fn new() -> Result<Self> {
        let home_dir = dirs::home_dir().context("Unable to determine home directory")?;
        let path = home_dir.join(".droidprobe").join("nicknames");
        Ok(Self::with_path(path))
    }

    /// Open the store at an explicit path (tests, alternate configs)
    pub fn with_path(path: PathBuf) -> Self {
        let names = Self::load(&path);
        Self { path, names }
    }

    fn load(path: &PathBuf) -> BTreeMap<String, String> {
        let mut names = BTreeMap::new();
        let Ok(content) = fs::read_to_string(path) else {
            debug!("No nickname file at {}, starting empty", path.display());
            return names;
        };
        for line in content.lines() {
            // Malformed lines are dropped silently; a corrupt file is an
            // empty map, not an error.
            if let Some((serial, name)) = line.split_once('=') {
                let (serial, name) = (serial.trim(), name.trim());
                if !serial.is_empty() && !name.is_empty() {
                    names.insert(serial.to_string(), name.to_string());
                }
            }
        }
        names
    }

    pub fn get(&self, serial: &str) -> Option<&str> {
        self.names.get(serial).map(|s| s.as_str())
    }

    /// Set or clear a nickname. Blank/whitespace values remove the key.
    ///
    /// Persistence is best-effort: the in-memory map is always updated, a
    /// failed write is logged and otherwise ignored.
    pub fn set(&mut self, serial: &str, name: &str) {
        let name = name.trim();
        if name.is_empty() {
            self.names.remove(serial);
        } else {
            self.names.insert(serial.to_string(), name.to_string());
        }
        if let Err(e) = self.save() {
            warn!("persisting nicknames failed (ignored): {:#}", e);
        }
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let mut content = String::new();
        for (serial, name) in &self.names {
            content.push_str(serial);
            content.push('=');
            content.push_str(name);
            content.push('\n');
        }
        fs::write(&self.path, content)
            .with_context(|| format!("writing {}", self.path.display()))
    }
}

#[cfg(test)]
#[path = "nickname_test.rs"]
mod nickname_test;
