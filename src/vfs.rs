//! In-memory filesystem shared between the facade and the interpreter.
//!
//! Only regular files are stored. Directories exist implicitly: `/` always,
//! and any path that is a prefix directory of a stored file.

use anyhow::Result;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

/// A node returned by [`MemoryFileSystem::lookup`].
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    File { content: Arc<[u8]> },
    Directory,
}

/// Cloneable handle to a `/`-rooted in-memory file tree.
///
/// All clones share the same tree.
#[derive(Debug, Clone, Default)]
pub struct MemoryFileSystem {
    files: Arc<RwLock<BTreeMap<String, Arc<[u8]>>>>,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace the file at `path`.
    pub fn add_file(&self, path: &str, content: impl Into<Arc<[u8]>>) {
        let path = normalize(path);
        log::trace!("vfs: add {path}");
        self.files
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path, content.into());
    }

    /// Remove the file at `path`. Fails if there is no such file.
    pub fn remove_file(&self, path: &str) -> Result<()> {
        let path = normalize(path);
        let removed = self
            .files
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&path);
        match removed {
            Some(_) => {
                log::trace!("vfs: remove {path}");
                Ok(())
            }
            None => anyhow::bail!("No such file: {path}"),
        }
    }

    pub fn lookup(&self, path: &str) -> Option<Node> {
        let path = normalize(path);
        let files = self.files.read().unwrap_or_else(PoisonError::into_inner);

        if let Some(content) = files.get(&path) {
            return Some(Node::File { content: content.clone() });
        }
        if path == "/" {
            return Some(Node::Directory);
        }

        let prefix = format!("{path}/");
        files
            .range(prefix.clone()..)
            .next()
            .filter(|(p, _)| p.starts_with(&prefix))
            .map(|_| Node::Directory)
    }

    pub fn contains_file(&self, path: &str) -> bool {
        self.files
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&normalize(path))
    }

    /// Snapshot of every file, ordered by path.
    pub fn files(&self) -> Vec<(String, Arc<[u8]>)> {
        self.files
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(p, c)| (p.clone(), c.clone()))
            .collect()
    }
}

/// Normalize to an absolute path without duplicate or trailing slashes.
///
/// `.` segments are dropped and `..` never climbs above `/`.
pub fn normalize(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    if segments.is_empty() {
        return "/".to_string();
    }
    segments.iter().fold(String::with_capacity(path.len() + 1), |mut out, s| {
        out.push('/');
        out.push_str(s);
        out
    })
}
