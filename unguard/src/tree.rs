//
// Copyright (c) 2024 Hemi Labs, Inc.
//
// This file is part of the posixutils-rs project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//

//! In-memory source trees.
//!
//! A unit is loaded into a [`SourceTree`], transformed without touching the
//! filesystem, then written out in a single [`SourceTree::flush`].

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::Result;

/// File mode given to files created in memory.
const DEFAULT_MODE: u32 = 0o644;

/// Which files count as source files, by extension.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceFilter {
    extensions: BTreeSet<String>,
}

impl SourceFilter {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        SourceFilter {
            extensions: extensions
                .into_iter()
                .map(|e| e.as_ref().trim_start_matches('.').to_string())
                .collect(),
        }
    }

    /// Extension matching is case-sensitive: `.C` is not `.c`.
    pub fn is_eligible(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map_or(false, |e| self.extensions.contains(e))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub bytes: Vec<u8>,
    pub mode: u32,
}

/// Files keyed by path relative to the tree root, plus every directory
/// (so empty ones survive a flush).
#[derive(Debug, Clone, Default)]
pub struct SourceTree {
    files: BTreeMap<PathBuf, FileEntry>,
    dirs: BTreeSet<PathBuf>,
}

impl SourceTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(root: &Path) -> Result<Self> {
        let mut tree = SourceTree::new();

        for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
            let entry = entry.map_err(io::Error::from)?;
            let Ok(rel) = entry.path().strip_prefix(root) else {
                continue;
            };
            if rel.as_os_str().is_empty() {
                continue;
            }
            let file_type = entry.file_type();
            if file_type.is_dir() {
                tree.dirs.insert(rel.to_path_buf());
            } else if file_type.is_file() {
                let mode = entry.metadata().map_err(io::Error::from)?.permissions().mode();
                let bytes = fs::read(entry.path())?;
                tree.files.insert(rel.to_path_buf(), FileEntry { bytes, mode });
            } else {
                log::warn!("skipping special file {}", entry.path().display());
            }
        }

        log::debug!(
            "loaded {}: {} file(s), {} dir(s)",
            root.display(),
            tree.files.len(),
            tree.dirs.len()
        );
        Ok(tree)
    }

    fn add_parents(&mut self, path: &Path) {
        let mut parent = path.parent();
        while let Some(dir) = parent {
            if dir.as_os_str().is_empty() {
                break;
            }
            self.dirs.insert(dir.to_path_buf());
            parent = dir.parent();
        }
    }

    /// Add or overwrite a file. A new file gets a default mode; an existing
    /// one keeps its mode.
    pub fn insert<P: Into<PathBuf>>(&mut self, path: P, bytes: Vec<u8>) {
        let path = path.into();
        self.add_parents(&path);
        match self.files.get_mut(&path) {
            Some(entry) => entry.bytes = bytes,
            None => {
                self.files.insert(
                    path,
                    FileEntry {
                        bytes,
                        mode: DEFAULT_MODE,
                    },
                );
            }
        }
    }

    pub fn get(&self, path: &Path) -> Option<&FileEntry> {
        self.files.get(path)
    }

    pub fn contents(&self, path: &Path) -> Option<&[u8]> {
        self.files.get(path).map(|e| e.bytes.as_slice())
    }

    /// Move a file. Fails if `from` is missing or `to` is taken.
    pub fn rename(&mut self, from: &Path, to: &Path) -> bool {
        if self.files.contains_key(to) {
            return false;
        }
        match self.files.remove(from) {
            Some(entry) => {
                self.add_parents(to);
                self.files.insert(to.to_path_buf(), entry);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn files(&self) -> impl Iterator<Item = (&Path, &FileEntry)> {
        self.files.iter().map(|(p, e)| (p.as_path(), e))
    }

    pub fn dirs(&self) -> impl Iterator<Item = &Path> {
        self.dirs.iter().map(PathBuf::as_path)
    }

    pub fn has_dir(&self, path: &Path) -> bool {
        self.dirs.contains(path)
    }

    /// Paths of the files under `dir` (any depth).
    pub fn files_under<'a>(&'a self, dir: &'a Path) -> impl Iterator<Item = &'a Path> + 'a {
        self.files
            .keys()
            .filter(move |p| p.starts_with(dir))
            .map(PathBuf::as_path)
    }

    /// Eligible source files under `dir`.
    pub fn sources_under<'a>(
        &'a self,
        dir: &'a Path,
        filter: &'a SourceFilter,
    ) -> impl Iterator<Item = &'a Path> + 'a {
        self.files_under(dir).filter(move |p| filter.is_eligible(p))
    }

    /// Delete every file named `name` under `dir`, returning the paths removed.
    pub fn remove_named_under(&mut self, dir: &Path, name: &str) -> Vec<PathBuf> {
        let doomed: Vec<PathBuf> = self
            .files_under(dir)
            .filter(|p| p.file_name().map_or(false, |f| f == name))
            .map(Path::to_path_buf)
            .collect();
        for path in &doomed {
            self.files.remove(path);
        }
        doomed
    }

    /// Write the tree below `dest`, which must not contain anything the
    /// tree would collide with.
    pub fn flush(&self, dest: &Path) -> Result<()> {
        fs::create_dir_all(dest)?;
        for dir in &self.dirs {
            fs::create_dir_all(dest.join(dir))?;
        }
        for (path, entry) in &self.files {
            let target = dest.join(path);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&target, &entry.bytes)?;
            fs::set_permissions(&target, fs::Permissions::from_mode(entry.mode & 0o7777))?;
        }
        Ok(())
    }
}
