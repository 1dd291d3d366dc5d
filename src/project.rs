//! Immutable project context shared by every agent.
//!
//! Holds the project root and configuration, and owns the on-disk naming
//! conventions (doc files, scratch files) plus the path containment rules
//! that gate every write and delete.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use walkdir::WalkDir;

use crate::config::Config;

/// Directory names never shown to agents nor turned into agents.
const IGNORED_NAMES: &[&str] = &[
    ".git",
    "target",
    "node_modules",
    "__pycache__",
    ".venv",
    "venv",
];

/// Master-level documentation file, kept at the project root.
pub const MASTER_DOC_FILE: &str = "DOCUMENTATION.md";

const DOC_SUFFIX: &str = "_README.md";

/// Lexically normalize a path: drop `.` and fold `..` without touching the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = matches!(
                    out.components().next_back(),
                    Some(Component::Normal(_))
                ) && out.pop();
                if !popped {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Whether `path` lies inside (or is) `scope` after normalization.
pub fn contains(scope: &Path, path: &Path) -> bool {
    normalize(path).starts_with(normalize(scope))
}

/// The project every agent works on.
///
/// # Invariants
/// - `root` is an absolute, normalized directory path
/// - root and config never change after construction; shared via `Arc`
/// - only scratch files the engine created are hidden from agents
#[derive(Debug, Clone)]
pub struct ProjectContext {
    root: PathBuf,
    config: Config,
    scratch: Arc<Mutex<HashSet<PathBuf>>>,
}

impl ProjectContext {
    /// Create a context rooted at an existing directory.
    pub fn new(root: impl AsRef<Path>, config: Config) -> std::io::Result<Self> {
        let root = root.as_ref().canonicalize()?;
        if !root.is_dir() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} is not a directory", root.display()),
            ));
        }
        Ok(Self {
            root: normalize(&root),
            config,
            scratch: Arc::default(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Resolve `name` against `base`; absolute names are only normalized.
    pub fn resolve(&self, base: &Path, name: &str) -> PathBuf {
        let name = Path::new(name.trim());
        if name.is_absolute() {
            normalize(name)
        } else {
            normalize(&base.join(name))
        }
    }

    /// Whether `path` is inside the project root.
    pub fn in_project(&self, path: &Path) -> bool {
        contains(&self.root, path)
    }

    /// Display name of a path relative to the project root (`.` for the root itself).
    pub fn display_name(&self, path: &Path) -> String {
        match normalize(path).strip_prefix(&self.root) {
            Ok(rel) if rel.as_os_str().is_empty() => ".".to_string(),
            Ok(rel) => rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/"),
            Err(_) => path.display().to_string(),
        }
    }

    /// Doc file of a managed directory: `<dir>/<dirname>_README.md`.
    pub fn doc_path(&self, dir: &Path) -> PathBuf {
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "project".to_string());
        dir.join(format!("{}{}", name, DOC_SUFFIX))
    }

    pub fn master_doc_path(&self) -> PathBuf {
        self.root.join(MASTER_DOC_FILE)
    }

    /// Create the doc file of `dir` if it does not exist yet.
    pub fn ensure_doc(&self, dir: &Path) -> std::io::Result<PathBuf> {
        let doc = self.doc_path(dir);
        if !doc.exists() {
            std::fs::write(&doc, "")?;
            tracing::debug!("Created doc file {}", doc.display());
        }
        Ok(doc)
    }

    /// Whether `path` is the doc file of its own directory or the master documentation.
    pub fn is_doc_file(&self, path: &Path) -> bool {
        if normalize(path) == self.master_doc_path() {
            return true;
        }
        path.parent()
            .map(|dir| self.doc_path(dir) == path)
            .unwrap_or(false)
    }

    /// Whether `path` is a scratch file created by the engine and not yet removed.
    ///
    /// User files that merely look like scratch files are ordinary files.
    pub fn is_scratch(&self, path: &Path) -> bool {
        self.scratch_files().contains(&normalize(path))
    }

    /// Record a scratch file the engine just created.
    pub fn claim_scratch(&self, path: &Path) {
        self.scratch_files().insert(normalize(path));
    }

    /// Forget a scratch file once it is deleted.
    pub fn forget_scratch(&self, path: &Path) {
        self.scratch_files().remove(&normalize(path));
    }

    fn scratch_files(&self) -> std::sync::MutexGuard<'_, HashSet<PathBuf>> {
        self.scratch.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Free for a new scratch file: absent, or already one of ours.
    fn scratch_slot_free(&self, path: &Path) -> bool {
        !path.exists() || self.is_scratch(path)
    }

    /// Hidden entries and build/VCS directories are invisible to agents.
    pub fn is_ignored(path: &Path) -> bool {
        path.file_name()
            .map(|n| {
                let name = n.to_string_lossy();
                name.starts_with('.') || IGNORED_NAMES.contains(&name.as_ref())
            })
            .unwrap_or(false)
    }

    /// Next free scratch file for a tester owned by the manager of `dir`.
    pub fn next_scratch_path(&self, dir: &Path) -> PathBuf {
        let stem = dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "project".to_string());
        let ext = &self.config.scratch_extension;
        (1u32..)
            .map(|n| dir.join(format!("{}_scratch_{}.{}", stem, n, ext)))
            .find(|candidate| !candidate.exists())
            .unwrap_or_else(|| dir.join(format!("{}_scratch.{}", stem, ext)))
    }

    /// Scratch file shared by all testers of the coder owning `file`.
    pub fn coder_scratch_path(&self, file: &Path) -> PathBuf {
        let stem = file
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "file".to_string());
        let ext = file
            .extension()
            .map(|e| e.to_string_lossy().to_string())
            .unwrap_or_else(|| self.config.scratch_extension.clone());
        let dir = file.parent().unwrap_or(&self.root);
        let first = dir.join(format!("{}_scratch.{}", stem, ext));
        if self.scratch_slot_free(&first) {
            return first;
        }
        (2u32..)
            .map(|n| dir.join(format!("{}_scratch_{}.{}", stem, n, ext)))
            .find(|candidate| self.scratch_slot_free(candidate))
            .unwrap_or(first)
    }

    /// Depth-bounded listing of the codebase below `base`, sorted by name.
    pub fn tree_listing(&self, base: &Path, max_depth: usize) -> String {
        let mut out = format!("{}/\n", self.display_name(base));
        let walker = WalkDir::new(base)
            .min_depth(1)
            .max_depth(max_depth.max(1))
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                e.depth() == 0 || (!Self::is_ignored(e.path()) && !self.is_scratch(e.path()))
            });

        for entry in walker.filter_map(Result::ok) {
            let indent = "  ".repeat(entry.depth());
            let name = entry.file_name().to_string_lossy();
            if entry.file_type().is_dir() {
                out.push_str(&format!("{}{}/\n", indent, name));
            } else {
                out.push_str(&format!("{}{}\n", indent, name));
            }
        }
        out
    }
}
