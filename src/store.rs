//! Project persistence.
//!
//! [`ProjectStore`] is the seam between the analysis pipeline and whatever
//! holds project records. Every call takes the caller's `owner_id`
//! explicitly; a project owned by someone else is reported as
//! [`SceneSplitError::ProjectNotFound`], exactly like a missing one.
//!
//! Two implementations ship with the crate:
//!
//! * [`MemoryStore`]: process-local, for tests and embedding.
//! * [`JsonFileStore`]: one JSON document on disk, rewritten atomically
//!   (temp file in the same directory, then rename) on every mutation.

use crate::error::SceneSplitError;
use crate::project::{Project, ProjectStatus};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};
use tracing::debug;

/// A pure snapshot update, see [`Project`]'s `with_*` methods.
pub type ProjectUpdate<'a> = &'a dyn Fn(&Project) -> Result<Project, SceneSplitError>;

/// Owner-scoped storage of [`Project`] snapshots.
pub trait ProjectStore: Send + Sync {
    /// Store a new project and return it.
    fn create(&self, project: Project) -> Result<Project, SceneSplitError>;

    fn get(&self, owner_id: &str, id: &str) -> Result<Project, SceneSplitError>;

    /// The owner's projects, newest first.
    fn list(&self, owner_id: &str) -> Result<Vec<Project>, SceneSplitError>;

    /// The owner's projects with `status`, newest first.
    fn list_by_status(
        &self,
        owner_id: &str,
        status: &ProjectStatus,
    ) -> Result<Vec<Project>, SceneSplitError> {
        Ok(self
            .list(owner_id)?
            .into_iter()
            .filter(|p| &p.status == status)
            .collect())
    }

    /// Replace a project with `update(current)`. Nothing is written when the
    /// update fails.
    fn update(
        &self,
        owner_id: &str,
        id: &str,
        update: ProjectUpdate<'_>,
    ) -> Result<Project, SceneSplitError>;

    fn delete(&self, owner_id: &str, id: &str) -> Result<(), SceneSplitError>;
}

fn not_found(id: &str) -> SceneSplitError {
    SceneSplitError::ProjectNotFound { id: id.to_string() }
}

fn find_owned<'a>(
    projects: &'a IndexMap<String, Project>,
    owner_id: &str,
    id: &str,
) -> Result<&'a Project, SceneSplitError> {
    projects
        .get(id)
        .filter(|p| p.owner_id == owner_id)
        .ok_or_else(|| not_found(id))
}

fn newest_first(projects: &IndexMap<String, Project>, owner_id: &str) -> Vec<Project> {
    let mut owned: Vec<Project> = projects
        .values()
        .filter(|p| p.owner_id == owner_id)
        .cloned()
        .collect();
    owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    owned
}

/// Apply `update` to the owned project, keeping its identity fixed.
fn apply_update(
    projects: &mut IndexMap<String, Project>,
    owner_id: &str,
    id: &str,
    update: ProjectUpdate<'_>,
) -> Result<Project, SceneSplitError> {
    let current = find_owned(projects, owner_id, id)?;
    let mut next = update(current)?;
    next.id = current.id.clone();
    next.owner_id = current.owner_id.clone();
    next.created_at = current.created_at;
    projects.insert(id.to_string(), next.clone());
    Ok(next)
}

fn poisoned() -> SceneSplitError {
    SceneSplitError::Internal("project store lock poisoned".into())
}

// ── In-memory ────────────────────────────────────────────────────────────────

/// Process-local store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    projects: RwLock<IndexMap<String, Project>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProjectStore for MemoryStore {
    fn create(&self, project: Project) -> Result<Project, SceneSplitError> {
        let mut projects = self.projects.write().map_err(|_| poisoned())?;
        projects.insert(project.id.clone(), project.clone());
        Ok(project)
    }

    fn get(&self, owner_id: &str, id: &str) -> Result<Project, SceneSplitError> {
        let projects = self.projects.read().map_err(|_| poisoned())?;
        find_owned(&projects, owner_id, id).cloned()
    }

    fn list(&self, owner_id: &str) -> Result<Vec<Project>, SceneSplitError> {
        let projects = self.projects.read().map_err(|_| poisoned())?;
        Ok(newest_first(&projects, owner_id))
    }

    fn update(
        &self,
        owner_id: &str,
        id: &str,
        update: ProjectUpdate<'_>,
    ) -> Result<Project, SceneSplitError> {
        let mut projects = self.projects.write().map_err(|_| poisoned())?;
        apply_update(&mut projects, owner_id, id, update)
    }

    fn delete(&self, owner_id: &str, id: &str) -> Result<(), SceneSplitError> {
        let mut projects = self.projects.write().map_err(|_| poisoned())?;
        find_owned(&projects, owner_id, id)?;
        projects.shift_remove(id);
        Ok(())
    }
}

// ── JSON file ────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreDocument {
    #[serde(default)]
    projects: Vec<Project>,
}

/// File-backed store. A missing file is an empty store.
///
/// Writes within one process are serialised; concurrent writers in separate
/// processes are last-writer-wins.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn failed(&self, detail: impl ToString) -> SceneSplitError {
        SceneSplitError::StoreFailed {
            path: self.path.clone(),
            detail: detail.to_string(),
        }
    }

    fn load(&self) -> Result<IndexMap<String, Project>, SceneSplitError> {
        let raw = match std::fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(IndexMap::new()),
            Err(e) => return Err(self.failed(e)),
        };
        let doc: StoreDocument = serde_json::from_slice(&raw).map_err(|e| self.failed(e))?;
        Ok(doc
            .projects
            .into_iter()
            .map(|p| (p.id.clone(), p))
            .collect())
    }

    fn save(&self, projects: &IndexMap<String, Project>) -> Result<(), SceneSplitError> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(|e| self.failed(e))?;

        let doc = StoreDocument {
            projects: projects.values().cloned().collect(),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(|e| self.failed(e))?;
        serde_json::to_writer_pretty(&mut tmp, &doc).map_err(|e| self.failed(e))?;
        tmp.write_all(b"\n").map_err(|e| self.failed(e))?;
        tmp.as_file().sync_all().map_err(|e| self.failed(e))?;
        tmp.persist(&self.path).map_err(|e| self.failed(e.error))?;

        debug!("Wrote {} projects to {}", doc.projects.len(), self.path.display());
        Ok(())
    }
}

impl ProjectStore for JsonFileStore {
    fn create(&self, project: Project) -> Result<Project, SceneSplitError> {
        let _guard = self.lock.lock().map_err(|_| poisoned())?;
        let mut projects = self.load()?;
        projects.insert(project.id.clone(), project.clone());
        self.save(&projects)?;
        Ok(project)
    }

    fn get(&self, owner_id: &str, id: &str) -> Result<Project, SceneSplitError> {
        let projects = self.load()?;
        find_owned(&projects, owner_id, id).cloned()
    }

    fn list(&self, owner_id: &str) -> Result<Vec<Project>, SceneSplitError> {
        Ok(newest_first(&self.load()?, owner_id))
    }

    fn update(
        &self,
        owner_id: &str,
        id: &str,
        update: ProjectUpdate<'_>,
    ) -> Result<Project, SceneSplitError> {
        let _guard = self.lock.lock().map_err(|_| poisoned())?;
        let mut projects = self.load()?;
        let next = apply_update(&mut projects, owner_id, id, update)?;
        self.save(&projects)?;
        Ok(next)
    }

    fn delete(&self, owner_id: &str, id: &str) -> Result<(), SceneSplitError> {
        let _guard = self.lock.lock().map_err(|_| poisoned())?;
        let mut projects = self.load()?;
        find_owned(&projects, owner_id, id)?;
        projects.shift_remove(id);
        self.save(&projects)
    }
}
