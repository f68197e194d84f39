//! Scoped handler-set loading.
//!
//! Resolving a handler set temporarily reroots the process working directory
//! and the lookup path to the set's directory, so procedures can touch their
//! data files with relative paths. Both resources are process-wide, so only
//! one scoped load may be active at a time per process: acquisition holds a
//! single global mutex from enter to release. The RAII guard restores exactly
//! the applied steps on every exit path.

use crate::errors::{DispatchError, Result};
use crate::handlers::{HandlerRegistry, HandlerSet};
use crate::path::normalize_path;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Default, Debug)]
struct ResolutionState {
    lookup_path: Vec<PathBuf>,
}

fn resolution() -> &'static Arc<Mutex<ResolutionState>> {
    static RESOLUTION: OnceLock<Arc<Mutex<ResolutionState>>> = OnceLock::new();
    RESOLUTION.get_or_init(|| Arc::new(Mutex::new(ResolutionState::default())))
}

/// Snapshot of the process lookup path, for introspection and tests.
pub async fn current_lookup_path() -> Vec<PathBuf> {
    resolution().lock().await.lookup_path.clone()
}

/// A held scope: the resolved handler set plus the bookkeeping needed to
/// restore the working directory and lookup path.
#[derive(Debug)]
pub struct HandlerScope {
    handler_set: Arc<HandlerSet>,
    _restore: ScopeRestore,
}

impl HandlerScope {
    pub fn handler_set(&self) -> &Arc<HandlerSet> {
        &self.handler_set
    }

    /// Explicit release; dropping the scope does the same.
    pub fn release(self) {}
}

#[derive(Debug)]
struct ScopeRestore {
    scope_dir: PathBuf,
    prior_cwd: Option<PathBuf>,
    inserted: bool,
    guard: OwnedMutexGuard<ResolutionState>,
}

impl Drop for ScopeRestore {
    fn drop(&mut self) {
        if let Some(prior) = self.prior_cwd.take() {
            // Only restore if nothing inside the scope moved us elsewhere
            if let Ok(current) = std::env::current_dir()
                && same_path(&current, &self.scope_dir)
                && let Err(error) = std::env::set_current_dir(&prior)
            {
                tracing::error!(
                    prior = %prior.display(),
                    %error,
                    "Failed to restore working directory on scope release"
                );
            }
        }

        if self.inserted {
            remove_lookup_path(&mut self.guard.lookup_path, &self.scope_dir);
        }
    }
}

/// Acquires a handler-set scope for `directory` and resolves `name` in it.
///
/// Steps already applied when a later step fails are unwound before the error
/// propagates.
pub async fn load_handler_set(
    registry: &HandlerRegistry,
    directory: &Path,
    name: &str,
) -> Result<HandlerScope> {
    let directory = normalize_path(directory);

    let guard = resolution().clone().lock_owned().await;
    let mut restore = ScopeRestore {
        scope_dir: directory.clone(),
        prior_cwd: None,
        inserted: false,
        guard,
    };

    let current = std::env::current_dir()?;
    if !same_path(&current, &directory) {
        std::env::set_current_dir(&directory).map_err(|_| {
            DispatchError::DirectoryNotFound(directory.display().to_string())
        })?;
        restore.prior_cwd = Some(current);
    }

    if insert_lookup_path(&mut restore.guard.lookup_path, &directory) {
        restore.inserted = true;
    }

    let handler_set = resolve_in_scope(registry, &restore.guard.lookup_path, &directory, name)
        .ok_or_else(|| DispatchError::HandlerSetNotFound {
            directory: directory.display().to_string(),
            name: name.to_string(),
        })?;

    Ok(HandlerScope {
        handler_set,
        _restore: restore,
    })
}

/// Resolution searches the scope directory first, then the lookup path in
/// order.
fn resolve_in_scope(
    registry: &HandlerRegistry,
    lookup_path: &[PathBuf],
    scope_dir: &Path,
    name: &str,
) -> Option<Arc<HandlerSet>> {
    registry.resolve(scope_dir, name).or_else(|| {
        lookup_path
            .iter()
            .filter(|entry| !is_sentinel(entry))
            .find_map(|entry| registry.resolve(entry, name))
    })
}

fn is_sentinel(path: &Path) -> bool {
    path.as_os_str().is_empty() || path == Path::new(".")
}

fn same_path(a: &Path, b: &Path) -> bool {
    normalize_path(a) == normalize_path(b)
}

/// Inserts a directory into the lookup path, immediately after any leading
/// sentinel entries (`""` or `"."`), else at position 0. Returns whether the
/// list changed.
fn insert_lookup_path(lookup_path: &mut Vec<PathBuf>, directory: &Path) -> bool {
    if is_sentinel(directory) {
        return false;
    }
    if lookup_path.iter().any(|entry| same_path(entry, directory)) {
        return false;
    }

    let index = match lookup_path.iter().position(|entry| is_sentinel(entry)) {
        Some(sentinel) => sentinel + 1,
        None => 0,
    };
    lookup_path.insert(index, directory.to_path_buf());
    true
}

/// Removes the most recently inserted occurrence of a directory.
fn remove_lookup_path(lookup_path: &mut Vec<PathBuf>, directory: &Path) -> bool {
    for index in (0..lookup_path.len()).rev() {
        if same_path(&lookup_path[index], directory) {
            lookup_path.remove(index);
            return true;
        }
    }
    false
}
