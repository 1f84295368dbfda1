//! Git-backed workspace provider.
//!
//! Each fetch clones into `<root>/<slug>-<ulid>`. The ULID suffix makes every
//! workspace path unique, including repeated fetches of the same reference.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::{debug, info, warn};
use ulid::Ulid;

use refresh_types::{RepositoryReference, Settings, Workspace};

use crate::error::{CleanupError, FetchError};
use crate::provider::WorkspaceProvider;

/// Clone settings for [`GitWorkspaceProvider`].
#[derive(Debug, Clone)]
pub struct GitWorkspaceConfig {
    /// Parent directory of all workspaces
    pub root: PathBuf,
    /// Shallow clone depth (0 = full history). Ignored for local paths.
    pub depth: u32,
    /// Branch to check out; remote HEAD when `None`
    pub branch: Option<String>,
}

impl GitWorkspaceConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            depth: 1,
            branch: None,
        }
    }

    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            root: settings.expanded_workspace_root(),
            depth: settings.git.depth,
            branch: settings.git.branch.clone(),
        }
    }
}

/// Clones repositories with libgit2.
pub struct GitWorkspaceProvider {
    config: GitWorkspaceConfig,
}

impl GitWorkspaceProvider {
    pub fn new(config: GitWorkspaceConfig) -> Self {
        Self { config }
    }

    pub fn root(&self) -> &Path {
        &self.config.root
    }

    fn allocate_path(&self, reference: &RepositoryReference) -> PathBuf {
        self.config
            .root
            .join(format!("{}-{}", reference.slug(), Ulid::new()))
    }
}

#[async_trait]
impl WorkspaceProvider for GitWorkspaceProvider {
    async fn fetch(&self, reference: &RepositoryReference) -> Result<Workspace, FetchError> {
        tokio::fs::create_dir_all(&self.config.root).await?;

        let path = self.allocate_path(reference);
        info!(repo = %reference, path = ?path, "Cloning repository");

        let url = reference.as_str().to_string();
        let dest = path.clone();
        let depth = self.config.depth;
        let branch = self.config.branch.clone();
        let handoff = Arc::new(CloneHandoff::default());
        let mut guard = AbandonOnDrop::new(handoff.clone(), path.clone());

        let joined = tokio::task::spawn_blocking(move || {
            let result = clone_into(&url, &dest, depth, branch.as_deref(), &handoff);
            handoff.settle(&dest, result.is_ok());
            result
        })
        .await;
        guard.disarm();

        match joined {
            Ok(Ok(())) => {
                debug!(repo = %reference, path = ?path, "Clone complete");
                Ok(Workspace::new(reference.clone(), path))
            }
            // the blocking side already removed the destination
            Ok(Err(e)) => Err(FetchError::Clone {
                reference: reference.to_string(),
                reason: e.message().to_string(),
            }),
            Err(e) => {
                remove_partial(&path).await;
                Err(FetchError::Task(e.to_string()))
            }
        }
    }

    async fn destroy(&self, workspace: &Workspace) -> Result<(), CleanupError> {
        let path = workspace.path();

        if !path.starts_with(&self.config.root) || path == self.config.root {
            return Err(CleanupError::OutsideRoot {
                path: path.to_path_buf(),
                root: self.config.root.clone(),
            });
        }

        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(CleanupError::Missing(path.to_path_buf()));
        }

        tokio::fs::remove_dir_all(path)
            .await
            .map_err(|source| CleanupError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        debug!(path = ?path, "Workspace removed");
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CloneState {
    Running,
    /// The fetch future was dropped before it received the result
    Abandoned,
    /// The clone finished and the destination holds a complete checkout
    Finished,
}

/// State shared by a fetch future and the blocking clone it started.
#[derive(Debug)]
struct CloneHandoff {
    state: Mutex<CloneState>,
}

impl Default for CloneHandoff {
    fn default() -> Self {
        Self {
            state: Mutex::new(CloneState::Running),
        }
    }
}

impl CloneHandoff {
    fn state(&self) -> MutexGuard<'_, CloneState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_abandoned(&self) -> bool {
        *self.state() == CloneState::Abandoned
    }

    /// Called on the blocking thread once libgit2 returns. Nobody will claim
    /// a failed or abandoned clone, so it is removed here.
    fn settle(&self, dest: &Path, cloned: bool) {
        let mut state = self.state();
        if !cloned || *state == CloneState::Abandoned {
            discard(dest);
        }
        if *state == CloneState::Running {
            *state = CloneState::Finished;
        }
    }
}

/// Marks the clone abandoned if the fetch future is dropped mid-flight,
/// which happens on attempt timeout and on cancellation.
struct AbandonOnDrop {
    handoff: Option<Arc<CloneHandoff>>,
    path: PathBuf,
}

impl AbandonOnDrop {
    fn new(handoff: Arc<CloneHandoff>, path: PathBuf) -> Self {
        Self {
            handoff: Some(handoff),
            path,
        }
    }

    fn disarm(&mut self) {
        self.handoff = None;
    }
}

impl Drop for AbandonOnDrop {
    fn drop(&mut self) {
        let Some(handoff) = self.handoff.take() else {
            return;
        };
        let mut state = handoff.state();
        match *state {
            CloneState::Running => *state = CloneState::Abandoned,
            // finished between the last poll and the drop: the checkout is ours to delete
            CloneState::Finished => {
                *state = CloneState::Abandoned;
                let path = self.path.clone();
                match tokio::runtime::Handle::try_current() {
                    Ok(handle) => {
                        handle.spawn_blocking(move || discard(&path));
                    }
                    Err(_) => discard(&path),
                }
            }
            CloneState::Abandoned => {}
        }
        debug!(path = ?self.path, "Clone abandoned");
    }
}

fn clone_into(
    url: &str,
    dest: &Path,
    depth: u32,
    branch: Option<&str>,
    handoff: &Arc<CloneHandoff>,
) -> Result<(), git2::Error> {
    let mut callbacks = git2::RemoteCallbacks::new();
    let watched = handoff.clone();
    // returning false makes libgit2 abort the transfer
    callbacks.transfer_progress(move |_| !watched.is_abandoned());

    let mut fetch_options = git2::FetchOptions::new();
    fetch_options.remote_callbacks(callbacks);
    // libgit2's local transport does not support shallow fetches
    if depth > 0 && !is_local_reference(url) {
        fetch_options.depth(i32::try_from(depth).unwrap_or(i32::MAX));
    }

    let mut builder = git2::build::RepoBuilder::new();
    builder.fetch_options(fetch_options);
    if let Some(branch) = branch {
        builder.branch(branch);
    }

    builder.clone(url, dest)?;
    Ok(())
}

fn is_local_reference(url: &str) -> bool {
    url.starts_with("file://") || Path::new(url).exists()
}

fn discard(path: &Path) {
    if path.exists() {
        if let Err(e) = std::fs::remove_dir_all(path) {
            warn!(path = ?path, error = %e, "Failed to remove abandoned clone");
        }
    }
}

async fn remove_partial(path: &Path) {
    if tokio::fs::try_exists(path).await.unwrap_or(false) {
        if let Err(e) = tokio::fs::remove_dir_all(path).await {
            warn!(path = ?path, error = %e, "Failed to remove partial clone");
        }
    }
}
