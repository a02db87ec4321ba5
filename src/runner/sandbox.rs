//! Disposable workspaces for agent runs.
//!
//! Every (agent, task) pair gets its own sandbox under
//! `<project>/.agentarena/worktrees/run-<id>`:
//! - inside a git repository, a detached `git worktree` at the base ref
//!   (shares object storage with the main repository)
//! - anywhere else, a recursive copy of the project tree
//!
//! Destroying a sandbox is best-effort and never fails the benchmark.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info, warn};
use uuid::Uuid;
use walkdir::{DirEntry, WalkDir};

/// Hidden directory, relative to the project root, holding all sandboxes.
pub const SANDBOX_DIR: &str = ".agentarena/worktrees";

/// Top-level hidden directory owned by agentarena.
pub const ARENA_DIR: &str = ".agentarena";

/// Directory names never copied into a copy-based sandbox.
const COPY_EXCLUDES: &[&str] = &[
    ".git",
    ARENA_DIR,
    ".venv",
    "venv",
    "node_modules",
    "__pycache__",
    ".pytest_cache",
    ".mypy_cache",
    ".ruff_cache",
    ".tox",
];

/// How a sandbox is backed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxStrategy {
    /// Detached git worktree.
    Worktree,
    /// Plain recursive copy.
    Copy,
}

impl std::fmt::Display for SandboxStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SandboxStrategy::Worktree => write!(f, "worktree"),
            SandboxStrategy::Copy => write!(f, "copy"),
        }
    }
}

/// Handle to one isolated workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sandbox {
    /// Unique identifier, also the directory name.
    pub id: String,
    /// Absolute or project-relative path of the workspace.
    pub path: PathBuf,
    /// Backing strategy, decides how the sandbox is destroyed.
    pub strategy: SandboxStrategy,
}

/// Error types for sandbox operations.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("Failed to create {strategy} sandbox at {path}: {reason}")]
    Creation {
        strategy: SandboxStrategy,
        path: String,
        reason: String,
    },

    #[error("Failed to create sandbox root {path}: {source}")]
    Root {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("git {args} failed: {stderr}")]
    Git { args: String, stderr: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Returns the directory sandboxes are created in.
pub fn sandbox_root(project_root: &Path) -> PathBuf {
    project_root.join(SANDBOX_DIR)
}

/// Creates the hidden sandbox root and returns its absolute path.
/// Failing here should abort a run.
pub async fn prepare_sandbox_root(project_root: &Path) -> Result<PathBuf, SandboxError> {
    let root = sandbox_root(project_root);
    let root_error = |source| SandboxError::Root {
        path: root.display().to_string(),
        source,
    };
    tokio::fs::create_dir_all(&root).await.map_err(root_error)?;
    // git resolves relative worktree paths against the repo, not our cwd.
    tokio::fs::canonicalize(&root).await.map_err(root_error)
}

/// Checks whether `path` is inside a git repository.
pub async fn is_git_repo(path: &Path) -> bool {
    run_git(&["rev-parse", "--git-dir"], path).await.is_ok()
}

/// Creates an isolated workspace, picking the strategy from the project.
pub async fn create_sandbox(project_root: &Path, git_ref: &str) -> Result<Sandbox, SandboxError> {
    if is_git_repo(project_root).await {
        create_worktree(project_root, git_ref).await
    } else {
        create_copy(project_root).await
    }
}

/// Destroys a sandbox. Missing paths are a no-op and failures are only logged.
pub async fn destroy_sandbox(project_root: &Path, sandbox: &Sandbox) {
    if !tokio::fs::try_exists(&sandbox.path).await.unwrap_or(false) {
        debug!("Sandbox {} already gone", sandbox.path.display());
        return;
    }

    match sandbox.strategy {
        SandboxStrategy::Worktree => remove_worktree(project_root, &sandbox.path).await,
        SandboxStrategy::Copy => remove_copy(&sandbox.path).await,
    }
    info!("Destroyed sandbox {}", sandbox.id);
}

/// Lists the paths of all worktrees registered with the repository.
pub async fn list_worktrees(repo: &Path) -> Result<Vec<PathBuf>, SandboxError> {
    let stdout = run_git(&["worktree", "list", "--porcelain"], repo).await?;
    Ok(stdout
        .lines()
        .filter_map(|line| line.strip_prefix("worktree "))
        .map(PathBuf::from)
        .collect())
}

/// Generates a fresh sandbox identifier, unique across concurrent callers.
fn new_sandbox_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("run-{}", &hex[..12])
}

async fn create_worktree(repo: &Path, git_ref: &str) -> Result<Sandbox, SandboxError> {
    let id = new_sandbox_id();
    let root = prepare_sandbox_root(repo).await?;
    let path = root.join(&id);
    let path_str = path.to_string_lossy().to_string();

    run_git(&["worktree", "add", &path_str, "--detach", git_ref], repo)
        .await
        .map_err(|e| SandboxError::Creation {
            strategy: SandboxStrategy::Worktree,
            path: path_str.clone(),
            reason: match e {
                SandboxError::Git { stderr, .. } => stderr,
                other => other.to_string(),
            },
        })?;

    info!("Created worktree sandbox {} at {}", id, git_ref);
    Ok(Sandbox {
        id,
        path,
        strategy: SandboxStrategy::Worktree,
    })
}

async fn remove_worktree(repo: &Path, path: &Path) {
    let path_str = path.to_string_lossy().to_string();
    let Err(e) = run_git(&["worktree", "remove", &path_str, "--force"], repo).await else {
        return;
    };

    warn!("worktree remove failed for {}: {}; pruning", path_str, e);
    if let Err(e) = run_git(&["worktree", "prune"], repo).await {
        warn!("worktree prune failed: {}", e);
    }
}

async fn create_copy(project_root: &Path) -> Result<Sandbox, SandboxError> {
    let id = new_sandbox_id();
    let root = prepare_sandbox_root(project_root).await?;
    let path = root.join(&id);

    let src = project_root.to_path_buf();
    let dst = path.clone();
    let copied = tokio::task::spawn_blocking(move || copy_tree(&src, &dst))
        .await
        .map_err(|e| std::io::Error::other(e.to_string()))
        .and_then(|r| r);

    if let Err(e) = copied {
        remove_copy(&path).await;
        return Err(SandboxError::Creation {
            strategy: SandboxStrategy::Copy,
            path: path.display().to_string(),
            reason: e.to_string(),
        });
    }

    info!("Created copy sandbox {}", id);
    Ok(Sandbox {
        id,
        path,
        strategy: SandboxStrategy::Copy,
    })
}

async fn remove_copy(path: &Path) {
    let target = path.to_path_buf();
    let removed = tokio::task::spawn_blocking(move || std::fs::remove_dir_all(&target)).await;
    match removed {
        Ok(Ok(())) => {}
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {}
        Ok(Err(e)) => warn!("Failed to remove sandbox {}: {}", path.display(), e),
        Err(e) => warn!("Sandbox removal task failed for {}: {}", path.display(), e),
    }
}

fn is_excluded(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| COPY_EXCLUDES.contains(&name))
}

/// Recursively copies `src` into `dst`, skipping excluded directories.
fn copy_tree(src: &Path, dst: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dst)?;

    let walker = WalkDir::new(src)
        .min_depth(1)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| !is_excluded(e));

    for entry in walker {
        let entry = entry.map_err(std::io::Error::other)?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(std::io::Error::other)?;
        let target = dst.join(rel);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            std::fs::create_dir_all(&target)?;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)?;
        } else if file_type.is_file() {
            std::fs::copy(entry.path(), &target)?;
        } else {
            // Opening a FIFO for reading blocks until a writer shows up.
            debug!("Skipping special file {}", entry.path().display());
        }
    }

    Ok(())
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dst: &Path) -> std::io::Result<()> {
    let link = std::fs::read_link(src)?;
    std::os::unix::fs::symlink(link, dst)
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, dst: &Path) -> std::io::Result<()> {
    std::fs::copy(src, dst).map(|_| ())
}

/// Runs git in `cwd`, returning stdout on success.
async fn run_git(args: &[&str], cwd: &Path) -> Result<String, SandboxError> {
    let output = Command::new("git")
        .args(args)
        .current_dir(cwd)
        .output()
        .await?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    } else {
        Err(SandboxError::Git {
            args: args.join(" "),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::process::Command as StdCommand;
    use tempfile::TempDir;

    fn git(dir: &Path, args: &[&str]) -> bool {
        StdCommand::new("git")
            .args(args)
            .current_dir(dir)
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    /// Initialises a repo with one commit. Returns false if git is unavailable.
    fn init_repo(dir: &Path) -> bool {
        std::fs::write(dir.join("hello.txt"), "hello").unwrap();
        git(dir, &["init", "-q"])
            && git(dir, &["config", "user.email", "test@test.com"])
            && git(dir, &["config", "user.name", "Test"])
            && git(dir, &["add", "."])
            && git(dir, &["commit", "-q", "-m", "init"])
    }

    #[test]
    fn test_sandbox_ids_unique() {
        let ids: HashSet<String> = (0..1000).map(|_| new_sandbox_id()).collect();
        assert_eq!(ids.len(), 1000);
        assert!(ids.iter().all(|id| id.starts_with("run-") && id.len() == 16));
    }

    #[tokio::test]
    async fn test_copy_sandbox_excludes_metadata() {
        let project = TempDir::new().unwrap();
        let root = project.path();
        std::fs::write(root.join("data.txt"), "test data").unwrap();
        std::fs::create_dir_all(root.join("src/nested")).unwrap();
        std::fs::write(root.join("src/nested/lib.py"), "x = 1").unwrap();
        std::fs::create_dir_all(root.join("node_modules/pkg")).unwrap();
        std::fs::write(root.join("node_modules/pkg/index.js"), "").unwrap();
        std::fs::create_dir_all(root.join("src/__pycache__")).unwrap();
        std::fs::write(root.join("src/__pycache__/lib.pyc"), "").unwrap();

        let sandbox = create_copy(root).await.unwrap();
        assert_eq!(sandbox.strategy, SandboxStrategy::Copy);
        assert!(sandbox.path.starts_with(sandbox_root(root).canonicalize().unwrap()));
        assert_eq!(
            std::fs::read_to_string(sandbox.path.join("data.txt")).unwrap(),
            "test data"
        );
        assert!(sandbox.path.join("src/nested/lib.py").exists());
        assert!(!sandbox.path.join("node_modules").exists());
        assert!(!sandbox.path.join("src/__pycache__").exists());
        assert!(!sandbox.path.join(ARENA_DIR).exists());

        destroy_sandbox(root, &sandbox).await;
        assert!(!sandbox.path.exists());
        assert!(root.join("data.txt").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_copy_sandbox_skips_fifo() {
        let project = TempDir::new().unwrap();
        std::fs::write(project.path().join("a.txt"), "a").unwrap();
        let made_fifo = StdCommand::new("mkfifo")
            .arg(project.path().join("pipe"))
            .status()
            .map(|s| s.success())
            .unwrap_or(false);
        if !made_fifo {
            return;
        }

        let sandbox = tokio::time::timeout(
            std::time::Duration::from_secs(10),
            create_copy(project.path()),
        )
        .await
        .expect("copy sandbox creation blocked on a FIFO")
        .unwrap();

        assert!(sandbox.path.join("a.txt").exists());
        assert!(!sandbox.path.join("pipe").exists());
        destroy_sandbox(project.path(), &sandbox).await;
    }

    #[tokio::test]
    async fn test_copy_sandboxes_do_not_nest() {
        let project = TempDir::new().unwrap();
        std::fs::write(project.path().join("a.txt"), "a").unwrap();

        let first = create_copy(project.path()).await.unwrap();
        let second = create_copy(project.path()).await.unwrap();
        assert_ne!(first.path, second.path);
        assert!(!second.path.join(SANDBOX_DIR).exists());

        destroy_sandbox(project.path(), &first).await;
        destroy_sandbox(project.path(), &second).await;
    }

    #[tokio::test]
    async fn test_destroy_missing_sandbox_is_noop() {
        let project = TempDir::new().unwrap();
        for strategy in [SandboxStrategy::Copy, SandboxStrategy::Worktree] {
            let sandbox = Sandbox {
                id: "run-missing".to_string(),
                path: project.path().join(SANDBOX_DIR).join("run-missing"),
                strategy,
            };
            destroy_sandbox(project.path(), &sandbox).await;
            assert!(!sandbox.path.exists());
        }
        assert!(!project.path().join(ARENA_DIR).exists());
    }

    #[tokio::test]
    async fn test_prepare_sandbox_root() {
        let project = TempDir::new().unwrap();
        let root = prepare_sandbox_root(project.path()).await.unwrap();
        assert!(root.is_dir());
        assert!(root.is_absolute());
        assert_eq!(root, sandbox_root(project.path()).canonicalize().unwrap());
    }

    #[tokio::test]
    async fn test_worktree_sandbox_lifecycle() {
        let project = TempDir::new().unwrap();
        if !init_repo(project.path()) {
            return;
        }
        assert!(is_git_repo(project.path()).await);

        let sandbox = create_sandbox(project.path(), "HEAD").await.unwrap();
        assert_eq!(sandbox.strategy, SandboxStrategy::Worktree);
        assert_eq!(
            std::fs::read_to_string(sandbox.path.join("hello.txt")).unwrap(),
            "hello"
        );

        let worktrees = list_worktrees(project.path()).await.unwrap();
        assert_eq!(worktrees.len(), 2);

        destroy_sandbox(project.path(), &sandbox).await;
        assert!(!sandbox.path.exists());
        assert_eq!(list_worktrees(project.path()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_worktree_bad_ref_reports_git_stderr() {
        let project = TempDir::new().unwrap();
        if !init_repo(project.path()) {
            return;
        }

        let err = create_sandbox(project.path(), "no-such-ref").await.unwrap_err();
        match err {
            SandboxError::Creation { strategy, reason, .. } => {
                assert_eq!(strategy, SandboxStrategy::Worktree);
                assert!(!reason.is_empty());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_plain_dir_is_not_git_repo() {
        let project = TempDir::new().unwrap();
        // Guard against a temp dir that happens to live inside a checkout.
        if git(project.path(), &["rev-parse", "--git-dir"]) {
            return;
        }
        assert!(!is_git_repo(project.path()).await);
    }
}
