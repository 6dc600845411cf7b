use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};

/// A per-invocation scratch directory, removed on drop unless kept.
#[derive(Debug)]
pub struct Workspace {
    path: PathBuf,
    keep: bool,
}

impl Workspace {
    /// Creates `valfile_<pid>_<n>` under `base`. Names are unique across
    /// threads of this process and across processes.
    pub fn create(base: &Path, keep: bool) -> Result<Self> {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        std::fs::create_dir_all(base)
            .with_context(|| format!("creating temporary directory base: {}", base.display()))?;
        let pid = std::process::id();

        for _ in 0..10_000 {
            let n = COUNTER.fetch_add(1, Ordering::Relaxed);
            let path = base.join(format!("valfile_{pid}_{n}"));
            match std::fs::create_dir(&path) {
                Ok(()) => {
                    tracing::debug!(path = %path.display(), "created workspace");
                    return Ok(Workspace { path, keep });
                }
                Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(err) => {
                    return Err(err).with_context(|| {
                        format!("creating temporary directory: {}", path.display())
                    })
                }
            }
        }
        anyhow::bail!("failed to create unique temporary directory under {}", base.display())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes `bytes` to `rel`, which must be a plain relative path.
    pub fn write_file(&self, rel: &str, bytes: &[u8]) -> Result<PathBuf> {
        ensure_safe_rel_path(Path::new(rel))?;
        let path = self.path.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating directory: {}", parent.display()))?;
        }
        std::fs::write(&path, bytes).with_context(|| format!("writing {}", path.display()))?;
        Ok(path)
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.keep {
            tracing::warn!(path = %self.path.display(), "keeping workspace");
            return;
        }
        if let Err(err) = std::fs::remove_dir_all(&self.path) {
            tracing::warn!(path = %self.path.display(), %err, "failed to remove workspace");
        }
    }
}

pub fn ensure_safe_rel_path(rel: &Path) -> Result<()> {
    if rel.as_os_str().is_empty() || rel.is_absolute() {
        anyhow::bail!("expected safe relative path, got {:?}", rel.display().to_string());
    }
    for c in rel.components() {
        match c {
            Component::Normal(_) => {}
            _ => anyhow::bail!("expected safe relative path, got {:?}", rel.display().to_string()),
        }
    }
    Ok(())
}
