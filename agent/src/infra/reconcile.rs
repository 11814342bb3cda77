//! Filesystem implementation of the `TreeReconciler` port.

use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::application::ports::TreeReconciler;
use crate::domain::IgnoreRules;
use crate::domain::reconcile::{ReconcileReport, plan};

/// Mirrors `reference` onto `target`, honoring the ignore file.
#[derive(Debug, Clone)]
pub struct FsReconciler {
    reference: PathBuf,
    target: PathBuf,
    ignore_file: PathBuf,
}

impl FsReconciler {
    #[must_use]
    pub fn new(reference: PathBuf, target: PathBuf, ignore_file: PathBuf) -> Self {
        Self {
            reference,
            target,
            ignore_file,
        }
    }

    fn reconcile_sync(&self) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        let rules = match std::fs::read_to_string(&self.ignore_file) {
            Ok(content) => IgnoreRules::parse(&content),
            Err(e) if e.kind() == ErrorKind::NotFound => IgnoreRules::default(),
            Err(e) => {
                report
                    .errors
                    .push(format!("reading {}: {e}", self.ignore_file.display()));
                IgnoreRules::default()
            }
        };

        let reference_files = match list_files(&self.reference) {
            Ok(files) => files,
            Err(e) => {
                report.errors.push(format!("{e:#}"));
                return report;
            }
        };
        let target_files = if self.target.exists() {
            match list_files(&self.target) {
                Ok(files) => files,
                Err(e) => {
                    report.errors.push(format!("{e:#}"));
                    return report;
                }
            }
        } else {
            Vec::new()
        };

        let work = plan(&reference_files, &target_files, &rules);
        for rel in work.candidates {
            let src = self.reference.join(&rel);
            let dst = self.target.join(&rel);
            match sync_file(&src, &dst) {
                Ok(true) => {
                    tracing::debug!(file = %rel, "restored from reference");
                    report.fixed.push(rel);
                }
                Ok(false) => {}
                Err(e) => report.errors.push(format!("{rel}: {e:#}")),
            }
        }
        let ignore_rel = self
            .ignore_file
            .strip_prefix(&self.target)
            .ok()
            .map(|p| p.to_string_lossy().replace('\\', "/"));
        for rel in work.orphans {
            if ignore_rel.as_deref() == Some(rel.as_str()) {
                continue;
            }
            match std::fs::remove_file(self.target.join(&rel)) {
                Ok(()) => {
                    tracing::debug!(file = %rel, "removed file absent from reference");
                    report.removed.push(rel);
                }
                Err(e) => report.errors.push(format!("{rel}: removing: {e}")),
            }
        }
        report
    }
}

impl TreeReconciler for FsReconciler {
    async fn reconcile(&self) -> ReconcileReport {
        let this = self.clone();
        match tokio::task::spawn_blocking(move || this.reconcile_sync()).await {
            Ok(report) => report,
            Err(e) => ReconcileReport {
                errors: vec![format!("reconcile task failed: {e}")],
                ..ReconcileReport::default()
            },
        }
    }
}

/// Copy `src` over `dst` when missing or different. `Ok(true)` if copied.
fn sync_file(src: &Path, dst: &Path) -> Result<bool> {
    if dst.is_file() && sha256_file(src)? == sha256_file(dst)? {
        return Ok(false);
    }
    if let Some(parent) = dst.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating directory {}", parent.display()))?;
    }
    std::fs::copy(src, dst).with_context(|| format!("copying to {}", dst.display()))?;
    Ok(true)
}

/// Relative `/`-separated paths of every regular file under `root`, sorted.
/// Symlinks are not followed.
fn list_files(root: &Path) -> Result<Vec<String>> {
    let mut out = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry.with_context(|| format!("walking {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        if let Ok(rel) = entry.path().strip_prefix(root) {
            let parts: Vec<_> = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            out.push(parts.join("/"));
        }
    }
    out.sort();
    Ok(out)
}

fn sha256_file(path: &Path) -> Result<Vec<u8>> {
    let mut file =
        std::fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 65536];
    loop {
        let n = file
            .read(&mut buf)
            .with_context(|| format!("reading {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_vec())
}
