//! Removal of empty log artifacts at exit.

// External crates
use std::fs;
use std::io;
use std::path::Path;
use tracing::instrument;

/// What the exit cleanup managed to remove, and what it could not.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// The log file was empty and is gone.
    pub file_removed: bool,
    /// The module directory was left empty and is gone.
    pub module_dir_removed: bool,
    /// The log root was left empty and is gone.
    pub root_dir_removed: bool,
    /// One human readable line per failed step.
    pub failures: Vec<String>,
}

/// Remove the log file if it is empty, then its directory and the log root
/// if they are left empty.
///
/// The three steps are independent: a failure is recorded, printed to
/// stderr and the next step is still attempted. Nothing here returns an
/// error.
#[instrument(
    name = "sutools_cleanup::out",
    target = "logger::cleanup",
    level = "debug",
    skip_all,
    fields(log_file = %log_path.display())
)]
pub fn remove_empty_artifacts(log_path: &Path) -> CleanupReport {
    let mut report = CleanupReport::default();

    match remove_if_empty_file(log_path) {
        Ok(removed) => report.file_removed = removed,
        Err(e) => record_failure(&mut report, format!("Failed to remove file: {e}")),
    }

    let Some(module_dir) = non_empty_parent(log_path) else {
        return report;
    };
    match remove_if_empty_dir(module_dir) {
        Ok(removed) => report.module_dir_removed = removed,
        Err(e) => record_failure(&mut report, format!("Failed to remove module folder: {e}")),
    }

    let Some(root_dir) = non_empty_parent(module_dir) else {
        return report;
    };
    match remove_if_empty_dir(root_dir) {
        Ok(removed) => report.root_dir_removed = removed,
        Err(e) => record_failure(&mut report, format!("Failed to remove log folder: {e}")),
    }

    tracing::debug!(
        file_removed = report.file_removed,
        module_dir_removed = report.module_dir_removed,
        root_dir_removed = report.root_dir_removed,
        failures = report.failures.len(),
        "Exit cleanup finished"
    );
    report
}

fn remove_if_empty_file(path: &Path) -> io::Result<bool> {
    if fs::metadata(path)?.len() != 0 {
        return Ok(false);
    }
    fs::remove_file(path)?;
    Ok(true)
}

fn remove_if_empty_dir(dir: &Path) -> io::Result<bool> {
    if fs::read_dir(dir)?.next().is_some() {
        return Ok(false);
    }
    fs::remove_dir(dir)?;
    Ok(true)
}

fn non_empty_parent(path: &Path) -> Option<&Path> {
    path.parent().filter(|p| !p.as_os_str().is_empty())
}

fn record_failure(report: &mut CleanupReport, message: String) {
    eprintln!("{message}");
    tracing::warn!(%message, "Exit cleanup step failed");
    report.failures.push(message);
}
