//! Count and age based pruning of old log files.

// Local crates
use crate::helpers::errors::{Result, SutoolsError, TimeoutParseError};

// External crates
use chrono::{DateTime, TimeDelta, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::instrument;
use walkdir::WalkDir;

/// Only files with this suffix are considered by the retention policies.
pub const LOG_SUFFIX: &str = ".log";

lazy_static! {
    static ref TIMEOUT_AMOUNT: Regex = Regex::new(r"^\d+$").expect("valid timeout amount regex");
}

/// A log file together with the instant it was created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFile {
    /// Location of the log file.
    pub path: PathBuf,
    /// Birth time, or modification time where the filesystem has none.
    pub created: DateTime<Utc>,
}

/// List the `.log` files directly inside `dir`.
///
/// Creation time falls back to the modification time on filesystems that do
/// not record it. A missing directory yields an empty list.
#[instrument(
    name = "sutools_retention::scan",
    target = "logger::retention",
    level = "debug",
    skip_all,
    fields(dir = %dir.display())
)]
pub fn scan_logs(dir: &Path) -> Result<Vec<LogFile>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut logs = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).follow_links(false) {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| dir.to_path_buf());
            SutoolsError::io(path, e.into())
        })?;

        if !entry.file_type().is_file() {
            continue;
        }
        let is_log = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.ends_with(LOG_SUFFIX));
        if !is_log {
            continue;
        }

        let metadata = entry
            .metadata()
            .map_err(|e| SutoolsError::io(entry.path(), e.into()))?;
        let created = metadata
            .created()
            .or_else(|_| metadata.modified())
            .map_err(|e| SutoolsError::io(entry.path(), e))?;

        logs.push(LogFile {
            path: entry.into_path(),
            created: DateTime::<Utc>::from(created),
        });
    }

    tracing::debug!(count = logs.len(), "Scanned log directory");
    Ok(logs)
}

/// Outcome of the count based policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CapReport {
    /// Files deleted.
    pub removed: usize,
    /// Files left in place.
    pub kept: usize,
}

impl fmt::Display for CapReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.removed {
            0 => Ok(()),
            1 => f.write_str("filecap reached"),
            n => write!(f, "filecap removed {n} logs"),
        }
    }
}

/// Keep the `max` most recently created files and delete the rest.
#[instrument(
    name = "sutools_retention::cap",
    target = "logger::retention",
    level = "debug",
    skip(files)
)]
pub fn cap(max: usize, mut files: Vec<LogFile>) -> CapReport {
    files.sort_by(|a, b| b.created.cmp(&a.created));

    let kept = files.len().min(max);
    let removed = files
        .iter()
        .skip(max)
        .filter(|log| remove_log(&log.path))
        .count();

    CapReport { removed, kept }
}

/// Time unit of a retention window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    /// `m`
    Minutes,
    /// `h`
    Hours,
    /// `d`
    Days,
    /// 30 days.
    Months,
    /// 365 days.
    Years,
}

impl TimeUnit {
    fn from_char(c: char) -> Option<Self> {
        match c {
            'm' => Some(TimeUnit::Minutes),
            'h' => Some(TimeUnit::Hours),
            'd' => Some(TimeUnit::Days),
            'o' => Some(TimeUnit::Months),
            'y' => Some(TimeUnit::Years),
            _ => None,
        }
    }
}

/// A parsed `<amount><unit>` retention window such as `30m` or `2y`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutWindow {
    /// How many units.
    pub amount: i64,
    /// Unit the amount is counted in.
    pub unit: TimeUnit,
}

impl TimeoutWindow {
    /// Length of the window, `None` when it overflows.
    pub fn span(&self) -> Option<TimeDelta> {
        match self.unit {
            TimeUnit::Minutes => TimeDelta::try_minutes(self.amount),
            TimeUnit::Hours => TimeDelta::try_hours(self.amount),
            TimeUnit::Days => TimeDelta::try_days(self.amount),
            TimeUnit::Months => TimeDelta::try_days(self.amount.checked_mul(30)?),
            TimeUnit::Years => TimeDelta::try_days(self.amount.checked_mul(365)?),
        }
    }

    /// Files created before this instant are expired.
    pub fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        now.checked_sub_signed(self.span()?)
    }
}

impl FromStr for TimeoutWindow {
    type Err = TimeoutParseError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        let unit_char = s.chars().last().ok_or(TimeoutParseError::Empty)?;
        let unit = TimeUnit::from_char(unit_char).ok_or(TimeoutParseError::InvalidUnit(unit_char))?;

        let amount = &s[..s.len() - unit_char.len_utf8()];
        if !TIMEOUT_AMOUNT.is_match(amount) {
            return Err(TimeoutParseError::InvalidAmount(amount.to_string()));
        }
        let amount = amount
            .parse::<i64>()
            .map_err(|_| TimeoutParseError::InvalidAmount(amount.to_string()))?;

        Ok(Self { amount, unit })
    }
}

/// Delete every file created before `now - window`.
///
/// An unparseable window is reported with a single warning and deletes
/// nothing; the parse error is handed back for callers that care.
#[instrument(
    name = "sutools_retention::timeout",
    target = "logger::retention",
    level = "debug",
    skip(files, now)
)]
pub fn timeout(
    window: &str,
    files: &[LogFile],
    now: DateTime<Utc>,
) -> std::result::Result<usize, TimeoutParseError> {
    let parsed = match window.parse::<TimeoutWindow>() {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::warn!(window, "{e}");
            return Err(e);
        }
    };

    let Some(cutoff) = parsed.cutoff(now) else {
        tracing::debug!(window, "Timeout window reaches past the representable range");
        return Ok(0);
    };

    let removed = files
        .iter()
        .filter(|log| log.created < cutoff)
        .filter(|log| remove_log(&log.path))
        .count();

    Ok(removed)
}

fn remove_log(path: &Path) -> bool {
    match fs::remove_file(path) {
        Ok(()) => {
            tracing::debug!(file = %path.display(), "Removed expired log file");
            true
        }
        Err(e) => {
            tracing::warn!(error = %e, file = %path.display(), "Failed to remove log file");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, name: &str, created: DateTime<Utc>) -> LogFile {
        let path = dir.join(name);
        fs::write(&path, "entry\n").expect("write log");
        LogFile { path, created }
    }

    #[test]
    fn parses_windows() {
        assert_eq!(
            "30m".parse::<TimeoutWindow>(),
            Ok(TimeoutWindow { amount: 30, unit: TimeUnit::Minutes })
        );
        assert_eq!(
            "2o".parse::<TimeoutWindow>().map(|w| w.span()),
            Ok(TimeDelta::try_days(60))
        );
        assert_eq!("1y".parse::<TimeoutWindow>().map(|w| w.span()), Ok(TimeDelta::try_days(365)));
        assert_eq!("1z".parse::<TimeoutWindow>(), Err(TimeoutParseError::InvalidUnit('z')));
        assert_eq!(
            "xh".parse::<TimeoutWindow>(),
            Err(TimeoutParseError::InvalidAmount("x".into()))
        );
        assert_eq!("".parse::<TimeoutWindow>(), Err(TimeoutParseError::Empty));
    }

    #[test]
    fn timeout_removes_only_files_older_than_the_window() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let now = Utc::now();
        let files = vec![
            touch(dir.path(), "two_years.log", now - TimeDelta::days(730)),
            touch(dir.path(), "thirty_days.log", now - TimeDelta::days(30)),
            touch(dir.path(), "five_hours.log", now - TimeDelta::hours(5)),
            touch(dir.path(), "thirty_minutes.log", now - TimeDelta::minutes(30)),
        ];

        assert_eq!(timeout("1y", &files, now), Ok(1));
        assert!(!files[0].path.exists());
        assert!(files[1..].iter().all(|f| f.path.exists()));

        let remaining: Vec<LogFile> = files[1..].to_vec();
        assert_eq!(timeout("31m", &remaining, now), Ok(2));
        assert!(!remaining[0].path.exists());
        assert!(!remaining[1].path.exists());
        assert!(remaining[2].path.exists());
    }

    #[test]
    fn thirty_minute_window_spares_the_thirty_minute_file() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let now = Utc::now();
        let files = vec![
            touch(dir.path(), "a.log", now - TimeDelta::days(730)),
            touch(dir.path(), "b.log", now - TimeDelta::days(30)),
            touch(dir.path(), "c.log", now - TimeDelta::hours(5)),
            touch(dir.path(), "d.log", now - TimeDelta::minutes(30) + TimeDelta::seconds(5)),
        ];

        assert_eq!(timeout("30m", &files, now), Ok(3));
        assert!(files[3].path.exists());
    }

    #[test]
    fn invalid_unit_deletes_nothing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let now = Utc::now();
        let files = vec![touch(dir.path(), "old.log", now - TimeDelta::days(3650))];

        let err = timeout("1z", &files, now).expect_err("invalid unit");
        assert!(err.to_string().contains('z'));
        assert!(files[0].path.exists());
    }

    #[test]
    fn cap_keeps_newest_files() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let now = Utc::now();
        let files = vec![
            touch(dir.path(), "middle.log", now - TimeDelta::minutes(2)),
            touch(dir.path(), "oldest.log", now - TimeDelta::minutes(3)),
            touch(dir.path(), "newest.log", now - TimeDelta::minutes(1)),
        ];

        let report = cap(2, files.clone());
        assert_eq!(report, CapReport { removed: 1, kept: 2 });
        assert_eq!(report.to_string(), "filecap reached");
        assert!(!files[1].path.exists());
        assert!(files[0].path.exists());
        assert!(files[2].path.exists());
    }

    #[test]
    fn cap_reports_multiple_removals() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let now = Utc::now();
        let files: Vec<LogFile> = (0..4)
            .map(|i| touch(dir.path(), &format!("{i}.log"), now - TimeDelta::minutes(i)))
            .collect();

        let report = cap(1, files.clone());
        assert_eq!(report.removed, 3);
        assert_eq!(report.to_string(), "filecap removed 3 logs");
        assert!(files[0].path.exists());

        assert_eq!(cap(5, vec![files[0].clone()]).to_string(), "");
    }

    #[test]
    fn scan_only_lists_log_files() {
        let dir = tempfile::tempdir().expect("tmp dir");
        fs::write(dir.path().join("keep.log"), "").expect("write keep.log");
        fs::write(dir.path().join("skip.txt"), "").expect("write skip.txt");
        fs::create_dir(dir.path().join("nested.log")).expect("create dir");

        let logs = scan_logs(dir.path()).expect("scan");
        assert_eq!(logs.len(), 1);
        assert!(logs[0].path.ends_with("keep.log"));

        let missing = scan_logs(&dir.path().join("missing")).expect("scan missing");
        assert!(missing.is_empty());
    }
}
