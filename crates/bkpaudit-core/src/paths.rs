//! Storage path conventions.
//!
//! Backups live under `{root}/{year}/{sector}/{tag}/{MM-YYYY}/`, possibly in
//! nested subfolders. Nothing here touches the filesystem.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// A calendar month, rendered as the `MM-YYYY` folder token.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MonthYear {
    pub year: i32,
    pub month: u32,
}

impl MonthYear {
    pub fn new(year: i32, month: u32) -> Self {
        Self { year, month }
    }

    /// The month containing `date`.
    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// Folder token, e.g. `01-2025`.
    pub fn token(&self) -> String {
        format!("{:02}-{}", self.month, self.year)
    }
}

impl fmt::Display for MonthYear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.token())
    }
}

/// Build `root/YYYY/sector/tag/MM-YYYY`.
///
/// Sector and tag values containing `/` or `\` expand into nested folders.
pub fn derive_path(root: &Path, sector: &str, tag: &str, period: MonthYear) -> PathBuf {
    let mut path = root.join(period.year.to_string());
    for segment in sector
        .split(['/', '\\'])
        .chain(tag.split(['/', '\\']))
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        path.push(segment);
    }
    path.push(period.token());
    path
}

/// A directory scheduled for scanning and the month it covers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CandidatePath {
    pub directory: PathBuf,
    pub period: MonthYear,
}

/// Ordered, de-duplicated set of candidate directories for one tab.
///
/// Two entities sharing sector, tag and month resolve to a single entry so
/// each directory is scanned once.
#[derive(Debug, Default)]
pub struct PathPlan {
    candidates: Vec<CandidatePath>,
    seen: HashSet<PathBuf>,
}

impl PathPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive the directory for one entity and month, recording it if new.
    pub fn add(&mut self, root: &Path, sector: &str, tag: &str, period: MonthYear) -> PathBuf {
        let directory = derive_path(root, sector, tag, period);
        if self.seen.insert(directory.clone()) {
            self.candidates.push(CandidatePath {
                directory: directory.clone(),
                period,
            });
        }
        directory
    }

    pub fn candidates(&self) -> &[CandidatePath] {
        &self.candidates
    }

    /// Directories in first-seen order.
    pub fn directories(&self) -> Vec<PathBuf> {
        self.candidates.iter().map(|c| c.directory.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn token_is_zero_padded() {
        assert_eq!(MonthYear::new(2025, 3).token(), "03-2025");
        assert_eq!(MonthYear::new(2024, 12).to_string(), "12-2024");
    }

    #[test]
    fn derive_follows_layout() {
        let path = derive_path(Path::new("/mnt/bkp"), "TI", "SRV1", MonthYear::new(2025, 1));
        assert_eq!(path, PathBuf::from("/mnt/bkp/2025/TI/SRV1/01-2025"));
    }

    #[test]
    fn year_comes_from_the_period() {
        let path = derive_path(Path::new("/mnt/bkp"), "TI", "SRV1", MonthYear::new(2024, 12));
        assert_eq!(path, PathBuf::from("/mnt/bkp/2024/TI/SRV1/12-2024"));
    }

    #[test]
    fn slashes_become_nested_segments() {
        let path = derive_path(Path::new("/r"), "ADM/RH", "PC-07", MonthYear::new(2025, 2));
        assert_eq!(path, PathBuf::from("/r/2025/ADM/RH/PC-07/02-2025"));
    }

    #[test]
    fn plan_deduplicates_shared_directories() {
        let root = Path::new("/r");
        let jan = MonthYear::new(2025, 1);
        let feb = MonthYear::new(2025, 2);

        let mut plan = PathPlan::new();
        let a = plan.add(root, "TI", "SRV1", jan);
        let b = plan.add(root, "TI", "SRV1", jan);
        plan.add(root, "TI", "SRV1", feb);
        plan.add(root, "TI", "SRV2", jan);

        assert_eq!(a, b);
        assert_eq!(plan.len(), 3);
        assert_eq!(
            plan.directories(),
            vec![
                PathBuf::from("/r/2025/TI/SRV1/01-2025"),
                PathBuf::from("/r/2025/TI/SRV1/02-2025"),
                PathBuf::from("/r/2025/TI/SRV2/01-2025"),
            ]
        );
    }
}
