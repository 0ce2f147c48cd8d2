//! Ceilings and oldest-first eviction order

use crate::types::{CachedFile, Totals};
use serde::{Deserialize, Serialize};

/// A single budget a directory tree must stay under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "limit", rename_all = "snake_case")]
pub enum Ceiling {
    MaxBytes(u64),
    MaxFiles(usize),
}

impl Ceiling {
    pub fn is_satisfied(&self, totals: &Totals) -> bool {
        match *self {
            Ceiling::MaxBytes(max) => totals.bytes <= max,
            Ceiling::MaxFiles(max) => totals.files <= max,
        }
    }
}

/// An ordered list of ceilings that must all hold after a sweep
///
/// A sweep starts when any ceiling is exceeded and deletes oldest files
/// until every ceiling holds. The last remaining file is only deleted to
/// satisfy a file-count ceiling; a byte ceiling alone never empties the tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvictionPolicy {
    ceilings: Vec<Ceiling>,
}

impl EvictionPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ceiling(mut self, ceiling: Ceiling) -> Self {
        self.ceilings.push(ceiling);
        self
    }

    pub fn with_max_bytes(self, max: u64) -> Self {
        self.with_ceiling(Ceiling::MaxBytes(max))
    }

    pub fn with_max_files(self, max: usize) -> Self {
        self.with_ceiling(Ceiling::MaxFiles(max))
    }

    pub fn ceilings(&self) -> &[Ceiling] {
        &self.ceilings
    }

    /// True when every ceiling holds for `totals`
    pub fn is_satisfied(&self, totals: &Totals) -> bool {
        self.ceilings.iter().all(|c| c.is_satisfied(totals))
    }

    /// True when another deletion is both needed and allowed
    pub fn needs_eviction(&self, totals: &Totals) -> bool {
        match totals.files {
            0 => false,
            1 => self
                .ceilings
                .iter()
                .any(|c| matches!(c, Ceiling::MaxFiles(_)) && !c.is_satisfied(totals)),
            _ => !self.is_satisfied(totals),
        }
    }

    /// Sort files into eviction order: oldest modification first, ties by path
    pub fn sort_oldest_first(files: &mut [CachedFile]) {
        files.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.path.cmp(&b.path)));
    }

    /// Start an eviction pass over `files`
    pub fn plan(&self, files: Vec<CachedFile>) -> EvictionPlan<'_> {
        let totals = Totals::of(&files);
        let mut ordered = files;
        Self::sort_oldest_first(&mut ordered);
        EvictionPlan {
            policy: self,
            ordered: ordered.into_iter(),
            totals,
        }
    }
}

/// Hands out eviction candidates oldest first while the policy is violated.
///
/// Call [`EvictionPlan::removed`] for every candidate that is gone; a
/// candidate that could not be deleted still counts against the budget, so
/// the plan keeps offering newer files.
#[derive(Debug)]
pub struct EvictionPlan<'a> {
    policy: &'a EvictionPolicy,
    ordered: std::vec::IntoIter<CachedFile>,
    totals: Totals,
}

impl EvictionPlan<'_> {
    /// The next file to delete, or `None` once the ceilings hold
    pub fn next_victim(&mut self) -> Option<CachedFile> {
        if !self.policy.needs_eviction(&self.totals) {
            return None;
        }
        self.ordered.next()
    }

    pub fn removed(&mut self, file: &CachedFile) {
        self.totals.remove(file);
    }

    pub fn totals(&self) -> Totals {
        self.totals
    }
}
