//! Version history model.
//!
//! A workflow's event lineage is a set of branches. Each branch is an ordered
//! list of `(event_id, version)` markers: every item says "events up to and
//! including `event_id` were produced under `version`". Branches share a
//! common prefix up to the point where two regions produced different
//! continuations; that point is the LCA (least common ancestor) item.

use serde::{Deserialize, Serialize};

/// Upper bound on branches kept per workflow.
pub const MAX_BRANCHES: usize = 10;

/// Result type for version history operations.
pub type Result<T> = std::result::Result<T, VersionHistoryError>;

/// Errors raised by version history operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VersionHistoryError {
    #[error("version history is empty")]
    Empty,

    #[error("event id must strictly increase: {previous} followed by {next}")]
    NonIncreasingEventId { previous: i64, next: i64 },

    #[error("version must not decrease: {previous} followed by {next}")]
    DecreasingVersion { previous: i64, next: i64 },

    #[error("version history is malformed: no joint point found")]
    NoJointPoint,

    #[error("version history index {index} out of range ({len} branches)")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("too many version history branches (max {max})")]
    TooManyBranches { max: usize },

    #[error("event {event_id} not covered by version history")]
    EventNotFound { event_id: i64 },

    #[error("item (event {event_id}, version {version}) not found in any branch")]
    ItemNotFound { event_id: i64, version: i64 },

    #[error("branches diverged but both end at version {version}")]
    DivergedAtSameVersion { version: i64 },
}

/// A single `(event_id, version)` marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionHistoryItem {
    pub event_id: i64,
    pub version: i64,
}

impl VersionHistoryItem {
    pub fn new(event_id: i64, version: i64) -> Self {
        Self { event_id, version }
    }
}

/// One branch of a workflow's event lineage.
///
/// Event ids strictly increase along the branch and versions never decrease.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "VersionHistoryRepr")]
pub struct VersionHistory {
    branch_token: Vec<u8>,
    items: Vec<VersionHistoryItem>,
}

impl VersionHistory {
    /// Build a branch from items, validating ordering.
    pub fn new(branch_token: Vec<u8>, items: Vec<VersionHistoryItem>) -> Result<Self> {
        validate_items(&items)?;
        Ok(Self {
            branch_token,
            items,
        })
    }

    /// Build a branch from `(event_id, version)` pairs.
    pub fn from_pairs(pairs: &[(i64, i64)]) -> Result<Self> {
        Self::new(
            Vec::new(),
            pairs
                .iter()
                .map(|&(event_id, version)| VersionHistoryItem::new(event_id, version))
                .collect(),
        )
    }

    pub fn branch_token(&self) -> &[u8] {
        &self.branch_token
    }

    pub fn set_branch_token(&mut self, branch_token: Vec<u8>) {
        self.branch_token = branch_token;
    }

    pub fn items(&self) -> &[VersionHistoryItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn first_item(&self) -> Result<VersionHistoryItem> {
        self.items.first().copied().ok_or(VersionHistoryError::Empty)
    }

    pub fn last_item(&self) -> Result<VersionHistoryItem> {
        self.items.last().copied().ok_or(VersionHistoryError::Empty)
    }

    /// Extend the branch with an item.
    ///
    /// An item carrying the last item's version moves that item's event id
    /// forward; a higher version appends a new item.
    pub fn add_or_update_item(&mut self, item: VersionHistoryItem) -> Result<()> {
        let Some(last) = self.items.last_mut() else {
            self.items.push(item);
            return Ok(());
        };

        if item.event_id <= last.event_id {
            return Err(VersionHistoryError::NonIncreasingEventId {
                previous: last.event_id,
                next: item.event_id,
            });
        }
        if item.version < last.version {
            return Err(VersionHistoryError::DecreasingVersion {
                previous: last.version,
                next: item.version,
            });
        }

        if item.version == last.version {
            last.event_id = item.event_id;
        } else {
            self.items.push(item);
        }
        Ok(())
    }

    /// Whether `item` falls inside the span this branch attributes to its version.
    pub fn contains_item(&self, item: VersionHistoryItem) -> bool {
        let mut previous_event_id = 0;
        for current in &self.items {
            if item.version == current.version
                && previous_event_id < item.event_id
                && item.event_id <= current.event_id
            {
                return true;
            }
            previous_event_id = current.event_id;
        }
        false
    }

    /// Version that produced `event_id` on this branch.
    pub fn event_version(&self, event_id: i64) -> Result<i64> {
        let last = self.last_item()?;
        if event_id < 1 || event_id > last.event_id {
            return Err(VersionHistoryError::EventNotFound { event_id });
        }
        self.items
            .iter()
            .find(|item| event_id <= item.event_id)
            .map(|item| item.version)
            .ok_or(VersionHistoryError::EventNotFound { event_id })
    }

    /// Find the last item shared by this branch and `remote`.
    ///
    /// Walks both branches from the tail. When the versions match the shared
    /// span ends at the smaller of the two event ids; otherwise the branch
    /// holding the higher version steps back, since that version cannot be
    /// part of the other lineage.
    pub fn find_lca_item(&self, remote: &VersionHistory) -> Result<VersionHistoryItem> {
        let mut local_index = self.items.len();
        let mut remote_index = remote.items.len();

        while local_index > 0 && remote_index > 0 {
            let local_item = self.items[local_index - 1];
            let remote_item = remote.items[remote_index - 1];

            if local_item.version == remote_item.version {
                if local_item.event_id > remote_item.event_id {
                    return Ok(remote_item);
                }
                return Ok(local_item);
            } else if local_item.version > remote_item.version {
                local_index -= 1;
            } else {
                remote_index -= 1;
            }
        }

        Err(VersionHistoryError::NoJointPoint)
    }

    /// Whether this branch ends exactly at `lca`, so it can be extended by the
    /// other lineage without divergence.
    pub fn is_lca_appendable(&self, lca: VersionHistoryItem) -> Result<bool> {
        Ok(self.last_item()? == lca)
    }

    /// Copy of this branch truncated at `lca`.
    pub fn duplicate_until_lca(&self, lca: VersionHistoryItem) -> Result<VersionHistory> {
        let mut items = Vec::with_capacity(self.items.len());
        for item in &self.items {
            if item.version > lca.version {
                break;
            }
            if item.version == lca.version && lca.event_id <= item.event_id {
                items.push(lca);
                return Ok(VersionHistory {
                    branch_token: self.branch_token.clone(),
                    items,
                });
            }
            items.push(*item);
        }
        Err(VersionHistoryError::ItemNotFound {
            event_id: lca.event_id,
            version: lca.version,
        })
    }
}

#[derive(Deserialize)]
struct VersionHistoryRepr {
    #[serde(default)]
    branch_token: Vec<u8>,
    items: Vec<VersionHistoryItem>,
}

impl TryFrom<VersionHistoryRepr> for VersionHistory {
    type Error = VersionHistoryError;

    fn try_from(repr: VersionHistoryRepr) -> Result<Self> {
        Self::new(repr.branch_token, repr.items)
    }
}

fn validate_items(items: &[VersionHistoryItem]) -> Result<()> {
    for pair in items.windows(2) {
        let (previous, next) = (pair[0], pair[1]);
        if next.event_id <= previous.event_id {
            return Err(VersionHistoryError::NonIncreasingEventId {
                previous: previous.event_id,
                next: next.event_id,
            });
        }
        if next.version < previous.version {
            return Err(VersionHistoryError::DecreasingVersion {
                previous: previous.version,
                next: next.version,
            });
        }
    }
    Ok(())
}

/// All known branches of one workflow plus the authoritative one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "VersionHistoriesRepr")]
pub struct VersionHistories {
    current_index: usize,
    histories: Vec<VersionHistory>,
}

impl VersionHistories {
    pub fn new(initial: VersionHistory) -> Self {
        Self {
            current_index: 0,
            histories: vec![initial],
        }
    }

    pub fn len(&self) -> usize {
        self.histories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.histories.is_empty()
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn get(&self, index: usize) -> Result<&VersionHistory> {
        self.histories
            .get(index)
            .ok_or(VersionHistoryError::IndexOutOfRange {
                index,
                len: self.histories.len(),
            })
    }

    pub fn current(&self) -> Result<&VersionHistory> {
        self.get(self.current_index)
    }

    pub fn current_mut(&mut self) -> Result<&mut VersionHistory> {
        let len = self.histories.len();
        self.histories
            .get_mut(self.current_index)
            .ok_or(VersionHistoryError::IndexOutOfRange {
                index: self.current_index,
                len,
            })
    }

    pub fn set_current(&mut self, index: usize) -> Result<()> {
        self.get(index)?;
        self.current_index = index;
        Ok(())
    }

    /// Add a branch. It becomes current when its last version is higher than
    /// the current branch's.
    ///
    /// Returns whether the current branch changed and the new branch's index.
    pub fn add(&mut self, history: VersionHistory) -> Result<(bool, usize)> {
        if self.histories.len() >= MAX_BRANCHES {
            return Err(VersionHistoryError::TooManyBranches { max: MAX_BRANCHES });
        }

        let incoming_last = history.last_item()?;
        let current_last = self.current()?.last_item()?;
        let current_changed = incoming_last.version > current_last.version;

        let index = self.histories.len();
        self.histories.push(history);
        if current_changed {
            self.current_index = index;
        }
        Ok((current_changed, index))
    }

    /// Find the local branch sharing the longest lineage with `incoming`.
    ///
    /// On equal LCA depth the earlier branch wins.
    pub fn find_lca_index_and_item(
        &self,
        incoming: &VersionHistory,
    ) -> Result<(usize, VersionHistoryItem)> {
        let mut best: Option<(usize, VersionHistoryItem)> = None;
        for (index, local) in self.histories.iter().enumerate() {
            let lca = local.find_lca_item(incoming)?;
            match best {
                Some((_, found)) if found.event_id >= lca.event_id => {}
                _ => best = Some((index, lca)),
            }
        }
        best.ok_or(VersionHistoryError::Empty)
    }

    /// Index of the first branch that contains `item`.
    pub fn find_first_index_by_item(&self, item: VersionHistoryItem) -> Result<usize> {
        self.histories
            .iter()
            .position(|history| history.contains_item(item))
            .ok_or(VersionHistoryError::ItemNotFound {
                event_id: item.event_id,
                version: item.version,
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = &VersionHistory> {
        self.histories.iter()
    }
}

#[derive(Deserialize)]
struct VersionHistoriesRepr {
    #[serde(default)]
    current_index: usize,
    histories: Vec<VersionHistory>,
}

impl TryFrom<VersionHistoriesRepr> for VersionHistories {
    type Error = VersionHistoryError;

    fn try_from(repr: VersionHistoriesRepr) -> Result<Self> {
        if repr.histories.is_empty() {
            return Err(VersionHistoryError::Empty);
        }
        if repr.histories.len() > MAX_BRANCHES {
            return Err(VersionHistoryError::TooManyBranches { max: MAX_BRANCHES });
        }
        if repr.current_index >= repr.histories.len() {
            return Err(VersionHistoryError::IndexOutOfRange {
                index: repr.current_index,
                len: repr.histories.len(),
            });
        }
        Ok(Self {
            current_index: repr.current_index,
            histories: repr.histories,
        })
    }
}
