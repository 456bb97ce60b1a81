//! Directory identity tracking for link-cycle detection.

use dashmap::DashSet;
use tidyvault_core::InodeInfo;

/// Remembers which directories a walk has already entered.
///
/// Following symbolic links can lead back into a directory that is already
/// on the walk; keying directories by (device, inode) makes such cycles
/// terminate.
#[derive(Debug, Default)]
pub struct InodeTracker {
    entered: DashSet<InodeInfo>,
}

impl InodeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a directory entered. Returns `false` if it was entered before.
    pub fn enter(&self, info: InodeInfo) -> bool {
        self.entered.insert(info)
    }

    pub fn len(&self) -> usize {
        self.entered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entered.is_empty()
    }
}

/// Identity of the file or directory behind `metadata`.
pub(crate) fn inode_of(metadata: &std::fs::Metadata) -> Option<InodeInfo> {
    InodeInfo::of(metadata)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_entry_is_refused() {
        let tracker = InodeTracker::new();
        let info = InodeInfo::new(12345, 1);

        assert!(tracker.enter(info));
        assert!(!tracker.enter(info));
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_same_inode_on_other_device() {
        let tracker = InodeTracker::new();
        assert!(tracker.enter(InodeInfo::new(7, 1)));
        assert!(tracker.enter(InodeInfo::new(7, 2)));
    }
}
