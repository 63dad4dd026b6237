use crate::hooks::{HookRecord, TargetAddress};
use shared::errors::HookError;
use std::collections::HashMap;

/// Live hooks keyed by target address.
///
/// A target is present here exactly while its entry carries a patch, and
/// every stored record saved exactly `patch_len` bytes.
#[derive(Debug)]
pub struct HookRegistry {
    records: HashMap<TargetAddress, HookRecord>,
    patch_len: usize,
}

impl HookRegistry {
    pub fn new(patch_len: usize) -> Self {
        Self {
            records: HashMap::new(),
            patch_len,
        }
    }

    pub fn contains(&self, target: TargetAddress) -> bool {
        self.records.contains_key(&target)
    }

    pub fn get(&self, target: TargetAddress) -> Option<&HookRecord> {
        self.records.get(&target)
    }

    /// First registered target whose patch span shares a byte with the span
    /// starting at `target`, other than `target` itself.
    pub fn overlapping(&self, target: TargetAddress) -> Option<TargetAddress> {
        self.records
            .keys()
            .copied()
            .find(|&existing| existing != target && existing.spans_overlap(target, self.patch_len))
    }

    /// Fails with [`HookError::AlreadyHooked`] if the target is taken.
    pub fn insert(&mut self, record: HookRecord) -> Result<(), HookError> {
        debug_assert_eq!(record.saved_bytes().len(), self.patch_len);
        let target = record.target();
        if self.records.contains_key(&target) {
            return Err(HookError::AlreadyHooked { target: target.get() });
        }
        self.records.insert(target, record);
        Ok(())
    }

    pub fn remove(&mut self, target: TargetAddress) -> Option<HookRecord> {
        self.records.remove(&target)
    }

    pub fn targets(&self) -> impl Iterator<Item = TargetAddress> + '_ {
        self.records.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(target: usize, replacement: usize) -> HookRecord {
        HookRecord::new(TargetAddress::new(target), TargetAddress::new(replacement), vec![0x90; 6])
    }

    #[test]
    fn insert_then_remove() {
        let mut reg = HookRegistry::new(6);
        reg.insert(record(0x1000, 0x2000)).unwrap();
        assert!(reg.contains(TargetAddress::new(0x1000)));
        assert_eq!(reg.len(), 1);

        let removed = reg.remove(TargetAddress::new(0x1000)).unwrap();
        assert_eq!(removed.replacement(), TargetAddress::new(0x2000));
        assert!(reg.is_empty());
        assert!(reg.remove(TargetAddress::new(0x1000)).is_none());
    }

    #[test]
    fn duplicate_target_keeps_first_record() {
        let mut reg = HookRegistry::new(6);
        reg.insert(record(0x1000, 0x2000)).unwrap();
        let err = reg.insert(record(0x1000, 0x3000)).unwrap_err();
        assert!(matches!(err, HookError::AlreadyHooked { target: 0x1000 }));
        assert_eq!(
            reg.get(TargetAddress::new(0x1000)).unwrap().replacement(),
            TargetAddress::new(0x2000)
        );
    }

    #[test]
    fn overlap_detection_uses_patch_len() {
        let mut reg = HookRegistry::new(6);
        reg.insert(record(0x1000, 0x2000)).unwrap();
        assert_eq!(reg.overlapping(TargetAddress::new(0x1005)), Some(TargetAddress::new(0x1000)));
        assert_eq!(reg.overlapping(TargetAddress::new(0x0ffb)), Some(TargetAddress::new(0x1000)));
        assert_eq!(reg.overlapping(TargetAddress::new(0x1006)), None);
        assert_eq!(reg.overlapping(TargetAddress::new(0x0ffa)), None);
        assert_eq!(reg.overlapping(TargetAddress::new(0x1000)), None);
    }
}
