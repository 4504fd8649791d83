//! lazily populated per-kind cache slot.

use importref_core::{Id, Pending};
use std::collections::BTreeMap;

/// pending registrations and resolved records for one kind.
///
/// `records` is `None` until the first batch runs ("not loaded"); an empty
/// map means "loaded, nothing matched".
#[derive(Debug)]
pub(crate) struct Slot<P, R> {
    pending: Option<P>,
    last_batch: P,
    records: Option<BTreeMap<Id, R>>,
    overlay: BTreeMap<Id, R>,
}

impl<P: Pending, R> Default for Slot<P, R> {
    fn default() -> Self {
        Self {
            pending: None,
            last_batch: P::default(),
            records: None,
            overlay: BTreeMap::new(),
        }
    }
}

impl<P: Pending, R> Slot<P, R> {
    /// replace the pending set. never merges with an earlier registration.
    pub(crate) fn register(&mut self, pending: P) {
        self.pending = Some(pending);
    }

    pub(crate) fn is_loaded(&self) -> bool {
        self.records.is_some()
    }

    pub(crate) fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// move the working set out of the slot for a batch query. falls back to
    /// the previous batch when nothing was registered since.
    pub(crate) fn take_batch(&mut self) -> P {
        self.pending
            .take()
            .unwrap_or_else(|| self.last_batch.clone())
    }

    /// install batch results; rows from the store win over remembered records.
    pub(crate) fn populate(&mut self, batch: P, rows: BTreeMap<Id, R>) {
        let mut records = std::mem::take(&mut self.overlay);
        records.extend(rows);
        self.records = Some(records);
        self.last_batch = batch;
    }

    /// hand a batch back after a failed query so the next lookup retries it.
    pub(crate) fn restore(&mut self, batch: P) {
        if self.pending.is_none() {
            self.pending = Some(batch);
        }
    }

    /// forget resolved records; the next lookup queries again.
    pub(crate) fn refresh(&mut self) {
        self.records = None;
        self.overlay.clear();
    }

    /// record an entity created during the import.
    pub(crate) fn remember(&mut self, id: Id, record: R) {
        match &mut self.records {
            Some(records) => {
                records.insert(id, record);
            }
            None => {
                self.overlay.insert(id, record);
            }
        }
    }

    pub(crate) fn records(&self) -> impl Iterator<Item = (&Id, &R)> {
        self.records.iter().flatten()
    }

    pub(crate) fn get(&self, id: Id) -> Option<&R> {
        self.records.as_ref().and_then(|records| records.get(&id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use importref_core::NameSet;

    fn names(values: &[&str]) -> NameSet {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn register_replaces_previous_set() {
        let mut slot: Slot<NameSet, String> = Slot::default();
        slot.register(names(&["a"]));
        slot.register(names(&["b"]));
        assert_eq!(slot.take_batch(), names(&["b"]));
        assert!(!slot.has_pending());
    }

    #[test]
    fn take_batch_reuses_last_batch_after_refresh() {
        let mut slot: Slot<NameSet, String> = Slot::default();
        slot.register(names(&["a"]));
        let batch = slot.take_batch();
        slot.populate(batch, BTreeMap::new());
        assert!(slot.is_loaded());

        slot.refresh();
        assert!(!slot.is_loaded());
        assert_eq!(slot.take_batch(), names(&["a"]));
    }

    #[test]
    fn registration_after_refresh_wins_over_last_batch() {
        let mut slot: Slot<NameSet, String> = Slot::default();
        slot.register(names(&["a"]));
        let batch = slot.take_batch();
        slot.populate(batch, BTreeMap::new());
        slot.refresh();
        slot.register(names(&["c"]));
        assert_eq!(slot.take_batch(), names(&["c"]));
    }

    #[test]
    fn restore_keeps_slot_unloaded_with_batch_pending() {
        let mut slot: Slot<NameSet, String> = Slot::default();
        slot.register(names(&["a"]));
        let batch = slot.take_batch();
        slot.restore(batch);
        assert!(!slot.is_loaded());
        assert!(slot.has_pending());
        assert_eq!(slot.take_batch(), names(&["a"]));
    }

    #[test]
    fn remembered_records_survive_population_but_not_refresh() {
        let mut slot: Slot<NameSet, String> = Slot::default();
        slot.remember(1, "created".to_string());
        slot.remember(2, "shadowed".to_string());
        let rows = BTreeMap::from([(2, "stored".to_string())]);
        slot.populate(NameSet::new(), rows);
        assert_eq!(slot.get(1).map(String::as_str), Some("created"));
        assert_eq!(slot.get(2).map(String::as_str), Some("stored"));

        slot.refresh();
        slot.populate(NameSet::new(), BTreeMap::new());
        assert_eq!(slot.get(1), None);
    }

    #[test]
    fn remember_on_loaded_slot_inserts_directly() {
        let mut slot: Slot<NameSet, String> = Slot::default();
        slot.populate(NameSet::new(), BTreeMap::new());
        slot.remember(9, "new".to_string());
        assert_eq!(slot.records().count(), 1);
    }
}
