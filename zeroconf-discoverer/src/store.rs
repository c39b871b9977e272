use parking_lot::Mutex;
use shared::types::ResolvedServiceRecord;

/// Append-only log of resolved services, shared by every instance listener
/// of a session. Insertion order is the only ordering it keeps.
#[derive(Debug, Default)]
pub struct EventStore {
    records: Mutex<Vec<ResolvedServiceRecord>>,
}

impl EventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The lock is held for the push only.
    pub fn append(&self, record: ResolvedServiceRecord) {
        self.records.lock().push(record);
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of every record in insertion order. Meant to be taken once the
    /// writers have been deregistered.
    pub fn snapshot(&self) -> Vec<ResolvedServiceRecord> {
        self.records.lock().clone()
    }
}
