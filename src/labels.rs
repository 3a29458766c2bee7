//! User-entered cluster labels.
//!
//! Persistence is somebody else's job; the assembler only needs a key-value
//! view keyed by cluster id. [`InMemoryLabelStore`] backs tests and
//! single-process deployments.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::error::Result;
use crate::id::ClusterId;

/// Key-value store of user labels.
pub trait LabelStore: Send + Sync {
    /// Every stored label.
    fn get_all_labels(&self) -> Result<HashMap<ClusterId, String>>;

    /// Set or replace the label of `id`.
    fn set_label(&self, id: ClusterId, label: String) -> Result<()>;

    /// Remove the label of `id`. Missing labels are not an error.
    fn delete_label(&self, id: &ClusterId) -> Result<()>;
}

/// Thread-safe in-memory [`LabelStore`].
#[derive(Debug, Default)]
pub struct InMemoryLabelStore {
    labels: RwLock<HashMap<ClusterId, String>>,
}

impl InMemoryLabelStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of labels.
    pub fn len(&self) -> usize {
        self.labels.read().len()
    }

    /// Whether no labels are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LabelStore for InMemoryLabelStore {
    fn get_all_labels(&self) -> Result<HashMap<ClusterId, String>> {
        Ok(self.labels.read().clone())
    }

    fn set_label(&self, id: ClusterId, label: String) -> Result<()> {
        self.labels.write().insert(id, label);
        Ok(())
    }

    fn delete_label(&self, id: &ClusterId) -> Result<()> {
        self.labels.write().remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_delete() {
        let store = InMemoryLabelStore::new();
        let id = ClusterId::node(4).child(1);
        store.set_label(id.clone(), "ml researchers".into()).unwrap();
        store.set_label(ClusterId::node(5), "artists".into()).unwrap();
        store.set_label(ClusterId::node(5), "painters".into()).unwrap();

        let all = store.get_all_labels().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[&id], "ml researchers");
        assert_eq!(all[&ClusterId::node(5)], "painters");

        store.delete_label(&id).unwrap();
        store.delete_label(&id).unwrap();
        assert_eq!(store.len(), 1);
    }
}
