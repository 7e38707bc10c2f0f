use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, RwLock};

use tania_core::AggregateId;

use super::{ReadStoreError, RowMutation, RowStore, StoredRow};

type Slot<V> = Arc<Mutex<Option<StoredRow<V>>>>;

/// In-memory row store.
///
/// The map lock is held only to find or insert a row slot; each slot has its own
/// mutex, so projections of different aggregates run in parallel.
#[derive(Debug)]
pub struct InMemoryRowStore<V> {
    rows: RwLock<BTreeMap<AggregateId, Slot<V>>>,
}

impl<V> InMemoryRowStore<V> {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(BTreeMap::new()),
        }
    }

    fn slot(&self, id: AggregateId) -> Result<Slot<V>, ReadStoreError> {
        {
            let rows = self.rows.read().map_err(|_| poisoned())?;
            if let Some(slot) = rows.get(&id) {
                return Ok(slot.clone());
            }
        }
        let mut rows = self.rows.write().map_err(|_| poisoned())?;
        Ok(rows
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone())
    }
}

impl<V> InMemoryRowStore<V> {
    /// Remove an empty slot that no other caller holds. Slots are only handed out
    /// under the map lock, so the count cannot grow while it is held here.
    fn discard_if_unused(&self, id: AggregateId, slot: &Slot<V>) -> Result<(), ReadStoreError> {
        let mut rows = self.rows.write().map_err(|_| poisoned())?;
        let unused = rows
            .get(&id)
            .is_some_and(|stored| Arc::ptr_eq(stored, slot) && Arc::strong_count(slot) == 2);
        if unused && slot.lock().map_err(|_| poisoned())?.is_none() {
            rows.remove(&id);
        }
        Ok(())
    }
}

impl<V> Default for InMemoryRowStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned() -> ReadStoreError {
    ReadStoreError::Storage("row lock poisoned".to_string())
}

impl<V> RowStore<V> for InMemoryRowStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn get(&self, id: AggregateId) -> Result<Option<StoredRow<V>>, ReadStoreError> {
        let slot = {
            let rows = self.rows.read().map_err(|_| poisoned())?;
            match rows.get(&id) {
                Some(slot) => slot.clone(),
                None => return Ok(None),
            }
        };
        let row = slot.lock().map_err(|_| poisoned())?;
        Ok(row.clone())
    }

    fn all(&self) -> Result<Vec<(AggregateId, StoredRow<V>)>, ReadStoreError> {
        let slots: Vec<(AggregateId, Slot<V>)> = {
            let rows = self.rows.read().map_err(|_| poisoned())?;
            rows.iter().map(|(id, slot)| (*id, slot.clone())).collect()
        };

        let mut out = Vec::with_capacity(slots.len());
        for (id, slot) in slots {
            if let Some(row) = slot.lock().map_err(|_| poisoned())?.clone() {
                out.push((id, row));
            }
        }
        Ok(out)
    }

    fn modify(&self, id: AggregateId, mutation: RowMutation<'_, V>) -> Result<(), ReadStoreError> {
        let slot = self.slot(id)?;
        let empty = {
            let mut current = slot.lock().map_err(|_| poisoned())?;
            let mut next = current.clone();
            if mutation(&mut next) {
                *current = next;
            }
            current.is_none()
        };
        if empty {
            self.discard_if_unused(id, &slot)?;
        }
        Ok(())
    }

    fn clear(&self) -> Result<(), ReadStoreError> {
        let mut rows = self.rows.write().map_err(|_| poisoned())?;
        rows.clear();
        Ok(())
    }
}
