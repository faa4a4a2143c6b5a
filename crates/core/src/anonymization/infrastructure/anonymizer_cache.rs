use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::anonymization::domain::anonymization_method::AnonymizationMethod;
use crate::anonymization::domain::anonymizer::Anonymizer;
use crate::shared::error::BlanketResult;

use super::anonymizer_registry::AnonymizerRegistry;

type Slot = Arc<Mutex<Option<Arc<dyn Anonymizer>>>>;

/// Process-wide store of constructed strategies, one per method.
///
/// Concurrent callers asking for the same method wait on that method's slot
/// while the first one builds it, so each strategy is constructed once.
/// Different methods build independently, which lets a composite fetch its
/// parts from the cache while its own slot is held.
pub struct AnonymizerCache {
    registry: AnonymizerRegistry,
    slots: Mutex<HashMap<String, Slot>>,
}

impl AnonymizerCache {
    pub fn new(registry: AnonymizerRegistry) -> Self {
        Self {
            registry,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &AnonymizerRegistry {
        &self.registry
    }

    /// Returns the cached strategy for `method`, constructing it on first use.
    /// A failed construction leaves the slot empty for the next caller.
    pub fn get(&self, method: AnonymizationMethod) -> BlanketResult<Arc<dyn Anonymizer>> {
        let slot = self.slot(method);
        let mut guard = lock(&slot);
        if let Some(anonymizer) = guard.as_ref() {
            return Ok(anonymizer.clone());
        }
        let anonymizer = self.registry.create(method, self)?;
        *guard = Some(anonymizer.clone());
        Ok(anonymizer)
    }

    pub fn contains(&self, method: AnonymizationMethod) -> bool {
        let slot = lock(&self.slots).get(&cache_key(method)).cloned();
        slot.is_some_and(|slot| lock(&slot).is_some())
    }

    /// Drops every cached strategy. Holders of earlier handles keep theirs.
    pub fn clear(&self) {
        lock(&self.slots).clear();
    }

    fn slot(&self, method: AnonymizationMethod) -> Slot {
        lock(&self.slots)
            .entry(cache_key(method))
            .or_default()
            .clone()
    }
}

fn cache_key(method: AnonymizationMethod) -> String {
    format!("face:{method}")
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
