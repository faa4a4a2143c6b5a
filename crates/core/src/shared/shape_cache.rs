use std::sync::{Arc, Mutex, PoisonError};

/// A lazily computed value remembered together with the key it was computed for.
///
/// Requesting the value for a different key recomputes and replaces it.
pub struct ShapeKeyedCell<K, T> {
    slot: Mutex<Option<(K, Arc<T>)>>,
}

impl<K: PartialEq + Copy, T> ShapeKeyedCell<K, T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    pub fn get_or_try_compute<E>(
        &self,
        key: K,
        force_recompute: bool,
        compute: impl FnOnce() -> Result<T, E>,
    ) -> Result<Arc<T>, E> {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if !force_recompute {
            if let Some((cached_key, value)) = slot.as_ref() {
                if *cached_key == key {
                    return Ok(Arc::clone(value));
                }
            }
        }
        let value = Arc::new(compute()?);
        *slot = Some((key, Arc::clone(&value)));
        Ok(value)
    }

    pub fn cached_key(&self) -> Option<K> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|(k, _)| *k)
    }

    pub fn invalidate(&self) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl<K: PartialEq + Copy, T> Default for ShapeKeyedCell<K, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Copy, T> Clone for ShapeKeyedCell<K, T> {
    fn clone(&self) -> Self {
        let current = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        Self {
            slot: Mutex::new(current),
        }
    }
}

impl<K: std::fmt::Debug + Copy, T> std::fmt::Debug for ShapeKeyedCell<K, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let key = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|(k, _)| *k);
        f.debug_struct("ShapeKeyedCell").field("key", &key).finish()
    }
}
