use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use ironbooks_core::TenantId;

/// Tenant-partitioned key/value store for disposable read models.
///
/// Every call names a tenant; there is no way to read across partitions.
pub trait TenantStore<K, V>: Send + Sync {
    fn get(&self, tenant_id: TenantId, key: &K) -> Option<V>;

    fn upsert(&self, tenant_id: TenantId, key: K, value: V);

    /// Mutate a row in place. Returns `false` when the row does not exist.
    fn update(&self, tenant_id: TenantId, key: &K, f: &mut dyn FnMut(&mut V)) -> bool;

    /// All rows of a tenant in key order.
    fn list(&self, tenant_id: TenantId) -> Vec<V>;

    fn clear_tenant(&self, tenant_id: TenantId);
}

impl<K, V, S> TenantStore<K, V> for Arc<S>
where
    S: TenantStore<K, V> + ?Sized,
{
    fn get(&self, tenant_id: TenantId, key: &K) -> Option<V> {
        (**self).get(tenant_id, key)
    }

    fn upsert(&self, tenant_id: TenantId, key: K, value: V) {
        (**self).upsert(tenant_id, key, value)
    }

    fn update(&self, tenant_id: TenantId, key: &K, f: &mut dyn FnMut(&mut V)) -> bool {
        (**self).update(tenant_id, key, f)
    }

    fn list(&self, tenant_id: TenantId) -> Vec<V> {
        (**self).list(tenant_id)
    }

    fn clear_tenant(&self, tenant_id: TenantId) {
        (**self).clear_tenant(tenant_id)
    }
}

/// In-memory store. Keys are ordered, so ids built on v7 UUIDs list oldest first.
#[derive(Debug)]
pub struct InMemoryTenantStore<K, V> {
    inner: RwLock<HashMap<TenantId, BTreeMap<K, V>>>,
}

impl<K, V> InMemoryTenantStore<K, V> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> Default for InMemoryTenantStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> TenantStore<K, V> for InMemoryTenantStore<K, V>
where
    K: Clone + Ord + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn get(&self, tenant_id: TenantId, key: &K) -> Option<V> {
        let map = self.inner.read().ok()?;
        map.get(&tenant_id)?.get(key).cloned()
    }

    fn upsert(&self, tenant_id: TenantId, key: K, value: V) {
        if let Ok(mut map) = self.inner.write() {
            map.entry(tenant_id).or_default().insert(key, value);
        }
    }

    fn update(&self, tenant_id: TenantId, key: &K, f: &mut dyn FnMut(&mut V)) -> bool {
        let Ok(mut map) = self.inner.write() else {
            return false;
        };
        match map.get_mut(&tenant_id).and_then(|rows| rows.get_mut(key)) {
            Some(row) => {
                f(row);
                true
            }
            None => false,
        }
    }

    fn list(&self, tenant_id: TenantId) -> Vec<V> {
        let Ok(map) = self.inner.read() else {
            return vec![];
        };
        map.get(&tenant_id)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    fn clear_tenant(&self, tenant_id: TenantId) {
        if let Ok(mut map) = self.inner.write() {
            map.remove(&tenant_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tenants_never_see_each_other() {
        let store = InMemoryTenantStore::<u32, &'static str>::new();
        let (a, b) = (TenantId::new(), TenantId::new());
        store.upsert(a, 1, "a1");
        store.upsert(b, 1, "b1");

        assert_eq!(store.get(a, &1), Some("a1"));
        assert_eq!(store.list(b), vec!["b1"]);

        store.clear_tenant(a);
        assert!(store.list(a).is_empty());
        assert_eq!(store.get(b, &1), Some("b1"));
    }

    #[test]
    fn update_touches_existing_rows_only() {
        let store = InMemoryTenantStore::<u32, i64>::new();
        let t = TenantId::new();
        store.upsert(t, 2, 10);
        store.upsert(t, 1, 5);

        assert!(store.update(t, &2, &mut |v| *v += 1));
        assert!(!store.update(t, &3, &mut |v| *v += 1));
        assert_eq!(store.list(t), vec![5, 11]);
    }
}
