//! In-process store backend.
//!
//! Mirrors the Redis semantics the game relies on: string/hash/sorted-set
//! values under one keyspace, lazy TTL expiry, and WRONGTYPE errors when an
//! operation hits a key of another type. One mutex guards the whole map; no
//! lock is ever held across an await point.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::StoreError;

#[derive(Debug)]
enum Value {
    Str(String),
    Hash(BTreeMap<String, String>),
    Zset(BTreeMap<String, i64>),
}

#[derive(Debug)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn expired(&self) -> bool {
        match self.expires_at {
            Some(t) => Instant::now() >= t,
            None => false,
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    map: Mutex<HashMap<String, Entry>>,
}

fn purge_expired(m: &mut HashMap<String, Entry>, key: &str) {
    if m.get(key).map(|e| e.expired()).unwrap_or(false) {
        m.remove(key);
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Entry>> {
        self.map.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    pub fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut m = self.lock();
        purge_expired(&mut m, key);
        match m.get(key) {
            None => Ok(None),
            Some(Entry {
                value: Value::Str(s),
                ..
            }) => Ok(Some(s.clone())),
            Some(_) => Err(StoreError::WrongType),
        }
    }

    pub fn set(&self, key: &str, value: &str, ttl_secs: Option<u64>) -> Result<(), StoreError> {
        let mut m = self.lock();
        // SET overwrites any existing value regardless of type.
        m.insert(
            key.to_string(),
            Entry {
                value: Value::Str(value.to_string()),
                expires_at: ttl_secs.map(|s| Instant::now() + Duration::from_secs(s)),
            },
        );
        Ok(())
    }

    pub fn del(&self, key: &str) -> Result<bool, StoreError> {
        let mut m = self.lock();
        purge_expired(&mut m, key);
        Ok(m.remove(key).is_some())
    }

    pub fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let mut m = self.lock();
        purge_expired(&mut m, key);
        Ok(m.contains_key(key))
    }

    pub fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut m = self.lock();
        let expired = m
            .iter()
            .filter(|(_, e)| e.expired())
            .map(|(k, _)| k.clone())
            .collect::<Vec<_>>();
        for k in expired {
            m.remove(&k);
        }
        let mut keys = m
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect::<Vec<_>>();
        keys.sort();
        Ok(keys)
    }

    pub fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        let mut m = self.lock();
        purge_expired(&mut m, key);
        match m.get(key) {
            None => Ok(None),
            Some(Entry {
                value: Value::Hash(h),
                ..
            }) => Ok(h.get(field).cloned()),
            Some(_) => Err(StoreError::WrongType),
        }
    }

    pub fn hset(&self, key: &str, fields: &[(&str, String)]) -> Result<(), StoreError> {
        let mut m = self.lock();
        purge_expired(&mut m, key);
        let entry = m.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::Hash(BTreeMap::new()),
            expires_at: None,
        });
        let Value::Hash(h) = &mut entry.value else {
            return Err(StoreError::WrongType);
        };
        for (f, v) in fields {
            h.insert((*f).to_string(), v.clone());
        }
        Ok(())
    }

    pub fn hgetall(&self, key: &str) -> Result<BTreeMap<String, String>, StoreError> {
        let mut m = self.lock();
        purge_expired(&mut m, key);
        match m.get(key) {
            None => Ok(BTreeMap::new()),
            Some(Entry {
                value: Value::Hash(h),
                ..
            }) => Ok(h.clone()),
            Some(_) => Err(StoreError::WrongType),
        }
    }

    pub fn hincrby(&self, key: &str, field: &str, delta: i64) -> Result<i64, StoreError> {
        let mut m = self.lock();
        purge_expired(&mut m, key);
        let entry = m.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::Hash(BTreeMap::new()),
            expires_at: None,
        });
        let Value::Hash(h) = &mut entry.value else {
            return Err(StoreError::WrongType);
        };
        let current = match h.get(field) {
            None => 0,
            Some(v) => v.parse::<i64>().map_err(|_| StoreError::NotAnInteger)?,
        };
        let next = current + delta;
        h.insert(field.to_string(), next.to_string());
        Ok(next)
    }

    pub fn zadd(&self, key: &str, member: &str, score: i64) -> Result<(), StoreError> {
        let mut m = self.lock();
        purge_expired(&mut m, key);
        let entry = m.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::Zset(BTreeMap::new()),
            expires_at: None,
        });
        let Value::Zset(z) = &mut entry.value else {
            return Err(StoreError::WrongType);
        };
        z.insert(member.to_string(), score);
        Ok(())
    }

    pub fn ztop(&self, key: &str, n: usize) -> Result<Vec<(String, i64)>, StoreError> {
        let mut m = self.lock();
        purge_expired(&mut m, key);
        match m.get(key) {
            None => Ok(Vec::new()),
            Some(Entry {
                value: Value::Zset(z),
                ..
            }) => {
                let mut items = z
                    .iter()
                    .map(|(k, v)| (k.clone(), *v))
                    .collect::<Vec<_>>();
                // Descending score, ties in reverse member order like ZREVRANGE.
                items.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| b.0.cmp(&a.0)));
                items.truncate(n);
                Ok(items)
            }
            Some(_) => Err(StoreError::WrongType),
        }
    }
}
