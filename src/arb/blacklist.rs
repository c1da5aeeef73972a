use std::collections::HashMap;

/// Seconds a failed cycle stays out of the pipeline
pub const BLACKLIST_TTL: u64 = 3600;

/// Cycles that recently failed verification, by [`Cycle::hash_key`](super::cycle::Cycle::hash_key).
/// Entries expire lazily when looked up or purged.
#[derive(Debug, Default)]
pub struct Blacklist {
    expiries: HashMap<String, u64>,
}

impl Blacklist {
    /// An empty blacklist
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Blacklists `key` until `now + BLACKLIST_TTL`, inclusive
    pub fn add(&mut self, key: String, now: u64) {
        self.expiries.insert(key, now + BLACKLIST_TTL);
    }

    /// Whether `key` is still blacklisted at `now`. An expired entry is dropped.
    pub fn contains(&mut self, key: &str, now: u64) -> bool {
        match self.expiries.get(key) {
            Some(&expiry) if expiry >= now => true,
            Some(_) => {
                self.expiries.remove(key);
                false
            }
            None => false,
        }
    }

    /// Drops every expired entry
    pub fn purge(&mut self, now: u64) {
        self.expiries.retain(|_, expiry| *expiry >= now);
    }

    /// Entries held, expired ones included until purged
    #[must_use]
    pub fn len(&self) -> usize {
        self.expiries.len()
    }

    /// Whether no entry is held
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.expiries.is_empty()
    }
}
