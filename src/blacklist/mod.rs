//! Host Blacklist: a permanent set loaded from config plus a temporary map
//! of hosts put into cooldown after repeated fetch failures.
//!
//! `is_blacklisted(host) = host ∈ permanent ∨ (host ∈ temporary ∧ age < cooldown)`.

use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::store::DurableStore;
use crate::url::matches_wildcard;

const DEFAULT_COOLDOWN: Duration = Duration::from_secs(30 * 60);

pub struct HostBlacklist {
    permanent: HashSet<String>,
    temporary: DashMap<String, Instant>,
    cooldown: Duration,
    durable: Option<Arc<DurableStore>>,
}

impl HostBlacklist {
    pub fn new(permanent_patterns: Vec<String>, durable: Option<Arc<DurableStore>>) -> Self {
        let mut permanent: HashSet<String> = permanent_patterns.into_iter().collect();
        if let Some(durable) = &durable {
            if let Ok(loaded) = durable.blacklist_load_permanent() {
                permanent.extend(loaded);
            }
        }
        Self {
            permanent,
            temporary: DashMap::new(),
            cooldown: DEFAULT_COOLDOWN,
            durable,
        }
    }

    #[cfg(test)]
    fn with_cooldown(permanent_patterns: Vec<String>, cooldown: Duration) -> Self {
        Self {
            permanent: permanent_patterns.into_iter().collect(),
            temporary: DashMap::new(),
            cooldown,
            durable: None,
        }
    }

    pub fn is_blacklisted(&self, host: &str) -> bool {
        if self.in_permanent_set(host) {
            return true;
        }
        match self.temporary.get(host) {
            Some(entered_at) => entered_at.elapsed() < self.cooldown,
            None => false,
        }
    }

    fn in_permanent_set(&self, host: &str) -> bool {
        self.permanent
            .iter()
            .any(|pattern| matches_wildcard(pattern, host))
    }

    /// Puts a host into temporary cooldown, e.g. after consecutive timeouts.
    pub fn add_temporary(&self, host: &str) {
        self.temporary.insert(host.to_string(), Instant::now());
    }

    pub fn add_permanent(&mut self, host: String) {
        if let Some(durable) = &self.durable {
            let _ = durable.blacklist_add_permanent(&host);
        }
        self.permanent.insert(host);
    }

    /// Removes expired temporary entries. Intended to run periodically from
    /// the monitor loop.
    pub fn sweep(&self) {
        self.temporary
            .retain(|_, entered_at| entered_at.elapsed() < self.cooldown);
    }

    pub fn temporary_len(&self) -> usize {
        self.temporary.len()
    }
}
