use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::Context;
use serde::Serialize;

use crate::ids::{ScopeId, SubscriberId};

/// Durable subscriber → scope-set mapping.
///
/// A subscriber whose last scope is removed is dropped from the mapping, so
/// the persisted file never contains empty arrays.
#[derive(Debug, Clone)]
pub struct SubscriptionStore {
    path: PathBuf,
    subscribers: BTreeMap<SubscriberId, BTreeSet<ScopeId>>,
    last_flush: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SubscriptionStats {
    pub subscribers: usize,
    pub scopes: usize,
    pub subscriptions: usize,
}

impl SubscriptionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            subscribers: BTreeMap::new(),
            last_flush: Instant::now(),
        }
    }

    /// Loads the mapping at `path`. A missing file yields an empty store; an
    /// unreadable or malformed file is logged and also yields an empty store.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let mut store = Self::new(path);
        if !store.path.exists() {
            tracing::info!(path = %store.path.display(), "no subscription file found, starting empty");
            return store;
        }
        match read_subscriptions(&store.path) {
            Ok(subscribers) => {
                store.subscribers = subscribers;
                tracing::info!(
                    subscribers = store.subscribers.len(),
                    "loaded subscriptions"
                );
            }
            Err(err) => {
                tracing::error!(
                    path = %store.path.display(),
                    failure = "persistence",
                    "error loading subscriptions: {err:#}"
                );
            }
        }
        store
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the mapping to a sibling temporary file and renames it over the
    /// target, so readers never observe a partial file.
    pub fn save(&mut self) -> anyhow::Result<()> {
        write_subscriptions(&self.path, &self.subscribers)?;
        self.last_flush = Instant::now();
        tracing::info!(subscribers = self.subscribers.len(), "saved subscriptions");
        Ok(())
    }

    /// Saves when at least `interval` has elapsed since the last successful
    /// flush. Returns whether a save happened.
    pub fn flush_if_due(&mut self, now: Instant, interval: Duration) -> anyhow::Result<bool> {
        if now.saturating_duration_since(self.last_flush) < interval {
            return Ok(false);
        }
        self.save()?;
        Ok(true)
    }

    pub fn subscribe(&mut self, subscriber: SubscriberId, scope: ScopeId) -> bool {
        self.subscribers.entry(subscriber).or_default().insert(scope)
    }

    /// Returns the scopes that were newly added.
    pub fn subscribe_many(
        &mut self,
        subscriber: SubscriberId,
        scopes: impl IntoIterator<Item = ScopeId>,
    ) -> Vec<ScopeId> {
        let mut added: Vec<ScopeId> = scopes
            .into_iter()
            .filter(|scope| self.subscribe(subscriber, *scope))
            .collect();
        added.sort();
        added.dedup();
        if self
            .subscribers
            .get(&subscriber)
            .is_some_and(BTreeSet::is_empty)
        {
            self.subscribers.remove(&subscriber);
        }
        added
    }

    pub fn unsubscribe(&mut self, subscriber: SubscriberId, scope: ScopeId) -> bool {
        let Some(scopes) = self.subscribers.get_mut(&subscriber) else {
            return false;
        };
        let removed = scopes.remove(&scope);
        if scopes.is_empty() {
            self.subscribers.remove(&subscriber);
        }
        removed
    }

    /// Returns the scopes that were actually removed.
    pub fn unsubscribe_many(
        &mut self,
        subscriber: SubscriberId,
        scopes: impl IntoIterator<Item = ScopeId>,
    ) -> Vec<ScopeId> {
        let mut removed: Vec<ScopeId> = scopes
            .into_iter()
            .filter(|scope| self.unsubscribe(subscriber, *scope))
            .collect();
        removed.sort();
        removed
    }

    /// Removes the subscriber entirely, returning how many scopes they had.
    pub fn unsubscribe_all(&mut self, subscriber: SubscriberId) -> Option<usize> {
        self.subscribers
            .remove(&subscriber)
            .map(|scopes| scopes.len())
    }

    pub fn scopes_for(&self, subscriber: SubscriberId) -> Option<&BTreeSet<ScopeId>> {
        self.subscribers.get(&subscriber)
    }

    pub fn is_subscribed(&self, subscriber: SubscriberId, scope: ScopeId) -> bool {
        self.subscribers
            .get(&subscriber)
            .is_some_and(|scopes| scopes.contains(&scope))
    }

    /// Subscribers whose interest set contains `scope`, in ascending id order.
    pub fn subscribers_for(&self, scope: ScopeId) -> Vec<SubscriberId> {
        self.subscribers
            .iter()
            .filter(|(_, scopes)| scopes.contains(&scope))
            .map(|(subscriber, _)| *subscriber)
            .collect()
    }

    pub fn stats(&self) -> SubscriptionStats {
        let scopes: BTreeSet<ScopeId> = self.subscribers.values().flatten().copied().collect();
        SubscriptionStats {
            subscribers: self.subscribers.len(),
            scopes: scopes.len(),
            subscriptions: self.subscribers.values().map(BTreeSet::len).sum(),
        }
    }

    pub fn mapping(&self) -> &BTreeMap<SubscriberId, BTreeSet<ScopeId>> {
        &self.subscribers
    }
}

fn read_subscriptions(path: &Path) -> anyhow::Result<BTreeMap<SubscriberId, BTreeSet<ScopeId>>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let parsed: BTreeMap<String, Vec<ScopeId>> = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a subscription mapping", path.display()))?;

    let mut subscribers = BTreeMap::new();
    for (key, scopes) in parsed {
        let Ok(subscriber) = key.parse::<SubscriberId>() else {
            tracing::warn!(key = %key, "skipping non-numeric subscriber id");
            continue;
        };
        let scopes: BTreeSet<ScopeId> = scopes.into_iter().collect();
        if !scopes.is_empty() {
            subscribers.insert(subscriber, scopes);
        }
    }
    Ok(subscribers)
}

fn write_subscriptions(
    path: &Path,
    subscribers: &BTreeMap<SubscriberId, BTreeSet<ScopeId>>,
) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let payload: BTreeMap<String, Vec<ScopeId>> = subscribers
        .iter()
        .filter(|(_, scopes)| !scopes.is_empty())
        .map(|(subscriber, scopes)| (subscriber.to_string(), scopes.iter().copied().collect()))
        .collect();

    let temp_path = temp_sibling(path);
    std::fs::write(&temp_path, serde_json::to_string_pretty(&payload)?)
        .with_context(|| format!("failed to write {}", temp_path.display()))?;
    std::fs::rename(&temp_path, path).with_context(|| {
        format!(
            "failed to move {} over {}",
            temp_path.display(),
            path.display()
        )
    })?;
    Ok(())
}

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| "subscriptions.json".to_string());
    path.with_file_name(format!("{name}.tmp"))
}
