//! Subscription bookkeeping for the notification hub
//!
//! Per-run and global subscribers are kept in separate sets so a wildcard
//! client costs one entry, not one per run. A reverse index from client to
//! runs makes `remove_client` proportional to that client's own
//! subscriptions.

use std::collections::HashMap;
use std::collections::HashSet;

use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

/// Session identifier handed out at connect time
pub type ClientId = Uuid;

/// Sentinel echoed back for wildcard subscriptions
pub const WILDCARD: &str = "*";

/// Resolved target of a subscribe/unsubscribe request
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SubscriptionScope {
    Run(String),
    Global,
}

impl SubscriptionScope {
    /// Missing, empty, `*` and `all` all mean every run
    #[must_use]
    pub fn resolve(run_id: Option<&str>) -> Self {
        match run_id.map(str::trim) {
            None | Some("" | WILDCARD) => Self::Global,
            Some(id) if id.eq_ignore_ascii_case("all") => Self::Global,
            Some(id) => Self::Run(id.to_string()),
        }
    }

    #[must_use]
    pub const fn kind(&self) -> ScopeKind {
        match self {
            Self::Run(_) => ScopeKind::Specific,
            Self::Global => ScopeKind::Global,
        }
    }

    /// The run id to echo in acknowledgments
    #[must_use]
    pub fn run_id(&self) -> &str {
        match self {
            Self::Run(id) => id,
            Self::Global => WILDCARD,
        }
    }
}

/// Wire form of a scope in acknowledgments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeKind {
    Specific,
    Global,
}

#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    per_run: HashMap<String, HashSet<ClientId>>,
    global: HashSet<ClientId>,
    by_client: HashMap<ClientId, HashSet<String>>,
}

impl SubscriptionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if the client was already in that set
    pub fn subscribe(&mut self, client: ClientId, scope: &SubscriptionScope) -> bool {
        match scope {
            SubscriptionScope::Global => self.global.insert(client),
            SubscriptionScope::Run(run_id) => {
                let added = self
                    .per_run
                    .entry(run_id.clone())
                    .or_default()
                    .insert(client);
                if added {
                    self.by_client
                        .entry(client)
                        .or_default()
                        .insert(run_id.clone());
                }
                added
            }
        }
    }

    /// Returns `false` if the client was not in that set
    pub fn unsubscribe(&mut self, client: ClientId, scope: &SubscriptionScope) -> bool {
        match scope {
            SubscriptionScope::Global => self.global.remove(&client),
            SubscriptionScope::Run(run_id) => {
                let removed = self.remove_from_run(client, run_id);
                if removed {
                    if let Some(runs) = self.by_client.get_mut(&client) {
                        runs.remove(run_id);
                        if runs.is_empty() {
                            self.by_client.remove(&client);
                        }
                    }
                }
                removed
            }
        }
    }

    /// Drop every membership of a client; safe to repeat
    pub fn remove_client(&mut self, client: ClientId) {
        self.global.remove(&client);
        if let Some(runs) = self.by_client.remove(&client) {
            for run_id in runs {
                self.remove_from_run(client, &run_id);
            }
        }
    }

    /// Union of the run's subscribers and the global subscribers
    #[must_use]
    pub fn recipients(&self, run_id: &str) -> HashSet<ClientId> {
        let mut recipients = self.global.clone();
        if let Some(clients) = self.per_run.get(run_id) {
            recipients.extend(clients.iter().copied());
        }
        recipients
    }

    #[must_use]
    pub fn is_subscribed(&self, client: ClientId, scope: &SubscriptionScope) -> bool {
        match scope {
            SubscriptionScope::Global => self.global.contains(&client),
            SubscriptionScope::Run(run_id) => self
                .per_run
                .get(run_id)
                .is_some_and(|clients| clients.contains(&client)),
        }
    }

    /// Number of sets (global plus per-run) the client belongs to
    #[must_use]
    pub fn membership_count(&self, client: ClientId) -> usize {
        let runs = self.by_client.get(&client).map_or(0, HashSet::len);
        runs + usize::from(self.global.contains(&client))
    }

    #[must_use]
    pub fn global_count(&self) -> usize {
        self.global.len()
    }

    /// Runs with at least one specific subscriber
    #[must_use]
    pub fn tracked_runs(&self) -> usize {
        self.per_run.len()
    }

    fn remove_from_run(&mut self, client: ClientId, run_id: &str) -> bool {
        let Some(clients) = self.per_run.get_mut(run_id) else {
            return false;
        };
        let removed = clients.remove(&client);
        if clients.is_empty() {
            self.per_run.remove(run_id);
        }
        removed
    }
}
