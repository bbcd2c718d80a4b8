//! State and live-resource loading
//!
//! `StateReader` pulls every persisted state group out of the store.
//! `LiveLoader` then refetches the actual resource behind each meta entry
//! from Grafana in a bounded worker pool. A resource that vanished
//! remotely is skipped; planning will recreate it.

use std::collections::BTreeMap;
use std::time::Duration;

use futures::StreamExt;
use tracing::{debug, warn};

use crate::domain::state::State;
use crate::error::{GdbtError, ProviderError, Result};
use crate::infrastructure::grafana::ResourceAdapter;
use crate::infrastructure::{ProviderRegistry, StateStore};
use crate::services::resolver::ResourceGroups;

/// Reads persisted state groups out of the state store
pub struct StateReader<'a> {
    store: &'a StateStore<'a>,
}

impl<'a> StateReader<'a> {
    pub fn new(store: &'a StateStore<'a>) -> Self {
        Self { store }
    }

    /// Load every persisted state group
    pub async fn load_all(&self) -> Result<BTreeMap<String, State>> {
        let mut states = BTreeMap::new();
        for name in self.store.list("").await? {
            if let Some(state) = self.load(&name).await? {
                states.insert(name, state);
            }
        }
        Ok(states)
    }

    /// Load one state group; absent groups read back as `None`
    pub async fn load(&self, name: &str) -> Result<Option<State>> {
        let Some(document) = self.store.get(name).await? else {
            return Ok(None);
        };
        Ok(Some(State::from_document(name, document)?))
    }
}

/// Fetches the live form of every state meta entry in parallel
pub struct LiveLoader<'a> {
    registry: &'a ProviderRegistry,
    threads: usize,
    timeout: f64,
}

impl<'a> LiveLoader<'a> {
    pub fn new(registry: &'a ProviderRegistry, threads: usize, timeout: f64) -> Self {
        Self {
            registry,
            threads,
            timeout,
        }
    }

    /// Load the live resources for every group. `GrafanaResourceNotFound`
    /// means the resource vanished remotely and its entry is skipped; any
    /// other error aborts the load.
    pub async fn load(&self, states: &BTreeMap<String, State>) -> Result<ResourceGroups> {
        let adapter = ResourceAdapter::new(self.registry);
        let adapter = &adapter;

        let tasks = states.iter().flat_map(|(group, state)| {
            state.resource_meta.iter().map(move |(name, meta)| async move {
                match adapter.get(meta.kind, &meta.grafana, &meta.uid).await {
                    Ok(resource) => Ok(Some((group.clone(), name.clone(), resource))),
                    Err(GdbtError::Provider(ProviderError::GrafanaResourceNotFound(_))) => {
                        warn!(group = %group, name = %name, uid = %meta.uid, "resource vanished from Grafana");
                        Ok(None)
                    }
                    Err(e) => Err(e),
                }
            })
        });

        let fetched = tokio::time::timeout(
            Duration::from_secs_f64(self.timeout),
            futures::stream::iter(tasks)
                .buffer_unordered(self.threads.max(1))
                .collect::<Vec<Result<_>>>(),
        )
        .await
        .map_err(|_| {
            ProviderError::Other(format!(
                "timed out after {} s loading live resources",
                self.timeout
            ))
        })?;

        let mut groups = ResourceGroups::new();
        for group in states.keys() {
            groups.insert(group.clone(), BTreeMap::new());
        }
        for result in fetched {
            if let Some((group, name, resource)) = result? {
                debug!(group = %group, name = %name, "loaded live resource");
                groups.entry(group).or_default().insert(name, resource);
            }
        }
        Ok(groups)
    }
}

/// Drop groups that ended up empty (everything vanished remotely and no
/// meta entries remain)
pub fn prune_empty_groups(groups: &mut ResourceGroups) {
    groups.retain(|_, resources| !resources.is_empty());
}
