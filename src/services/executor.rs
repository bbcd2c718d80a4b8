//! Plan executor
//!
//! Applies a plan in five ordered phases: create folders, create
//! dashboards, update everything, delete dashboards, delete folders.
//! Tasks inside a phase run concurrently in a bounded pool; phases are
//! barriers. After every phase the state store is rewritten from whatever
//! actually succeeded, so a crash mid-apply leaves state consistent with
//! the last completed transition.
//!
//! While the executor runs, termination signals are swallowed so a
//! Ctrl-C cannot half-apply a plan.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use futures::StreamExt;
use tracing::warn;

use crate::domain::plan::{Action, Plan};
use crate::domain::resource::{Resource, ResourceKind};
use crate::domain::state::State;
use crate::error::{GdbtError, ProviderError, Result};
use crate::infrastructure::grafana::ResourceAdapter;
use crate::infrastructure::{ProviderRegistry, StateStore};
use crate::services::planner::group_of;
use crate::ui;

pub struct PlanExecutor<'a> {
    registry: &'a ProviderRegistry,
    store: &'a StateStore<'a>,
    threads: usize,
    timeout: f64,
}

enum Mutation {
    Upsert(String, Resource),
    Drop(String),
}

impl<'a> PlanExecutor<'a> {
    pub fn new(
        registry: &'a ProviderRegistry,
        store: &'a StateStore<'a>,
        threads: usize,
        timeout: f64,
    ) -> Self {
        Self {
            registry,
            store,
            threads,
            timeout,
        }
    }

    /// Apply the plan. Returns the number of modified resources. The first
    /// task error is surfaced after its phase barrier; completed work stays
    /// applied and persisted.
    pub async fn execute(
        &self,
        plan: &Plan,
        current: &BTreeMap<String, Resource>,
        desired: &BTreeMap<String, Resource>,
    ) -> Result<usize> {
        let _guard = SignalGuard::install();

        let involved: BTreeSet<String> = current
            .keys()
            .chain(desired.keys())
            .map(|name| group_of(name).to_string())
            .collect();

        // Best-effort group locks; no backend implements a real lease yet
        for group in &involved {
            self.store.lock(group).await?;
        }
        let result = self.apply_phases(plan, current, desired, &involved).await;
        for group in &involved {
            if let Err(e) = self.store.unlock(group).await {
                warn!(group = %group, error = %e, "failed to unlock state group");
            }
        }
        result
    }

    async fn apply_phases(
        &self,
        plan: &Plan,
        current: &BTreeMap<String, Resource>,
        desired: &BTreeMap<String, Resource>,
        involved: &BTreeSet<String>,
    ) -> Result<usize> {
        let mut live = current.clone();
        let mut applied = 0;

        for names in phases(plan) {
            if names.is_empty() {
                continue;
            }

            let adapter = ResourceAdapter::new(self.registry);
            let tasks = names.iter().map(|name| {
                let adapter = &adapter;
                let live = &live;
                async move {
                    self.run_task(adapter, plan, live, desired, name)
                        .await
                        .map_err(|e| (name.clone(), e))
                }
            });

            let results = tokio::time::timeout(
                Duration::from_secs_f64(self.timeout),
                futures::stream::iter(tasks)
                    .buffer_unordered(self.threads.max(1))
                    .collect::<Vec<std::result::Result<Mutation, (String, GdbtError)>>>(),
            )
            .await
            .map_err(|_| {
                ProviderError::Other(format!(
                    "timed out after {} s applying changes",
                    self.timeout
                ))
            })?;

            let mut first_error = None;
            for result in results {
                match result {
                    Ok(Mutation::Upsert(name, resource)) => {
                        applied += 1;
                        live.insert(name, resource);
                    }
                    Ok(Mutation::Drop(name)) => {
                        applied += 1;
                        live.remove(&name);
                    }
                    Err((name, error)) => {
                        ui::print_error(&format!("Failed to apply {}: {}", name, error));
                        if first_error.is_none() {
                            first_error = Some(error);
                        }
                    }
                }
            }

            self.persist(&live, involved).await?;

            if let Some(error) = first_error {
                return Err(error);
            }
        }

        Ok(applied)
    }

    async fn run_task(
        &self,
        adapter: &ResourceAdapter<'_>,
        plan: &Plan,
        live: &BTreeMap<String, Resource>,
        desired: &BTreeMap<String, Resource>,
        name: &str,
    ) -> Result<Mutation> {
        let change = plan
            .changes
            .get(name)
            .ok_or_else(|| GdbtError::Data(format!("no planned change for {}", name)))?;

        match change.action {
            Action::Create => {
                let resource = desired
                    .get(name)
                    .ok_or_else(|| GdbtError::Data(format!("no desired resource for {}", name)))?;
                let created = adapter.create(resource).await?;
                ui::print_success(&format!("Created {} {}", change.kind, name));
                Ok(Mutation::Upsert(name.to_string(), created))
            }
            Action::Update => {
                let current_resource = live
                    .get(name)
                    .ok_or_else(|| GdbtError::Data(format!("no live resource for {}", name)))?;
                let desired_resource = desired
                    .get(name)
                    .ok_or_else(|| GdbtError::Data(format!("no desired resource for {}", name)))?;
                adapter
                    .update(current_resource, desired_resource.model())
                    .await?;
                ui::print_success(&format!("Updated {} {}", change.kind, name));
                Ok(Mutation::Upsert(name.to_string(), desired_resource.clone()))
            }
            Action::Remove => {
                let current_resource = live
                    .get(name)
                    .ok_or_else(|| GdbtError::Data(format!("no live resource for {}", name)))?;
                adapter
                    .delete(
                        current_resource.kind(),
                        current_resource.grafana(),
                        current_resource.uid(),
                    )
                    .await?;
                ui::print_success(&format!("Deleted {} {}", change.kind, name));
                Ok(Mutation::Drop(name.to_string()))
            }
        }
    }

    /// Rewrite the state of every involved group; emptied groups are removed
    async fn persist(
        &self,
        live: &BTreeMap<String, Resource>,
        involved: &BTreeSet<String>,
    ) -> Result<()> {
        for group in involved {
            let resources: BTreeMap<String, Resource> = live
                .iter()
                .filter(|(name, _)| group_of(name) == group)
                .map(|(name, resource)| (name.clone(), resource.clone()))
                .collect();
            match State::from_resources(&resources) {
                Some(state) => self.store.put(group, &state.to_document()).await?,
                None => self.store.remove(group).await?,
            }
        }
        Ok(())
    }
}

/// The five ordering phases: folder creates, dashboard creates, updates,
/// dashboard deletes, folder deletes. Phases may be empty.
fn phases(plan: &Plan) -> [Vec<String>; 5] {
    let mut updates = plan.names_for(Action::Update, ResourceKind::Folder);
    updates.extend(plan.names_for(Action::Update, ResourceKind::Dashboard));
    [
        plan.names_for(Action::Create, ResourceKind::Folder),
        plan.names_for(Action::Create, ResourceKind::Dashboard),
        updates,
        plan.names_for(Action::Remove, ResourceKind::Dashboard),
        plan.names_for(Action::Remove, ResourceKind::Folder),
    ]
}

/// Swallows termination signals for as long as it is alive
struct SignalGuard {
    #[cfg(unix)]
    tasks: Vec<tokio::task::JoinHandle<()>>,
}

impl SignalGuard {
    #[cfg(unix)]
    fn install() -> Self {
        use tokio::signal::unix::{signal, SignalKind};

        let mut tasks = Vec::new();
        for kind in [
            SignalKind::hangup(),
            SignalKind::interrupt(),
            SignalKind::quit(),
            SignalKind::terminate(),
        ] {
            match signal(kind) {
                Ok(mut stream) => {
                    tasks.push(tokio::spawn(async move {
                        while stream.recv().await.is_some() {
                            warn!("termination signal ignored while applying changes");
                        }
                    }));
                }
                Err(e) => warn!(error = %e, "could not install signal guard"),
            }
        }
        Self { tasks }
    }

    #[cfg(not(unix))]
    fn install() -> Self {
        Self {}
    }
}

impl Drop for SignalGuard {
    fn drop(&mut self) {
        #[cfg(unix)]
        for task in &self.tasks {
            task.abort();
        }
    }
}
