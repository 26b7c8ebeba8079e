//! Plan execution against a provider, with state persisted after each effect

use std::collections::HashMap;

use colored::Colorize;

use amiform_core::effect::Effect;
use amiform_core::plan::{Plan, format_effect};
use amiform_core::provider::{Provider, ProviderError};
use amiform_core::resource::{Resource, ResourceId, State};
use amiform_state::{StateBackend, StateFile};

/// Counts of effects that succeeded and failed during an apply
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub succeeded: usize,
    pub failed: usize,
}

/// Refresh every recorded resource from the provider
///
/// Resources that no longer exist are left out. Taint survives the refresh.
pub async fn refresh_states(
    provider: &dyn Provider,
    state: &StateFile,
) -> Result<HashMap<ResourceId, State>, String> {
    let mut current = HashMap::new();

    for (id, recorded) in state.current_states() {
        let Some(identifier) = recorded.identifier.clone() else {
            log::warn!("{} has no recorded identifier, treating it as gone", id);
            continue;
        };

        let refreshed = provider
            .read(&id, &identifier, &recorded)
            .await
            .map_err(|e| format!("Failed to read state: {}", e))?;

        if refreshed.exists {
            current.insert(id, refreshed.with_tainted(recorded.tainted));
        } else {
            log::info!("{} ({}) was deleted outside amiform", id, identifier);
        }
    }

    Ok(current)
}

/// Bump the serial and write the state
pub async fn persist(backend: &dyn StateBackend, state: &mut StateFile) -> Result<(), String> {
    state.increment_serial();
    backend
        .write_state(state)
        .await
        .map_err(|e| format!("Failed to write state: {}", e))
}

/// Apply effects in order
///
/// Provider failures are reported and counted; the remaining effects still
/// run. Failing to persist state stops the apply.
pub async fn apply_plan(
    provider: &dyn Provider,
    backend: &dyn StateBackend,
    state: &mut StateFile,
    plan: &Plan,
) -> Result<ApplyOutcome, String> {
    let mut outcome = ApplyOutcome::default();

    for effect in plan.effects() {
        let result = match effect {
            Effect::Read(_) => continue,
            Effect::Create(resource) => create(provider, backend, state, resource).await,
            Effect::Update { id, from, to } => {
                update(provider, backend, state, id, from, to).await
            }
            Effect::Replace { id, from, to, .. } => {
                match delete(provider, backend, state, id, from).await {
                    Ok(()) => create(provider, backend, state, to).await,
                    Err(e) => Err(e),
                }
            }
            Effect::Delete { id, from } => delete(provider, backend, state, id, from).await,
        };

        match result {
            Ok(()) => {
                println!("  {} {}", "✓".green(), format_effect(effect));
                outcome.succeeded += 1;
            }
            Err(Failure::Provider(e)) => {
                println!("  {} {} - {}", "✗".red(), format_effect(effect), e);
                outcome.failed += 1;
            }
            Err(Failure::State(e)) => return Err(e),
        }
    }

    Ok(outcome)
}

/// Delete every resource in `current`, in reverse id order
pub async fn destroy_all(
    provider: &dyn Provider,
    backend: &dyn StateBackend,
    state: &mut StateFile,
    current: &HashMap<ResourceId, State>,
) -> Result<ApplyOutcome, String> {
    let mut plan = Plan::new();
    let mut ids: Vec<&ResourceId> = current.keys().collect();
    ids.sort();
    for id in ids.into_iter().rev() {
        plan.add(Effect::Delete {
            id: id.clone(),
            from: current[id].clone(),
        });
    }

    // Entries whose images are already gone are dropped without a call
    let stale: Vec<ResourceId> = state
        .resources
        .iter()
        .map(|r| ResourceId::new(&r.resource_type, &r.name))
        .filter(|id| !current.contains_key(id))
        .collect();
    if !stale.is_empty() {
        for id in &stale {
            state.remove_resource(id);
        }
        persist(backend, state).await?;
    }

    apply_plan(provider, backend, state, &plan).await
}

enum Failure {
    Provider(ProviderError),
    State(String),
}

async fn record(
    backend: &dyn StateBackend,
    state: &mut StateFile,
    outcome: &State,
    provider: &str,
) -> Result<(), Failure> {
    state.record(outcome, provider);
    persist(backend, state).await.map_err(Failure::State)
}

async fn create(
    provider: &dyn Provider,
    backend: &dyn StateBackend,
    state: &mut StateFile,
    resource: &Resource,
) -> Result<(), Failure> {
    match provider.create(resource).await {
        Ok(created) => record(backend, state, &created, provider.name()).await,
        Err(mut e) => {
            // The remote object exists; keep it so the next apply replaces it
            if let Some(partial) = e.partial_state.take() {
                log::warn!(
                    "Recording {} ({}) as tainted",
                    partial.id,
                    partial.identifier.as_deref().unwrap_or("unknown")
                );
                record(backend, state, &partial.with_tainted(true), provider.name()).await?;
            }
            Err(Failure::Provider(e))
        }
    }
}

async fn update(
    provider: &dyn Provider,
    backend: &dyn StateBackend,
    state: &mut StateFile,
    id: &ResourceId,
    from: &State,
    to: &Resource,
) -> Result<(), Failure> {
    let identifier = from.identifier.as_deref().ok_or_else(|| {
        Failure::Provider(
            ProviderError::new("No identifier recorded for update").for_resource(id.clone()),
        )
    })?;

    let updated = provider
        .update(id, identifier, from, to)
        .await
        .map_err(Failure::Provider)?;
    record(backend, state, &updated, provider.name()).await
}

async fn delete(
    provider: &dyn Provider,
    backend: &dyn StateBackend,
    state: &mut StateFile,
    id: &ResourceId,
    from: &State,
) -> Result<(), Failure> {
    match from.identifier.as_deref() {
        Some(identifier) => provider
            .delete(id, identifier, from)
            .await
            .map_err(Failure::Provider)?,
        None => log::warn!("{} has no recorded identifier, dropping it from state", id),
    }
    record(backend, state, &State::not_found(id.clone()), provider.name()).await
}
