//! Command execution pipeline.
//!
//! One consistent path for every aggregate:
//!
//! ```text
//! load stream → validate → rehydrate → handle → append → publish
//! ```
//!
//! Events are appended before publication, so a publish failure leaves the
//! store correct and delivery is at-least-once; projections must tolerate
//! replays. Tenant isolation is re-checked on loaded streams even though the
//! store already enforces it.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use opsdesk_core::{Aggregate, AggregateId, DomainError, ExpectedVersion, TenantId};
use opsdesk_events::{EventBus, EventEnvelope};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

#[derive(Debug)]
pub enum DispatchError {
    /// Optimistic concurrency failure (stale aggregate version).
    Concurrency(String),
    /// Cross-tenant or cross-aggregate stream mixing.
    TenantIsolation(String),
    /// Domain validation failure.
    Validation(String),
    /// Domain invariant failure.
    InvariantViolation(String),
    /// Domain-level not found.
    NotFound,
    /// Historical payload did not deserialize into the aggregate event type.
    Deserialize(String),
    /// Persisting to the event store failed.
    Store(EventStoreError),
    /// Publication failed after a successful append.
    Publish(String),
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match &value {
            EventStoreError::Concurrency(msg) => DispatchError::Concurrency(msg.clone()),
            EventStoreError::TenantIsolation(msg) => DispatchError::TenantIsolation(msg.clone()),
            _ => DispatchError::Store(value),
        }
    }
}

impl From<DomainError> for DispatchError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => DispatchError::Validation(msg),
            DomainError::InvariantViolation(msg) => DispatchError::InvariantViolation(msg),
            DomainError::NotFound => DispatchError::NotFound,
            DomainError::InvalidId(msg) => DispatchError::Validation(msg),
        }
    }
}

/// Reusable command execution engine for event-sourced aggregates.
///
/// Generic over the store and bus so tests can run fully in memory. The
/// aggregate factory closure keeps the dispatcher ignorant of how aggregates
/// are constructed (`User::empty(id)` and friends stay in domain code).
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Run a command through the full pipeline, returning the committed
    /// events. A command that decides nothing commits nothing.
    pub fn dispatch<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        command: A::Command,
        make_aggregate: impl FnOnce(TenantId, AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: opsdesk_events::Event + Serialize + DeserializeOwned,
    {
        let history = self.store.load_stream(tenant_id, aggregate_id)?;
        validate_loaded_stream(tenant_id, aggregate_id, &history)?;
        let expected = ExpectedVersion::Exact(stream_version(&history));

        let mut aggregate = make_aggregate(tenant_id, aggregate_id);
        apply_history::<A>(&mut aggregate, &history)?;

        let decided = aggregate.handle(&command).map_err(DispatchError::from)?;
        if decided.is_empty() {
            return Ok(vec![]);
        }

        let aggregate_type = aggregate_type.into();
        let uncommitted = decided
            .iter()
            .map(|ev| {
                UncommittedEvent::from_typed(
                    tenant_id,
                    aggregate_id,
                    aggregate_type.clone(),
                    Uuid::now_v7(),
                    ev,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let committed = self.store.append(uncommitted, expected)?;

        for stored in &committed {
            self.bus
                .publish(stored.to_envelope())
                .map_err(|e| DispatchError::Publish(format!("{e:?}")))?;
        }

        tracing::debug!(
            tenant_id = %tenant_id,
            aggregate_id = %aggregate_id,
            aggregate_type = %aggregate_type,
            committed = committed.len(),
            "command dispatched"
        );

        Ok(committed)
    }
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

fn validate_loaded_stream(
    tenant_id: TenantId,
    aggregate_id: AggregateId,
    stream: &[StoredEvent],
) -> Result<(), DispatchError> {
    // Defence in depth: enforce tenant isolation and monotonic ordering even
    // if a buggy backend returns garbage.
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.tenant_id != tenant_id {
            return Err(DispatchError::TenantIsolation(format!(
                "loaded stream contains wrong tenant_id at index {idx}"
            )));
        }
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::TenantIsolation(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            )));
        }
        if e.sequence_number <= last {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "non-monotonic sequence_number in loaded stream (last={last}, found={})",
                e.sequence_number
            ))));
        }
        last = e.sequence_number;
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    let mut sorted = history.to_vec();
    sorted.sort_by_key(|e| e.sequence_number);

    for stored in sorted {
        let ev: A::Event = serde_json::from_value(stored.payload)
            .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
        aggregate.apply(&ev);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::Utc;
    use opsdesk_auth::UserRole;
    use opsdesk_events::InMemoryEventBus;
    use opsdesk_identity::{CreateUser, User, UserCommand};
    use opsdesk_core::UserId;

    use crate::event_store::InMemoryEventStore;

    fn dispatcher() -> CommandDispatcher<
        Arc<InMemoryEventStore>,
        Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>,
    > {
        CommandDispatcher::new(
            Arc::new(InMemoryEventStore::new()),
            Arc::new(InMemoryEventBus::new()),
        )
    }

    fn create_cmd(tenant_id: TenantId, user_id: UserId) -> UserCommand {
        UserCommand::Create(CreateUser {
            tenant_id,
            user_id,
            email: "alice@example.com".to_string(),
            first_name: "Alice".to_string(),
            last_name: "Smith".to_string(),
            role: UserRole::Employee,
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn dispatch_persists_and_replays() {
        let d = dispatcher();
        let tenant_id = TenantId::new();
        let user_id = UserId::new();
        let aggregate_id = AggregateId::from(user_id);

        let committed = d
            .dispatch::<User>(
                tenant_id,
                aggregate_id,
                "identity.user",
                create_cmd(tenant_id, user_id),
                |_t, id| User::empty(id.into()),
            )
            .unwrap();
        assert_eq!(committed.len(), 1);
        assert_eq!(committed[0].sequence_number, 1);

        // Creating twice fails on the rehydrated state.
        let err = d
            .dispatch::<User>(
                tenant_id,
                aggregate_id,
                "identity.user",
                create_cmd(tenant_id, user_id),
                |_t, id| User::empty(id.into()),
            )
            .unwrap_err();
        assert!(matches!(err, DispatchError::InvariantViolation(_)));
    }

    #[test]
    fn dispatch_publishes_committed_events() {
        let store = Arc::new(InMemoryEventStore::new());
        let bus = Arc::new(InMemoryEventBus::new());
        let sub = bus.subscribe();
        let d = CommandDispatcher::new(store, bus);

        let tenant_id = TenantId::new();
        let user_id = UserId::new();

        d.dispatch::<User>(
            tenant_id,
            AggregateId::from(user_id),
            "identity.user",
            create_cmd(tenant_id, user_id),
            |_t, id| User::empty(id.into()),
        )
        .unwrap();

        let envelope = sub.try_recv().unwrap();
        assert_eq!(envelope.aggregate_type(), "identity.user");
        assert_eq!(envelope.tenant_id(), tenant_id);
    }

    #[test]
    fn noop_command_commits_nothing() {
        let d = dispatcher();
        let tenant_id = TenantId::new();
        let user_id = UserId::new();
        let aggregate_id = AggregateId::from(user_id);

        d.dispatch::<User>(
            tenant_id,
            aggregate_id,
            "identity.user",
            create_cmd(tenant_id, user_id),
            |_t, id| User::empty(id.into()),
        )
        .unwrap();

        let committed = d
            .dispatch::<User>(
                tenant_id,
                aggregate_id,
                "identity.user",
                UserCommand::GrantPermissions(opsdesk_identity::GrantPermissions {
                    tenant_id,
                    user_id,
                    permissions: vec![],
                    occurred_at: Utc::now(),
                }),
                |_t, id| User::empty(id.into()),
            )
            .unwrap();
        assert!(committed.is_empty());
    }

    #[test]
    fn domain_rejections_map_onto_dispatch_errors() {
        assert!(matches!(
            DispatchError::from(DomainError::validation("empty name")),
            DispatchError::Validation(_)
        ));
        assert!(matches!(
            DispatchError::from(DomainError::invalid_id("UserId: bad uuid")),
            DispatchError::Validation(_)
        ));
        assert!(matches!(
            DispatchError::from(DomainError::NotFound),
            DispatchError::NotFound
        ));

        // Rejections surface before anything is appended.
        let d = dispatcher();
        let tenant_id = TenantId::new();
        let user_id = UserId::new();
        let mut cmd = create_cmd(tenant_id, user_id);
        if let UserCommand::Create(ref mut c) = cmd {
            c.email = "not-an-email".to_string();
        }
        let err = d
            .dispatch::<User>(
                tenant_id,
                AggregateId::from(user_id),
                "identity.user",
                cmd,
                |_t, id| User::empty(id.into()),
            )
            .unwrap_err();
        assert!(matches!(err, DispatchError::Validation(_)));
    }
}
