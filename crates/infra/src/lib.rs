//! Infrastructure: event store, command dispatcher, read models, projections.
//!
//! The domain crates are pure; everything that moves events around lives
//! here. The store is append-only with per-stream optimistic concurrency,
//! the dispatcher runs the load → rehydrate → handle → append → publish
//! pipeline, and the projections fold published envelopes into in-memory
//! read models behind the `TenantStore` abstraction.

pub mod command_dispatcher;
pub mod event_store;
pub mod projections;
pub mod read_model;

pub use command_dispatcher::{CommandDispatcher, DispatchError};
pub use event_store::{EventStore, EventStoreError, InMemoryEventStore, StoredEvent, UncommittedEvent};
pub use read_model::{InMemoryTenantStore, OrganisationDirectory, OrganisationRecord, TenantStore};
