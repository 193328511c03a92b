//! `opsdesk-events` — domain event contracts and pub/sub mechanics.
//!
//! Events are stored first (event store is the source of truth) and published
//! after; the bus is transport only. Consumers must be idempotent: delivery is
//! at-least-once and duplicates are possible.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::InMemoryEventBus;
