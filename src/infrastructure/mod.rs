//! Storage and messaging adapters.
pub mod memory;
pub mod nats;
pub mod postgres;

pub use memory::InMemoryCatalogStore;
pub use nats::NatsEventPublisher;
pub use postgres::PgCatalogStore;
