//! Catalog domain: aggregates, value objects, events and slug allocation.
pub mod aggregates;
pub mod events;
pub mod slug;
pub mod value_objects;
