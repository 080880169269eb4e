//! Application layer: commands, storage ports and the services that run them.
pub mod commands;
mod guards;
pub mod lifecycle;
pub mod listings;
pub mod ports;
pub mod result;

pub use lifecycle::RequestLifecycle;
pub use listings::ListingCatalog;
pub use result::{CommandResult, FailureKind};
