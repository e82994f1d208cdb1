//! Domain Layer - Watchlist and quote reconciliation.
//!
//! Pure types and state machines with no I/O. Everything asynchronous lives
//! in the application and infrastructure layers and talks to this layer
//! through owned values.

/// Quote, observation, and connection state types.
pub mod quote;

/// Last-write-wins quote reconciliation with generation tagging.
pub mod reconciliation;

/// Ordered watchlist with a selection pointer.
pub mod watchlist;
