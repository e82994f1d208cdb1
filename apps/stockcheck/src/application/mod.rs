//! Application Layer - Session orchestration and port definitions.
//!
//! This layer contains the session service and the port interfaces
//! that define how the domain interacts with external systems.

/// Port interfaces for external systems (price stream, quotes, storage).
pub mod ports;

/// Application services for the watchlist session and sidebar.
pub mod services;
