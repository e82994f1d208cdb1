//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `session`: The watchlist session event loop
//! - `sidebar`: Polled prices for every watchlist symbol

pub mod session;
pub mod sidebar;

pub use session::{
    POLL_ERROR_MESSAGE, SessionClosed, SessionCommand, SessionHandle, SessionPorts,
    SessionSettings, SessionSnapshot, WatchlistSession,
};
pub use sidebar::{BatchOutcome, NO_TOKEN_MESSAGE, SidebarEntry, SidebarPrices};
