//! N-1 port registry.
//!
//! Owns every port bound below the RMT, its lifecycle state, its queues and
//! its statistics.
//!
//! # Lifecycle
//!
//! ```text
//!            bind
//!             │
//!             ▼      enable         enable
//!         Enabled ◄──────── Disabled      Enabled ──────► DoNotDisable
//!             │                ▲                              │
//!             └──── disable ───┘        Enabled ◄── disable ──┘
//!
//!   any ── unbind ──► Deallocated ── last PortHandle dropped ──► destroyed
//! ```
//!
//! Lookups hand out [`PortHandle`]s, which hold a counted reference. A port
//! that is unbound while handles are outstanding stays alive until the last
//! handle is dropped; that drop frees whatever is still queued or pending.

mod port;
mod queues;
mod registry;
mod state;
mod stats;

pub use port::N1Port;
pub(crate) use port::PortInner;
pub use queues::QueueSet;
pub use registry::{PortHandle, PortRegistry};
pub use state::PortState;
pub use stats::{PortSnapshot, PortStats};
