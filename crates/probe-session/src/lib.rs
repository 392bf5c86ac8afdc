//! Session core for the RPC probe: target registry, session state, and the
//! synchronizer task that cascades catalog/record reloads as the active
//! target, service, and method change while discarding stale completions.

pub mod registry;
pub mod state;
pub mod sync;

pub use registry::{TargetPatch, TargetRegistry};
pub use state::{Epoch, SessionState};
pub use sync::{
    spawn_session, SessionCommand, SessionHandle, NOTICE_VISIBLE_FOR, RECORD_POLL_INTERVAL,
};
