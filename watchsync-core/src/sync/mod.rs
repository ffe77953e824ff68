//! Sync Engine
//!
//! Playback state values and session state exchanged between peers.

mod protocol;
mod state;

pub use protocol::*;
pub use state::*;
