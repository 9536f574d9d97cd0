//! Voice Core
//!
//! Per-user WebRTC media peers, the in-memory session registries, the
//! signaling coordinator driven by control frames, and the RTP audio
//! fan-out workers. Control frames themselves arrive over WebSocket
//! (see `ws`).

mod active;
mod error;
mod factory;
mod forward;
mod peer;
mod signaling;
mod store;

pub use active::{ActiveUser, ActiveUserDirectory};
pub use error::VoiceError;
pub use factory::PeerFactory;
pub use peer::{MediaPeer, PeerRegistry};
pub use signaling::SignalingCoordinator;
pub use store::{ChannelRef, ChannelStore, UserRef, UserStore};
