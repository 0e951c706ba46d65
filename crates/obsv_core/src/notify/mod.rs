//! Change notification.
//!
//! Three ways of hearing about changes:
//! - [`ObserverRegistry`]: synchronous callbacks with cancellable
//!   [`Subscription`] handles
//! - [`ChangeFeed`]: sequence-numbered events over channels, with polling
//! - [`ChangeSignal`]: one notification per session instead of per event

mod change_feed;
mod registry;
mod signal;

pub use change_feed::{ChangeFeed, Sequenced};
pub use registry::{Observer, ObserverRegistry, Subscription};
pub use signal::ChangeSignal;
