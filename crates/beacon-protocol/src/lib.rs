//! Wire format spoken between the gateway and browser clients.

pub mod filter;
pub mod frames;
pub mod methods;

pub use filter::{FilterSignature, SubscriptionKey};
pub use frames::{ClientFrame, Established, FrameError, ServerFrame};
