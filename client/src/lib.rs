//! Client-side library: the `ClockManagerClient` facade, per-time-base
//! state, subscription evaluation, and liveness tracking.

pub mod error;
pub mod facade;
pub mod liveness;
pub mod logging;
pub mod state;
pub mod subscription;

pub use error::ClientError;
pub use facade::{ClockManagerClient, ClockStatus};
pub use state::{StatusSnapshot, WaitTimeout};
pub use subscription::Subscription;
