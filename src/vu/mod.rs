//! Virtual users and the pool that owns them.
mod pool;
mod user;


pub use pool::{PoolShutdown, VuPool};
pub use user::{VirtualUser, VuControl, VuState};
