//! Shared plumbing for the services and binaries.

pub mod bootstrap;
pub mod retry;
pub mod shutdown;

pub use shutdown::{Shutdown, ShutdownTrigger, TaskHandle};
