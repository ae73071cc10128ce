//! Dedicated server registry and READY-server allocation

pub mod allocator;

pub use allocator::{DedicatedServerRegistry, ServerAllocator, ServerRegistration};
