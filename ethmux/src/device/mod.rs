//! Device backends.

mod loopback;

pub use loopback::LoopbackDevice;
