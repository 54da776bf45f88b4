//! Device registry, physics simulation, and recording engine (C2-C7).

pub mod descriptor_protocol;
pub mod device;
pub mod error;
pub mod loader;
pub mod physics;
pub mod recorder;
pub mod registry;
pub mod simulated;

pub use device::Device;
pub use error::CoreError;
pub use physics::{EnvironmentalState, Node, PhysicsEngine};
pub use recorder::Recorder;
pub use registry::DeviceRegistry;
pub use simulated::SimulatedDevice;
