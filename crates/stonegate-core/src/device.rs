use stonegate_proto::{DeviceDescriptor, DeviceId, JsonValue, Measurement};

/// Capability set every device, simulated or hardware-backed, implements.
///
/// Implementations may suspend briefly inside these calls but must not
/// hold a lock that would block the broadcast loop for longer than a few
/// milliseconds.
pub trait Device: Send + Sync {
    fn id(&self) -> &DeviceId;
    fn device_type(&self) -> &str;
    fn descriptor(&self) -> DeviceDescriptor;
    fn read_measurement(&self) -> Measurement;
    fn perform_action(&self, cmd: &JsonValue);
}
