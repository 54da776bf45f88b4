use std::sync::{Arc, Mutex};

use stonegate_proto::{DeviceDescriptor, DeviceId};

use crate::device::Device;

/// Thread-safe indexed collection of devices. All operations serialize
/// through a single mutex over the internal sequence; `descriptor_graph`
/// and `poll_all` snapshot the list, release the lock, then call into
/// devices, so a device callback can never deadlock against the registry.
#[derive(Default)]
pub struct DeviceRegistry {
    devices: Mutex<Vec<Arc<dyn Device>>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `device`. If a device with the same id is already
    /// present, the earlier registration wins and this call is a no-op —
    /// callers that need to know should `get` first.
    pub fn register(&self, device: Arc<dyn Device>) {
        let mut devices = self.devices.lock().unwrap();
        if devices.iter().any(|d| d.id() == device.id()) {
            return;
        }
        devices.push(device);
    }

    pub fn get(&self, id: &DeviceId) -> Option<Arc<dyn Device>> {
        self.devices
            .lock()
            .unwrap()
            .iter()
            .find(|d| d.id() == id)
            .cloned()
    }

    /// Snapshots the device list and invokes `f` for each one outside the
    /// lock. `f` must not re-enter the registry.
    pub fn for_each(&self, mut f: impl FnMut(&Arc<dyn Device>)) {
        let snapshot = self.devices.lock().unwrap().clone();
        for device in &snapshot {
            f(device);
        }
    }

    pub fn descriptor_graph(&self) -> Vec<DeviceDescriptor> {
        let snapshot = self.devices.lock().unwrap().clone();
        snapshot.iter().map(|d| d.descriptor()).collect()
    }

    pub fn poll_all(&self) -> Vec<(DeviceId, stonegate_proto::Measurement)> {
        let snapshot = self.devices.lock().unwrap().clone();
        snapshot
            .iter()
            .map(|d| (d.id().clone(), d.read_measurement()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.devices.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stonegate_proto::{JsonValue, Measurement};

    struct StubDevice {
        id: DeviceId,
    }

    impl Device for StubDevice {
        fn id(&self) -> &DeviceId {
            &self.id
        }

        fn device_type(&self) -> &str {
            "Stub"
        }

        fn descriptor(&self) -> DeviceDescriptor {
            DeviceDescriptor {
                id: self.id.to_string(),
                device_type: "Stub".to_string(),
                simulated: Some(true),
                properties: vec![],
                metrics: indexmap::IndexMap::new(),
            }
        }

        fn read_measurement(&self) -> Measurement {
            Measurement::nominal(0)
        }

        fn perform_action(&self, _cmd: &JsonValue) {}
    }

    #[test]
    fn register_then_get_round_trips() {
        let registry = DeviceRegistry::new();
        let id = DeviceId::new("tc1").unwrap();
        registry.register(Arc::new(StubDevice { id: id.clone() }));
        assert!(registry.get(&id).is_some());
        assert_eq!(registry.descriptor_graph().len(), 1);
    }

    #[test]
    fn duplicate_registration_keeps_first() {
        let registry = DeviceRegistry::new();
        let id = DeviceId::new("tc1").unwrap();
        registry.register(Arc::new(StubDevice { id: id.clone() }));
        registry.register(Arc::new(StubDevice { id: id.clone() }));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn poll_all_covers_every_registered_device() {
        let registry = DeviceRegistry::new();
        registry.register(Arc::new(StubDevice {
            id: DeviceId::new("a").unwrap(),
        }));
        registry.register(Arc::new(StubDevice {
            id: DeviceId::new("b").unwrap(),
        }));
        assert_eq!(registry.poll_all().len(), 2);
    }
}
