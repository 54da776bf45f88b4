//! Wire-envelope builders over the registry (C6). Kept separate from
//! `DeviceRegistry` so tests can assert the envelope shape directly.

use stonegate_proto::{DescriptorMessage, MeasurementEntry, MeasurementUpdate};

use crate::registry::DeviceRegistry;

pub fn build_descriptor_message(registry: &DeviceRegistry) -> DescriptorMessage {
    DescriptorMessage::new(registry.descriptor_graph())
}

pub fn build_measurement_update(registry: &DeviceRegistry) -> MeasurementUpdate {
    let entries = registry
        .poll_all()
        .into_iter()
        .map(|(device_id, measurement)| MeasurementEntry {
            id: device_id.to_string(),
            measurement,
        })
        .collect();
    MeasurementUpdate::new(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Device;
    use std::sync::Arc;
    use stonegate_proto::{DeviceDescriptor, DeviceId, JsonValue, Measurement};

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
    fn descriptor_message_lists_every_registered_device() {
        let registry = DeviceRegistry::new();
        registry.register(Arc::new(StubDevice {
            id: DeviceId::new("tc1").unwrap(),
        }));
        let message = build_descriptor_message(&registry);
        assert_eq!(message.devices.len(), 1);
    }

    #[test]
    fn measurement_update_carries_device_ids() {
        let registry = DeviceRegistry::new();
        registry.register(Arc::new(StubDevice {
            id: DeviceId::new("tc1").unwrap(),
        }));
        let update = build_measurement_update(&registry);
        assert_eq!(update.updates[0].id, "tc1");
    }
}
