use crate::CLIError;
use bacnet_core::registry::{
    DeviceReadProperty, ObjectId, ObjectPropertyList, PropertyListKind, PropertyReference,
};
use bacnet_core::rpm::{ObjectSpecifier, RpmRequest};
use bacnet_core::{DefaultRuntimeParams, PeerAddress, PropertyFailure, Stack, StackConfig};
use std::collections::HashMap;

/// A minimal in-memory device object database, standing in for the real
/// registry a host would inject. Serves only as a fixture for this demo.
struct FixtureDevice {
    device_instance: u32,
    present_values: HashMap<ObjectId, f32>,
}

const PROPERTY_PRESENT_VALUE: u32 = 85;
const PROPERTY_OBJECT_NAME: u32 = 77;

impl DeviceReadProperty for FixtureDevice {
    fn object_exists(&self, object: ObjectId) -> bool {
        self.present_values.contains_key(&object)
    }

    fn read_property(
        &self,
        object: ObjectId,
        property_id: u32,
        _array_index: Option<u32>,
    ) -> Result<Vec<u8>, PropertyFailure> {
        match property_id {
            PROPERTY_PRESENT_VALUE => self
                .present_values
                .get(&object)
                .map(|v| v.to_be_bytes().to_vec())
                .ok_or(PropertyFailure::Error(
                    bacnet_core::ErrorClass::Object,
                    bacnet_core::ErrorCode::UnknownObject,
                )),
            PROPERTY_OBJECT_NAME => Ok(format!("AI-{}", object.instance).into_bytes()),
            _ => Err(PropertyFailure::Error(
                bacnet_core::ErrorClass::Property,
                bacnet_core::ErrorCode::UnknownProperty,
            )),
        }
    }

    fn is_array_property(&self, _object: ObjectId, _property_id: u32) -> bool {
        false
    }
}

impl ObjectPropertyList for FixtureDevice {
    fn property_count(&self, _object: ObjectId, kind: PropertyListKind) -> usize {
        match kind {
            PropertyListKind::Optional => 0,
            _ => 2,
        }
    }

    fn property_at(&self, _object: ObjectId, kind: PropertyListKind, index: usize) -> Option<u32> {
        match kind {
            PropertyListKind::Optional => None,
            _ => [PROPERTY_PRESENT_VALUE, PROPERTY_OBJECT_NAME].get(index).copied(),
        }
    }

    fn local_device_instance(&self) -> u32 {
        self.device_instance
    }
}

struct CountingSender {
    bytes_sent: usize,
}

impl bacnet_core::dispatch::PduSender for CountingSender {
    fn send_pdu(&mut self, _dest: &PeerAddress, pdu: &[u8]) -> usize {
        self.bytes_sent += pdu.len();
        pdu.len()
    }
}

pub fn sub_command() -> clap::App<'static, 'static> {
    clap::SubCommand::with_name("demo")
        .about("Run a simulated ReadPropertyMultiple exchange against fixture analog-input objects")
}

pub fn demo_matches(parent_logger: &slog::Logger, _matches: &clap::ArgMatches) -> Result<(), CLIError> {
    let logger = parent_logger.new(o!());

    let mut present_values = HashMap::new();
    present_values.insert(ObjectId::new(0, 1), 72.5f32);
    present_values.insert(ObjectId::new(0, 2), 68.1f32);
    let device = FixtureDevice {
        device_instance: 1001,
        present_values,
    };

    let request = RpmRequest {
        specifiers: vec![
            ObjectSpecifier {
                object: ObjectId::new(0, 1),
                properties: vec![PropertyReference {
                    property_id: bacnet_core::rpm::PROPERTY_ALL,
                    array_index: None,
                }],
            },
            ObjectSpecifier {
                object: ObjectId::new(0, 99),
                properties: vec![PropertyReference {
                    property_id: PROPERTY_PRESENT_VALUE,
                    array_index: None,
                }],
            },
        ],
    };

    let config = StackConfig::default();
    match bacnet_core::rpm::handle_read_property_multiple(&request, &device, &device, config.max_apdu) {
        Ok(body) => {
            info!(logger, "assembled rpm response"; "len" => body.len());
            println!("assembled {} bytes of RPM response payload", body.len());
        }
        Err(status) => {
            error!(logger, "rpm assembly failed"; "status" => %status);
            println!("rpm assembly failed: {}", status);
        }
    }

    let stack = Stack::new(config, DefaultRuntimeParams);
    let mut sender = CountingSender { bytes_sent: 0 };
    let peer = PeerAddress::local(&[0xC0, 0xA8, 0x01, 0x02]);
    let request_payload = [0u8; 8];
    match stack.send_confirmed_request(&mut sender, peer, 14, &request_payload) {
        Ok(invoke_id) => {
            info!(logger, "sent confirmed request"; "invoke_id" => invoke_id, "bytes" => sender.bytes_sent)
        }
        Err(_) => error!(logger, "failed to send confirmed request"),
    }

    Ok(())
}
