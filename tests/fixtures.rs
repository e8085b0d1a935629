//! A minimal analog-input/analog-value object database used only as test
//! fixture data (spec §1 non-goal: "AI/AV object definitions"). Not part of
//! the crate's public surface.

use bacnet_core::error::{ErrorClass, ErrorCode, PropertyFailure};
use bacnet_core::registry::{DeviceReadProperty, ObjectId, ObjectPropertyList, PropertyListKind};
use std::collections::HashMap;

pub const PROPERTY_PRESENT_VALUE: u32 = 85;
pub const PROPERTY_OBJECT_NAME: u32 = 77;
pub const PROPERTY_UNITS: u32 = 117;

pub const OBJECT_TYPE_ANALOG_INPUT: u16 = 0;
pub const OBJECT_TYPE_ANALOG_VALUE: u16 = 2;

pub struct FixtureRegistry {
    pub device_instance: u32,
    pub present_values: HashMap<ObjectId, f32>,
    pub array_properties: std::collections::HashSet<(ObjectId, u32)>,
}

impl FixtureRegistry {
    pub fn new(device_instance: u32) -> Self {
        let mut present_values = HashMap::new();
        present_values.insert(ObjectId::new(OBJECT_TYPE_ANALOG_INPUT, 1), 72.5);
        present_values.insert(ObjectId::new(OBJECT_TYPE_ANALOG_INPUT, 2), 68.1);
        present_values.insert(ObjectId::new(OBJECT_TYPE_ANALOG_VALUE, 1), 21.0);
        FixtureRegistry {
            device_instance,
            present_values,
            array_properties: Default::default(),
        }
    }
}

impl DeviceReadProperty for FixtureRegistry {
    fn object_exists(&self, object: ObjectId) -> bool {
        self.present_values.contains_key(&object)
    }

    fn read_property(
        &self,
        object: ObjectId,
        property_id: u32,
        _array_index: Option<u32>,
    ) -> Result<Vec<u8>, PropertyFailure> {
        if !self.present_values.contains_key(&object) {
            return Err(PropertyFailure::Error(
                ErrorClass::Object,
                ErrorCode::UnknownObject,
            ));
        }
        match property_id {
            PROPERTY_PRESENT_VALUE => Ok(self.present_values[&object].to_be_bytes().to_vec()),
            PROPERTY_OBJECT_NAME => Ok(format!("fixture-{}", object.instance).into_bytes()),
            PROPERTY_UNITS => Ok(vec![62]),
            _ => Err(PropertyFailure::Error(
                ErrorClass::Property,
                ErrorCode::UnknownProperty,
            )),
        }
    }

    fn is_array_property(&self, object: ObjectId, property_id: u32) -> bool {
        self.array_properties.contains(&(object, property_id))
    }
}

impl ObjectPropertyList for FixtureRegistry {
    fn property_count(&self, _object: ObjectId, kind: PropertyListKind) -> usize {
        match kind {
            PropertyListKind::Optional => 0,
            _ => 3,
        }
    }

    fn property_at(&self, _object: ObjectId, kind: PropertyListKind, index: usize) -> Option<u32> {
        match kind {
            PropertyListKind::Optional => None,
            _ => [PROPERTY_PRESENT_VALUE, PROPERTY_OBJECT_NAME, PROPERTY_UNITS]
                .get(index)
                .copied(),
        }
    }

    fn local_device_instance(&self) -> u32 {
        self.device_instance
    }
}
