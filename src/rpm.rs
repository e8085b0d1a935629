//! ReadPropertyMultiple response assembly (spec §4.D), grounded on
//! `handler_read_property_multiple` and `RPM_Encode_Property` in
//! `h_rpm.c`. Object-id/property-id/array-index/open-close tag framing is
//! written out here (it's the RPM envelope, not a primitive value codec);
//! the property *values* themselves arrive pre-encoded from
//! [`crate::registry::DeviceReadProperty`].

use crate::error::{AbortReason, ErrorClass, ErrorCode, PropertyFailure, ServiceStatus};
use crate::registry::{
    DeviceReadProperty, ObjectId, ObjectPropertyList, PropertyListKind, PropertyReference,
    INDEFINITE_INSTANCE, OBJECT_TYPE_DEVICE, OBJECT_TYPE_NETWORK_PORT,
};

pub const PROPERTY_ALL: u32 = 8;
pub const PROPERTY_REQUIRED: u32 = 111;
pub const PROPERTY_OPTIONAL: u32 = 112;

/// One `{object-id, list-of-properties}` specifier from the request.
#[derive(Clone, Debug)]
pub struct ObjectSpecifier {
    pub object: ObjectId,
    pub properties: Vec<PropertyReference>,
}

#[derive(Clone, Debug)]
pub struct RpmRequest {
    pub specifiers: Vec<ObjectSpecifier>,
}

fn write_opening_tag(out: &mut Vec<u8>, tag_number: u8) {
    out.push((tag_number << 4) | 0x6);
}

fn write_closing_tag(out: &mut Vec<u8>, tag_number: u8) {
    out.push((tag_number << 4) | 0x7);
}

/// Context-tagged `BACnetObjectIdentifier`: 10 bits of object-type, 22 bits
/// of instance, packed into a 4-byte value.
fn write_object_id(out: &mut Vec<u8>, tag_number: u8, object: ObjectId) {
    out.push((tag_number << 4) | 0x4);
    let value = ((object.object_type as u32) << 22) | (object.instance & 0x3F_FFFF);
    out.extend_from_slice(&value.to_be_bytes());
}

fn write_context_uint(out: &mut Vec<u8>, tag_number: u8, value: u32) {
    let bytes = value.to_be_bytes();
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(3);
    let len = (4 - start).max(1);
    out.push((tag_number << 4) | (len as u8));
    out.extend_from_slice(&bytes[4 - len..]);
}

fn error_class_value(class: ErrorClass) -> u32 {
    match class {
        ErrorClass::Device => 0,
        ErrorClass::Object => 1,
        ErrorClass::Property => 2,
        ErrorClass::Resources => 3,
        ErrorClass::Security => 4,
        ErrorClass::Services => 5,
        ErrorClass::Vt => 6,
        ErrorClass::Communication => 7,
        ErrorClass::Other => 63,
    }
}

fn error_code_value(code: ErrorCode) -> u32 {
    match code {
        ErrorCode::UnknownObject => 31,
        ErrorCode::UnknownProperty => 32,
        ErrorCode::PropertyIsNotAnArray => 50,
        ErrorCode::WriteAccessDenied => 40,
        ErrorCode::InvalidDataType => 9,
        ErrorCode::ValueOutOfRange => 37,
        ErrorCode::Other(v) => v as u32,
    }
}

fn write_property_access_error(out: &mut Vec<u8>, class: ErrorClass, code: ErrorCode) {
    write_opening_tag(out, 5);
    write_context_uint(out, 0, error_class_value(class));
    write_context_uint(out, 1, error_code_value(code));
    write_closing_tag(out, 5);
}

/// Indefinite (wildcard) DEVICE/NETWORK_PORT instance substitution
/// (spec §4.D, `handler_read_property_multiple`'s instance check).
fn resolve_indefinite(object: ObjectId, list: &dyn ObjectPropertyList) -> ObjectId {
    if object.instance != INDEFINITE_INSTANCE {
        return object;
    }
    match object.object_type {
        t if t == OBJECT_TYPE_DEVICE || t == OBJECT_TYPE_NETWORK_PORT => {
            ObjectId::new(object.object_type, list.local_device_instance())
        }
        _ => object,
    }
}

/// Expand an `ALL`/`REQUIRED`/`OPTIONAL` specifier into concrete property
/// ids via the object type's property list (`RPM_Object_Property`).
fn expand_property_list(
    object: ObjectId,
    kind: PropertyListKind,
    list: &dyn ObjectPropertyList,
) -> Vec<u32> {
    let count = list.property_count(object, kind);
    (0..count)
        .filter_map(|i| list.property_at(object, kind, i))
        .collect()
}

/// One property's encoded result: either a successful value or a
/// property-level error, written as `{property-id [array-index] value-or-
/// error}` (`RPM_Encode_Property`).
fn encode_property(
    out: &mut Vec<u8>,
    object: ObjectId,
    property: PropertyReference,
    registry: &dyn DeviceReadProperty,
) -> Result<(), PropertyFailure> {
    write_context_uint(out, 2, property.property_id);
    if let Some(index) = property.array_index {
        write_context_uint(out, 3, index);
    }

    if property.array_index.is_some() && !registry.is_array_property(object, property.property_id)
    {
        write_property_access_error(out, ErrorClass::Property, ErrorCode::PropertyIsNotAnArray);
        return Ok(());
    }

    match registry.read_property(object, property.property_id, property.array_index) {
        Ok(value) => {
            write_opening_tag(out, 4);
            out.extend_from_slice(&value);
            write_closing_tag(out, 4);
            Ok(())
        }
        Err(PropertyFailure::Error(class, code)) => {
            write_property_access_error(out, class, code);
            Ok(())
        }
        Err(abort_or_reject) => Err(abort_or_reject),
    }
}

/// Assemble the full RPM response body (the list of object results) for a
/// decoded request. `max_apdu` is the absolute ceiling this device will
/// ever produce; callers that need the "does it fit in one unsegmented
/// response" decision should use [`finalize_response`] on the result.
pub fn handle_read_property_multiple(
    request: &RpmRequest,
    registry: &dyn DeviceReadProperty,
    list: &dyn ObjectPropertyList,
    max_apdu: usize,
) -> Result<Vec<u8>, ServiceStatus> {
    let mut out = Vec::new();
    for spec in &request.specifiers {
        let object = resolve_indefinite(spec.object, list);
        write_object_id(&mut out, 0, object);
        write_opening_tag(&mut out, 1);

        if !registry.object_exists(object) {
            write_context_uint(&mut out, 2, PROPERTY_ALL);
            write_property_access_error(&mut out, ErrorClass::Object, ErrorCode::UnknownObject);
        } else {
            let mut properties = Vec::new();
            for p in &spec.properties {
                match p.property_id {
                    PROPERTY_ALL => {
                        properties.extend(
                            expand_property_list(object, PropertyListKind::All, list)
                                .into_iter()
                                .map(|id| PropertyReference {
                                    property_id: id,
                                    array_index: None,
                                }),
                        );
                    }
                    PROPERTY_REQUIRED => {
                        properties.extend(
                            expand_property_list(object, PropertyListKind::Required, list)
                                .into_iter()
                                .map(|id| PropertyReference {
                                    property_id: id,
                                    array_index: None,
                                }),
                        );
                    }
                    PROPERTY_OPTIONAL => {
                        // Clarification 135-2016bl-2: an object with no
                        // optional properties returns an empty result list
                        // here, not an error, since the object does exist.
                        properties.extend(
                            expand_property_list(object, PropertyListKind::Optional, list)
                                .into_iter()
                                .map(|id| PropertyReference {
                                    property_id: id,
                                    array_index: None,
                                }),
                        );
                    }
                    _ => properties.push(*p),
                }
            }
            for property in properties {
                encode_property(&mut out, object, property, registry)
                    .map_err(ServiceStatus::from)?;
                if out.len() + 1 > max_apdu {
                    return Err(ServiceStatus::Abort(AbortReason::BufferOverflow));
                }
            }
        }
        write_closing_tag(&mut out, 1);
    }
    Ok(out)
}

/// The final sizing decision (`handler_read_property_multiple`'s tail):
/// does the assembled body fit in one unsegmented response, and if not, is
/// segmentation available to carry it?
pub fn finalize_response(
    body: Vec<u8>,
    max_resp: usize,
    max_apdu: usize,
    segmentation_enabled: bool,
    peer_accepts_segmentation: bool,
) -> Result<Vec<u8>, ServiceStatus> {
    let max_resp_len = max_resp.min(max_apdu);
    if body.len() <= max_resp_len {
        return Ok(body);
    }
    if body.len() > max_apdu {
        return Err(ServiceStatus::Abort(AbortReason::BufferOverflow));
    }
    if segmentation_enabled && peer_accepts_segmentation {
        Ok(body)
    } else {
        Err(ServiceStatus::Abort(AbortReason::SegmentationNotSupported))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct FixtureRegistry {
        values: HashMap<(ObjectId, u32), Vec<u8>>,
        arrays: std::collections::HashSet<(ObjectId, u32)>,
        objects: std::collections::HashSet<ObjectId>,
    }

    impl DeviceReadProperty for FixtureRegistry {
        fn object_exists(&self, object: ObjectId) -> bool {
            self.objects.contains(&object)
        }
        fn read_property(
            &self,
            object: ObjectId,
            property_id: u32,
            _array_index: Option<u32>,
        ) -> Result<Vec<u8>, PropertyFailure> {
            self.values
                .get(&(object, property_id))
                .cloned()
                .ok_or(PropertyFailure::Error(
                    ErrorClass::Property,
                    ErrorCode::UnknownProperty,
                ))
        }
        fn is_array_property(&self, object: ObjectId, property_id: u32) -> bool {
            self.arrays.contains(&(object, property_id))
        }
    }

    struct FixtureList {
        device_instance: u32,
        required: HashMap<ObjectId, Vec<u32>>,
    }

    impl ObjectPropertyList for FixtureList {
        fn property_count(&self, object: ObjectId, kind: PropertyListKind) -> usize {
            match kind {
                PropertyListKind::Optional => 0,
                _ => self.required.get(&object).map(|v| v.len()).unwrap_or(0),
            }
        }
        fn property_at(&self, object: ObjectId, kind: PropertyListKind, index: usize) -> Option<u32> {
            match kind {
                PropertyListKind::Optional => None,
                _ => self.required.get(&object).and_then(|v| v.get(index).copied()),
            }
        }
        fn local_device_instance(&self) -> u32 {
            self.device_instance
        }
    }

    fn analog_input(instance: u32) -> ObjectId {
        ObjectId::new(0, instance)
    }

    #[test]
    fn unknown_object_yields_inline_error_not_whole_response_failure() {
        let registry = FixtureRegistry {
            values: HashMap::new(),
            arrays: Default::default(),
            objects: Default::default(),
        };
        let list = FixtureList {
            device_instance: 1,
            required: HashMap::new(),
        };
        let request = RpmRequest {
            specifiers: vec![ObjectSpecifier {
                object: analog_input(1),
                properties: vec![PropertyReference {
                    property_id: 85,
                    array_index: None,
                }],
            }],
        };
        let result = handle_read_property_multiple(&request, &registry, &list, 1476).unwrap();
        assert!(!result.is_empty());
    }

    #[test]
    fn optional_on_existing_object_with_no_optionals_is_empty_not_error() {
        let mut objects = std::collections::HashSet::new();
        objects.insert(analog_input(1));
        let registry = FixtureRegistry {
            values: HashMap::new(),
            arrays: Default::default(),
            objects,
        };
        let list = FixtureList {
            device_instance: 1,
            required: HashMap::new(),
        };
        let request = RpmRequest {
            specifiers: vec![ObjectSpecifier {
                object: analog_input(1),
                properties: vec![PropertyReference {
                    property_id: PROPERTY_OPTIONAL,
                    array_index: None,
                }],
            }],
        };
        let result = handle_read_property_multiple(&request, &registry, &list, 1476).unwrap();
        // object-id(5) + opening(1) + closing(1), no property results at all.
        assert_eq!(result.len(), 7);
    }

    #[test]
    fn array_index_on_non_array_property_is_rejected_inline() {
        let mut objects = std::collections::HashSet::new();
        objects.insert(analog_input(1));
        let registry = FixtureRegistry {
            values: HashMap::new(),
            arrays: Default::default(),
            objects,
        };
        let list = FixtureList {
            device_instance: 1,
            required: HashMap::new(),
        };
        let request = RpmRequest {
            specifiers: vec![ObjectSpecifier {
                object: analog_input(1),
                properties: vec![PropertyReference {
                    property_id: 85,
                    array_index: Some(1),
                }],
            }],
        };
        let result = handle_read_property_multiple(&request, &registry, &list, 1476).unwrap();
        assert!(!result.is_empty());
    }

    #[test]
    fn finalize_response_requires_segmentation_support_when_oversized() {
        let body = vec![0u8; 200];
        assert!(finalize_response(body.clone(), 50, 1476, true, false).is_err());
        assert!(finalize_response(body.clone(), 50, 1476, true, true).is_ok());
        assert!(matches!(
            finalize_response(vec![0u8; 2000], 50, 1476, true, true),
            Err(ServiceStatus::Abort(AbortReason::BufferOverflow))
        ));
    }
}
