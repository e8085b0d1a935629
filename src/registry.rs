//! The capability traits the RPM assembler reads through. The device
//! object database itself is an external collaborator (spec §1); these
//! traits are the seam, replacing the original's direct calls into
//! `Device_Read_Property` and the per-object `Read_Property_List` function
//! pointer.

use crate::error::PropertyFailure;

/// `BACNET_OBJECT_ID`.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub struct ObjectId {
    pub object_type: u16,
    pub instance: u32,
}

impl ObjectId {
    pub fn new(object_type: u16, instance: u32) -> Self {
        ObjectId {
            object_type,
            instance,
        }
    }
}

/// The magic "give me your instance number" wildcard (`BACNET_MAX_INSTANCE`)
/// used by indefinite DEVICE/NETWORK_PORT object-id substitution.
pub const INDEFINITE_INSTANCE: u32 = 0x3F_FFFF;

pub const OBJECT_TYPE_DEVICE: u16 = 8;
pub const OBJECT_TYPE_NETWORK_PORT: u16 = 56;

/// Which property list an `ALL`/`REQUIRED`/`OPTIONAL` specifier expands to
/// (`RPM_Object_Property`, `h_rpm.c`).
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum PropertyListKind {
    All,
    Required,
    Optional,
}

/// A single requested property, possibly array-indexed.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct PropertyReference {
    pub property_id: u32,
    pub array_index: Option<u32>,
}

/// Bridge to the device object database's property-value encoder
/// (`Device_Read_Property`). Returns the already application-tag-encoded
/// value bytes; primitive tag encoding itself is out of scope here.
pub trait DeviceReadProperty {
    fn object_exists(&self, object: ObjectId) -> bool;

    fn read_property(
        &self,
        object: ObjectId,
        property_id: u32,
        array_index: Option<u32>,
    ) -> Result<Vec<u8>, PropertyFailure>;

    /// True when `property_id` is declared as a BACnetARRAY on `object`;
    /// guards the "array index supplied on a non-array property" reject
    /// path (`read_property_bacnet_array_valid`).
    fn is_array_property(&self, object: ObjectId, property_id: u32) -> bool;
}

/// Bridge to an object type's required/optional/proprietary property list
/// (`Device_Objects_Property_List` + `RPM_Object_Property_Count`/
/// `RPM_Object_Property` in the original).
pub trait ObjectPropertyList {
    fn property_count(&self, object: ObjectId, kind: PropertyListKind) -> usize;

    fn property_at(&self, object: ObjectId, kind: PropertyListKind, index: usize) -> Option<u32>;

    /// The device's own instance number, used to resolve an indefinite
    /// (wildcard) DEVICE object-id in an RPM request (spec §4.D).
    fn local_device_instance(&self) -> u32;
}

/// Notified once a pending confirmed request (`AwaitConfirmation`) exhausts
/// its retries without an ack, reply, or abort from the peer
/// (`Timeout_Function` in the original). Replaces that function pointer
/// with a trait, same as [`crate::config::RuntimeParams`]. No PDU is sent
/// on this path -- the transaction is simply given up on locally.
pub trait TimeoutHandler {
    fn timeout(&mut self, invoke_id: u8);
}
