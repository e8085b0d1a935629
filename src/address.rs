//! Peer addressing. NPDU/datalink addressing is an external collaborator
//! (spec §1); this crate only needs enough of the address to do MAC-level
//! equality (spec §4.A) and to hand back to the `PduSender` it is given.

use core::fmt;

/// A datalink MAC address, up to 7 bytes (the largest BACnet MAC, e.g. a
/// 6-byte Ethernet MAC plus a port octet).
#[derive(Copy, Clone, Eq)]
pub struct MacAddress {
    len: u8,
    bytes: [u8; 7],
}

impl MacAddress {
    pub fn new(bytes: &[u8]) -> Self {
        assert!(bytes.len() <= 7, "MAC address longer than 7 bytes");
        let mut buf = [0u8; 7];
        buf[..bytes.len()].copy_from_slice(bytes);
        MacAddress {
            len: bytes.len() as u8,
            bytes: buf,
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }
}

impl PartialEq for MacAddress {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl core::hash::Hash for MacAddress {
    fn hash<H: core::hash::Hasher>(&self, state: &mut H) {
        self.as_slice().hash(state)
    }
}

impl fmt::Debug for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MacAddress({:02x?})", self.as_slice())
    }
}

/// A peer network address: network number (`None` for the local network,
/// matching the unrouted case) plus a MAC address. Equality is MAC-level
/// (network, length, bytes), per spec §4.A.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub struct PeerAddress {
    pub network_number: Option<u16>,
    pub mac: MacAddress,
}

impl PeerAddress {
    pub fn local(mac: &[u8]) -> Self {
        PeerAddress {
            network_number: None,
            mac: MacAddress::new(mac),
        }
    }

    pub fn routed(network_number: u16, mac: &[u8]) -> Self {
        PeerAddress {
            network_number: Some(network_number),
            mac: MacAddress::new(mac),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mac_equality_is_by_value_not_capacity() {
        let a = MacAddress::new(&[1, 2, 3]);
        let b = MacAddress::new(&[1, 2, 3]);
        assert_eq!(a, b);
        let c = MacAddress::new(&[1, 2, 3, 4]);
        assert_ne!(a, c);
    }

    #[test]
    fn peer_address_distinguishes_network_number() {
        let a = PeerAddress::local(&[1, 2, 3]);
        let b = PeerAddress::routed(5, &[1, 2, 3]);
        assert_ne!(a, b);
    }
}
