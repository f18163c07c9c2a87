//! Endpoint table

use crate::endpoint::Endpoint;
use usb_device::{
    endpoint::{EndpointAddress, EndpointType},
    UsbDirection,
};

/// The maximum supported number of endpoints.
///
/// Eight endpoint registers, two directions each.
pub const MAX_ENDPOINTS: usize = 8 * 2;

/// Produces an index into the endpoint table
fn index(ep_addr: EndpointAddress) -> usize {
    (ep_addr.index() * 2) + (UsbDirection::In == ep_addr.direction()) as usize
}

/// Returns the address that shares an endpoint register with `ep_addr`
fn opposite(ep_addr: EndpointAddress) -> EndpointAddress {
    let direction = match ep_addr.direction() {
        UsbDirection::In => UsbDirection::Out,
        UsbDirection::Out => UsbDirection::In,
    };
    EndpointAddress::from_parts(ep_addr.index(), direction)
}

/// All allocated endpoints
pub struct EndpointTable {
    endpoints: [Option<Endpoint>; MAX_ENDPOINTS],
}

impl EndpointTable {
    pub const fn new() -> Self {
        const EP: Option<Endpoint> = None;
        EndpointTable {
            endpoints: [EP; MAX_ENDPOINTS],
        }
    }

    /// Acquire the endpoint.
    ///
    /// Returns `None` if the endpoint isn't allocated.
    pub fn endpoint(&self, addr: EndpointAddress) -> Option<&Endpoint> {
        self.endpoints.get(index(addr))?.as_ref()
    }

    /// Acquire the mutable endpoint.
    ///
    /// Returns `None` if the endpoint isn't allocated.
    pub fn endpoint_mut(&mut self, addr: EndpointAddress) -> Option<&mut Endpoint> {
        self.endpoints.get_mut(index(addr))?.as_mut()
    }

    /// Checks if an endpoint with this address, type, and buffering could be
    /// allocated
    ///
    /// Both directions of an endpoint number share one endpoint register, so
    /// they must agree on the endpoint type. A double-buffered endpoint takes
    /// the whole register. Only endpoint 0 may be, and must be, a control
    /// endpoint.
    pub fn can_allocate(&self, addr: EndpointAddress, kind: EndpointType, double: bool) -> bool {
        if index(addr) >= MAX_ENDPOINTS || self.endpoint(addr).is_some() {
            return false;
        }
        if (addr.index() == 0) != (kind == EndpointType::Control) {
            return false;
        }
        match self.endpoint(opposite(addr)) {
            None => true,
            Some(other) => !double && !other.is_double_buffered() && other.kind() == kind,
        }
    }

    /// Allocate the endpoint.
    ///
    /// Returns `None` if the endpoint's address is already allocated, or out
    /// of range. Use [`can_allocate`](Self::can_allocate) to check for
    /// conflicts with the other direction.
    pub fn allocate_endpoint(&mut self, ep: Endpoint) -> Option<&mut Endpoint> {
        let slot = self.endpoints.get_mut(index(ep.address()))?;
        if slot.is_some() {
            return None;
        }
        Some(slot.insert(ep))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Endpoint> {
        self.endpoints.iter_mut().flatten()
    }
}
