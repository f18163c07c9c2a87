//! A USB endpoint, in one direction
//!
//! Two endpoints (one OUT, one IN) with the same number share an endpoint
//! register and a buffer descriptor table entry. Each endpoint only touches
//! its own half of both, except for double-buffered endpoints, which own the
//! whole register.

use crate::{
    buffer::Buffer,
    epr::{self, Status},
    pma::{self, PacketMemory, Slot},
    ral,
};
use usb_device::{
    endpoint::{EndpointAddress, EndpointType},
    UsbDirection, UsbError,
};

/// Returns the endpoint register for register `index`
pub fn endpoint_register(usb: &ral::usb::RegisterBlock, index: usize) -> EndpointRegister<'_> {
    EndpointRegister {
        EPR: match index {
            0 => &usb.EP0R,
            1 => &usb.EP1R,
            2 => &usb.EP2R,
            3 => &usb.EP3R,
            4 => &usb.EP4R,
            5 => &usb.EP5R,
            6 => &usb.EP6R,
            7 => &usb.EP7R,
            _ => unreachable!("EP{}R register doesn't exist", index),
        },
    }
}

#[allow(non_snake_case)]
pub struct EndpointRegister<'a> {
    EPR: &'a ral::RWRegister<u32>,
}

impl EndpointRegister<'_> {
    pub fn read(&self) -> u32 {
        ral::read_reg!(ral::usb, self, EPR)
    }

    pub fn write(&self, value: u32) {
        #[cfg(test)]
        let value = epr::hardware_write(self.read(), value);
        ral::write_reg!(ral::usb, self, EPR, value);
    }

    /// Write back the value computed from the current register value
    ///
    /// See the `epr` module for functions that compute the value.
    pub fn modify(&self, f: impl FnOnce(u32) -> u32) {
        self.write(f(self.read()));
    }
}

fn ep_type(kind: EndpointType) -> u32 {
    use ral::usb::EPR::EP_TYPE::RW;
    match kind {
        EndpointType::Control => RW::Control,
        EndpointType::Bulk => RW::Bulk,
        EndpointType::Interrupt => RW::Interrupt,
        EndpointType::Isochronous { .. } => RW::Isochronous,
    }
}

/// Packet memory used by an endpoint
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Buffers {
    /// Uses the descriptor slot of the endpoint's direction.
    Single(Buffer),
    /// Buffer 0 uses the transmit slot, and buffer 1 uses the receive slot.
    ///
    /// Only for bulk endpoints.
    Double([Buffer; 2]),
}

/// A USB endpoint
pub struct Endpoint {
    address: EndpointAddress,
    kind: EndpointType,
    max_packet_len: usize,
    buffers: Buffers,
    /// OUT endpoints stay NAK after receiving a packet.
    force_nak: bool,
    /// A double-buffered IN endpoint has sent its first packet.
    ///
    /// Double-buffered flow control only starts after the first transaction.
    primed: bool,
}

impl Endpoint {
    /// Create an endpoint
    ///
    /// `max_packet_len` is expected to be between 1 and 1023 bytes. Each buffer
    /// must be large enough for the max packet length; OUT buffers must be as
    /// large as [`rx_block`](pma::rx_block) says.
    pub const fn new(
        address: EndpointAddress,
        kind: EndpointType,
        max_packet_len: usize,
        buffers: Buffers,
    ) -> Self {
        Endpoint {
            address,
            kind,
            max_packet_len,
            buffers,
            force_nak: false,
            primed: false,
        }
    }

    pub fn address(&self) -> EndpointAddress {
        self.address
    }

    pub fn kind(&self) -> EndpointType {
        self.kind
    }

    pub fn is_double_buffered(&self) -> bool {
        matches!(self.buffers, Buffers::Double(_))
    }

    fn register<'a>(&self, usb: &'a ral::usb::RegisterBlock) -> EndpointRegister<'a> {
        endpoint_register(usb, self.address.index())
    }

    /// The receive status used when the OUT endpoint is ready for data
    fn rx_ready(&self) -> Status {
        if self.force_nak {
            Status::Nak
        } else {
            Status::Valid
        }
    }

    /// Program the endpoint register and buffer descriptors
    ///
    /// The peripheral clears all endpoint registers on a bus reset, so this
    /// runs after every reset.
    pub fn initialize(&mut self, usb: &ral::usb::RegisterBlock, pma: &PacketMemory) {
        let index = self.address.index();
        let reg = self.register(usb);
        let desc = pma::descriptor(pma, index);
        let rx_block = pma::rx_block(self.max_packet_len);

        reg.write(epr::configure(
            index as u32,
            ep_type(self.kind),
            self.is_double_buffered(),
        ));

        match (self.buffers, self.address.direction()) {
            (Buffers::Single(buffer), UsbDirection::Out) => {
                desc.set_addr(Slot::Rx, buffer.offset());
                if let Some(block) = rx_block {
                    desc.set_rx_block(Slot::Rx, block);
                }
                reg.modify(epr::clear_dtog_rx);
                reg.modify(|r| epr::set_rx_status(r, self.rx_ready()));
            }
            (Buffers::Single(buffer), UsbDirection::In) => {
                desc.set_addr(Slot::Tx, buffer.offset());
                desc.set_tx_count(Slot::Tx, 0);
                reg.modify(epr::clear_dtog_tx);
                reg.modify(|r| epr::set_tx_status(r, Status::Nak));
            }
            (Buffers::Double(buffers), UsbDirection::Out) => {
                for (idx, buffer) in buffers.iter().enumerate() {
                    desc.set_addr(Slot::double(idx), buffer.offset());
                    if let Some(block) = rx_block {
                        desc.set_rx_block(Slot::double(idx), block);
                    }
                }
                reg.modify(epr::clear_dtog_rx);
                reg.modify(epr::clear_dtog_tx);
                reg.modify(|r| epr::set_tx_status(r, Status::Disabled));
                reg.modify(|r| epr::set_rx_status(r, self.rx_ready()));
            }
            (Buffers::Double(buffers), UsbDirection::In) => {
                for (idx, buffer) in buffers.iter().enumerate() {
                    desc.set_addr(Slot::double(idx), buffer.offset());
                    desc.set_tx_count(Slot::double(idx), 0);
                }
                reg.modify(epr::clear_dtog_rx);
                reg.modify(epr::clear_dtog_tx);
                reg.modify(|r| epr::set_rx_status(r, Status::Disabled));
                reg.modify(|r| epr::set_tx_status(r, Status::Nak));
            }
        }
        self.primed = false;
    }

    /// Indicates if an OUT endpoint holds a packet, given the endpoint
    /// register value `r`
    ///
    /// A double-buffered endpoint may hold a packet even after its
    /// correct transfer flag is cleared: the hardware buffer pointer
    /// (`DTOG_RX`) moved ahead of the software buffer pointer (`DTOG_TX`).
    pub fn has_data(&self, r: u32) -> bool {
        match self.buffers {
            Buffers::Single(_) => epr::ctr_rx(r),
            Buffers::Double(_) => epr::ctr_rx(r) || epr::dtog_rx(r) != epr::dtog_tx(r),
        }
    }

    /// Read a received packet into `buffer`
    ///
    /// Returns `WouldBlock` if there's no packet, and `BufferOverflow` if the
    /// packet doesn't fit in `buffer`. On overflow, the packet stays in
    /// packet memory.
    pub fn read(
        &mut self,
        usb: &ral::usb::RegisterBlock,
        pma: &PacketMemory,
        buffer: &mut [u8],
    ) -> Result<usize, UsbError> {
        let reg = self.register(usb);
        let desc = pma::descriptor(pma, self.address.index());
        let r = reg.read();
        if !self.has_data(r) {
            return Err(UsbError::WouldBlock);
        }

        match self.buffers {
            Buffers::Single(packet) => {
                let count = desc.rx_count(Slot::Rx);
                let data = buffer.get_mut(..count).ok_or(UsbError::BufferOverflow)?;
                debug_assert!(count <= packet.size());
                pma.copy_from(packet.offset(), data);

                reg.modify(epr::clear_ctr_rx);
                if !self.force_nak {
                    reg.modify(|r| epr::set_rx_status(r, Status::Valid));
                }
                Ok(count)
            }
            Buffers::Double(packets) => {
                let sw_buf = epr::dtog_tx(r) as usize;
                let count = desc.rx_count(Slot::double(sw_buf));
                let data = buffer.get_mut(..count).ok_or(UsbError::BufferOverflow)?;
                debug_assert!(count <= packets[sw_buf].size());
                pma.copy_from(packets[sw_buf].offset(), data);

                // The hardware NAKs on its own while both buffers are full.
                reg.modify(epr::toggle_dtog_tx);
                reg.modify(epr::clear_ctr_rx);
                Ok(count)
            }
        }
    }

    /// Queue `buffer` for transmission
    ///
    /// Returns `WouldBlock` if the hardware still owns the transmit buffer,
    /// or if a non-control endpoint is stalled. Returns `BufferOverflow` if
    /// `buffer` is larger than the max packet length.
    pub fn write(
        &mut self,
        usb: &ral::usb::RegisterBlock,
        pma: &PacketMemory,
        buffer: &[u8],
    ) -> Result<usize, UsbError> {
        if buffer.len() > self.max_packet_len {
            return Err(UsbError::BufferOverflow);
        }

        let reg = self.register(usb);
        let desc = pma::descriptor(pma, self.address.index());
        let r = reg.read();
        let count = buffer.len() as u16;

        match self.buffers {
            Buffers::Single(packet) => {
                // Writing to a stalled control endpoint lifts the stall, since
                // a new request ends the stall on the control pipe. Other
                // endpoints stay halted until the host clears the halt.
                match epr::tx_status(r) {
                    Status::Valid | Status::Disabled => return Err(UsbError::WouldBlock),
                    Status::Stall if self.kind != EndpointType::Control => {
                        return Err(UsbError::WouldBlock)
                    }
                    _ => {}
                }
                debug_assert!(buffer.len() <= packet.size());
                pma.copy_to(packet.offset(), buffer);
                desc.set_tx_count(Slot::Tx, count);
                reg.modify(|r| epr::set_tx_status(r, Status::Valid));
            }
            Buffers::Double(packets) => {
                let sw_buf = epr::dtog_rx(r);
                if self.primed && epr::dtog_tx(r) != sw_buf {
                    return Err(UsbError::WouldBlock);
                }
                let sw_buf = sw_buf as usize;
                debug_assert!(buffer.len() <= packets[sw_buf].size());
                pma.copy_to(packets[sw_buf].offset(), buffer);
                desc.set_tx_count(Slot::double(sw_buf), count);
                reg.modify(epr::toggle_dtog_rx);

                if !self.primed {
                    reg.modify(|r| epr::set_tx_status(r, Status::Valid));
                    reg.modify(epr::toggle_dtog_tx);
                    self.primed = true;
                }
            }
        }

        Ok(buffer.len())
    }

    /// Stall, or unstall, the endpoint
    ///
    /// Unstalling resets the data toggle to DATA0.
    pub fn set_stalled(&mut self, usb: &ral::usb::RegisterBlock, stall: bool) {
        let reg = self.register(usb);
        match (self.address.direction(), stall) {
            (UsbDirection::In, true) => reg.modify(|r| epr::set_tx_status(r, Status::Stall)),
            (UsbDirection::Out, true) => reg.modify(|r| epr::set_rx_status(r, Status::Stall)),
            (UsbDirection::In, false) => {
                reg.modify(epr::clear_dtog_tx);
                if self.is_double_buffered() {
                    reg.modify(epr::clear_dtog_rx);
                    self.primed = false;
                }
                reg.modify(|r| epr::set_tx_status(r, Status::Nak));
            }
            (UsbDirection::Out, false) => {
                reg.modify(epr::clear_dtog_rx);
                if self.is_double_buffered() {
                    reg.modify(epr::clear_dtog_tx);
                }
                reg.modify(|r| epr::set_rx_status(r, self.rx_ready()));
            }
        }
    }

    pub fn is_stalled(&self, usb: &ral::usb::RegisterBlock) -> bool {
        let r = self.register(usb).read();
        let status = match self.address.direction() {
            UsbDirection::In => epr::tx_status(r),
            UsbDirection::Out => epr::rx_status(r),
        };
        status == Status::Stall
    }

    /// Force the OUT endpoint to NAK (`true`), or accept data again (`false`)
    ///
    /// Does nothing for IN endpoints. A stalled endpoint stays stalled, and
    /// picks up the setting when it's unstalled.
    pub fn set_nak(&mut self, usb: &ral::usb::RegisterBlock, nak: bool) {
        if self.address.direction() == UsbDirection::In {
            return;
        }
        self.force_nak = nak;
        if !self.is_stalled(usb) {
            let reg = self.register(usb);
            reg.modify(|r| epr::set_rx_status(r, self.rx_ready()));
        }
    }
}
