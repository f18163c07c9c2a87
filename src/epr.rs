//! Endpoint register arithmetic
//!
//! `EPnR` mixes three kinds of bits:
//!
//! - the status and data toggle fields flip when software writes a one, and
//!   stay the same when software writes a zero.
//! - the correct transfer (`CTR_RX`, `CTR_TX`) flags clear when software writes
//!   a zero, and stay the same when software writes a one.
//! - everything else is a plain read / write field (except `SETUP`, which is
//!   read only).
//!
//! Most functions take the register's current value, and return the value to
//! write back to achieve exactly one change. Both correct transfer flags are
//! always written as one, unless the function's job is to clear one of them,
//! so that a transfer completing between the read and the write isn't lost.

use crate::ral::usb::EPR;

const CTR_RX: u32 = EPR::CTR_RX::mask;
const DTOG_RX: u32 = EPR::DTOG_RX::mask;
const STAT_RX: u32 = EPR::STAT_RX::mask;
const EP_TYPE: u32 = EPR::EP_TYPE::mask;
const EP_KIND: u32 = EPR::EP_KIND::mask;
const CTR_TX: u32 = EPR::CTR_TX::mask;
const DTOG_TX: u32 = EPR::DTOG_TX::mask;
const STAT_TX: u32 = EPR::STAT_TX::mask;
const EA: u32 = EPR::EA::mask;

/// Read / write fields, written back unchanged
const RW_FIELDS: u32 = EP_TYPE | EP_KIND | EA;
/// Correct transfer flags, written as one to leave them alone
const CTR: u32 = CTR_RX | CTR_TX;

/// Endpoint status, for either direction
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u32)]
pub enum Status {
    Disabled = EPR::STAT_RX::RW::Disabled,
    Stall = EPR::STAT_RX::RW::Stall,
    Nak = EPR::STAT_RX::RW::Nak,
    Valid = EPR::STAT_RX::RW::Valid,
}

impl Status {
    const fn from_bits(bits: u32) -> Self {
        match bits & 0b11 {
            EPR::STAT_RX::RW::Disabled => Status::Disabled,
            EPR::STAT_RX::RW::Stall => Status::Stall,
            EPR::STAT_RX::RW::Nak => Status::Nak,
            _ => Status::Valid,
        }
    }
}

/// Returns the receive status
pub const fn rx_status(r: u32) -> Status {
    Status::from_bits((r & STAT_RX) >> EPR::STAT_RX::offset)
}

/// Returns the transmit status
pub const fn tx_status(r: u32) -> Status {
    Status::from_bits((r & STAT_TX) >> EPR::STAT_TX::offset)
}

/// Indicates that a packet was received
pub const fn ctr_rx(r: u32) -> bool {
    r & CTR_RX != 0
}

/// Indicates that a packet was transmitted
pub const fn ctr_tx(r: u32) -> bool {
    r & CTR_TX != 0
}

/// Indicates that the last received packet was a SETUP packet
pub const fn setup(r: u32) -> bool {
    r & EPR::SETUP::mask != 0
}

/// Returns the receive data toggle
///
/// For a double-buffered IN endpoint, this is the software buffer pointer.
/// For a double-buffered OUT endpoint, this is the hardware buffer pointer.
pub const fn dtog_rx(r: u32) -> bool {
    r & DTOG_RX != 0
}

/// Returns the transmit data toggle
///
/// For a double-buffered IN endpoint, this is the hardware buffer pointer.
/// For a double-buffered OUT endpoint, this is the software buffer pointer.
pub const fn dtog_tx(r: u32) -> bool {
    r & DTOG_TX != 0
}

/// Change the receive status to `status`
pub const fn set_rx_status(r: u32, status: Status) -> u32 {
    let stat = (status as u32) << EPR::STAT_RX::offset;
    (r & RW_FIELDS) | CTR | ((r & STAT_RX) ^ stat)
}

/// Change the transmit status to `status`
pub const fn set_tx_status(r: u32, status: Status) -> u32 {
    let stat = (status as u32) << EPR::STAT_TX::offset;
    (r & RW_FIELDS) | CTR | ((r & STAT_TX) ^ stat)
}

/// Clear the receive correct transfer flag
pub const fn clear_ctr_rx(r: u32) -> u32 {
    (r & RW_FIELDS) | CTR_TX
}

/// Clear the transmit correct transfer flag
pub const fn clear_ctr_tx(r: u32) -> u32 {
    (r & RW_FIELDS) | CTR_RX
}

/// Reset the receive data toggle to DATA0
pub const fn clear_dtog_rx(r: u32) -> u32 {
    (r & (RW_FIELDS | DTOG_RX)) | CTR
}

/// Reset the transmit data toggle to DATA0
pub const fn clear_dtog_tx(r: u32) -> u32 {
    (r & (RW_FIELDS | DTOG_TX)) | CTR
}

/// Flip the receive data toggle
pub const fn toggle_dtog_rx(r: u32) -> u32 {
    (r & RW_FIELDS) | CTR | DTOG_RX
}

/// Flip the transmit data toggle
pub const fn toggle_dtog_tx(r: u32) -> u32 {
    (r & RW_FIELDS) | CTR | DTOG_TX
}

/// Assign the endpoint address, type, and kind
///
/// `kind` selects double buffering for bulk endpoints, and the
/// `STATUS_OUT` behavior for control endpoints.
pub const fn configure(address: u32, ep_type: u32, kind: bool) -> u32 {
    ((address << EPR::EA::offset) & EA)
        | ((ep_type << EPR::EP_TYPE::offset) & EP_TYPE)
        | ((kind as u32) << EPR::EP_KIND::offset)
        | CTR
}

/// Models how the peripheral applies a software write of `written` to a
/// register holding `current`
///
/// Host tests keep registers in plain memory. Endpoint register writes pass
/// through this model, so that tests observe what the peripheral would hold.
#[cfg(test)]
pub fn hardware_write(current: u32, written: u32) -> u32 {
    let toggles = DTOG_RX | STAT_RX | DTOG_TX | STAT_TX;
    ((current & toggles) ^ (written & toggles))
        | (current & CTR & written)
        | (written & RW_FIELDS)
        | (current & EPR::SETUP::mask)
}
