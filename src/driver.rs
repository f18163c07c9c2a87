//! USB FS device peripheral driver
//!
//! The driver owns the registers, the packet memory, and the endpoint table.
//! It speaks in `usb-device` types, but leaves locking and endpoint number
//! selection to the `BusAdapter`.

use crate::{
    buffer,
    endpoint::{self, Buffers, Endpoint},
    epr,
    pma::{self, PacketMemory},
    ral,
    state::EndpointTable,
};
use usb_device::{
    bus::PollResult,
    endpoint::{EndpointAddress, EndpointType},
    UsbDirection, UsbError,
};

/// Core cycles to wait for the transceiver to start up
///
/// Covers the 1us t_STARTUP for core clocks up to 170MHz.
const STARTUP_DELAY_CYCLES: u32 = 170;

bitflags::bitflags! {
    /// Interrupt flags in `ISTR`
    ///
    /// All flags except `CTR` are cleared by writing a zero. `CTR` follows
    /// the endpoint registers.
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    struct Interrupts: u32 {
        const CTR = ral::usb::ISTR::CTR::mask;
        const PMAOVR = ral::usb::ISTR::PMAOVR::mask;
        const ERR = ral::usb::ISTR::ERR::mask;
        const WKUP = ral::usb::ISTR::WKUP::mask;
        const SUSP = ral::usb::ISTR::SUSP::mask;
        const RESET = ral::usb::ISTR::RESET::mask;
        const SOF = ral::usb::ISTR::SOF::mask;
        const ESOF = ral::usb::ISTR::ESOF::mask;
        const L1REQ = ral::usb::ISTR::L1REQ::mask;
    }
}

/// Packet buffering for bulk endpoints
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum Buffering {
    /// Every endpoint has one packet buffer.
    #[default]
    Single,
    /// Bulk endpoints (other than endpoint 0) have two packet buffers.
    ///
    /// The hardware can receive, or transmit, one packet while software
    /// handles the other. A double-buffered bulk endpoint occupies both
    /// directions of its endpoint number, so an OUT and an IN bulk endpoint
    /// need different endpoint numbers.
    DoubleBulk,
}

/// A USB driver
///
/// After you allocate a `Driver` with [`new()`](Driver::new), you must
/// call [`initialize()`](Driver::initialize) once.
pub struct Driver {
    usb: ral::usb::Instance,
    pma: PacketMemory,
    internal_pullup: bool,
    buffering: Buffering,
    buffer_allocator: buffer::Allocator,
    ep_table: EndpointTable,
}

// Safety: the driver is the only owner of the USB registers and packet memory.
// See the Peripherals safety requirements.
unsafe impl Send for Driver {}

impl Driver {
    /// Create a new `Driver`
    ///
    /// Creation does nothing except for taking the peripheral. After
    /// creating the driver, call [`initialize()`](Driver::initialize).
    pub fn new<P: crate::Peripherals>(peripherals: P, buffering: Buffering) -> Self {
        let ral::Instances { usb, pma } = ral::instances(peripherals);
        let end = u16::try_from(P::PACKET_MEMORY_SIZE).unwrap_or(u16::MAX);
        Driver {
            usb,
            pma,
            internal_pullup: P::INTERNAL_PULLUP,
            buffering,
            buffer_allocator: buffer::Allocator::new(pma::BTABLE_SIZE, end),
            ep_table: EndpointTable::new(),
        }
    }

    /// Power up the transceiver, and reset the USB core registers
    ///
    /// Assumes that the USB clock is enabled, and running at 48MHz.
    ///
    /// You **must** call this once, before creating the complete USB
    /// bus.
    pub fn initialize(&mut self) {
        // Leaves PDWN cleared, which powers the transceiver.
        ral::write_reg!(ral::usb, self.usb, CNTR, FRES: 1);
        cortex_m::asm::delay(STARTUP_DELAY_CYCLES);
        // Release the reset; disables all interrupts.
        ral::write_reg!(ral::usb, self.usb, CNTR, 0);
        ral::write_reg!(ral::usb, self.usb, ISTR, 0);
        ral::write_reg!(ral::usb, self.usb, BTABLE, 0);
        ral::write_reg!(ral::usb, self.usb, DADDR, 0);
    }

    /// Enable (`true`) or disable (`false`) USB interrupts
    pub fn set_interrupts(&mut self, interrupts: bool) {
        // Keep this in sync with the poll() behaviors
        let enable = interrupts as u32;
        ral::modify_reg!(
            ral::usb,
            self.usb,
            CNTR,
            CTRM: enable,
            RESETM: enable,
            SUSPM: enable,
            WKUPM: enable
        );
    }

    pub fn set_address(&mut self, address: u8) {
        ral::write_reg!(ral::usb, self.usb, DADDR, EF: 1, ADD: address as u32);
        debug!("ADDRESS {=u8}", address);
    }

    /// Enable the D+ pull-up, if the peripheral has one
    ///
    /// If the pull-up is external, the caller connects it.
    pub fn attach(&mut self) {
        if self.internal_pullup {
            ral::modify_reg!(ral::usb, self.usb, BCDR, DPPU: 1);
        }
    }

    /// Disable the D+ pull-up, if the peripheral has one
    pub fn detach(&mut self) {
        if self.internal_pullup {
            ral::modify_reg!(ral::usb, self.usb, BCDR, DPPU: 0);
        }
    }

    /// Handle a bus reset
    ///
    /// The hardware clears every endpoint register, and the device
    /// address, when it detects a bus reset.
    pub fn bus_reset(&mut self) {
        ral::write_reg!(ral::usb, self.usb, BTABLE, 0);
        ral::write_reg!(ral::usb, self.usb, DADDR, EF: 1);
        debug!("RESET");

        self.initialize_endpoints();
    }

    /// Enter low-power mode
    ///
    /// Call when the host suspends the bus.
    pub fn suspend(&mut self) {
        ral::modify_reg!(ral::usb, self.usb, CNTR, FSUSP: 1);
        ral::modify_reg!(ral::usb, self.usb, CNTR, LP_MODE: 1);
        debug!("SUSPEND");
    }

    /// Leave low-power mode
    pub fn resume(&mut self) {
        ral::modify_reg!(ral::usb, self.usb, CNTR, FSUSP: 0, LP_MODE: 0);
        debug!("RESUME");
    }

    /// Start (`true`) or stop (`false`) driving resume signaling
    ///
    /// The caller is responsible for the 1ms to 15ms signaling time.
    pub fn set_remote_wakeup(&mut self, wakeup: bool) {
        ral::modify_reg!(ral::usb, self.usb, CNTR, RESUME: wakeup as u32);
    }

    /// Returns the frame number of the last received start of frame
    pub fn frame_number(&self) -> u16 {
        ral::read_reg!(ral::usb, self.usb, FNR, FN) as u16
    }

    /// Check if the endpoint is valid
    pub fn is_allocated(&self, addr: EndpointAddress) -> bool {
        self.ep_table.endpoint(addr).is_some()
    }

    /// Indicates if the endpoint at `addr` is double buffered, when allocated
    fn is_double_buffered(&self, addr: EndpointAddress, kind: EndpointType) -> bool {
        self.buffering == Buffering::DoubleBulk && kind == EndpointType::Bulk && addr.index() != 0
    }

    /// Checks if an endpoint can be allocated at `addr`
    pub fn can_allocate(&self, addr: EndpointAddress, kind: EndpointType) -> bool {
        self.ep_table
            .can_allocate(addr, kind, self.is_double_buffered(addr, kind))
    }

    /// Allocate a buffer from packet memory
    fn allocate_buffer(&mut self, size: usize) -> Result<buffer::Buffer, UsbError> {
        self.buffer_allocator
            .allocate(size)
            .ok_or(UsbError::EndpointMemoryOverflow)
    }

    /// Allocate a specific endpoint, and its packet memory
    pub fn allocate_ep(
        &mut self,
        addr: EndpointAddress,
        kind: EndpointType,
        max_packet_len: usize,
    ) -> Result<(), UsbError> {
        if let EndpointType::Isochronous { .. } = kind {
            return Err(UsbError::Unsupported);
        }
        let rx_block = pma::rx_block(max_packet_len).ok_or(UsbError::Unsupported)?;

        let double = self.is_double_buffered(addr, kind);
        if !self.ep_table.can_allocate(addr, kind, double) {
            return Err(UsbError::InvalidEndpoint);
        }

        let size = match addr.direction() {
            UsbDirection::Out => rx_block.size(),
            UsbDirection::In => max_packet_len,
        };
        let buffers = if double {
            self.buffer_allocator
                .allocate_pair(size)
                .map(Buffers::Double)
                .ok_or(UsbError::EndpointMemoryOverflow)?
        } else {
            Buffers::Single(self.allocate_buffer(size)?)
        };

        let ep = self
            .ep_table
            .allocate_endpoint(Endpoint::new(addr, kind, max_packet_len, buffers))
            .ok_or(UsbError::InvalidEndpoint)?;
        ep.initialize(self.usb, &self.pma);

        debug!(
            "ALLOC EP{=usize} {} {} {=usize} DOUBLE={=bool}",
            addr.index(),
            addr.direction(),
            kind,
            max_packet_len,
            double
        );
        Ok(())
    }

    /// Read data from an OUT endpoint
    pub fn ep_read(&mut self, buffer: &mut [u8], addr: EndpointAddress) -> Result<usize, UsbError> {
        if addr.direction() != UsbDirection::Out {
            return Err(UsbError::InvalidEndpoint);
        }
        let ep = self
            .ep_table
            .endpoint_mut(addr)
            .ok_or(UsbError::InvalidEndpoint)?;
        let read = ep.read(self.usb, &self.pma, buffer)?;
        debug!("EP{=usize} Out {=usize}", addr.index(), read);
        Ok(read)
    }

    /// Write data to an IN endpoint
    pub fn ep_write(&mut self, buffer: &[u8], addr: EndpointAddress) -> Result<usize, UsbError> {
        if addr.direction() != UsbDirection::In {
            return Err(UsbError::InvalidEndpoint);
        }
        let ep = self
            .ep_table
            .endpoint_mut(addr)
            .ok_or(UsbError::InvalidEndpoint)?;
        let written = ep.write(self.usb, &self.pma, buffer)?;
        debug!("EP{=usize} In {=usize}", addr.index(), written);
        Ok(written)
    }

    /// Stall, or unstall, an endpoint
    ///
    /// Does nothing if the endpoint isn't allocated.
    pub fn ep_stall(&mut self, stall: bool, addr: EndpointAddress) {
        if let Some(ep) = self.ep_table.endpoint_mut(addr) {
            ep.set_stalled(self.usb, stall);
        }
    }

    /// Checks if an endpoint is stalled
    ///
    /// Returns `false` if the endpoint isn't allocated.
    pub fn is_ep_stalled(&self, addr: EndpointAddress) -> bool {
        self.ep_table
            .endpoint(addr)
            .is_some_and(|ep| ep.is_stalled(self.usb))
    }

    /// Force an OUT endpoint to NAK every transaction (`true`), or let it
    /// accept data again (`false`)
    ///
    /// Does nothing for IN endpoints, or if the endpoint isn't allocated.
    pub fn ep_nak(&mut self, nak: bool, addr: EndpointAddress) {
        if let Some(ep) = self.ep_table.endpoint_mut(addr) {
            ep.set_nak(self.usb, nak);
        }
    }

    /// Initialize (or reinitialize) all allocated endpoints
    fn initialize_endpoints(&mut self) {
        for ep in self.ep_table.iter_mut() {
            ep.initialize(self.usb, &self.pma);
        }
    }

    /// Clear the interrupt flags in `flags`, leaving all others
    fn clear_interrupts(&mut self, flags: Interrupts) {
        ral::write_reg!(ral::usb, self.usb, ISTR, (Interrupts::all() - flags).bits());
    }

    /// Poll for reset, suspend / resume, or USB traffic
    pub fn poll(&mut self) -> PollResult {
        let istr = Interrupts::from_bits_truncate(ral::read_reg!(ral::usb, self.usb, ISTR));

        if istr.contains(Interrupts::RESET) {
            self.clear_interrupts(Interrupts::RESET);
            return PollResult::Reset;
        }
        if istr.contains(Interrupts::WKUP) {
            self.clear_interrupts(Interrupts::WKUP);
            return PollResult::Resume;
        }
        if istr.contains(Interrupts::SUSP) {
            self.clear_interrupts(Interrupts::SUSP);
            return PollResult::Suspend;
        }

        let ignored = Interrupts::SOF
            | Interrupts::ESOF
            | Interrupts::ERR
            | Interrupts::PMAOVR
            | Interrupts::L1REQ;
        if istr.intersects(ignored) {
            trace!("ISTR {=u32:X}", istr.bits());
            self.clear_interrupts(istr & ignored);
        }

        let mut ep_out: u16 = 0;
        let mut ep_in_complete: u16 = 0;
        let mut ep_setup: u16 = 0;

        for index in 0..pma::DESCRIPTOR_COUNT {
            let reg = endpoint::endpoint_register(self.usb, index);
            let r = reg.read();
            let bit = 1 << index;

            if epr::ctr_rx(r) {
                if epr::setup(r) {
                    ep_setup |= bit;
                } else {
                    ep_out |= bit;
                }
            } else if self
                .ep_table
                .endpoint(EndpointAddress::from_parts(index, UsbDirection::Out))
                .is_some_and(|ep| ep.has_data(r))
            {
                ep_out |= bit;
            }

            if epr::ctr_tx(r) {
                ep_in_complete |= bit;
                reg.modify(epr::clear_ctr_tx);
            }
        }

        if ep_out | ep_in_complete | ep_setup != 0 {
            trace!(
                "OUT {=u16:X} IN {=u16:X} SETUP {=u16:X}",
                ep_out,
                ep_in_complete,
                ep_setup
            );
            PollResult::Data {
                ep_out,
                ep_in_complete,
                ep_setup,
            }
        } else {
            PollResult::None
        }
    }
}

#[cfg(test)]
mod test {
    use super::{Buffering, Driver};
    use crate::{
        pma::Access,
        epr::{self, Status},
        ral::usb::{RegisterBlock, BCDR, CNTR, DADDR, EPR, ISTR},
        Peripherals,
    };
    use usb_device::{
        bus::PollResult,
        endpoint::{EndpointAddress, EndpointType},
        UsbDirection, UsbError,
    };

    struct TestPeripherals<const PULLUP: bool> {
        usb: *const RegisterBlock,
        pma: *mut u16,
    }

    unsafe impl<const PULLUP: bool> Peripherals for TestPeripherals<PULLUP> {
        const ACCESS: Access = Access::Word2x16;
        const PACKET_MEMORY_SIZE: usize = 512;
        const INTERNAL_PULLUP: bool = PULLUP;
        fn usb(&self) -> *const () {
            self.usb.cast()
        }
        fn packet_memory(&self) -> *const () {
            self.pma.cast_const().cast()
        }
    }

    fn registers() -> RegisterBlock {
        // Safety: all registers are valid when zeroed.
        unsafe { core::mem::zeroed() }
    }

    fn driver(usb: &RegisterBlock, memory: &mut [u16; 256], buffering: Buffering) -> Driver {
        Driver::new(
            TestPeripherals::<false> {
                usb,
                pma: memory.as_mut_ptr(),
            },
            buffering,
        )
    }

    fn driver_with_pullup(usb: &RegisterBlock, memory: &mut [u16; 256]) -> Driver {
        Driver::new(
            TestPeripherals::<true> {
                usb,
                pma: memory.as_mut_ptr(),
            },
            Buffering::Single,
        )
    }

    fn out(index: usize) -> EndpointAddress {
        EndpointAddress::from_parts(index, UsbDirection::Out)
    }

    fn in_(index: usize) -> EndpointAddress {
        EndpointAddress::from_parts(index, UsbDirection::In)
    }

    #[test]
    fn poll_nothing() {
        let usb = registers();
        let mut memory = [0; 256];
        let mut driver = driver(&usb, &mut memory, Buffering::Single);
        assert!(matches!(driver.poll(), PollResult::None));
    }

    #[test]
    fn poll_reset() {
        let usb = registers();
        let mut memory = [0; 256];
        let mut driver = driver(&usb, &mut memory, Buffering::Single);

        usb.ISTR.write(ISTR::RESET::mask | ISTR::SUSP::mask | ISTR::SOF::mask);
        assert!(matches!(driver.poll(), PollResult::Reset));
        // Only the reset flag is written as zero.
        let istr = usb.ISTR.read();
        assert_eq!(istr & ISTR::RESET::mask, 0);
        assert_ne!(istr & ISTR::SUSP::mask, 0);
    }

    #[test]
    fn poll_resume_before_suspend() {
        let usb = registers();
        let mut memory = [0; 256];
        let mut driver = driver(&usb, &mut memory, Buffering::Single);

        usb.ISTR.write(ISTR::WKUP::mask | ISTR::SUSP::mask);
        assert!(matches!(driver.poll(), PollResult::Resume));

        usb.ISTR.write(ISTR::SUSP::mask);
        assert!(matches!(driver.poll(), PollResult::Suspend));
    }

    #[test]
    fn poll_data() {
        let usb = registers();
        let mut memory = [0; 256];
        let mut driver = driver(&usb, &mut memory, Buffering::Single);

        usb.ISTR.write(ISTR::CTR::mask);
        usb.EP0R.write(EPR::CTR_RX::mask | EPR::SETUP::mask);
        usb.EP2R.write(EPR::CTR_RX::mask | EPR::CTR_TX::mask | 2);

        match driver.poll() {
            PollResult::Data {
                ep_out,
                ep_in_complete,
                ep_setup,
            } => {
                assert_eq!(ep_setup, 0b001);
                assert_eq!(ep_out, 0b100);
                assert_eq!(ep_in_complete, 0b100);
            }
            _ => panic!("Expected data"),
        }
        // Transmit flag cleared, receive flag left for the read.
        let ep2r = usb.EP2R.read();
        assert_eq!(ep2r & EPR::CTR_TX::mask, 0);
        assert_ne!(ep2r & EPR::CTR_RX::mask, 0);
    }

    #[test]
    fn poll_double_buffered_out() {
        let usb = registers();
        let mut memory = [0; 256];
        let mut driver = driver(&usb, &mut memory, Buffering::DoubleBulk);
        driver.allocate_ep(out(1), EndpointType::Bulk, 64).unwrap();

        // A second packet waits, even though the flag was cleared.
        usb.EP1R.write(EPR::DTOG_RX::mask | EPR::EP_KIND::mask | 1);
        match driver.poll() {
            PollResult::Data { ep_out, .. } => assert_eq!(ep_out, 0b10),
            _ => panic!("Expected data"),
        }
    }

    #[test]
    fn poll_clears_ignored_flags() {
        let usb = registers();
        let mut memory = [0; 256];
        let mut driver = driver(&usb, &mut memory, Buffering::Single);

        let ignored = ISTR::SOF::mask | ISTR::ESOF::mask | ISTR::ERR::mask | ISTR::PMAOVR::mask;
        usb.ISTR.write(ignored);
        assert!(matches!(driver.poll(), PollResult::None));
        assert_eq!(usb.ISTR.read() & ignored, 0);
    }

    #[test]
    fn poll_in_complete() {
        let usb = registers();
        let mut memory = [0; 256];
        let mut driver = driver(&usb, &mut memory, Buffering::Single);
        driver.allocate_ep(in_(3), EndpointType::Interrupt, 8).unwrap();
        assert_eq!(driver.ep_write(&[1, 2], in_(3)), Ok(2));

        // The hardware sent the packet.
        let ep3r = usb.EP3R.read();
        usb.EP3R.write((ep3r & !EPR::STAT_TX::mask) | 0x0020 | EPR::CTR_TX::mask);
        match driver.poll() {
            PollResult::Data {
                ep_out,
                ep_in_complete,
                ep_setup,
            } => {
                assert_eq!(ep_in_complete, 0b1000);
                assert_eq!(ep_out | ep_setup, 0);
            }
            _ => panic!("Expected data"),
        }
        assert!(matches!(driver.poll(), PollResult::None));
        assert_eq!(driver.ep_write(&[3], in_(3)), Ok(1));
    }

    #[test]
    fn allocate_unsupported() {
        let usb = registers();
        let mut memory = [0; 256];
        let mut driver = driver(&usb, &mut memory, Buffering::Single);

        let iso = EndpointType::Isochronous {
            synchronization: usb_device::endpoint::IsochronousSynchronizationType::NoSynchronization,
            usage: usb_device::endpoint::IsochronousUsageType::Data,
        };
        assert_eq!(driver.allocate_ep(in_(1), iso, 64), Err(UsbError::Unsupported));
        assert_eq!(
            driver.allocate_ep(in_(1), EndpointType::Bulk, 0),
            Err(UsbError::Unsupported)
        );
        assert_eq!(
            driver.allocate_ep(in_(1), EndpointType::Bulk, 1024),
            Err(UsbError::Unsupported)
        );
        assert!(!driver.is_allocated(in_(1)));
    }

    #[test]
    fn allocate_conflicts() {
        let usb = registers();
        let mut memory = [0; 256];
        let mut driver = driver(&usb, &mut memory, Buffering::Single);

        assert_eq!(driver.allocate_ep(out(0), EndpointType::Control, 64), Ok(()));
        assert_eq!(driver.allocate_ep(in_(0), EndpointType::Control, 64), Ok(()));
        assert_eq!(
            driver.allocate_ep(in_(0), EndpointType::Control, 64),
            Err(UsbError::InvalidEndpoint)
        );
        assert_eq!(
            driver.allocate_ep(in_(1), EndpointType::Control, 64),
            Err(UsbError::InvalidEndpoint)
        );

        assert_eq!(driver.allocate_ep(in_(1), EndpointType::Interrupt, 8), Ok(()));
        assert!(!driver.can_allocate(out(1), EndpointType::Bulk));
        assert!(driver.can_allocate(out(1), EndpointType::Interrupt));
    }

    #[test]
    fn allocate_double_buffered() {
        let usb = registers();
        let mut memory = [0; 256];
        let mut driver = driver(&usb, &mut memory, Buffering::DoubleBulk);

        assert_eq!(driver.allocate_ep(out(1), EndpointType::Bulk, 64), Ok(()));
        assert!(!driver.can_allocate(in_(1), EndpointType::Bulk));
        assert_eq!(
            driver.allocate_ep(in_(1), EndpointType::Bulk, 64),
            Err(UsbError::InvalidEndpoint)
        );

        // Only bulk endpoints are double buffered.
        assert_eq!(driver.allocate_ep(in_(2), EndpointType::Interrupt, 8), Ok(()));
        assert_eq!(driver.allocate_ep(out(2), EndpointType::Interrupt, 8), Ok(()));

        let ep1r = usb.EP1R.read();
        assert_eq!(ep1r & EPR::EP_KIND::mask, EPR::EP_KIND::mask);
        let ep2r = usb.EP2R.read();
        assert_eq!(ep2r & EPR::EP_KIND::mask, 0);
    }

    #[test]
    fn allocate_out_of_memory() {
        let usb = registers();
        let mut memory = [0; 256];
        let mut driver = driver(&usb, &mut memory, Buffering::Single);

        // 448 bytes after the buffer descriptor table
        for index in 1..8 {
            assert_eq!(driver.allocate_ep(in_(index), EndpointType::Bulk, 64), Ok(()));
        }
        assert_eq!(
            driver.allocate_ep(out(1), EndpointType::Bulk, 64),
            Err(UsbError::EndpointMemoryOverflow)
        );
        assert!(!driver.is_allocated(out(1)));
    }

    #[test]
    fn allocate_double_buffered_out_of_memory() {
        let usb = registers();
        let mut memory = [0; 256];
        let mut driver = driver(&usb, &mut memory, Buffering::DoubleBulk);

        // 384 of the 448 bytes after the buffer descriptor table
        for index in 1..4 {
            assert_eq!(driver.allocate_ep(out(index), EndpointType::Bulk, 64), Ok(()));
        }
        assert_eq!(
            driver.allocate_ep(in_(4), EndpointType::Bulk, 64),
            Err(UsbError::EndpointMemoryOverflow)
        );
        assert!(!driver.is_allocated(in_(4)));
        // The failed pair didn't take the last 64 bytes.
        assert_eq!(driver.allocate_ep(in_(4), EndpointType::Interrupt, 64), Ok(()));
    }

    #[test]
    fn unallocated_endpoints() {
        let usb = registers();
        let mut memory = [0; 256];
        let mut driver = driver(&usb, &mut memory, Buffering::Single);

        let mut buffer = [0; 8];
        assert_eq!(
            driver.ep_read(&mut buffer, out(1)),
            Err(UsbError::InvalidEndpoint)
        );
        assert_eq!(driver.ep_write(&buffer, in_(1)), Err(UsbError::InvalidEndpoint));
        assert!(!driver.is_ep_stalled(in_(1)));

        driver.allocate_ep(in_(1), EndpointType::Bulk, 8).unwrap();
        // Wrong direction
        assert_eq!(
            driver.ep_read(&mut buffer, in_(1)),
            Err(UsbError::InvalidEndpoint)
        );
    }

    #[test]
    fn set_address() {
        let usb = registers();
        let mut memory = [0; 256];
        let mut driver = driver(&usb, &mut memory, Buffering::Single);

        driver.set_address(5);
        assert_eq!(usb.DADDR.read(), DADDR::EF::mask | 5);
    }

    #[test]
    fn bus_reset() {
        let usb = registers();
        let mut memory = [0; 256];
        let mut driver = driver(&usb, &mut memory, Buffering::Single);

        driver.allocate_ep(out(0), EndpointType::Control, 64).unwrap();
        driver.allocate_ep(in_(0), EndpointType::Control, 64).unwrap();
        driver.allocate_ep(in_(1), EndpointType::Interrupt, 8).unwrap();
        driver.set_address(5);

        // The peripheral clears the endpoint registers on reset.
        usb.EP0R.write(0);
        usb.EP1R.write(0);
        driver.bus_reset();

        assert_eq!(usb.DADDR.read(), DADDR::EF::mask);
        assert_eq!(usb.BTABLE.read(), 0);

        let ep0r = usb.EP0R.read();
        assert_eq!(ep0r & EPR::EA::mask, 0);
        assert_eq!(ep0r & EPR::EP_TYPE::mask, 0x0200);
        assert_eq!(epr::rx_status(ep0r), Status::Valid);
        assert_eq!(epr::tx_status(ep0r), Status::Nak);

        let ep1r = usb.EP1R.read();
        assert_eq!(ep1r & EPR::EA::mask, 1);
        assert_eq!(ep1r & EPR::EP_TYPE::mask, 0x0600);
        assert_eq!(epr::rx_status(ep1r), Status::Disabled);
        assert_eq!(epr::tx_status(ep1r), Status::Nak);
    }

    #[test]
    fn stall_and_nak() {
        let usb = registers();
        let mut memory = [0; 256];
        let mut driver = driver(&usb, &mut memory, Buffering::Single);
        driver.allocate_ep(out(1), EndpointType::Bulk, 64).unwrap();

        driver.ep_stall(true, out(1));
        assert!(driver.is_ep_stalled(out(1)));
        driver.ep_nak(true, out(1));
        assert!(driver.is_ep_stalled(out(1)));

        driver.ep_stall(false, out(1));
        assert!(!driver.is_ep_stalled(out(1)));
        assert_eq!(epr::rx_status(usb.EP1R.read()), Status::Nak);

        driver.ep_nak(false, out(1));
        assert_eq!(epr::rx_status(usb.EP1R.read()), Status::Valid);
    }

    #[test]
    fn suspend_resume() {
        let usb = registers();
        let mut memory = [0; 256];
        let mut driver = driver(&usb, &mut memory, Buffering::Single);
        let low_power = CNTR::FSUSP::mask | CNTR::LP_MODE::mask;

        driver.suspend();
        assert_eq!(usb.CNTR.read() & low_power, low_power);
        driver.resume();
        assert_eq!(usb.CNTR.read() & low_power, 0);

        driver.set_remote_wakeup(true);
        assert_eq!(usb.CNTR.read(), CNTR::RESUME::mask);
        driver.set_remote_wakeup(false);
        assert_eq!(usb.CNTR.read(), 0);
    }

    #[test]
    fn interrupt_masks() {
        let usb = registers();
        let mut memory = [0; 256];
        let mut driver = driver(&usb, &mut memory, Buffering::Single);

        driver.set_interrupts(true);
        assert_eq!(
            usb.CNTR.read(),
            CNTR::CTRM::mask | CNTR::RESETM::mask | CNTR::SUSPM::mask | CNTR::WKUPM::mask
        );
        driver.set_interrupts(false);
        assert_eq!(usb.CNTR.read(), 0);
    }

    #[test]
    fn internal_pullup() {
        let usb = registers();
        let mut memory = [0; 256];
        let mut driver = driver_with_pullup(&usb, &mut memory);

        driver.attach();
        assert_eq!(usb.BCDR.read(), BCDR::DPPU::mask);
        driver.detach();
        assert_eq!(usb.BCDR.read(), 0);
    }

    #[test]
    fn external_pullup() {
        let usb = registers();
        let mut memory = [0; 256];
        let mut driver = driver(&usb, &mut memory, Buffering::Single);

        driver.attach();
        assert_eq!(usb.BCDR.read(), 0);
        usb.BCDR.write(BCDR::DPPU::mask);
        driver.detach();
        assert_eq!(usb.BCDR.read(), BCDR::DPPU::mask);
    }
}
