//! USB bus implementation

use crate::driver::{Buffering, Driver};
use core::cell::RefCell;
use cortex_m::interrupt::{self, Mutex};
use usb_device::{
    bus::{PollResult, UsbBus},
    endpoint::{EndpointAddress, EndpointType},
    UsbDirection,
};

/// A `UsbBus` implementation
///
/// The `BusAdapter` adapts the USB peripheral, and exposes a `UsbBus` implementation.
///
/// # Requirements
///
/// The driver assumes that you've enabled the USB peripheral clock, and that the USB
/// kernel clock runs at 48MHz. If your part uses an external D+ pull-up, you're
/// responsible for connecting it after calling `UsbDeviceBuilder::build()`.
///
/// # Example
///
/// This example shows you how to create a `BusAdapter`, and build a simple USB device.
///
/// Note that this example does not demonstrate USB class allocation or polling. See
/// your USB class' documentation for details. This example also skips the clock initialization.
///
/// ```no_run
/// use st_usbfs::{Access, BusAdapter, Peripherals};
///
/// /// The USB peripheral of an STM32F103
/// struct Usb;
///
/// unsafe impl Peripherals for Usb {
///     const ACCESS: Access = Access::Word1x16;
///     const PACKET_MEMORY_SIZE: usize = 512;
///     fn usb(&self) -> *const () {
///         0x4000_5C00 as _
///     }
///     fn packet_memory(&self) -> *const () {
///         0x4000_6000 as _
///     }
/// }
///
/// // Enable the USB clock, running at 48MHz...
///
/// let bus_adapter = BusAdapter::new(Usb);
///
/// // Create the USB device...
/// use usb_device::prelude::*;
/// let bus_allocator = usb_device::bus::UsbBusAllocator::new(bus_adapter);
/// let mut device = UsbDeviceBuilder::new(&bus_allocator, UsbVidPid(0x5824, 0x27dd))
///     // Other builder methods...
///     .build();
///
/// loop {
///     device.poll(&mut []);
/// }
/// ```
pub struct BusAdapter {
    usb: Mutex<RefCell<Driver>>,
}

impl BusAdapter {
    /// Create a USB bus adapter, with single-buffered endpoints
    ///
    /// When this function returns, the `BusAdapter` has powered up the transceiver,
    /// and initialized the USB core registers.
    pub fn new<P: crate::Peripherals>(peripherals: P) -> Self {
        Self::with_buffering(peripherals, Buffering::Single)
    }

    /// Create a USB bus adapter, selecting the buffering for bulk endpoints
    ///
    /// See [`Buffering`] for the tradeoffs.
    pub fn with_buffering<P: crate::Peripherals>(peripherals: P, buffering: Buffering) -> Self {
        let mut usb = Driver::new(peripherals, buffering);

        usb.initialize();

        BusAdapter {
            usb: Mutex::new(RefCell::new(usb)),
        }
    }

    /// Enable (`true`) or disable (`false`) interrupts for this USB peripheral
    ///
    /// The interrupts signal the events that [`poll()`](UsbBus::poll) reports.
    pub fn set_interrupts(&self, interrupts: bool) {
        self.with_usb_mut(|usb| usb.set_interrupts(interrupts));
    }

    /// Disconnect from the host, by disabling the internal D+ pull-up
    ///
    /// Does nothing on parts without an internal pull-up. Use
    /// `UsbBus::enable()` (through `UsbDeviceBuilder::build()`) to connect.
    pub fn detach(&self) {
        self.with_usb_mut(|usb| usb.detach());
    }

    /// Force an OUT endpoint to NAK all transactions (`true`), or let it
    /// receive data again (`false`)
    ///
    /// Use this to apply back pressure when you're not ready for more data.
    /// Does nothing for IN endpoints.
    pub fn set_nak(&self, ep_addr: EndpointAddress, nak: bool) {
        self.with_usb_mut(|usb| usb.ep_nak(nak, ep_addr));
    }

    /// Start (`true`) or stop (`false`) signaling remote wakeup
    ///
    /// Hold the signal for at least 1ms, and no more than 15ms.
    pub fn set_remote_wakeup(&self, wakeup: bool) {
        self.with_usb_mut(|usb| usb.set_remote_wakeup(wakeup));
    }

    /// Returns the 11-bit frame number from the last start of frame packet
    pub fn frame_number(&self) -> u16 {
        self.with_usb(|usb| usb.frame_number())
    }

    /// Interrupt-safe, immutable access to the USB peripheral
    fn with_usb<R>(&self, func: impl FnOnce(&Driver) -> R) -> R {
        interrupt::free(|cs| {
            let usb = self.usb.borrow(cs);
            let usb = usb.borrow();
            func(&usb)
        })
    }

    /// Interrupt-safe, mutable access to the USB peripheral
    fn with_usb_mut<R>(&self, func: impl FnOnce(&mut Driver) -> R) -> R {
        interrupt::free(|cs| {
            let usb = self.usb.borrow(cs);
            let mut usb = usb.borrow_mut();
            func(&mut usb)
        })
    }
}

impl UsbBus for BusAdapter {
    /// The device address takes effect as soon as it's written, so it must
    /// be written after the status stage of `SET_ADDRESS`.
    const QUIRK_SET_ADDRESS_BEFORE_STATUS: bool = false;

    fn alloc_ep(
        &mut self,
        ep_dir: UsbDirection,
        ep_addr: Option<EndpointAddress>,
        ep_type: EndpointType,
        max_packet_size: u16,
        _interval: u8,
    ) -> usb_device::Result<EndpointAddress> {
        self.with_usb_mut(|usb| {
            if let EndpointType::Isochronous { .. } = ep_type {
                return Err(usb_device::UsbError::Unsupported);
            }

            if let Some(addr) = ep_addr {
                usb.allocate_ep(addr, ep_type, max_packet_size as usize)?;
                Ok(addr)
            } else {
                for idx in 1..8 {
                    let addr = EndpointAddress::from_parts(idx, ep_dir);
                    if !usb.can_allocate(addr, ep_type) {
                        continue;
                    }
                    usb.allocate_ep(addr, ep_type, max_packet_size as usize)?;
                    return Ok(addr);
                }
                Err(usb_device::UsbError::EndpointOverflow)
            }
        })
    }

    fn set_device_address(&self, addr: u8) {
        self.with_usb_mut(|usb| usb.set_address(addr));
    }

    fn enable(&mut self) {
        self.with_usb_mut(|usb| usb.attach());
    }

    fn reset(&self) {
        self.with_usb_mut(|usb| usb.bus_reset());
    }

    fn write(&self, ep_addr: EndpointAddress, buf: &[u8]) -> usb_device::Result<usize> {
        self.with_usb_mut(|usb| {
            trace!(
                "EP{=usize} {} WRITE {=usize}",
                ep_addr.index(),
                ep_addr.direction(),
                buf.len()
            );

            usb.ep_write(buf, ep_addr).map_err(|status| {
                if status != usb_device::UsbError::WouldBlock {
                    warn!(
                        "EP{=usize} {} STATUS {}",
                        ep_addr.index(),
                        ep_addr.direction(),
                        status
                    );
                }
                status
            })
        })
    }

    fn read(&self, ep_addr: EndpointAddress, buf: &mut [u8]) -> usb_device::Result<usize> {
        self.with_usb_mut(|usb| {
            trace!(
                "EP{=usize} {} READ {=usize}",
                ep_addr.index(),
                ep_addr.direction(),
                buf.len()
            );

            usb.ep_read(buf, ep_addr).map_err(|status| {
                if status != usb_device::UsbError::WouldBlock {
                    warn!(
                        "EP{=usize} {} STATUS {}",
                        ep_addr.index(),
                        ep_addr.direction(),
                        status
                    );
                }
                status
            })
        })
    }

    fn set_stalled(&self, ep_addr: EndpointAddress, stalled: bool) {
        self.with_usb_mut(|usb| {
            if usb.is_allocated(ep_addr) {
                usb.ep_stall(stalled, ep_addr);
            }
        });
    }

    fn is_stalled(&self, ep_addr: EndpointAddress) -> bool {
        self.with_usb(|usb| usb.is_ep_stalled(ep_addr))
    }

    fn suspend(&self) {
        self.with_usb_mut(|usb| usb.suspend());
    }

    fn resume(&self) {
        self.with_usb_mut(|usb| usb.resume());
    }

    fn poll(&self) -> PollResult {
        self.with_usb_mut(|usb| usb.poll())
    }
}
