//! Demonstrate a USB serial device
//!
//! Flash your Blue Pill with this demo:
//!
//! ```text
//! cd demos/bluepill
//! cargo build --release --bin serial
//! ```
//!
//! Then, connect a serial interface to the USB device. You should see
//! all inputs echoed back to you. The bulk endpoints are double buffered.

#![no_std]
#![no_main]

use st_usbfs::{BusAdapter, Buffering};
use usb_device::prelude::*;

#[cortex_m_rt::entry]
fn main() -> ! {
    let support::Board { usb, mut led } = support::setup();

    let bus_adapter = BusAdapter::with_buffering(usb, Buffering::DoubleBulk);
    let bus = usb_device::bus::UsbBusAllocator::new(bus_adapter);

    let mut serial = usbd_serial::SerialPort::new(&bus);
    let mut device = UsbDeviceBuilder::new(&bus, UsbVidPid(0x16c0, 0x27dd))
        .strings(&[StringDescriptors::default()
            .manufacturer("st-usbfs")
            .product("Serial echo")
            .serial_number("ECHO")])
        .unwrap()
        .device_class(usbd_serial::USB_CLASS_CDC)
        .max_packet_size_0(64)
        .unwrap()
        .build();

    loop {
        if !device.poll(&mut [&mut serial]) {
            continue;
        }

        let mut buf = [0u8; 64];
        match serial.read(&mut buf) {
            Ok(count) if count > 0 => {
                led.toggle();
                let mut pending = &buf[..count];
                while !pending.is_empty() {
                    match serial.write(pending) {
                        Ok(written) => pending = &pending[written..],
                        Err(UsbError::WouldBlock) => {
                            device.poll(&mut [&mut serial]);
                        }
                        Err(_) => break,
                    }
                }
            }
            _ => {}
        }
    }
}
