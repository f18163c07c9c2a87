//! Turns on the LED once the host configures the device
//!
//! The device has no classes. It enumerates, and then does nothing. Use this
//! to check enumeration, suspend, and resume: the LED follows the device
//! state.

#![no_std]
#![no_main]

use st_usbfs::BusAdapter;
use usb_device::{device::UsbDeviceState, prelude::*};

#[cortex_m_rt::entry]
fn main() -> ! {
    let support::Board { usb, mut led } = support::setup();

    let bus_adapter = BusAdapter::new(usb);
    let bus = usb_device::bus::UsbBusAllocator::new(bus_adapter);

    let mut device = UsbDeviceBuilder::new(&bus, UsbVidPid(0x16c0, 0x27dd))
        .strings(&[StringDescriptors::default().product("st-usbfs configured")])
        .unwrap()
        .max_packet_size_0(64)
        .unwrap()
        .build();

    loop {
        device.poll(&mut []);
        // The LED is active low.
        if device.state() == UsbDeviceState::Configured {
            led.set_low();
        } else {
            led.set_high();
        }
    }
}
