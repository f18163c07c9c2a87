//! Support library (qualified as `support`) for all demos.

#![no_std]

pub use stm32f1xx_hal as hal;

use hal::{pac, prelude::*};
use panic_halt as _;

/// Start of the USB packet memory on the STM32F103
const PACKET_MEMORY: usize = 0x4000_6000;

/// Board resources used by the demos
pub struct Board {
    pub usb: Usb,
    pub led: hal::gpio::gpioc::PC13<hal::gpio::Output<hal::gpio::PushPull>>,
}

/// Run the core at 48MHz from the 8MHz crystal, and prepare the USB peripheral
///
/// The Blue Pill has a fixed 1.5k pull-up on D+. The setup drives D+ low for a
/// moment, so that the host sees a new connection after a reset.
///
/// # Panics
///
/// Panics if the peripherals are already taken.
pub fn setup() -> Board {
    let dp = pac::Peripherals::take().unwrap();

    let mut flash = dp.FLASH.constrain();
    let rcc = dp.RCC.constrain();
    let clocks = rcc
        .cfgr
        .use_hse(8.MHz())
        .sysclk(48.MHz())
        .pclk1(24.MHz())
        .freeze(&mut flash.acr);
    assert!(clocks.usbclk_valid());

    let mut gpioc = dp.GPIOC.split();
    let mut led = gpioc.pc13.into_push_pull_output(&mut gpioc.crh);
    led.set_high();

    let mut gpioa = dp.GPIOA.split();
    let mut usb_dp = gpioa.pa12.into_push_pull_output(&mut gpioa.crh);
    usb_dp.set_low();
    cortex_m::asm::delay(clocks.sysclk().raw() / 100);
    let _usb_dp = usb_dp.into_floating_input(&mut gpioa.crh);

    // Safety: the clock configuration is frozen, and only the USB enable
    // bit changes.
    let rcc = unsafe { &*pac::RCC::ptr() };
    rcc.apb1enr.modify(|_, w| w.usben().set_bit());

    Board {
        usb: Usb { _usb: dp.USB },
        led,
    }
}

//
// Keep in sync with the st_usbfs::Peripherals example!
//

/// The USB peripheral of the STM32F103
pub struct Usb {
    _usb: pac::USB,
}

unsafe impl st_usbfs::Peripherals for Usb {
    const ACCESS: st_usbfs::Access = st_usbfs::Access::Word1x16;
    const PACKET_MEMORY_SIZE: usize = 512;

    fn usb(&self) -> *const () {
        pac::USB::ptr().cast()
    }
    fn packet_memory(&self) -> *const () {
        PACKET_MEMORY as _
    }
}
