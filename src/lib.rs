//! A USB driver for the STM32 USB full-speed device peripheral
//!
//! `st-usbfs` provides a [`usb-device`] USB bus implementation, allowing you
//! to add USB device features to your embedded Rust program. It supports the
//! "USB FS device" peripheral, found in STM32F0, STM32F1, STM32F3, STM32L0,
//! STM32L1, STM32L4, and STM32G4 parts. See [`BusAdapter`] for usage and
//! examples.
//!
//! To interface the library, you must define a safe implementation of [`Peripherals`].
//! See the peripherals documentation for more information.
//!
//! # Debugging features
//!
//! Enable the `defmt-03` feature to log driver events with `defmt` 0.3.
//!
//! [`usb-device`]: https://crates.io/crates/usb-device

#![no_std]

// The defmt macros refer to their own crate as `defmt`.
#[cfg(feature = "defmt-03")]
extern crate defmt_03 as defmt;

#[macro_use]
mod log;

mod buffer;
mod bus;
mod driver;
mod endpoint;
mod epr;
mod pma;
mod ral;
mod state;

pub use bus::BusAdapter;
pub use driver::Buffering;
pub use pma::Access;

/// A type that owns the USB peripheral
///
/// An implementation of `Peripherals` is expected to own
///
/// - the USB registers
/// - the USB packet memory area (PMA)
///
/// of one USB FS device peripheral. The associated constants describe how
/// the packet memory is laid out, and whether the peripheral controls the
/// D+ pull-up.
///
/// # Safety
///
/// `Peripherals` should only be implemented on a type that
/// owns the register block and packet memory required for all USB
/// operation. The pointers returned by the methods are
/// assumed to be valid, and will be cast to a register
/// definition, or accessed as packet memory. The constants
/// must describe the part that owns the peripheral.
///
/// # Example
///
/// A safe implementation of `Peripherals` for an STM32F103, built on a
/// peripheral access crate. Assume that `pac` is the PAC for your part.
///
/// ```
/// # mod pac {
/// #   pub struct USB { _private: () }
/// #   impl USB {
/// #     pub const PTR: *const () = 0x4000_5c00 as _;
/// #     pub fn take() -> Option<USB> { Some(USB { _private: () }) }
/// #   }
/// # }
/// use st_usbfs::{Access, Peripherals};
///
/// struct Usb {
///     _usb: pac::USB,
/// }
///
/// impl Usb {
///     /// Panics if the USB peripheral is already taken
///     pub fn take() -> Usb {
///         Self {
///             _usb: pac::USB::take().unwrap(),
///         }
///     }
/// }
///
/// unsafe impl Peripherals for Usb {
///     const ACCESS: Access = Access::Word1x16;
///     const PACKET_MEMORY_SIZE: usize = 512;
///
///     fn usb(&self) -> *const () {
///         pac::USB::PTR
///     }
///     fn packet_memory(&self) -> *const () {
///         0x4000_6000 as _
///     }
/// }
///
/// let usb = Usb::take();
/// assert_eq!(usb.usb(), 0x4000_5c00 as *const ());
/// ```
pub unsafe trait Peripherals {
    /// How the CPU addresses packet memory on this part
    const ACCESS: Access;
    /// The size of the packet memory, in bytes
    ///
    /// This is the size seen by the USB peripheral. On parts with
    /// [`Access::Word1x16`], the CPU sees a region twice this size.
    const PACKET_MEMORY_SIZE: usize;
    /// Indicates that the peripheral controls the D+ pull-up through
    /// `BCDR.DPPU`
    ///
    /// Set this on STM32F0, STM32L0, STM32L4, and STM32G4 parts. Otherwise,
    /// the pull-up is external, and the driver doesn't control it.
    const INTERNAL_PULLUP: bool = false;

    /// Returns the address of the USB registers
    /// for this peripheral instance
    fn usb(&self) -> *const ();
    /// Returns the address of the USB packet memory
    /// for this peripheral instance
    fn packet_memory(&self) -> *const ();
}
