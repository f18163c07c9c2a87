//! Register access layer for the USB full-speed device peripheral
//!
//! The register and field definitions follow the `ral-registers` conventions,
//! so they work with `read_reg!`, `write_reg!`, and `modify_reg!`. Endpoint
//! registers have a shared field layout, described once by the `EPR` module.

#![allow(non_snake_case, non_upper_case_globals, dead_code)]

pub use ral_registers::{modify_reg, read_reg, write_reg, RORegister, RWRegister};

use crate::pma::PacketMemory;

/// Defines a register field module
macro_rules! field {
    ($name:ident, $offset:expr, $width:expr, { $($variant:ident = $value:expr),* $(,)? }) => {
        pub mod $name {
            pub const offset: u32 = $offset;
            pub const mask: u32 = ((1u32 << $width) - 1) << offset;
            pub mod R {}
            pub mod W {}
            pub mod RW {
                $(pub const $variant: u32 = $value;)*
            }
        }
    };
    ($name:ident, $offset:expr, $width:expr) => {
        field!($name, $offset, $width, {});
    };
}

pub mod usb {
    use super::{RORegister, RWRegister};

    #[repr(C)]
    pub struct RegisterBlock {
        pub EP0R: RWRegister<u32>,
        pub EP1R: RWRegister<u32>,
        pub EP2R: RWRegister<u32>,
        pub EP3R: RWRegister<u32>,
        pub EP4R: RWRegister<u32>,
        pub EP5R: RWRegister<u32>,
        pub EP6R: RWRegister<u32>,
        pub EP7R: RWRegister<u32>,
        _reserved0: [u32; 8],
        pub CNTR: RWRegister<u32>,
        pub ISTR: RWRegister<u32>,
        pub FNR: RORegister<u32>,
        pub DADDR: RWRegister<u32>,
        pub BTABLE: RWRegister<u32>,
        /// Only available on parts with 2x16 packet memory access
        pub LPMCSR: RWRegister<u32>,
        /// Only available on parts with 2x16 packet memory access
        pub BCDR: RWRegister<u32>,
    }

    pub type Instance = &'static RegisterBlock;

    /// Fields shared by all endpoint registers, `EP0R` through `EP7R`
    pub mod EPR {
        field!(CTR_RX, 15, 1);
        field!(DTOG_RX, 14, 1);
        field!(STAT_RX, 12, 2, { Disabled = 0, Stall = 1, Nak = 2, Valid = 3 });
        field!(SETUP, 11, 1);
        field!(EP_TYPE, 9, 2, { Bulk = 0, Control = 1, Isochronous = 2, Interrupt = 3 });
        field!(EP_KIND, 8, 1);
        field!(CTR_TX, 7, 1);
        field!(DTOG_TX, 6, 1);
        field!(STAT_TX, 4, 2, { Disabled = 0, Stall = 1, Nak = 2, Valid = 3 });
        field!(EA, 0, 4);
    }

    pub mod CNTR {
        field!(CTRM, 15, 1);
        field!(PMAOVRM, 14, 1);
        field!(ERRM, 13, 1);
        field!(WKUPM, 12, 1);
        field!(SUSPM, 11, 1);
        field!(RESETM, 10, 1);
        field!(SOFM, 9, 1);
        field!(ESOFM, 8, 1);
        field!(L1REQM, 7, 1);
        field!(L1RESUME, 5, 1);
        field!(RESUME, 4, 1);
        field!(FSUSP, 3, 1);
        field!(LP_MODE, 2, 1);
        field!(PDWN, 1, 1);
        field!(FRES, 0, 1);
    }

    pub mod ISTR {
        field!(CTR, 15, 1);
        field!(PMAOVR, 14, 1);
        field!(ERR, 13, 1);
        field!(WKUP, 12, 1);
        field!(SUSP, 11, 1);
        field!(RESET, 10, 1);
        field!(SOF, 9, 1);
        field!(ESOF, 8, 1);
        field!(L1REQ, 7, 1);
        field!(DIR, 4, 1);
        field!(EP_ID, 0, 4);
    }

    pub mod FNR {
        field!(RXDP, 15, 1);
        field!(RXDM, 14, 1);
        field!(LCK, 13, 1);
        field!(LSOF, 11, 2);
        field!(FN, 0, 11);
    }

    pub mod DADDR {
        field!(EF, 7, 1);
        field!(ADD, 0, 7);
    }

    pub mod BTABLE {
        field!(BTABLE, 3, 13);
    }

    pub mod LPMCSR {
        field!(BESL, 4, 4);
        field!(REMWAKE, 3, 1);
        field!(LPMACK, 1, 1);
        field!(LPMEN, 0, 1);
    }

    pub mod BCDR {
        field!(DPPU, 15, 1);
        field!(PS2DET, 7, 1);
        field!(SDET, 6, 1);
        field!(PDET, 5, 1);
        field!(DCDET, 4, 1);
        field!(SDEN, 3, 1);
        field!(PDEN, 2, 1);
        field!(DCDEN, 1, 1);
        field!(BCDEN, 0, 1);
    }

    const _: [(); 1] = [(); (core::mem::size_of::<RegisterBlock>() == 0x5C) as usize];
}

/// Typed handles to the hardware described by a [`Peripherals`](crate::Peripherals)
pub struct Instances {
    pub usb: usb::Instance,
    pub pma: PacketMemory,
}

/// Converts the user's peripherals into register and packet memory handles
pub fn instances<P: crate::Peripherals>(peripherals: P) -> Instances {
    // Safety: the implementer of Peripherals guarantees that these addresses
    // are the USB register block and the packet memory of the same peripheral,
    // and that the object owns them.
    let usb = unsafe { &*peripherals.usb().cast::<usb::RegisterBlock>() };
    let pma = unsafe {
        PacketMemory::new(
            peripherals.packet_memory().cast::<u8>().cast_mut(),
            P::ACCESS,
        )
    };
    Instances { usb, pma }
}
