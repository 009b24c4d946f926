//! Register access for the device controller
//!
//! Re-exports the `ral-registers` macros, and defines a RAL-compatible
//! register block for the endpoint-select USB device controller. The block
//! is eight bits wide, and starts at `USBCON`.

pub use ral_registers::{modify_reg, read_reg, write_reg};

#[allow(non_snake_case, non_upper_case_globals)]
pub mod udc {
    use crate::vcell::VCell;

    #[repr(C)]
    pub struct RegisterBlock {
        pub USBCON: VCell<u8>,
        pub USBSTA: VCell<u8>,
        pub USBINT: VCell<u8>,
        _reserved0: [u8; 5],
        pub UDCON: VCell<u8>,
        pub UDINT: VCell<u8>,
        pub UDIEN: VCell<u8>,
        pub UDADDR: VCell<u8>,
        pub UDFNUML: VCell<u8>,
        pub UDFNUMH: VCell<u8>,
        pub UDMFN: VCell<u8>,
        _reserved1: [u8; 1],
        pub UEINTX: VCell<u8>,
        pub UENUM: VCell<u8>,
        pub UERST: VCell<u8>,
        pub UECONX: VCell<u8>,
        pub UECFG0X: VCell<u8>,
        pub UECFG1X: VCell<u8>,
        pub UESTA0X: VCell<u8>,
        pub UESTA1X: VCell<u8>,
        pub UEIENX: VCell<u8>,
        pub UEDATX: VCell<u8>,
        pub UEBCLX: VCell<u8>,
        pub UEBCHX: VCell<u8>,
        pub UEINT: VCell<u8>,
    }

    impl RegisterBlock {
        /// A zeroed block, for testing register manipulation in memory.
        #[cfg(test)]
        pub const fn new() -> Self {
            RegisterBlock {
                USBCON: VCell::new(0),
                USBSTA: VCell::new(0),
                USBINT: VCell::new(0),
                _reserved0: [0; 5],
                UDCON: VCell::new(0),
                UDINT: VCell::new(0),
                UDIEN: VCell::new(0),
                UDADDR: VCell::new(0),
                UDFNUML: VCell::new(0),
                UDFNUMH: VCell::new(0),
                UDMFN: VCell::new(0),
                _reserved1: [0; 1],
                UEINTX: VCell::new(0),
                UENUM: VCell::new(0),
                UERST: VCell::new(0),
                UECONX: VCell::new(0),
                UECFG0X: VCell::new(0),
                UECFG1X: VCell::new(0),
                UESTA0X: VCell::new(0),
                UESTA1X: VCell::new(0),
                UEIENX: VCell::new(0),
                UEDATX: VCell::new(0),
                UEBCLX: VCell::new(0),
                UEBCHX: VCell::new(0),
                UEINT: VCell::new(0),
            }
        }
    }

    const _: [(); 1] = [(); (core::mem::size_of::<RegisterBlock>() == 29) as usize];

    macro_rules! field {
        ($name:ident, $offset:expr, $mask:expr) => {
            #[allow(dead_code)]
            pub mod $name {
                pub const offset: u8 = $offset;
                pub const mask: u8 = $mask << offset;
                pub mod RW {}
                pub mod R {}
                pub mod W {}
            }
        };
    }

    pub mod USBCON {
        field!(VBUSTE, 0, 1);
        field!(OTGPADE, 4, 1);
        field!(FRZCLK, 5, 1);
        field!(USBE, 7, 1);
    }

    pub mod UDCON {
        field!(DETACH, 0, 1);
        field!(RMWKUP, 1, 1);
        field!(LSM, 2, 1);
    }

    pub mod UDINT {
        field!(SUSPI, 0, 1);
        field!(SOFI, 2, 1);
        field!(EORSTI, 3, 1);
        field!(WAKEUPI, 4, 1);
    }

    pub mod UDIEN {
        field!(SUSPE, 0, 1);
        field!(SOFE, 2, 1);
        field!(EORSTE, 3, 1);
        field!(WAKEUPE, 4, 1);
    }

    pub mod UDADDR {
        field!(UADD, 0, 0x7F);
        field!(ADDEN, 7, 1);
    }

    pub mod UEINTX {
        field!(TXINI, 0, 1);
        field!(STALLEDI, 1, 1);
        field!(RXOUTI, 2, 1);
        field!(RXSTPI, 3, 1);
        field!(NAKOUTI, 4, 1);
        field!(RWAL, 5, 1);
        field!(NAKINI, 6, 1);
        field!(FIFOCON, 7, 1);
    }

    pub mod UENUM {
        field!(EPNUM, 0, 0b111);
    }

    pub mod UERST {
        field!(EPRST, 0, 0x7F);
    }

    pub mod UECONX {
        field!(EPEN, 0, 1);
        field!(RSTDT, 3, 1);
        field!(STALLRQC, 4, 1);
        field!(STALLRQ, 5, 1);
    }

    pub mod UECFG0X {
        field!(EPDIR, 0, 1);
        field!(EPTYPE, 6, 0b11);
    }

    pub mod UECFG1X {
        field!(ALLOC, 1, 1);
        field!(EPBK, 2, 0b11);
        field!(EPSIZE, 4, 0b111);
    }

    pub mod UESTA0X {
        field!(NBUSYBK, 0, 0b11);
        field!(DTSEQ, 2, 0b11);
        field!(UNDERFI, 5, 1);
        field!(OVERFI, 6, 1);
        field!(CFGOK, 7, 1);
    }

    pub mod UEIENX {
        field!(TXINE, 0, 1);
        field!(STALLEDE, 1, 1);
        field!(RXOUTE, 2, 1);
        field!(RXSTPE, 3, 1);
    }

    pub mod UEDATX {
        field!(DAT, 0, 0xFF);
    }

    pub mod UEBCLX {
        field!(BYCT, 0, 0xFF);
    }

    pub mod UEINT {
        field!(EPINT, 0, 0x7F);
    }
}
