//! Endpoint-select USB device controller
//!
//! [`Udc`] implements [`Hardware`] for a full-speed device controller with
//! an eight-bit register interface: software writes an endpoint number to
//! `UENUM`, then moves bytes through that endpoint's bank with `UEDATX`,
//! and hands banks over by clearing flags in `UEINTX`. This is the device
//! controller found on USB-capable 8-bit AVR parts.
//!
//! The driver assumes that the USB clock, and any PLL that feeds it, are
//! already running.

use crate::{
    error::Result,
    hardware::{EndpointMeta, Hardware},
    ral::{self, udc::RegisterBlock},
    Peripherals, PHYSICAL_ENDPOINTS,
};
use usb_device::{endpoint::EndpointType, UsbDirection, UsbError};

/// Clears the IN flag of the control endpoint, sending the bank.
const CONTROL_IN_RELEASE: u8 = !ral::udc::UEINTX::TXINI::mask;
/// Clears the OUT flag of the control endpoint, freeing the bank.
const CONTROL_OUT_RELEASE: u8 = !ral::udc::UEINTX::RXOUTI::mask;
/// Clears the IN flag and the bank of a data endpoint.
const DATA_IN_RELEASE: u8 = !(ral::udc::UEINTX::TXINI::mask | ral::udc::UEINTX::FIFOCON::mask);
/// Clears the OUT flag and the bank of a data endpoint.
const DATA_OUT_RELEASE: u8 = !(ral::udc::UEINTX::RXOUTI::mask | ral::udc::UEINTX::FIFOCON::mask);
/// Clears SETUP, along with any IN or OUT condition left from the last transfer.
const SETUP_RELEASE: u8 = !(ral::udc::UEINTX::RXSTPI::mask
    | ral::udc::UEINTX::RXOUTI::mask
    | ral::udc::UEINTX::TXINI::mask);

/// The USB device controller.
pub struct Udc<P> {
    udc: *const RegisterBlock,
    _peripherals: P,
}

// Safety: the pointer is owned through `P`, and nothing else aliases the
// registers. Moving the controller moves that ownership with it.
unsafe impl<P: Send> Send for Udc<P> {}

impl<P: Peripherals> Udc<P> {
    /// Take ownership of the controller, and power it up.
    ///
    /// The controller stays detached from the bus until the device starts.
    pub fn new(peripherals: P) -> Self {
        let udc = Udc {
            udc: peripherals.udc().cast(),
            _peripherals: peripherals,
        };
        udc.initialize();
        udc
    }

    fn regs(&self) -> &RegisterBlock {
        // Safety: the `Peripherals` implementation guarantees that the
        // pointer is valid, and that we own the registers.
        unsafe { &*self.udc }
    }

    fn initialize(&self) {
        ral::write_reg!(ral::udc, self.regs(), USBCON, USBE: 1, OTGPADE: 1, FRZCLK: 0);
        ral::write_reg!(ral::udc, self.regs(), UDCON, DETACH: 1);
    }

    fn selected(&self) -> u8 {
        ral::read_reg!(ral::udc, self.regs(), UENUM, EPNUM)
    }

    fn is_control(&self) -> bool {
        self.selected() == 0
    }
}

/// `EPSIZE` encoding of a max packet size.
fn size_code(max_packet_size: u16) -> core::result::Result<u8, UsbError> {
    match max_packet_size {
        8 => Ok(0),
        16 => Ok(1),
        32 => Ok(2),
        64 => Ok(3),
        128 => Ok(4),
        256 => Ok(5),
        512 => Ok(6),
        _ => Err(UsbError::EndpointMemoryOverflow),
    }
}

/// `EPTYPE` encoding of a transfer type.
fn type_code(ep_type: EndpointType) -> u8 {
    match ep_type {
        EndpointType::Control => 0,
        EndpointType::Isochronous { .. } => 1,
        EndpointType::Bulk => 2,
        EndpointType::Interrupt => 3,
    }
}

impl<P: Peripherals> Hardware for Udc<P> {
    fn select_endpoint(&mut self, number: u8) {
        ral::write_reg!(ral::udc, self.regs(), UENUM, EPNUM: number);
    }

    fn write_byte(&mut self, byte: u8) {
        ral::write_reg!(ral::udc, self.regs(), UEDATX, byte);
    }

    fn read_byte(&mut self) -> u8 {
        ral::read_reg!(ral::udc, self.regs(), UEDATX)
    }

    fn bytes_available(&self) -> usize {
        let count = ral::read_reg!(ral::udc, self.regs(), UEBCLX, BYCT);
        usize::from(count)
    }

    fn transmit_ready(&self) -> bool {
        ral::read_reg!(ral::udc, self.regs(), UEINTX, TXINI == 1)
    }

    fn receive_ready(&self) -> bool {
        ral::read_reg!(ral::udc, self.regs(), UEINTX, RXOUTI == 1)
    }

    fn end_packet(&mut self) {
        let release = if self.is_control() {
            CONTROL_IN_RELEASE
        } else {
            DATA_IN_RELEASE
        };
        ral::write_reg!(ral::udc, self.regs(), UEINTX, release);
    }

    fn release_packet(&mut self) {
        let release = if self.is_control() {
            CONTROL_OUT_RELEASE
        } else {
            DATA_OUT_RELEASE
        };
        ral::write_reg!(ral::udc, self.regs(), UEINTX, release);
    }

    fn setup_received(&self) -> bool {
        ral::read_reg!(ral::udc, self.regs(), UEINTX, RXSTPI == 1)
    }

    fn clear_setup(&mut self) {
        ral::write_reg!(ral::udc, self.regs(), UEINTX, SETUP_RELEASE);
    }

    fn stall(&mut self) {
        ral::write_reg!(ral::udc, self.regs(), UECONX, STALLRQ: 1, EPEN: 1);
    }

    fn set_address(&mut self, address: u8) {
        // The address must be written before it's enabled.
        ral::write_reg!(ral::udc, self.regs(), UDADDR, UADD: address);
        ral::modify_reg!(ral::udc, self.regs(), UDADDR, ADDEN: 1);
    }

    fn init_endpoint(&mut self, number: u8, meta: &EndpointMeta) -> Result<()> {
        if usize::from(number) >= PHYSICAL_ENDPOINTS {
            return Err(UsbError::InvalidEndpoint.into());
        }
        let size = size_code(meta.max_packet_size)?;
        let direction = (meta.direction == UsbDirection::In) as u8;
        // Data endpoints get two banks, so one can fill while the other drains.
        let banks = (number != 0) as u8;

        let udc = self.regs();
        ral::write_reg!(ral::udc, udc, UENUM, EPNUM: number);
        ral::write_reg!(ral::udc, udc, UECONX, EPEN: 1);
        ral::write_reg!(ral::udc, udc, UECFG0X, EPTYPE: type_code(meta.ep_type), EPDIR: direction);
        ral::write_reg!(ral::udc, udc, UECFG1X, EPSIZE: size, EPBK: banks, ALLOC: 1);

        if ral::read_reg!(ral::udc, udc, UESTA0X, CFGOK == 0) {
            warn!("EP{} rejected by the controller", number);
            return Err(UsbError::EndpointMemoryOverflow.into());
        }
        if number != 0 && meta.direction == UsbDirection::Out {
            ral::write_reg!(ral::udc, udc, UEIENX, RXOUTE: 1);
        }
        trace!("EP{} initialized, size code {}", number, size);
        Ok(())
    }

    fn reset_endpoint(&mut self, number: u8) -> Result<()> {
        if usize::from(number) >= PHYSICAL_ENDPOINTS {
            return Err(UsbError::InvalidEndpoint.into());
        }
        let udc = self.regs();
        ral::write_reg!(ral::udc, udc, UERST, EPRST: 1 << number);
        ral::write_reg!(ral::udc, udc, UERST, 0);
        ral::write_reg!(ral::udc, udc, UENUM, EPNUM: number);
        ral::modify_reg!(ral::udc, udc, UECONX, RSTDT: 1);
        Ok(())
    }

    fn attach(&mut self) {
        ral::modify_reg!(ral::udc, self.regs(), UDCON, DETACH: 0);
        ral::modify_reg!(ral::udc, self.regs(), UDIEN, EORSTE: 1);
    }

    fn take_bus_reset(&mut self) -> bool {
        let udc = self.regs();
        if ral::read_reg!(ral::udc, udc, UDINT, EORSTI == 1) {
            ral::modify_reg!(ral::udc, udc, UDINT, EORSTI: 0);
            true
        } else {
            false
        }
    }

    fn enable_setup_interrupt(&mut self) {
        ral::modify_reg!(ral::udc, self.regs(), UEIENX, RXSTPE: 1);
    }

    fn pending_endpoints(&self) -> u8 {
        let pending = ral::read_reg!(ral::udc, self.regs(), UEINT, EPINT);
        // Endpoint 0 is serviced through SETUP.
        pending & !1
    }
}
