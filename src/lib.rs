//! A composite USB device stack for endpoint-select device controllers
//!
//! `composite-usbd` enumerates a microcontroller as a composite USB device.
//! Class interfaces register with a [`Device`] at boot; the device numbers
//! their endpoints, composes the configuration descriptor from their
//! descriptors, and services every control transfer from the USB interrupt.
//!
//! The stack talks to the controller through the [`Hardware`] trait. The
//! [`udc`] module provides an implementation for an endpoint-select device
//! controller; to use it, you must define a safe implementation of
//! [`Peripherals`]. The [`msc`] module provides a bulk-only mass storage
//! interface.
//!
//! # Usage
//!
//! 1. Describe the device with a [`DeviceDescriptor`] and a table of
//!    [`StringDescriptor`]s.
//! 2. Create the [`Device`], and [`register`](Device::register) each class
//!    interface. Registration fails once the interfaces need more than
//!    [`ENDPOINT_BUDGET`] endpoints.
//! 3. [`start`](Device::start) the device, and call
//!    [`on_interrupt`](Device::on_interrupt) from the USB interrupt. See
//!    [`SharedDevice`] to share the device with the main loop.
//!
//! # Debugging features
//!
//! Enable the `defmt-03` feature to derive `defmt::Format` on the public
//! enums. The hidden `__log` feature logs through the `log` crate, from
//! interrupt context; only use it when your logger doesn't depend on USB.

#![no_std]

#[cfg(feature = "defmt-03")]
extern crate defmt_03 as defmt;

#[macro_use]
mod log;

mod config;
mod descriptor;
mod device;
mod error;
mod hardware;
mod interface;
mod ral;
mod registry;
mod setup;
mod shared;
mod transport;
mod vcell;

pub mod msc;
pub mod udc;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use descriptor::{
    endpoint_descriptor, interface_descriptor, ConfigurationHeader, Descriptors,
    DeviceDescriptor, StringDescriptor,
};
pub use device::{Device, DeviceStatus, ProtocolState, Stage};
pub use error::{Error, Result};
pub use hardware::{EndpointMeta, Hardware};
pub use interface::UsbInterface;
pub use registry::InterfaceRegistry;
pub use setup::SetupRequest;
pub use shared::SharedDevice;
pub use transport::{Pipe, Transport};

/// Physical endpoints on the controller, counting endpoint 0 once in each
/// direction.
pub const PHYSICAL_ENDPOINTS: usize = 6;
/// Physical endpoints reserved for control transfers.
pub const CONTROL_ENDPOINTS: usize = 2;
/// Physical endpoints available to class interfaces.
pub const ENDPOINT_BUDGET: usize = PHYSICAL_ENDPOINTS - CONTROL_ENDPOINTS;
/// Endpoint numbers addressable through the transport, including 0.
pub const MAX_ENDPOINT_NUMBERS: usize = 8;

/// A type that owns the USB device controller registers
///
/// # Safety
///
/// `Peripherals` should only be implemented on a type that owns the USB
/// device controller register block. The pointer returned by `udc` is
/// assumed to be valid, and is cast to the register definition used by
/// [`Udc`](udc::Udc).
///
/// # Example
///
/// A safe implementation of `Peripherals`, for a controller whose register
/// block starts at `USBCON`, address `0xD8`.
///
/// ```
/// use composite_usbd::Peripherals;
///
/// /// Only construct one of these.
/// struct Usb(());
///
/// unsafe impl Peripherals for Usb {
///     fn udc(&self) -> *const () {
///         0x00D8 as *const ()
///     }
/// }
///
/// let usb = Usb(());
/// assert_eq!(usb.udc(), 0xD8 as *const ());
/// ```
pub unsafe trait Peripherals {
    /// Returns the address of the USB device controller registers
    fn udc(&self) -> *const ();
}
