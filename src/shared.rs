//! Interrupt-safe device ownership

use crate::{device::Device, hardware::Hardware};
use core::cell::RefCell;
use cortex_m::interrupt::{self, Mutex};

/// A [`Device`] shared between the USB interrupt and the main loop.
///
/// Every access runs in a critical section, so a control transfer serviced
/// by [`on_interrupt`](SharedDevice::on_interrupt) is never interleaved with
/// main loop access. Register all interfaces and start the device before you
/// enable the USB interrupt.
///
/// # Example
///
/// ```no_run
/// use composite_usbd::{
///     udc::Udc, Descriptors, Device, DeviceDescriptor, Peripherals, SharedDevice,
///     StringDescriptor,
/// };
///
/// struct Usb;
/// unsafe impl Peripherals for Usb {
///     fn udc(&self) -> *const () {
///         0x00D8 as *const ()
///     }
/// }
///
/// static STRINGS: [StringDescriptor<'static>; 2] = [
///     StringDescriptor::Language(0x0409),
///     StringDescriptor::Text("composite-usbd"),
/// ];
///
/// let descriptors = Descriptors::new(DeviceDescriptor::new(0x5824, 0x27dd), &STRINGS);
/// let device = SharedDevice::new(Device::new(Udc::new(Usb), descriptors));
/// device.with_device_mut(|device| device.start()).unwrap();
///
/// // The USB interrupt calls device.on_interrupt()...
/// while !device.is_configured() {}
/// ```
pub struct SharedDevice<'a, H> {
    device: Mutex<RefCell<Device<'a, H>>>,
}

impl<'a, H: Hardware> SharedDevice<'a, H> {
    /// Take ownership of a device.
    pub fn new(device: Device<'a, H>) -> Self {
        SharedDevice {
            device: Mutex::new(RefCell::new(device)),
        }
    }

    /// Interrupt-safe, immutable access to the device
    pub fn with_device<R>(&self, func: impl FnOnce(&Device<'a, H>) -> R) -> R {
        interrupt::free(|cs| {
            let device = self.device.borrow(cs);
            let device = device.borrow();
            func(&*device)
        })
    }

    /// Interrupt-safe, mutable access to the device
    pub fn with_device_mut<R>(&self, func: impl FnOnce(&mut Device<'a, H>) -> R) -> R {
        interrupt::free(|cs| {
            let device = self.device.borrow(cs);
            let mut device = device.borrow_mut();
            func(&mut *device)
        })
    }

    /// Service the USB interrupt.
    pub fn on_interrupt(&self) {
        self.with_device_mut(|device| device.on_interrupt());
    }

    /// Indicates that the host configured the device.
    pub fn is_configured(&self) -> bool {
        self.with_device(|device| device.is_configured())
    }
}
