//! Class interfaces

use crate::{error::Result, hardware::EndpointMeta, setup::SetupRequest, transport::Pipe};

/// A USB class interface that can be registered with a [`Device`](crate::Device).
///
/// The device never owns an interface; it holds a mutable borrow for as long
/// as the stack runs. Every method is called from the USB interrupt, and must
/// finish without depending on progress in the main loop. Interfaces move
/// into interrupt context with the device, so they must be `Send`.
pub trait UsbInterface: Send {
    /// Handle a class request addressed to this interface, or to one of its
    /// endpoints.
    ///
    /// The pipe is selected on endpoint 0, and its window is bounded to the
    /// request's `wLength`. Return an error to stall the request.
    fn class_request(&mut self, pipe: &mut dyn Pipe, setup: &SetupRequest) -> Result<()>;

    /// Service a data event on one of this interface's endpoints.
    ///
    /// `endpoint` is the physical endpoint number; `offset` is the endpoint's
    /// position in [`endpoints`](UsbInterface::endpoints).
    fn endpoint_request(&mut self, pipe: &mut dyn Pipe, endpoint: u8, offset: u8) -> Result<()>;

    /// The physical endpoints this interface needs, in the order they're
    /// numbered.
    fn endpoints(&self) -> &[EndpointMeta];

    /// Number of physical endpoints this interface needs.
    fn endpoint_count(&self) -> usize {
        self.endpoints().len()
    }

    /// The interface's descriptor blob, as it appears in the configuration
    /// descriptor.
    fn descriptor(&self) -> &[u8];

    /// Size of [`descriptor`](UsbInterface::descriptor), in bytes.
    fn descriptor_size(&self) -> usize {
        self.descriptor().len()
    }

    /// Called once the interface is accepted, with its interface number and
    /// the physical number of its first endpoint.
    fn on_register(&mut self, interface_number: u8, first_endpoint: u8) {
        let _ = (interface_number, first_endpoint);
    }
}
