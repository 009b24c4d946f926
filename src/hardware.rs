//! Physical device controller contract
//!
//! The stack drives an endpoint-select style controller: software selects
//! an endpoint, then moves bytes through that endpoint's FIFO one at a time,
//! and hands each full bank to (or back from) the host by clearing a ready
//! condition. [`Udc`](crate::udc::Udc) implements this for the register
//! block in [`udc`](crate::udc). Tests and other controllers can provide
//! their own implementation.
//!
//! None of these methods block. The stack layers bounded waits on top of
//! the ready queries; see [`Transport`](crate::Transport).

use crate::error::Result;
use usb_device::{endpoint::EndpointType, UsbDirection};

/// Description of one physical endpoint owned by a class interface.
///
/// Used once, at configuration time, to initialize the hardware endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointMeta {
    /// Transfer type.
    pub ep_type: EndpointType,
    /// Data direction.
    pub direction: UsbDirection,
    /// Max packet size, in bytes.
    pub max_packet_size: u16,
}

impl EndpointMeta {
    /// A bulk endpoint.
    pub const fn bulk(direction: UsbDirection, max_packet_size: u16) -> Self {
        EndpointMeta {
            ep_type: EndpointType::Bulk,
            direction,
            max_packet_size,
        }
    }

    /// An interrupt endpoint.
    pub const fn interrupt(direction: UsbDirection, max_packet_size: u16) -> Self {
        EndpointMeta {
            ep_type: EndpointType::Interrupt,
            direction,
            max_packet_size,
        }
    }

    /// The bidirectional control endpoint 0.
    pub const fn control(max_packet_size: u16) -> Self {
        EndpointMeta {
            ep_type: EndpointType::Control,
            direction: UsbDirection::Out,
            max_packet_size,
        }
    }
}

/// A USB device controller with per-endpoint byte FIFOs.
///
/// Every FIFO method acts on the endpoint chosen by the most recent
/// [`select_endpoint`](Hardware::select_endpoint).
pub trait Hardware {
    /// Choose the endpoint that the following FIFO operations act on.
    fn select_endpoint(&mut self, number: u8);

    /// Write one byte into the selected endpoint's IN bank.
    fn write_byte(&mut self, byte: u8);
    /// Read one byte from the selected endpoint's OUT bank.
    fn read_byte(&mut self) -> u8;
    /// Number of unread bytes in the selected endpoint's OUT bank.
    fn bytes_available(&self) -> usize;

    /// The IN bank can accept data (the previous packet was taken by the host).
    fn transmit_ready(&self) -> bool;
    /// An OUT packet (or the status stage of a control read) has arrived.
    fn receive_ready(&self) -> bool;
    /// Hand the current IN bank to the host.
    ///
    /// Marks a packet boundary. An empty bank is sent as a zero length packet,
    /// which is how the control status stage is acknowledged.
    fn end_packet(&mut self);
    /// Return the current OUT bank to the hardware.
    fn release_packet(&mut self);

    /// A SETUP packet is waiting on the selected (control) endpoint.
    fn setup_received(&self) -> bool;
    /// Clear the SETUP condition, along with any stale IN and OUT conditions.
    fn clear_setup(&mut self);
    /// Stall the selected endpoint.
    fn stall(&mut self);

    /// Latch a new device address.
    fn set_address(&mut self, address: u8);
    /// Configure and enable the physical endpoint `number`.
    fn init_endpoint(&mut self, number: u8, meta: &EndpointMeta) -> Result<()>;
    /// Reset the FIFO and data toggle of physical endpoint `number`.
    fn reset_endpoint(&mut self, number: u8) -> Result<()>;

    /// Connect to the bus, and enable end-of-reset interrupts.
    fn attach(&mut self);
    /// The host reset the bus. Clears the condition.
    fn take_bus_reset(&mut self) -> bool;
    /// Enable the SETUP interrupt on the selected endpoint.
    fn enable_setup_interrupt(&mut self);
    /// Bit mask of class endpoints (1 through 7) with pending data events.
    fn pending_endpoints(&self) -> u8;
}
