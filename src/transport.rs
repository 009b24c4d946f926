//! Chunked endpoint transport
//!
//! [`Transport`] turns the byte-at-a-time [`Hardware`] FIFOs into packet
//! streams:
//!
//! - Bytes are flushed to the host one max-packet-size bank at a time. The
//!   caller never splits a transfer itself.
//! - A *clip window* bounds the number of bytes that reach the wire. Bytes
//!   offered beyond the window are accepted, and dropped. This is how a
//!   data stage sends "up to `wLength`" without every sender checking it.
//! - The only places the stack waits on hardware are here. Every wait is
//!   bounded by [`Config::wait_limit`](crate::Config::wait_limit).
//!
//! Class interfaces see the transport through the object-safe [`Pipe`] trait.

use crate::{
    error::{Error, Result},
    hardware::{EndpointMeta, Hardware},
    setup::SetupRequest,
    MAX_ENDPOINT_NUMBERS,
};

/// Byte channel to the currently selected endpoint.
///
/// This is the view of the transport that class interfaces get.
pub trait Pipe {
    /// Select `endpoint`, and open an unbounded window on it.
    fn select(&mut self, endpoint: u8);
    /// Bound the following stream of sends or receives to `limit` bytes.
    ///
    /// Resets the stream position on the selected endpoint.
    fn set_window(&mut self, limit: usize);
    /// Send `data`, splitting it into packets.
    ///
    /// Returns the number of bytes accepted, which is always `data.len()`
    /// unless an error occurs. Accepted bytes outside of the window are
    /// not transmitted.
    fn send(&mut self, data: &[u8]) -> Result<usize>;
    /// Receive into `buffer`, packet by packet.
    ///
    /// Stops at the end of `buffer`, at the end of the window, or after a
    /// short packet. Returns the number of bytes received.
    fn receive(&mut self, buffer: &mut [u8]) -> Result<usize>;
    /// Hand any partially filled IN bank to the host.
    fn flush(&mut self);
    /// Stall the selected endpoint.
    fn stall(&mut self);
}

/// Packet and clip-window layer over a [`Hardware`] controller.
pub struct Transport<H> {
    hw: H,
    endpoint: u8,
    /// Bytes offered on the selected endpoint since the window opened
    position: usize,
    window: usize,
    max_packet_sizes: [u16; MAX_ENDPOINT_NUMBERS],
    wait_limit: Option<u32>,
}

impl<H: Hardware> Transport<H> {
    /// Wrap the hardware, using `max_packet_size_0` for the control endpoint.
    pub fn new(hw: H, max_packet_size_0: u8, wait_limit: Option<u32>) -> Self {
        let mut max_packet_sizes = [0; MAX_ENDPOINT_NUMBERS];
        max_packet_sizes[0] = max_packet_size_0.into();
        Transport {
            hw,
            endpoint: 0,
            position: 0,
            window: usize::MAX,
            max_packet_sizes,
            wait_limit,
        }
    }

    /// Immutable access to the hardware.
    pub fn hardware(&self) -> &H {
        &self.hw
    }

    /// Mutable access to the hardware.
    ///
    /// Bypasses the window and packet accounting.
    pub fn hardware_mut(&mut self) -> &mut H {
        &mut self.hw
    }

    /// Returns the selected endpoint number.
    pub fn endpoint(&self) -> u8 {
        self.endpoint
    }

    /// Bytes offered since the window last opened, including dropped bytes.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Returns the max packet size of `endpoint`, or 0 if it isn't initialized.
    pub fn max_packet_size(&self, endpoint: u8) -> u16 {
        self.max_packet_sizes
            .get(usize::from(endpoint))
            .copied()
            .unwrap_or(0)
    }

    /// Read the raw SETUP packet from endpoint 0.
    ///
    /// Selects endpoint 0. Ignores the window.
    pub fn read_setup(&mut self) -> SetupRequest {
        Pipe::select(self, 0);
        let mut raw = [0; SetupRequest::SIZE];
        for byte in raw.iter_mut() {
            *byte = self.hw.read_byte();
        }
        SetupRequest::from_bytes(raw)
    }

    /// Initialize a physical endpoint, and remember its max packet size.
    pub fn init_endpoint(&mut self, number: u8, meta: &EndpointMeta) -> Result<()> {
        let slot = self
            .max_packet_sizes
            .get_mut(usize::from(number))
            .ok_or(Error::ConfigurationFailure)?;
        let result = self.hw.init_endpoint(number, meta);
        // The controller may have changed the selection.
        self.hw.select_endpoint(self.endpoint);
        result?;
        *slot = meta.max_packet_size;
        Ok(())
    }

    /// Reset a physical endpoint's FIFO and data toggle.
    pub fn reset_endpoint(&mut self, number: u8) -> Result<()> {
        let result = self.hw.reset_endpoint(number);
        self.hw.select_endpoint(self.endpoint);
        result
    }

    /// Wait for the IN bank of the selected endpoint to accept data.
    pub fn wait_transmit_ready(&mut self) -> Result<()> {
        self.wait(|hw| hw.transmit_ready())
    }

    /// Wait for an OUT packet on the selected endpoint.
    pub fn wait_receive_ready(&mut self) -> Result<()> {
        self.wait(|hw| hw.receive_ready())
    }

    /// Spin until `ready`, the wait limit, or a preempting SETUP.
    fn wait(&self, ready: impl Fn(&H) -> bool) -> Result<()> {
        let mut polls: u32 = 0;
        loop {
            if ready(&self.hw) {
                return Ok(());
            }
            // A new SETUP on the control endpoint ends whatever transfer is
            // in flight. The next interrupt services it.
            if self.endpoint == 0 && self.hw.setup_received() {
                debug!("EP0 transfer preempted by SETUP");
                return Err(Error::Aborted);
            }
            if let Some(limit) = self.wait_limit {
                if polls >= limit {
                    warn!("EP{} wait timed out", self.endpoint);
                    return Err(Error::Timeout);
                }
            }
            polls = polls.saturating_add(1);
            core::hint::spin_loop();
        }
    }

    /// Place one byte in the stream.
    fn send_byte(&mut self, byte: u8) -> Result<()> {
        if self.position < self.window {
            let control = self.endpoint == 0;
            self.wait(|hw| hw.transmit_ready() || (control && hw.receive_ready()))?;

            if control && self.hw.receive_ready() {
                // The host moved on to the status stage; it wants no more data.
                debug!("EP0 IN data stage ended by host at {}", self.position);
                self.window = self.position;
            } else {
                self.hw.write_byte(byte);
                if (self.position + 1) % self.packet_len() == 0 {
                    self.hw.end_packet();
                }
            }
        }
        self.position += 1;
        Ok(())
    }

    /// Max packet size of the selected endpoint, never zero.
    fn packet_len(&self) -> usize {
        usize::from(self.max_packet_size(self.endpoint)).max(1)
    }

    /// Bytes that may still reach the wire before the window closes.
    fn remaining(&self) -> usize {
        self.window.saturating_sub(self.position)
    }
}

impl<H: Hardware> Pipe for Transport<H> {
    fn select(&mut self, endpoint: u8) {
        self.hw.select_endpoint(endpoint);
        self.endpoint = endpoint;
        self.position = 0;
        self.window = usize::MAX;
    }

    fn set_window(&mut self, limit: usize) {
        self.position = 0;
        self.window = limit;
    }

    fn send(&mut self, data: &[u8]) -> Result<usize> {
        for &byte in data {
            self.send_byte(byte)?;
        }
        Ok(data.len())
    }

    fn receive(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let mut count = 0;
        while count < buffer.len() && self.remaining() > 0 {
            self.wait_receive_ready()?;

            let available = self.hw.bytes_available();
            let take = available
                .min(buffer.len() - count)
                .min(self.remaining());
            for slot in &mut buffer[count..count + take] {
                *slot = self.hw.read_byte();
            }
            count += take;
            self.position += take;

            if take == available {
                self.hw.release_packet();
            }
            if available < self.packet_len() {
                break;
            }
        }
        trace!("EP{} received {}", self.endpoint, count);
        Ok(count)
    }

    fn flush(&mut self) {
        let sent = self.position.min(self.window);
        if sent % self.packet_len() != 0 {
            self.hw.end_packet();
        }
    }

    fn stall(&mut self) {
        debug!("EP{} STALL", self.endpoint);
        self.hw.stall();
    }
}
