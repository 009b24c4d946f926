//! Recording hardware for unit tests

use crate::{
    error::{Error, Result},
    hardware::{EndpointMeta, Hardware},
    interface::UsbInterface,
    setup::SetupRequest,
    transport::Pipe,
};
use heapless::Vec;
use usb_device::UsbDirection;

/// Hardware calls that matter for ordering checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Select(u8),
    EndPacket,
    ReleasePacket,
    ClearSetup,
    Stall(u8),
    SetAddress(u8),
    InitEndpoint(u8),
    ResetEndpoint(u8),
    Attach,
    EnableSetupInterrupt,
}

/// A controller that never blocks, and records what the stack did.
pub struct FakeHardware {
    pub transmit_ready: bool,
    pub receive_ready: bool,
    pub setup_pending: bool,
    pub bus_reset: bool,
    pub pending: u8,
    /// Endpoint number that refuses to initialize
    pub fail_init: Option<u8>,
    pub address: u8,
    /// Another SETUP arrives as soon as one is cleared
    pub preempt: bool,
    selected: u8,
    setup: [u8; SetupRequest::SIZE],
    setup_read: usize,
    out_packets: Vec<Vec<u8, 64>, 8>,
    wire: Vec<u8, 512>,
    events: Vec<Event, 256>,
    initialized: Vec<(u8, EndpointMeta), 8>,
}

impl FakeHardware {
    pub fn new() -> Self {
        FakeHardware {
            transmit_ready: true,
            receive_ready: false,
            setup_pending: false,
            bus_reset: false,
            pending: 0,
            fail_init: None,
            address: 0,
            preempt: false,
            selected: 0,
            setup: [0; SetupRequest::SIZE],
            setup_read: SetupRequest::SIZE,
            out_packets: Vec::new(),
            wire: Vec::new(),
            events: Vec::new(),
            initialized: Vec::new(),
        }
    }

    /// Present a SETUP packet on endpoint 0.
    pub fn load_setup(&mut self, setup: SetupRequest) {
        self.setup = setup.to_bytes();
        self.setup_read = 0;
        self.setup_pending = true;
    }

    /// Queue an OUT packet from the host.
    pub fn queue_out(&mut self, data: &[u8]) {
        self.out_packets
            .push(Vec::from_slice(data).unwrap())
            .unwrap();
    }

    /// Every byte written to an IN bank.
    pub fn wire(&self) -> &[u8] {
        &self.wire
    }

    pub fn clear_wire(&mut self) {
        self.wire.clear();
        self.events.clear();
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn count(&self, event: Event) -> usize {
        self.events.iter().filter(|e| **e == event).count()
    }

    /// Index of the first occurrence of `event`.
    pub fn first(&self, event: Event) -> Option<usize> {
        self.events.iter().position(|e| *e == event)
    }

    /// Endpoints initialized, in call order.
    pub fn initialized(&self) -> &[(u8, EndpointMeta)] {
        &self.initialized
    }

    fn record(&mut self, event: Event) {
        let _ = self.events.push(event);
    }
}

impl Hardware for FakeHardware {
    fn select_endpoint(&mut self, number: u8) {
        self.selected = number;
        self.record(Event::Select(number));
    }

    fn write_byte(&mut self, byte: u8) {
        let _ = self.wire.push(byte);
    }

    fn read_byte(&mut self) -> u8 {
        if self.selected == 0 && self.setup_read < SetupRequest::SIZE {
            let byte = self.setup[self.setup_read];
            self.setup_read += 1;
            return byte;
        }
        match self.out_packets.first_mut() {
            Some(packet) if !packet.is_empty() => packet.remove(0),
            _ => 0,
        }
    }

    fn bytes_available(&self) -> usize {
        self.out_packets.first().map(|p| p.len()).unwrap_or(0)
    }

    fn transmit_ready(&self) -> bool {
        self.transmit_ready
    }

    fn receive_ready(&self) -> bool {
        self.receive_ready || !self.out_packets.is_empty()
    }

    fn end_packet(&mut self) {
        self.record(Event::EndPacket);
    }

    fn release_packet(&mut self) {
        if !self.out_packets.is_empty() {
            self.out_packets.remove(0);
        }
        self.record(Event::ReleasePacket);
    }

    fn setup_received(&self) -> bool {
        self.setup_pending
    }

    fn clear_setup(&mut self) {
        self.setup_pending = self.preempt;
        self.receive_ready = false;
        self.record(Event::ClearSetup);
    }

    fn stall(&mut self) {
        let selected = self.selected;
        self.record(Event::Stall(selected));
    }

    fn set_address(&mut self, address: u8) {
        self.address = address;
        self.record(Event::SetAddress(address));
    }

    fn init_endpoint(&mut self, number: u8, meta: &EndpointMeta) -> Result<()> {
        if self.fail_init == Some(number) {
            return Err(Error::ConfigurationFailure);
        }
        let _ = self.initialized.push((number, *meta));
        self.record(Event::InitEndpoint(number));
        Ok(())
    }

    fn reset_endpoint(&mut self, number: u8) -> Result<()> {
        self.record(Event::ResetEndpoint(number));
        Ok(())
    }

    fn attach(&mut self) {
        self.record(Event::Attach);
    }

    fn take_bus_reset(&mut self) -> bool {
        core::mem::replace(&mut self.bus_reset, false)
    }

    fn enable_setup_interrupt(&mut self) {
        self.record(Event::EnableSetupInterrupt);
    }

    fn pending_endpoints(&self) -> u8 {
        self.pending
    }
}

/// A class interface that records what the device asked of it.
pub struct TestInterface {
    endpoints: &'static [EndpointMeta],
    descriptor: &'static [u8],
    /// Bytes sent in answer to every class request
    pub response: &'static [u8],
    /// Fail every class request
    pub reject: bool,
    pub class_requests: Vec<SetupRequest, 8>,
    pub endpoint_requests: Vec<(u8, u8), 8>,
    pub registered: Option<(u8, u8)>,
}

impl TestInterface {
    pub fn new(endpoints: &'static [EndpointMeta], descriptor: &'static [u8]) -> Self {
        TestInterface {
            endpoints,
            descriptor,
            response: &[],
            reject: false,
            class_requests: Vec::new(),
            endpoint_requests: Vec::new(),
            registered: None,
        }
    }
}

impl UsbInterface for TestInterface {
    fn class_request(&mut self, pipe: &mut dyn Pipe, setup: &SetupRequest) -> Result<()> {
        let _ = self.class_requests.push(*setup);
        if self.reject {
            return Err(Error::Unsupported);
        }
        pipe.send(self.response)?;
        Ok(())
    }

    fn endpoint_request(&mut self, _: &mut dyn Pipe, endpoint: u8, offset: u8) -> Result<()> {
        let _ = self.endpoint_requests.push((endpoint, offset));
        Ok(())
    }

    fn endpoints(&self) -> &[EndpointMeta] {
        self.endpoints
    }

    fn descriptor(&self) -> &[u8] {
        self.descriptor
    }

    fn on_register(&mut self, interface_number: u8, first_endpoint: u8) {
        self.registered = Some((interface_number, first_endpoint));
    }
}

/// Two bulk endpoints, OUT then IN.
pub static BULK_PAIR: [EndpointMeta; 2] = [
    EndpointMeta::bulk(UsbDirection::Out, 64),
    EndpointMeta::bulk(UsbDirection::In, 64),
];

/// One interrupt IN endpoint.
pub static INTERRUPT_IN: [EndpointMeta; 1] = [EndpointMeta::interrupt(UsbDirection::In, 8)];
