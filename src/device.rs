//! The control transfer engine
//!
//! [`Device`] owns everything the stack needs: the transport, the registered
//! interfaces, the descriptors, and the protocol state. Construct it at
//! boot, register interfaces, then [`start`](Device::start) it and call
//! [`on_interrupt`](Device::on_interrupt) from the USB interrupt handler.
//!
//! Control transfers run to completion. A SETUP is read, decoded and
//! answered before the handler returns, and the handler is the only writer
//! of the protocol state. A request handler that fails stalls endpoint 0,
//! unless the failure was a newer SETUP preempting the transfer. That SETUP
//! is left pending, and serviced on the next interrupt.

use crate::{
    config::Config,
    descriptor::Descriptors,
    error::{Error, Result},
    hardware::{EndpointMeta, Hardware},
    interface::UsbInterface,
    registry::InterfaceRegistry,
    setup::{request_type, SetupRequest},
    transport::{Pipe, Transport},
    MAX_ENDPOINT_NUMBERS, PHYSICAL_ENDPOINTS,
};
use usb_device::{
    control::{Recipient, Request, RequestType},
    UsbDirection,
};

bitflags::bitflags! {
    /// Device features reported by GET_STATUS.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DeviceStatus: u16 {
        /// The host enabled remote wakeup.
        const REMOTE_WAKEUP = 1 << 0;
    }
}

/// Process-wide protocol state.
///
/// Written only by the control engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProtocolState {
    /// The active configuration value. Zero when unconfigured.
    pub configuration: u8,
    /// Features set by the host.
    pub status: DeviceStatus,
    /// The latched bus address.
    pub address: u8,
}

/// Where the engine is within a control transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum Stage {
    /// Waiting for a SETUP.
    Idle,
    /// A SETUP was read, and not yet dispatched.
    SetupReceived,
    /// Moving data in `direction`.
    DataStage { direction: UsbDirection },
    /// The request was handled; acknowledging it.
    StatusStage,
}

/// A composite USB device.
pub struct Device<'a, H> {
    transport: Transport<H>,
    interfaces: InterfaceRegistry<'a>,
    descriptors: Descriptors<'a>,
    config: Config,
    state: ProtocolState,
    stage: Stage,
}

impl<'a, H: Hardware> Device<'a, H> {
    /// Create a device that uses the default [`Config`].
    pub fn new(hw: H, descriptors: Descriptors<'a>) -> Self {
        Self::with_config(hw, descriptors, Config::DEFAULT)
    }

    /// Create a device with a specific configuration.
    pub fn with_config(hw: H, descriptors: Descriptors<'a>, config: Config) -> Self {
        Device {
            transport: Transport::new(hw, config.max_packet_size_0, config.wait_limit),
            interfaces: InterfaceRegistry::new(),
            descriptors,
            config,
            state: ProtocolState::default(),
            stage: Stage::Idle,
        }
    }

    /// Register a class interface, returning its interface number.
    ///
    /// Register every interface before calling [`start`](Device::start).
    pub fn register(&mut self, interface: &'a mut dyn UsbInterface) -> Result<u8> {
        self.interfaces.register(interface)
    }

    /// Attach to the bus.
    ///
    /// Enumeration begins once the host resets the bus.
    pub fn start(&mut self) -> Result<()> {
        if PHYSICAL_ENDPOINTS == 0 {
            warn!("No endpoints; can't start");
            return Err(Error::Unsupported);
        }
        self.transport.hardware_mut().attach();
        debug!("ATTACHED with {} interfaces", self.interfaces.len());
        Ok(())
    }

    /// Service everything the controller has pending.
    ///
    /// Call this from the USB interrupt handler.
    pub fn on_interrupt(&mut self) {
        if self.transport.hardware_mut().take_bus_reset() {
            self.on_bus_reset();
        }

        self.on_setup();

        let pending = self.transport.hardware().pending_endpoints();
        for endpoint in 1..MAX_ENDPOINT_NUMBERS as u8 {
            if pending & (1 << endpoint) != 0 {
                if let Err(_err) = self.on_endpoint(endpoint) {
                    warn!("EP{} request failed: {:?}", endpoint, _err);
                }
            }
        }
    }

    /// Handle the end of a bus reset.
    ///
    /// Prepares endpoint 0 for the next SETUP, and forgets the configuration
    /// and any features set by the host.
    pub fn on_bus_reset(&mut self) {
        debug!("RESET");
        let meta = EndpointMeta::control(self.config.max_packet_size_0.into());
        if let Err(_err) = self.transport.init_endpoint(0, &meta) {
            warn!("EP0 initialization failed: {:?}", _err);
        }
        self.reset_state();
        self.transport.select(0);
        self.transport.hardware_mut().enable_setup_interrupt();
    }

    /// Run one control transfer, if a SETUP is pending.
    pub fn on_setup(&mut self) {
        self.transport.select(0);
        if !self.transport.hardware().setup_received() {
            return;
        }

        let setup = self.transport.read_setup();
        self.transport.hardware_mut().clear_setup();
        self.stage = Stage::SetupReceived;
        trace!("SETUP {:?}", setup);

        let result = self
            .begin_transfer(&setup)
            .and_then(|()| self.dispatch(&setup));

        if self.transport.endpoint() != 0 {
            self.transport.select(0);
        }
        match result {
            Ok(()) => {
                self.stage = Stage::StatusStage;
                self.transport.hardware_mut().end_packet();
            }
            Err(Error::Aborted) => {
                debug!("SETUP {:02X} abandoned", setup.request);
            }
            Err(_err) => {
                debug!("STALL request {:02X}: {:?}", setup.request, _err);
                self.transport.stall();
            }
        }
        self.stage = Stage::Idle;
    }

    /// Let the owner of class `endpoint` service its data event.
    pub fn on_endpoint(&mut self, endpoint: u8) -> Result<()> {
        let (index, offset) = self.interfaces.owner(endpoint).ok_or(Error::Unsupported)?;
        let interface = self.interfaces.get_mut(index).ok_or(Error::Unsupported)?;
        self.transport.select(endpoint);
        interface.endpoint_request(&mut self.transport, endpoint, offset)
    }

    /// Indicates that the host selected a configuration, and every
    /// interface's endpoints are live.
    pub fn is_configured(&self) -> bool {
        self.state.configuration != 0
    }

    /// Returns the protocol state.
    pub fn state(&self) -> &ProtocolState {
        &self.state
    }

    /// Returns the control transfer stage.
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Forget the configuration, address and features.
    pub fn reset_state(&mut self) {
        self.state = ProtocolState::default();
        self.stage = Stage::Idle;
    }

    /// Returns the registered interfaces.
    pub fn interfaces(&self) -> &InterfaceRegistry<'a> {
        &self.interfaces
    }

    /// Returns the descriptors.
    pub fn descriptors(&self) -> &Descriptors<'a> {
        &self.descriptors
    }

    /// Returns the configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Immutable access to the hardware.
    pub fn hardware(&self) -> &H {
        self.transport.hardware()
    }

    /// Mutable access to the hardware.
    pub fn hardware_mut(&mut self) -> &mut H {
        self.transport.hardware_mut()
    }

    /// Prepare the data stage.
    ///
    /// Device-to-host requests wait for the IN bank. Host-to-device
    /// requests are acknowledged right away.
    fn begin_transfer(&mut self, setup: &SetupRequest) -> Result<()> {
        if setup.is_in() {
            self.transport.wait_transmit_ready()?;
        } else {
            self.transport.hardware_mut().end_packet();
        }
        self.transport.set_window(setup.length.into());
        if setup.length > 0 {
            self.stage = Stage::DataStage {
                direction: setup.direction(),
            };
        }
        Ok(())
    }

    fn dispatch(&mut self, setup: &SetupRequest) -> Result<()> {
        match setup.kind() {
            RequestType::Standard => self.standard_request(setup),
            _ => self.class_request(setup),
        }
    }

    fn standard_request(&mut self, setup: &SetupRequest) -> Result<()> {
        match setup.request {
            Request::GET_STATUS => {
                let device = setup.request_type == request_type::DEVICE_TO_HOST_STANDARD_DEVICE;
                let status = if device { self.state.status.bits() } else { 0 };
                self.transport.send(&status.to_le_bytes())?;
            }
            Request::CLEAR_FEATURE => {
                if self.is_remote_wakeup(setup) {
                    self.state.status.remove(DeviceStatus::REMOTE_WAKEUP);
                }
            }
            Request::SET_FEATURE => {
                if self.is_remote_wakeup(setup) {
                    self.state.status.insert(DeviceStatus::REMOTE_WAKEUP);
                }
            }
            Request::SET_ADDRESS => {
                // The status stage completes at the old address.
                self.transport.wait_transmit_ready()?;
                let address = setup.value_low();
                self.transport.hardware_mut().set_address(address);
                self.state.address = address;
                debug!("ADDRESS {}", address);
            }
            Request::GET_DESCRIPTOR => {
                self.descriptors.send(
                    setup,
                    &self.interfaces,
                    &self.config,
                    &mut self.transport,
                )?;
            }
            Request::SET_DESCRIPTOR => return Err(Error::Unsupported),
            Request::GET_CONFIGURATION => {
                self.transport.send(&[1])?;
            }
            Request::SET_CONFIGURATION => {
                if setup.recipient() != Recipient::Device {
                    return Err(Error::Unsupported);
                }
                self.interfaces.configure_endpoints(&mut self.transport)?;
                self.state.configuration = setup.value_low();
                debug!("CONFIGURED {}", self.state.configuration);
            }
            _ => return Err(Error::Unsupported),
        }
        Ok(())
    }

    fn is_remote_wakeup(&self, setup: &SetupRequest) -> bool {
        setup.request_type == request_type::HOST_TO_DEVICE_STANDARD_DEVICE
            && setup.value == Request::FEATURE_DEVICE_REMOTE_WAKEUP
    }

    /// Route a class or vendor request to the interface it addresses.
    fn class_request(&mut self, setup: &SetupRequest) -> Result<()> {
        let index = match setup.recipient() {
            Recipient::Interface => usize::from(setup.index as u8),
            Recipient::Endpoint => {
                let endpoint = (setup.index & 0x0F) as u8;
                let (index, _) = self.interfaces.owner(endpoint).ok_or(Error::Unsupported)?;
                index
            }
            _ => return Err(Error::Unsupported),
        };
        let interface = self.interfaces.get_mut(index).ok_or(Error::Unsupported)?;
        interface.class_request(&mut self.transport, setup)
    }
}
