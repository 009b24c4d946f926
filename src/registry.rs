//! Interface registry
//!
//! Interfaces are registered once, at boot, before the device starts. The
//! registry keeps them in registration order, which is also the order of
//! their interface numbers and of their physical endpoint numbers. Endpoint
//! 0 belongs to the control pipe, so class endpoints start at 1.

use crate::{
    error::{Error, Result},
    hardware::Hardware,
    interface::UsbInterface,
    transport::Transport,
    ENDPOINT_BUDGET,
};
use heapless::Vec;

/// Ordered, append-only collection of class interfaces.
///
/// Registration fails once the interfaces would need more than
/// [`ENDPOINT_BUDGET`] physical endpoints.
pub struct InterfaceRegistry<'a> {
    interfaces: Vec<&'a mut dyn UsbInterface, ENDPOINT_BUDGET>,
    endpoints_used: usize,
}

impl<'a> InterfaceRegistry<'a> {
    /// An empty registry.
    pub const fn new() -> Self {
        InterfaceRegistry {
            interfaces: Vec::new(),
            endpoints_used: 0,
        }
    }

    /// Append `interface`, returning its interface number.
    ///
    /// Fails with [`ResourceExhausted`](Error::ResourceExhausted), leaving
    /// the registry unchanged, if the interface's endpoints don't fit in
    /// the remaining budget.
    pub fn register(&mut self, interface: &'a mut dyn UsbInterface) -> Result<u8> {
        let needed = interface.endpoint_count();
        let total = self.endpoints_used.saturating_add(needed);
        if total > ENDPOINT_BUDGET || self.interfaces.is_full() {
            warn!(
                "Refusing interface with {} endpoints; {} of {} used",
                needed,
                self.endpoints_used,
                ENDPOINT_BUDGET
            );
            return Err(Error::ResourceExhausted);
        }

        let interface_number = self.interfaces.len() as u8;
        let first_endpoint = self.endpoints_used as u8 + 1;
        interface.on_register(interface_number, first_endpoint);
        self.interfaces
            .push(interface)
            .map_err(|_| Error::ResourceExhausted)?;
        self.endpoints_used = total;

        debug!(
            "INTERFACE {} registered, endpoints {}..{}",
            interface_number,
            first_endpoint,
            first_endpoint as usize + needed
        );
        Ok(interface_number)
    }

    /// Number of registered interfaces.
    pub fn len(&self) -> usize {
        self.interfaces.len()
    }

    /// Indicates that nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.interfaces.is_empty()
    }

    /// Physical endpoints claimed by registered interfaces.
    pub fn endpoints_used(&self) -> usize {
        self.endpoints_used
    }

    /// Physical endpoints still available for registration.
    pub fn endpoints_available(&self) -> usize {
        ENDPOINT_BUDGET - self.endpoints_used
    }

    /// Iterate over the interfaces, in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &(dyn UsbInterface + 'a)> + '_ {
        self.interfaces.iter().map(|interface| &**interface)
    }

    /// Returns the interface with the given interface number.
    pub fn get_mut(&mut self, interface_number: usize) -> Option<&mut (dyn UsbInterface + 'a)> {
        self.interfaces
            .get_mut(interface_number)
            .map(|interface| &mut **interface)
    }

    /// Find the interface that owns physical `endpoint`.
    ///
    /// Returns the interface number, and the endpoint's offset within that
    /// interface.
    pub fn owner(&self, endpoint: u8) -> Option<(usize, u8)> {
        let endpoint = usize::from(endpoint);
        let mut first = 1;
        for (index, interface) in self.iter().enumerate() {
            let count = interface.endpoint_count();
            if (first..first + count).contains(&endpoint) {
                return Some((index, (endpoint - first) as u8));
            }
            first += count;
        }
        None
    }

    /// Initialize and reset every interface's endpoints.
    ///
    /// Endpoints are numbered from 1, in registration order. The first
    /// failure stops the walk with [`ConfigurationFailure`](Error::ConfigurationFailure);
    /// endpoints initialized before it stay initialized.
    pub fn configure_endpoints<H: Hardware>(&self, transport: &mut Transport<H>) -> Result<()> {
        let mut number: u8 = 1;
        for interface in self.iter() {
            for meta in interface.endpoints() {
                transport
                    .init_endpoint(number, meta)
                    .and_then(|()| transport.reset_endpoint(number))
                    .map_err(|_err| {
                        warn!("EP{} configuration failed: {:?}", number, _err);
                        Error::ConfigurationFailure
                    })?;
                trace!("EP{} configured", number);
                number += 1;
            }
        }
        Ok(())
    }
}

impl Default for InterfaceRegistry<'_> {
    fn default() -> Self {
        Self::new()
    }
}
