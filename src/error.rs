//! Stack errors

use usb_device::UsbError;

/// Errors produced by the control stack and its class interfaces.
///
/// Errors raised while servicing a control transfer never reach mainline.
/// The engine turns them into a stall on endpoint 0. Only registration and
/// start-up calls return them to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum Error {
    /// The request is malformed, unknown, or not supported.
    Unsupported,
    /// Registering the interface would exceed the endpoint budget.
    ResourceExhausted,
    /// A physical endpoint failed to initialize.
    ConfigurationFailure,
    /// The hardware never signaled ready within the configured wait limit.
    Timeout,
    /// A new SETUP arrived while the current transfer was in flight.
    Aborted,
    /// A bulk-only command block failed validation.
    InvalidCommand,
}

/// Result type used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;

impl From<UsbError> for Error {
    fn from(err: UsbError) -> Self {
        match err {
            UsbError::EndpointOverflow | UsbError::EndpointMemoryOverflow => {
                Error::ResourceExhausted
            }
            UsbError::InvalidEndpoint | UsbError::InvalidState => Error::ConfigurationFailure,
            UsbError::WouldBlock => Error::Timeout,
            _ => Error::Unsupported,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Error;
    use usb_device::UsbError;

    #[test]
    fn usb_errors_map_to_stack_errors() {
        assert_eq!(
            Error::from(UsbError::EndpointOverflow),
            Error::ResourceExhausted
        );
        assert_eq!(
            Error::from(UsbError::InvalidEndpoint),
            Error::ConfigurationFailure
        );
        assert_eq!(Error::from(UsbError::WouldBlock), Error::Timeout);
        assert_eq!(Error::from(UsbError::ParseError), Error::Unsupported);
    }
}
