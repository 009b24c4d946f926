//! Stack configuration

/// Run-time configuration for a [`Device`](crate::Device).
///
/// Use [`Config::DEFAULT`] unless you need to change the power attributes
/// reported in the configuration descriptor, or the wait limit.
///
/// ```
/// use composite_usbd::Config;
///
/// const CONFIG: Config = Config {
///     self_powered: true,
///     max_power_ma: 100,
///     ..Config::DEFAULT
/// };
/// assert_eq!(CONFIG.max_power(), 50);
/// assert_eq!(CONFIG.attributes(), 0xC0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Max packet size of the control endpoint.
    ///
    /// Must be a power of two between 8 and 64. Data stages are flushed
    /// to the host in packets of this size.
    pub max_packet_size_0: u8,
    /// Number of polls to spend waiting on a hardware ready condition.
    ///
    /// `None` waits forever. A bounded wait surfaces [`Error::Timeout`](crate::Error::Timeout)
    /// and stalls the control transfer instead of hanging the interrupt.
    pub wait_limit: Option<u32>,
    /// Report the device as self powered.
    pub self_powered: bool,
    /// Report the device as remote-wakeup capable.
    pub remote_wakeup: bool,
    /// Maximum bus current draw, in milliamps.
    pub max_power_ma: u16,
}

impl Config {
    /// The default configuration: 64 byte control packets, bus powered,
    /// 500mA, and a bounded wait.
    pub const DEFAULT: Config = Config {
        max_packet_size_0: 64,
        wait_limit: Some(100_000),
        self_powered: false,
        remote_wakeup: false,
        max_power_ma: 500,
    };

    /// Returns the `bmAttributes` configuration descriptor field.
    pub const fn attributes(&self) -> u8 {
        // Bit 7 is reserved, and must be set.
        0x80 | ((self.self_powered as u8) << 6) | ((self.remote_wakeup as u8) << 5)
    }

    /// Returns the `bMaxPower` configuration descriptor field, in 2mA units.
    pub const fn max_power(&self) -> u8 {
        let units = self.max_power_ma / 2;
        if units > 0xFF {
            0xFF
        } else {
            units as u8
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[cfg(test)]
mod tests {
    use super::Config;

    #[test]
    fn default_attributes() {
        let config = Config::default();
        assert_eq!(config.attributes(), 0x80);
        assert_eq!(config.max_power(), 250);
        assert_eq!(config.max_packet_size_0, 64);
    }

    #[test]
    fn max_power_saturates() {
        let config = Config {
            max_power_ma: 1000,
            ..Config::DEFAULT
        };
        assert_eq!(config.max_power(), 0xFF);
    }

    #[test]
    fn remote_wakeup_attribute() {
        let config = Config {
            remote_wakeup: true,
            ..Config::DEFAULT
        };
        assert_eq!(config.attributes(), 0xA0);
    }
}
