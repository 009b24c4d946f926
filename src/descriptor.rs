//! Device, configuration, and string descriptors
//!
//! The device descriptor and string table are fixed when the stack is
//! built. The configuration descriptor is assembled on demand from the
//! registered interfaces: a 9 byte header, followed by each interface's
//! descriptor blob in registration order. Everything is streamed through
//! the control endpoint's clip window, so the host never receives more than
//! it asked for.

use crate::{
    config::Config,
    error::{Error, Result},
    registry::InterfaceRegistry,
    setup::SetupRequest,
    transport::Pipe,
};
use usb_device::{descriptor::descriptor_type, endpoint::EndpointType};

/// The standard device descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceDescriptor {
    /// `bcdUSB`
    pub usb_release: u16,
    /// `bDeviceClass`
    pub device_class: u8,
    /// `bDeviceSubClass`
    pub device_sub_class: u8,
    /// `bDeviceProtocol`
    pub device_protocol: u8,
    /// `bMaxPacketSize0`
    pub max_packet_size_0: u8,
    /// `idVendor`
    pub vendor_id: u16,
    /// `idProduct`
    pub product_id: u16,
    /// `bcdDevice`
    pub device_release: u16,
    /// `iManufacturer` string index
    pub manufacturer: u8,
    /// `iProduct` string index
    pub product: u8,
    /// `iSerialNumber` string index
    pub serial_number: u8,
}

impl DeviceDescriptor {
    /// Size of the descriptor on the wire.
    pub const SIZE: usize = 18;

    /// A USB 2.0 device, with a 64 byte control endpoint, that defers its
    /// class to its interfaces. Strings 1, 2 and 3 name the manufacturer,
    /// product and serial number.
    pub const fn new(vendor_id: u16, product_id: u16) -> Self {
        DeviceDescriptor {
            usb_release: 0x0200,
            device_class: 0,
            device_sub_class: 0,
            device_protocol: 0,
            max_packet_size_0: 64,
            vendor_id,
            product_id,
            device_release: 0x0100,
            manufacturer: 1,
            product: 2,
            serial_number: 3,
        }
    }

    /// Returns the descriptor in its wire format.
    pub const fn to_bytes(&self) -> [u8; Self::SIZE] {
        let usb = self.usb_release.to_le_bytes();
        let vid = self.vendor_id.to_le_bytes();
        let pid = self.product_id.to_le_bytes();
        let release = self.device_release.to_le_bytes();
        [
            Self::SIZE as u8,
            descriptor_type::DEVICE,
            usb[0],
            usb[1],
            self.device_class,
            self.device_sub_class,
            self.device_protocol,
            self.max_packet_size_0,
            vid[0],
            vid[1],
            pid[0],
            pid[1],
            release[0],
            release[1],
            self.manufacturer,
            self.product,
            self.serial_number,
            // Only one configuration
            1,
        ]
    }
}

/// One entry of the string descriptor table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringDescriptor<'a> {
    /// Index 0: the supported language ID, e.g. `0x0409` for US English.
    Language(u16),
    /// Any other index: text, sent as UTF-16LE.
    Text(&'a str),
}

/// Longest string that fits in the one byte `bLength`, in UTF-16 units.
const MAX_STRING_UNITS: usize = (u8::MAX as usize - 2) / 2;

impl StringDescriptor<'_> {
    /// Size of the descriptor on the wire.
    pub fn size(&self) -> usize {
        match self {
            StringDescriptor::Language(_) => 4,
            StringDescriptor::Text(text) => {
                2 + 2 * text.encode_utf16().take(MAX_STRING_UNITS).count()
            }
        }
    }

    fn send(&self, pipe: &mut dyn Pipe) -> Result<()> {
        pipe.send(&[self.size() as u8, descriptor_type::STRING])?;
        match self {
            StringDescriptor::Language(lang_id) => {
                pipe.send(&lang_id.to_le_bytes())?;
            }
            StringDescriptor::Text(text) => {
                for unit in text.encode_utf16().take(MAX_STRING_UNITS) {
                    pipe.send(&unit.to_le_bytes())?;
                }
            }
        }
        Ok(())
    }
}

/// The 9 byte configuration descriptor header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigurationHeader {
    /// `wTotalLength`: header plus all interface descriptors.
    pub total_length: u16,
    /// `bNumInterfaces`
    pub num_interfaces: u8,
    /// `bmAttributes`
    pub attributes: u8,
    /// `bMaxPower`
    pub max_power: u8,
}

impl ConfigurationHeader {
    /// Size of the header on the wire.
    pub const SIZE: usize = 9;
    /// The one and only configuration value.
    pub const CONFIGURATION_VALUE: u8 = 1;

    /// Compute the header for the registered interfaces.
    pub fn new(interfaces: &InterfaceRegistry<'_>, config: &Config) -> Self {
        let total_length = interfaces
            .iter()
            .fold(Self::SIZE, |total, interface| total + interface.descriptor_size());
        ConfigurationHeader {
            total_length: total_length.min(u16::MAX.into()) as u16,
            num_interfaces: interfaces.len() as u8,
            attributes: config.attributes(),
            max_power: config.max_power(),
        }
    }

    /// Returns the header in its wire format.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let total = self.total_length.to_le_bytes();
        [
            Self::SIZE as u8,
            descriptor_type::CONFIGURATION,
            total[0],
            total[1],
            self.num_interfaces,
            Self::CONFIGURATION_VALUE,
            0,
            self.attributes,
            self.max_power,
        ]
    }
}

/// The descriptor registry.
///
/// ```
/// use composite_usbd::{DeviceDescriptor, Descriptors, StringDescriptor};
///
/// static STRINGS: [StringDescriptor<'static>; 4] = [
///     StringDescriptor::Language(0x0409),
///     StringDescriptor::Text("composite-usbd"),
///     StringDescriptor::Text("Flash drive"),
///     StringDescriptor::Text("0001"),
/// ];
/// let descriptors = Descriptors::new(DeviceDescriptor::new(0x5824, 0x27dd), &STRINGS);
/// assert_eq!(descriptors.string_count(), 4);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Descriptors<'a> {
    device: DeviceDescriptor,
    strings: &'a [StringDescriptor<'a>],
}

impl<'a> Descriptors<'a> {
    /// Bundle the device descriptor and string table.
    pub const fn new(device: DeviceDescriptor, strings: &'a [StringDescriptor<'a>]) -> Self {
        Descriptors { device, strings }
    }

    /// Returns the device descriptor.
    pub fn device(&self) -> &DeviceDescriptor {
        &self.device
    }

    /// Number of entries in the string table.
    pub fn string_count(&self) -> usize {
        self.strings.len()
    }

    /// Answer a GET_DESCRIPTOR request.
    ///
    /// The data stage is clipped to the request's `wLength`. Unknown
    /// descriptor types, and string indexes past the end of the table, are
    /// [`Unsupported`](Error::Unsupported); nothing is sent for them.
    pub fn send(
        &self,
        setup: &SetupRequest,
        interfaces: &InterfaceRegistry<'_>,
        config: &Config,
        pipe: &mut dyn Pipe,
    ) -> Result<()> {
        pipe.set_window(setup.length.into());
        match setup.descriptor_type() {
            descriptor_type::DEVICE => {
                pipe.send(&self.device.to_bytes())?;
            }
            descriptor_type::CONFIGURATION => {
                let header = ConfigurationHeader::new(interfaces, config);
                pipe.send(&header.to_bytes())?;
                for interface in interfaces.iter() {
                    pipe.send(interface.descriptor())?;
                }
            }
            descriptor_type::STRING => {
                let index = usize::from(setup.descriptor_index());
                let string = self.strings.get(index).ok_or_else(|| {
                    debug!("STRING {} out of range", index);
                    Error::Unsupported
                })?;
                string.send(pipe)?;
            }
            _other => {
                debug!("DESCRIPTOR {} unsupported", _other);
                return Err(Error::Unsupported);
            }
        }
        Ok(())
    }
}

/// Returns a standard interface descriptor.
pub const fn interface_descriptor(
    number: u8,
    num_endpoints: u8,
    class: u8,
    sub_class: u8,
    protocol: u8,
    string: u8,
) -> [u8; 9] {
    [
        9,
        descriptor_type::INTERFACE,
        number,
        // Alternate setting
        0,
        num_endpoints,
        class,
        sub_class,
        protocol,
        string,
    ]
}

/// Returns a standard endpoint descriptor.
pub fn endpoint_descriptor(
    address: u8,
    ep_type: EndpointType,
    max_packet_size: u16,
    interval: u8,
) -> [u8; 7] {
    let attributes = match ep_type {
        EndpointType::Control => 0b00,
        EndpointType::Isochronous { .. } => 0b01,
        EndpointType::Bulk => 0b10,
        EndpointType::Interrupt => 0b11,
    };
    let size = max_packet_size.to_le_bytes();
    [
        7,
        descriptor_type::ENDPOINT,
        address,
        attributes,
        size[0],
        size[1],
        interval,
    ]
}

#[cfg(test)]
mod tests {
    use super::{endpoint_descriptor, DeviceDescriptor, StringDescriptor};
    use crate::{testing::FakeHardware, transport::Pipe, Transport};
    use usb_device::endpoint::EndpointType;

    #[test]
    fn device_descriptor_layout() {
        let bytes = DeviceDescriptor::new(0x1234, 0xABCD).to_bytes();
        assert_eq!(bytes.len(), 18);
        assert_eq!(&bytes[..4], &[18, 1, 0x00, 0x02]);
        assert_eq!(bytes[7], 64);
        assert_eq!(&bytes[8..12], &[0x34, 0x12, 0xCD, 0xAB]);
        assert_eq!(bytes[17], 1);
    }

    #[test]
    fn language_string() {
        let mut transport = Transport::new(FakeHardware::new(), 64, None);
        transport.select(0);
        StringDescriptor::Language(0x0409).send(&mut transport).unwrap();
        assert_eq!(transport.hardware().wire(), &[4, 3, 0x09, 0x04]);
    }

    #[test]
    fn text_string_is_utf16() {
        let mut transport = Transport::new(FakeHardware::new(), 64, None);
        transport.select(0);
        let string = StringDescriptor::Text("Hi");
        assert_eq!(string.size(), 6);
        string.send(&mut transport).unwrap();
        assert_eq!(transport.hardware().wire(), &[6, 3, b'H', 0, b'i', 0]);
    }

    #[test]
    fn long_strings_are_truncated() {
        let text = "abcdefghijklmnopqrstuvwxyz0123456789abcdefghijklmnopqrstuvwxyz0123456789abcdefghijklmnopqrstuvwxyz0123456789abcdefghijklmnopqrstuvwxyz";
        assert!(text.len() > 126);
        assert_eq!(StringDescriptor::Text(text).size(), 254);
    }

    #[test]
    fn bulk_endpoint_descriptor() {
        assert_eq!(
            endpoint_descriptor(0x82, EndpointType::Bulk, 64, 0),
            [7, 5, 0x82, 0x02, 64, 0, 0]
        );
    }
}
