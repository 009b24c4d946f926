//! Control SETUP packets

use usb_device::{
    control::{Recipient, RequestType},
    UsbDirection,
};

/// The 8-byte request that starts every control transfer.
///
/// Decoded once from endpoint 0, and not modified for the rest of the
/// transfer. Multi-byte fields are little endian on the wire.
///
/// ```
/// use composite_usbd::SetupRequest;
/// use usb_device::control::{Recipient, RequestType};
///
/// // GET_DESCRIPTOR(DEVICE), 18 bytes
/// let setup = SetupRequest::from_bytes([0x80, 0x06, 0x00, 0x01, 0x00, 0x00, 0x12, 0x00]);
/// assert_eq!(setup.kind(), RequestType::Standard);
/// assert_eq!(setup.recipient(), Recipient::Device);
/// assert_eq!(setup.descriptor_type(), 1);
/// assert_eq!(setup.length, 18);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct SetupRequest {
    /// `bmRequestType`: direction, type and recipient.
    pub request_type: u8,
    /// `bRequest`: the request code.
    pub request: u8,
    /// `wValue`
    pub value: u16,
    /// `wIndex`
    pub index: u16,
    /// `wLength`: the most bytes the data stage may move.
    pub length: u16,
}

/// `bmRequestType` direction bit
const DIRECTION: u8 = 1 << 7;
/// `bmRequestType` type field
const TYPE_MASK: u8 = 0b11 << 5;
/// `bmRequestType` recipient field
const RECIPIENT_MASK: u8 = 0b1_1111;

impl SetupRequest {
    /// Size of a SETUP packet.
    pub const SIZE: usize = 8;

    /// Decode a request from the raw SETUP bytes.
    pub const fn from_bytes(raw: [u8; Self::SIZE]) -> Self {
        SetupRequest {
            request_type: raw[0],
            request: raw[1],
            value: u16::from_le_bytes([raw[2], raw[3]]),
            index: u16::from_le_bytes([raw[4], raw[5]]),
            length: u16::from_le_bytes([raw[6], raw[7]]),
        }
    }

    /// Encode the request back into its wire format.
    pub const fn to_bytes(&self) -> [u8; Self::SIZE] {
        let value = self.value.to_le_bytes();
        let index = self.index.to_le_bytes();
        let length = self.length.to_le_bytes();
        [
            self.request_type,
            self.request,
            value[0],
            value[1],
            index[0],
            index[1],
            length[0],
            length[1],
        ]
    }

    /// Direction of the data stage.
    pub fn direction(&self) -> UsbDirection {
        if self.request_type & DIRECTION != 0 {
            UsbDirection::In
        } else {
            UsbDirection::Out
        }
    }

    /// Indicates a device-to-host transfer.
    pub fn is_in(&self) -> bool {
        self.direction() == UsbDirection::In
    }

    /// Standard, class, or vendor request.
    pub fn kind(&self) -> RequestType {
        match (self.request_type & TYPE_MASK) >> 5 {
            0 => RequestType::Standard,
            1 => RequestType::Class,
            2 => RequestType::Vendor,
            _ => RequestType::Reserved,
        }
    }

    /// Who the request is addressed to.
    pub fn recipient(&self) -> Recipient {
        match self.request_type & RECIPIENT_MASK {
            0 => Recipient::Device,
            1 => Recipient::Interface,
            2 => Recipient::Endpoint,
            3 => Recipient::Other,
            _ => Recipient::Reserved,
        }
    }

    /// Low byte of `wValue`.
    pub fn value_low(&self) -> u8 {
        self.value as u8
    }

    /// High byte of `wValue`.
    pub fn value_high(&self) -> u8 {
        (self.value >> 8) as u8
    }

    /// Descriptor type of a GET_DESCRIPTOR request.
    pub fn descriptor_type(&self) -> u8 {
        self.value_high()
    }

    /// Descriptor index of a GET_DESCRIPTOR request.
    pub fn descriptor_index(&self) -> u8 {
        self.value_low()
    }
}

/// `bmRequestType` values matched exactly by the standard request handler.
pub(crate) mod request_type {
    /// Device-to-host, standard, device recipient
    pub const DEVICE_TO_HOST_STANDARD_DEVICE: u8 = 0x80;
    /// Host-to-device, standard, device recipient
    pub const HOST_TO_DEVICE_STANDARD_DEVICE: u8 = 0x00;
}
