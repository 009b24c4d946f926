//! USB mass storage, bulk-only transport
//!
//! [`MassStorage`] frames SCSI commands on a pair of bulk endpoints. The
//! host sends a 31 byte command block wrapper (CBW) on the OUT endpoint.
//! The interface validates it, hands the command to a [`CommandHandler`],
//! and answers with a 13 byte command status wrapper (CSW) on the IN
//! endpoint. Interpreting the SCSI command is up to the handler.

use crate::{
    descriptor::{endpoint_descriptor, interface_descriptor},
    error::{Error, Result},
    hardware::EndpointMeta,
    interface::UsbInterface,
    setup::SetupRequest,
    transport::Pipe,
};
use usb_device::{endpoint::EndpointType, UsbDirection};

/// `'USBC'`
pub const CBW_SIGNATURE: u32 = 0x4342_5355;
/// `'USBS'`
pub const CSW_SIGNATURE: u32 = 0x5342_5355;

/// Mass storage interface class
const CLASS_MSC: u8 = 0x08;
/// SCSI transparent command set
const SUBCLASS_SCSI: u8 = 0x06;
/// Bulk-only transport
const PROTOCOL_BOT: u8 = 0x50;

/// Class request: reset the interface, and get ready for the next CBW.
const REQUEST_RESET: u8 = 0xFF;
/// Class request: how many logical units, less one.
const REQUEST_GET_MAX_LUN: u8 = 0xFE;

const MAX_PACKET_SIZE: u16 = 64;
const OUT_OFFSET: u8 = 0;
const IN_OFFSET: u8 = 1;

static ENDPOINTS: [EndpointMeta; 2] = [
    EndpointMeta::bulk(UsbDirection::Out, MAX_PACKET_SIZE),
    EndpointMeta::bulk(UsbDirection::In, MAX_PACKET_SIZE),
];

/// A validated command block wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandBlockWrapper {
    /// Echoed back in the status wrapper.
    pub tag: u32,
    /// Bytes the host expects to move in the data stage.
    pub data_transfer_length: u32,
    /// Bit 7 set for device-to-host data.
    pub flags: u8,
    /// Target logical unit.
    pub lun: u8,
    command_length: u8,
    command: [u8; 16],
}

impl CommandBlockWrapper {
    /// Size of a CBW on the wire.
    pub const SIZE: usize = 31;

    /// Validate and decode a CBW.
    ///
    /// Fails with [`InvalidCommand`](Error::InvalidCommand) if the block is
    /// the wrong size, has the wrong signature, or has an impossible command
    /// length.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let raw: &[u8; Self::SIZE] = raw.try_into().map_err(|_| {
            debug!("CBW is {} bytes", raw.len());
            Error::InvalidCommand
        })?;
        let word = |at: usize| {
            u32::from_le_bytes([raw[at], raw[at + 1], raw[at + 2], raw[at + 3]])
        };

        let signature = word(0);
        if signature != CBW_SIGNATURE {
            debug!("CBW signature {:08X}", signature);
            return Err(Error::InvalidCommand);
        }
        let command_length = raw[14] & 0x1F;
        if command_length == 0 || command_length > 16 {
            debug!("CBW command length {}", command_length);
            return Err(Error::InvalidCommand);
        }

        let mut command = [0; 16];
        command.copy_from_slice(&raw[15..]);
        Ok(CommandBlockWrapper {
            tag: word(4),
            data_transfer_length: word(8),
            flags: raw[12],
            lun: raw[13] & 0x0F,
            command_length,
            command,
        })
    }

    /// Direction of the data stage.
    pub fn direction(&self) -> UsbDirection {
        if self.flags & 0x80 != 0 {
            UsbDirection::In
        } else {
            UsbDirection::Out
        }
    }

    /// The SCSI command descriptor block.
    pub fn command(&self) -> &[u8] {
        &self.command[..usize::from(self.command_length)]
    }
}

/// Outcome of a command, reported in the CSW.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
#[repr(u8)]
pub enum CommandStatus {
    Passed = 0,
    Failed = 1,
    PhaseError = 2,
}

/// A command status wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandStatusWrapper {
    /// The tag of the CBW that this answers.
    pub tag: u32,
    /// Expected bytes that weren't moved.
    pub residue: u32,
    pub status: CommandStatus,
}

impl CommandStatusWrapper {
    /// Size of a CSW on the wire.
    pub const SIZE: usize = 13;

    /// The status of `command`.
    pub fn new(command: &CommandBlockWrapper, result: CommandResult) -> Self {
        CommandStatusWrapper {
            tag: command.tag,
            residue: result.residue,
            status: result.status,
        }
    }

    /// Returns the CSW in its wire format.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut raw = [0; Self::SIZE];
        raw[0..4].copy_from_slice(&CSW_SIGNATURE.to_le_bytes());
        raw[4..8].copy_from_slice(&self.tag.to_le_bytes());
        raw[8..12].copy_from_slice(&self.residue.to_le_bytes());
        raw[12] = self.status as u8;
        raw
    }
}

/// What a [`CommandHandler`] reports for one command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandResult {
    pub status: CommandStatus,
    pub residue: u32,
}

impl CommandResult {
    /// The command succeeded, leaving `residue` bytes unmoved.
    pub const fn passed(residue: u32) -> Self {
        CommandResult {
            status: CommandStatus::Passed,
            residue,
        }
    }

    /// The command failed, leaving `residue` bytes unmoved.
    pub const fn failed(residue: u32) -> Self {
        CommandResult {
            status: CommandStatus::Failed,
            residue,
        }
    }
}

/// Interprets SCSI commands for a [`MassStorage`] interface.
pub trait CommandHandler {
    /// Execute `command`.
    ///
    /// `data` is selected on the bulk endpoint that matches the command's
    /// data direction. Send or receive at most `data_transfer_length` bytes.
    /// Returning an error skips the status wrapper; the host recovers with
    /// a reset.
    fn execute(
        &mut self,
        command: &CommandBlockWrapper,
        data: &mut dyn Pipe,
    ) -> Result<CommandResult>;

    /// Highest logical unit number.
    fn max_lun(&self) -> u8 {
        0
    }

    /// The host reset the interface.
    fn reset(&mut self) {}
}

/// A bulk-only mass storage interface.
pub struct MassStorage<C> {
    handler: C,
    descriptor: [u8; 23],
    out_endpoint: u8,
}

impl<C: CommandHandler + Send> MassStorage<C> {
    /// Create an interface that passes commands to `handler`.
    pub fn new(handler: C) -> Self {
        let mut storage = MassStorage {
            handler,
            descriptor: [0; 23],
            out_endpoint: 1,
        };
        storage.on_register(0, 1);
        storage
    }

    /// Returns the command handler.
    pub fn handler(&self) -> &C {
        &self.handler
    }

    /// Mutable access to the command handler.
    pub fn handler_mut(&mut self) -> &mut C {
        &mut self.handler
    }

    fn in_endpoint(&self) -> u8 {
        self.out_endpoint + IN_OFFSET
    }

    fn stall_endpoints(&self, pipe: &mut dyn Pipe) {
        pipe.select(self.out_endpoint);
        pipe.stall();
        pipe.select(self.in_endpoint());
        pipe.stall();
    }

    /// Read a CBW from the OUT endpoint, run it, and report its status.
    fn transaction(&mut self, pipe: &mut dyn Pipe) -> Result<()> {
        let mut raw = [0; CommandBlockWrapper::SIZE + 1];
        pipe.select(self.out_endpoint);
        let received = pipe.receive(&mut raw)?;

        let command = CommandBlockWrapper::parse(&raw[..received]).map_err(|err| {
            warn!("Rejected CBW; stalling bulk endpoints");
            self.stall_endpoints(pipe);
            err
        })?;
        trace!("CBW {:08X}", command.tag);

        let data_endpoint = match command.direction() {
            UsbDirection::In => self.in_endpoint(),
            UsbDirection::Out => self.out_endpoint,
        };
        pipe.select(data_endpoint);
        pipe.set_window(command.data_transfer_length as usize);
        let result = self.handler.execute(&command, pipe)?;
        if command.direction() == UsbDirection::In {
            pipe.flush();
        }

        let status = CommandStatusWrapper::new(&command, result);
        pipe.select(self.in_endpoint());
        pipe.send(&status.to_bytes())?;
        pipe.flush();
        Ok(())
    }
}

impl<C: CommandHandler + Send> UsbInterface for MassStorage<C> {
    fn class_request(&mut self, pipe: &mut dyn Pipe, setup: &SetupRequest) -> Result<()> {
        match setup.request {
            REQUEST_RESET if !setup.is_in() => {
                debug!("MSC RESET");
                self.handler.reset();
                Ok(())
            }
            REQUEST_GET_MAX_LUN if setup.is_in() => {
                pipe.send(&[self.handler.max_lun()])?;
                Ok(())
            }
            _ => Err(Error::Unsupported),
        }
    }

    fn endpoint_request(&mut self, pipe: &mut dyn Pipe, _endpoint: u8, offset: u8) -> Result<()> {
        match offset {
            OUT_OFFSET => self.transaction(pipe),
            // IN completions need no work.
            _ => Ok(()),
        }
    }

    fn endpoints(&self) -> &[EndpointMeta] {
        &ENDPOINTS
    }

    fn descriptor(&self) -> &[u8] {
        &self.descriptor
    }

    fn on_register(&mut self, interface_number: u8, first_endpoint: u8) {
        self.out_endpoint = first_endpoint;
        let interface = interface_descriptor(
            interface_number,
            ENDPOINTS.len() as u8,
            CLASS_MSC,
            SUBCLASS_SCSI,
            PROTOCOL_BOT,
            0,
        );
        let bulk_out = endpoint_descriptor(first_endpoint, EndpointType::Bulk, MAX_PACKET_SIZE, 0);
        let bulk_in = endpoint_descriptor(
            0x80 | self.in_endpoint(),
            EndpointType::Bulk,
            MAX_PACKET_SIZE,
            0,
        );
        self.descriptor[..9].copy_from_slice(&interface);
        self.descriptor[9..16].copy_from_slice(&bulk_out);
        self.descriptor[16..].copy_from_slice(&bulk_in);
    }
}

#[cfg(test)]
mod tests {
    use super::{
        CommandBlockWrapper, CommandHandler, CommandResult, CommandStatus, CommandStatusWrapper,
        MassStorage, CBW_SIGNATURE,
    };
    use crate::{
        config::Config,
        descriptor::{DeviceDescriptor, Descriptors},
        error::{Error, Result},
        interface::UsbInterface,
        setup::SetupRequest,
        testing::{Event, FakeHardware, TestInterface, INTERRUPT_IN},
        transport::Pipe,
        Device,
    };
    use usb_device::UsbDirection;

    /// Answers every command with four bytes of data.
    #[derive(Default)]
    struct Inquiry {
        tags: heapless::Vec<u32, 4>,
        resets: usize,
    }

    impl CommandHandler for Inquiry {
        fn execute(
            &mut self,
            command: &CommandBlockWrapper,
            data: &mut dyn Pipe,
        ) -> Result<CommandResult> {
            let _ = self.tags.push(command.tag);
            let sent = data.send(&[0xAA; 4])? as u32;
            Ok(CommandResult::passed(
                command.data_transfer_length.saturating_sub(sent),
            ))
        }

        fn reset(&mut self) {
            self.resets += 1;
        }
    }

    fn cbw(signature: u32, tag: u32) -> [u8; 31] {
        let mut raw = [0; 31];
        raw[0..4].copy_from_slice(&signature.to_le_bytes());
        raw[4..8].copy_from_slice(&tag.to_le_bytes());
        // INQUIRY, 36 bytes in
        raw[8..12].copy_from_slice(&36u32.to_le_bytes());
        raw[12] = 0x80;
        raw[14] = 6;
        raw[15] = 0x12;
        raw[19] = 36;
        raw
    }

    fn device<'a>() -> Device<'a, FakeHardware> {
        static STRINGS: [crate::StringDescriptor<'static>; 1] =
            [crate::StringDescriptor::Language(0x0409)];
        let config = Config {
            wait_limit: Some(16),
            ..Config::DEFAULT
        };
        let descriptors = Descriptors::new(DeviceDescriptor::new(0x1209, 0x0002), &STRINGS);
        Device::with_config(FakeHardware::new(), descriptors, config)
    }

    fn configure(device: &mut Device<'_, FakeHardware>) {
        let set_configuration = [0x00, 0x09, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00];
        device
            .hardware_mut()
            .load_setup(SetupRequest::from_bytes(set_configuration));
        device.on_setup();
        assert!(device.is_configured());
        device.hardware_mut().clear_wire();
    }

    #[test]
    fn parse_command() {
        let command = CommandBlockWrapper::parse(&cbw(CBW_SIGNATURE, 0xDEAD_BEEF)).unwrap();
        assert_eq!(command.tag, 0xDEAD_BEEF);
        assert_eq!(command.data_transfer_length, 36);
        assert_eq!(command.direction(), UsbDirection::In);
        assert_eq!(command.lun, 0);
        assert_eq!(command.command(), &[0x12, 0, 0, 0, 36, 0]);
    }

    #[test]
    fn reject_bad_blocks() {
        assert_eq!(
            CommandBlockWrapper::parse(&cbw(0x5342_5355, 1)),
            Err(Error::InvalidCommand)
        );
        assert_eq!(
            CommandBlockWrapper::parse(&cbw(CBW_SIGNATURE, 1)[..30]),
            Err(Error::InvalidCommand)
        );
        let mut raw = cbw(CBW_SIGNATURE, 1);
        raw[14] = 0;
        assert_eq!(
            CommandBlockWrapper::parse(&raw),
            Err(Error::InvalidCommand)
        );
    }

    #[test]
    fn status_layout() {
        let command = CommandBlockWrapper::parse(&cbw(CBW_SIGNATURE, 0x0102_0304)).unwrap();
        let status = CommandStatusWrapper::new(&command, CommandResult::failed(36));
        assert_eq!(status.status, CommandStatus::Failed);
        assert_eq!(
            status.to_bytes(),
            [b'U', b'S', b'B', b'S', 4, 3, 2, 1, 36, 0, 0, 0, 1]
        );
    }

    #[test]
    fn descriptor_follows_registration() {
        let mut other = TestInterface::new(&INTERRUPT_IN, &[]);
        let mut storage = MassStorage::new(Inquiry::default());
        assert_eq!(storage.descriptor()[2], 0);
        assert_eq!(storage.descriptor()[11], 0x01);
        assert_eq!(storage.descriptor()[18], 0x82);
        {
            let mut device = device();
            device.register(&mut other).unwrap();
            assert_eq!(device.register(&mut storage), Ok(1));
        }
        let descriptor = storage.descriptor();
        assert_eq!(descriptor.len(), 23);
        assert_eq!(&descriptor[..9], &[9, 4, 1, 0, 2, 0x08, 0x06, 0x50, 0]);
        assert_eq!(&descriptor[9..16], &[7, 5, 0x02, 0x02, 64, 0, 0]);
        assert_eq!(&descriptor[16..], &[7, 5, 0x83, 0x02, 64, 0, 0]);
    }

    #[test]
    fn command_transaction() {
        let mut storage = MassStorage::new(Inquiry::default());
        {
            let mut device = device();
            device.register(&mut storage).unwrap();
            configure(&mut device);

            device.hardware_mut().queue_out(&cbw(CBW_SIGNATURE, 0x1234_5678));
            device.hardware_mut().pending = 1 << 1;
            device.on_interrupt();

            let wire = device.hardware().wire();
            assert_eq!(&wire[..4], &[0xAA; 4]);
            let status = &wire[4..];
            assert_eq!(status.len(), CommandStatusWrapper::SIZE);
            assert_eq!(&status[4..8], &0x1234_5678u32.to_le_bytes());
            assert_eq!(&status[8..12], &32u32.to_le_bytes());
            assert_eq!(status[12], 0);
            assert_eq!(device.hardware().count(Event::Stall(1)), 0);
        }
        assert_eq!(storage.handler().tags.as_slice(), &[0x1234_5678]);
    }

    #[test]
    fn bad_signature_stalls_without_status() {
        let mut storage = MassStorage::new(Inquiry::default());
        {
            let mut device = device();
            device.register(&mut storage).unwrap();
            configure(&mut device);

            device.hardware_mut().queue_out(&cbw(0x0BAD_0BAD, 7));
            device.hardware_mut().pending = 1 << 1;
            device.on_interrupt();

            assert!(device.hardware().wire().is_empty());
            assert_eq!(device.hardware().count(Event::Stall(1)), 1);
            assert_eq!(device.hardware().count(Event::Stall(2)), 1);
        }
        assert!(storage.handler().tags.is_empty());
    }

    #[test]
    fn class_requests() {
        let mut storage = MassStorage::new(Inquiry::default());
        {
            let mut device = device();
            device.register(&mut storage).unwrap();

            let get_max_lun = [0xA1, 0xFE, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00];
            device
                .hardware_mut()
                .load_setup(SetupRequest::from_bytes(get_max_lun));
            device.on_setup();
            assert_eq!(device.hardware().wire(), &[0]);

            let reset = [0x21, 0xFF, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
            device
                .hardware_mut()
                .load_setup(SetupRequest::from_bytes(reset));
            device.on_setup();
            assert_eq!(device.hardware().count(Event::Stall(0)), 0);
        }
        assert_eq!(storage.handler().resets, 1);
    }
}
