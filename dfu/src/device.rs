use std::{num::NonZeroU8, time::Duration};

use log::{debug, warn};
use nusb::{
    self, MaybeFuture,
    transfer::{ControlIn, ControlOut, ControlType, Recipient, TransferError},
};

use crate::{DEFAULT_TIMEOUT, DeviceIdentity, DfuError, transport::*};

const INTERFACE: u8 = 0;

// Shortest window given to requests submitted with a zero timeout
const FIRE_AND_FORGET: Duration = Duration::from_millis(10);

/// Apple device in Recovery or DFU mode, as enumerated
pub struct AppleDevice {
    dev: nusb::DeviceInfo,
    mode: DeviceMode,
}

impl AppleDevice {
    pub fn device_info(&self) -> &nusb::DeviceInfo {
        &self.dev
    }

    pub fn mode(&self) -> DeviceMode {
        self.mode
    }

    pub fn bus_id(&self) -> &str {
        self.dev.bus_id()
    }

    pub fn device_address(&self) -> u8 {
        self.dev.device_address()
    }

    pub fn product_id(&self) -> u16 {
        self.dev.product_id()
    }

    pub fn serial_number(&self) -> Option<&str> {
        self.dev.serial_number()
    }

    /// Identity parsed from the cached serial number, if the OS provides it
    pub fn identity(&self) -> Option<DeviceIdentity> {
        DeviceIdentity::parse(self.serial_number()?).ok()
    }

    pub fn open(&self) -> Result<NusbSession, DfuError> {
        let device = self.dev.open().wait()?;
        let interface = device.claim_interface(INTERFACE).wait()?;
        Ok(NusbSession {
            info: self.dev.clone(),
            device,
            interface,
        })
    }
}

/// List Apple devices in Recovery or DFU mode, optionally only in `mode`
pub fn find_apple_devices(
    mode: Option<DeviceMode>,
) -> Result<Vec<AppleDevice>, DfuError> {
    Ok(nusb::list_devices()
        .wait()?
        .filter(|dev| dev.vendor_id() == APPLE_VENDOR_ID)
        .filter_map(|dev| {
            let dev_mode = DeviceMode::from_product_id(dev.product_id())?;
            mode.is_none_or(|m| m == dev_mode).then_some(AppleDevice {
                dev,
                mode: dev_mode,
            })
        })
        .collect())
}

/// [UsbBus] backed by [nusb]
#[derive(Default)]
pub struct NusbBus;

impl NusbBus {
    pub fn new() -> Self {
        NusbBus
    }
}

impl UsbBus for NusbBus {
    type Session = NusbSession;

    fn open(
        &mut self,
        mode: DeviceMode,
        pairing: bool,
    ) -> Result<Option<NusbSession>, DfuError> {
        if pairing {
            warn!("pairing is not supported by the nusb backend");
        }
        match find_apple_devices(Some(mode))?.first() {
            Some(device) => {
                debug!(
                    "found {} device {:04x}:{:04x} at bus {} address {}",
                    mode,
                    APPLE_VENDOR_ID,
                    device.product_id(),
                    device.bus_id(),
                    device.device_address()
                );
                device.open().map(Some)
            }
            None => Ok(None),
        }
    }
}

/// Claimed interface of an opened [AppleDevice]
pub struct NusbSession {
    info: nusb::DeviceInfo,
    device: nusb::Device,
    interface: nusb::Interface,
}

impl UsbSession for NusbSession {
    fn control_out(
        &mut self,
        request: ControlRequest,
        data: &[u8],
        timeout: Duration,
    ) -> Transfer {
        let (control_type, recipient) =
            split_request_type(request.request_type);
        let res = self
            .interface
            .control_out(
                ControlOut {
                    control_type,
                    recipient,
                    request: request.request,
                    value: request.value,
                    index: request.index,
                    data,
                },
                effective_timeout(timeout),
            )
            .wait();
        match res {
            Ok(()) => Transfer::completed(data.len()),
            Err(err) => Transfer::failed(transfer_status(err)),
        }
    }

    fn control_in(
        &mut self,
        request: ControlRequest,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Transfer {
        let (control_type, recipient) =
            split_request_type(request.request_type);
        let res = self
            .interface
            .control_in(
                ControlIn {
                    control_type,
                    recipient,
                    request: request.request,
                    value: request.value,
                    index: request.index,
                    length: buf.len().min(u16::MAX as usize) as u16,
                },
                effective_timeout(timeout),
            )
            .wait();
        match res {
            Ok(data) => {
                let length = data.len().min(buf.len());
                buf[..length].copy_from_slice(&data[..length]);
                Transfer::completed(length)
            }
            Err(err) => Transfer::failed(transfer_status(err)),
        }
    }

    fn serial_number(&mut self) -> Result<String, DfuError> {
        if let Some(serial) = self.info.serial_number() {
            return Ok(serial.to_string());
        }
        let index = self
            .device
            .device_descriptor()
            .serial_number_string_index()
            .ok_or(DfuError::NoSerialNumber)?;
        get_string_descriptor(&self.device, index, DEFAULT_TIMEOUT)
            .ok_or(DfuError::NoSerialNumber)
    }

    fn release(self, reset: ResetPolicy) -> Result<(), DfuError> {
        let NusbSession {
            device, interface, ..
        } = self;
        drop(interface);
        if reset == ResetPolicy::Reset {
            device.reset().wait()?;
        }
        Ok(())
    }
}

fn effective_timeout(timeout: Duration) -> Duration {
    if timeout.is_zero() {
        FIRE_AND_FORGET
    } else {
        timeout
    }
}

fn split_request_type(request_type: u8) -> (ControlType, Recipient) {
    let control_type = match (request_type >> 5) & 0x3 {
        0 => ControlType::Standard,
        1 => ControlType::Class,
        _ => ControlType::Vendor,
    };
    let recipient = match request_type & 0x1f {
        0 => Recipient::Device,
        1 => Recipient::Interface,
        2 => Recipient::Endpoint,
        _ => Recipient::Other,
    };
    (control_type, recipient)
}

fn transfer_status(err: TransferError) -> TransferStatus {
    match err {
        TransferError::Stall => TransferStatus::Stall,
        TransferError::Disconnected => TransferStatus::Disconnected,
        // nusb cancels transfers that hit their timeout
        TransferError::Cancelled => TransferStatus::Timeout,
        _ => TransferStatus::Error,
    }
}

fn get_string_descriptor(
    device: &nusb::Device,
    desc_index: NonZeroU8,
    timeout: Duration,
) -> Option<String> {
    let language: u16 = device
        .get_string_descriptor_supported_languages(timeout)
        .wait()
        .ok()?
        .next()
        .unwrap_or(nusb::descriptors::language_id::US_ENGLISH);

    device
        .get_string_descriptor(desc_index, language, timeout)
        .wait()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_request_type() {
        assert!(matches!(
            split_request_type(0x21),
            (ControlType::Class, Recipient::Interface)
        ));
        assert!(matches!(
            split_request_type(0xa1),
            (ControlType::Class, Recipient::Interface)
        ));
        assert!(matches!(
            split_request_type(0x40),
            (ControlType::Vendor, Recipient::Device)
        ));
        assert!(matches!(
            split_request_type(0x80),
            (ControlType::Standard, Recipient::Device)
        ));
    }

    #[test]
    fn test_effective_timeout() {
        assert_eq!(effective_timeout(Duration::ZERO), FIRE_AND_FORGET);
        assert_eq!(effective_timeout(DEFAULT_TIMEOUT), DEFAULT_TIMEOUT);
    }
}
