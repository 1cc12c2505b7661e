//! Seams between the orchestration logic and the USB stack
//!
//! [UsbBus] enumerates and opens devices, [UsbSession] is one opened device.
//! The nusb implementation lives in [crate::NusbBus].

use std::{fmt, time::Duration};

use crate::DfuError;

pub const APPLE_VENDOR_ID: u16 = 0x05AC;
pub const DFU_PRODUCT_ID: u16 = 0x1227;
pub const RECOVERY_PRODUCT_IDS: [u16; 4] = [0x1280, 0x1281, 0x1282, 0x1283];

/// Bootloader mode a device enumerates in
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DeviceMode {
    Recovery,
    Dfu,
}

impl DeviceMode {
    pub fn from_product_id(pid: u16) -> Option<Self> {
        if pid == DFU_PRODUCT_ID {
            Some(DeviceMode::Dfu)
        } else if RECOVERY_PRODUCT_IDS.contains(&pid) {
            Some(DeviceMode::Recovery)
        } else {
            None
        }
    }

    pub fn matches(&self, pid: u16) -> bool {
        DeviceMode::from_product_id(pid) == Some(*self)
    }
}

impl fmt::Display for DeviceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceMode::Recovery => write!(f, "Recovery"),
            DeviceMode::Dfu => write!(f, "DFU"),
        }
    }
}

/// Whether the transport resets the device when releasing it
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ResetPolicy {
    #[default]
    NoReset,
    Reset,
}

/// Setup stage of a control transfer, minus `wLength`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ControlRequest {
    pub request_type: u8,
    pub request: u8,
    pub value: u16,
    pub index: u16,
}

impl ControlRequest {
    pub const fn new(request_type: u8, request: u8) -> Self {
        ControlRequest {
            request_type,
            request,
            value: 0,
            index: 0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransferStatus {
    Completed,
    Stall,
    Timeout,
    Disconnected,
    Error,
}

/// Outcome of a control transfer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transfer {
    pub status: TransferStatus,
    /// Bytes moved during the data stage
    pub length: usize,
}

impl Transfer {
    pub fn completed(length: usize) -> Self {
        Transfer {
            status: TransferStatus::Completed,
            length,
        }
    }

    pub fn failed(status: TransferStatus) -> Self {
        Transfer { status, length: 0 }
    }

    pub fn ok(&self) -> bool {
        self.status == TransferStatus::Completed
    }
}

/// One opened USB device
pub trait UsbSession {
    /// Host to device control transfer. A zero `timeout` submits the
    /// request without waiting for its completion.
    fn control_out(
        &mut self,
        request: ControlRequest,
        data: &[u8],
        timeout: Duration,
    ) -> Transfer;

    /// Device to host control transfer into `buf`
    fn control_in(
        &mut self,
        request: ControlRequest,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Transfer;

    /// Raw serial number string of the device
    fn serial_number(&mut self) -> Result<String, DfuError>;

    /// Close the session, resetting the device first if `reset` asks for it
    fn release(self, reset: ResetPolicy) -> Result<(), DfuError>
    where
        Self: Sized;
}

/// Enumerates devices and opens sessions
pub trait UsbBus {
    type Session: UsbSession;

    /// Open the first Apple device currently enumerated in `mode`
    fn open(
        &mut self,
        mode: DeviceMode,
        pairing: bool,
    ) -> Result<Option<Self::Session>, DfuError>;
}
