//! Recovery to DFU mode transition for Apple devices, based on [`nusb`]
//!
//! Putting a device into DFU mode requires the operator to hold a button
//! combination with the right timing. This crate identifies a device
//! attached in Recovery mode, picks the button procedure for it, paces the
//! operator through that procedure while rebooting the device at the right
//! moment, and confirms that the device came back in DFU mode.
//!
//! # Example
//!
//! The following example shows how to classify a device from its iBoot
//! serial number:
//! ```
//! use recdfu::{DeviceIdentity, DeviceTable, EntryType};
//!
//! let identity = DeviceIdentity::parse("CPID:8015 CPRV:11 BDID:0E").unwrap();
//! let entry_type =
//!     DeviceTable::default().classify(identity.cpid, identity.bdid);
//! assert_eq!(entry_type, EntryType::FamilyB);
//! ```
//!
//! [`nusb`]: https://docs.rs/nusb

pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000u64);

mod cancel;
mod classify;
mod connection;
mod control;
mod device;
mod error;
mod identity;
mod orchestrator;
mod progress;
mod timer;
pub mod transport;

#[cfg(test)]
mod testing;

use std::time::Duration;

// Re-exports
pub use cancel::CancelToken;
pub use classify::{
    ANY_BDID, ButtonProcedure, DEFAULT_MIXED_CPIDS, DeviceClassEntry,
    DeviceGroup, DeviceTable, EntryType, SENTINEL_CPID,
};
pub use connection::{ConnectionManager, DeviceHandle};
pub use control::ControlTransferClient;
pub use device::{AppleDevice, NusbBus, NusbSession, find_apple_devices};
pub use error::DfuError;
pub use identity::DeviceIdentity;
pub use orchestrator::{
    DfuEntry, EntryConfig, EntryError, EntryEvent, EntryObserver, EntryState,
    EntrySummary, OperatorGate, REBOOT_TICK, Window,
};
pub use progress::ProgressBar;
pub use timer::IntervalTimer;
pub use transport::{DeviceMode, ResetPolicy};
