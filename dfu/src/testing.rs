//! Scripted USB bus for tests

use std::{cell::RefCell, rc::Rc, time::Duration};

use crate::{
    DfuError,
    transport::{
        ControlRequest, DeviceMode, ResetPolicy, Transfer, TransferStatus,
        UsbBus, UsbSession,
    },
};

pub(crate) const FAMILY_B_SERIAL: &str = concat!(
    "CPID:8015 CPRV:11 CPFM:03 SCEP:01 BDID:0E ECID:001A2B3C4D5E6F70 ",
    "IBFL:3C SRTG:[iBoot-3332.0.0.1.23]"
);

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct RecordedTransfer {
    pub request: ControlRequest,
    pub data: Vec<u8>,
    pub timeout: Duration,
}

#[derive(Debug)]
struct BusState {
    serial: Option<String>,
    recovery_after: Option<usize>,
    dfu_after: Option<usize>,
    recovery_errors: usize,
    dfu_errors: usize,
    recovery_attempts: usize,
    dfu_attempts: usize,
    pairing: Vec<bool>,
    opened: usize,
    closed: usize,
    resets: usize,
    fail_status: Option<TransferStatus>,
    transfers: Vec<RecordedTransfer>,
}

/// Bus whose devices appear after a configured number of failed lookups
#[derive(Clone, Debug)]
pub(crate) struct MockBus {
    state: Rc<RefCell<BusState>>,
}

impl MockBus {
    pub fn new() -> Self {
        MockBus {
            state: Rc::new(RefCell::new(BusState {
                serial: Some(FAMILY_B_SERIAL.to_string()),
                recovery_after: Some(0),
                dfu_after: Some(0),
                recovery_errors: 0,
                dfu_errors: 0,
                recovery_attempts: 0,
                dfu_attempts: 0,
                pairing: Vec::new(),
                opened: 0,
                closed: 0,
                resets: 0,
                fail_status: None,
                transfers: Vec::new(),
            })),
        }
    }

    pub fn with_serial(self, serial: Option<&str>) -> Self {
        self.state.borrow_mut().serial = serial.map(str::to_string);
        self
    }

    /// Number of empty lookups before a Recovery device shows up
    pub fn with_recovery_after(self, misses: Option<usize>) -> Self {
        self.state.borrow_mut().recovery_after = misses;
        self
    }

    /// Number of empty lookups before a DFU device shows up
    pub fn with_dfu_after(self, misses: Option<usize>) -> Self {
        self.state.borrow_mut().dfu_after = misses;
        self
    }

    /// Number of lookups in `mode` that fail with an IO error, counted from
    /// the first lookup
    pub fn with_lookup_errors(self, mode: DeviceMode, errors: usize) -> Self {
        {
            let mut state = self.state.borrow_mut();
            match mode {
                DeviceMode::Recovery => state.recovery_errors = errors,
                DeviceMode::Dfu => state.dfu_errors = errors,
            }
        }
        self
    }

    pub fn fail_transfers(&self, status: TransferStatus) {
        self.state.borrow_mut().fail_status = Some(status);
    }

    pub fn transfers(&self) -> Vec<RecordedTransfer> {
        self.state.borrow().transfers.clone()
    }

    pub fn attempts(&self, mode: DeviceMode) -> usize {
        let state = self.state.borrow();
        match mode {
            DeviceMode::Recovery => state.recovery_attempts,
            DeviceMode::Dfu => state.dfu_attempts,
        }
    }

    pub fn pairing_requests(&self) -> Vec<bool> {
        self.state.borrow().pairing.clone()
    }

    pub fn opened(&self) -> usize {
        self.state.borrow().opened
    }

    /// Sessions opened but not yet dropped
    pub fn open_sessions(&self) -> usize {
        let state = self.state.borrow();
        state.opened - state.closed
    }

    pub fn resets(&self) -> usize {
        self.state.borrow().resets
    }
}

impl UsbBus for MockBus {
    type Session = MockSession;

    fn open(
        &mut self,
        mode: DeviceMode,
        pairing: bool,
    ) -> Result<Option<MockSession>, DfuError> {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        state.pairing.push(pairing);
        let (attempts, after, errors) = match mode {
            DeviceMode::Recovery => (
                &mut state.recovery_attempts,
                state.recovery_after,
                state.recovery_errors,
            ),
            DeviceMode::Dfu => {
                (&mut state.dfu_attempts, state.dfu_after, state.dfu_errors)
            }
        };
        let misses = *attempts;
        *attempts += 1;
        if misses < errors {
            return Err(DfuError::Io(std::io::Error::other(format!(
                "lookup {misses} in {mode} mode failed"
            ))));
        }
        if after.is_none_or(|after| misses < after) {
            return Ok(None);
        }
        state.opened += 1;
        Ok(Some(MockSession {
            state: Rc::clone(&self.state),
        }))
    }
}

#[derive(Debug)]
pub(crate) struct MockSession {
    state: Rc<RefCell<BusState>>,
}

impl MockSession {
    fn record(
        &mut self,
        request: ControlRequest,
        data: Vec<u8>,
        timeout: Duration,
    ) -> Transfer {
        let mut state = self.state.borrow_mut();
        let length = data.len();
        state.transfers.push(RecordedTransfer {
            request,
            data,
            timeout,
        });
        match state.fail_status {
            Some(status) => Transfer::failed(status),
            None => Transfer::completed(length),
        }
    }
}

impl UsbSession for MockSession {
    fn control_out(
        &mut self,
        request: ControlRequest,
        data: &[u8],
        timeout: Duration,
    ) -> Transfer {
        self.record(request, data.to_vec(), timeout)
    }

    fn control_in(
        &mut self,
        request: ControlRequest,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Transfer {
        buf.fill(0);
        self.record(request, buf.to_vec(), timeout)
    }

    fn serial_number(&mut self) -> Result<String, DfuError> {
        self.state
            .borrow()
            .serial
            .clone()
            .ok_or(DfuError::NoSerialNumber)
    }

    fn release(self, reset: ResetPolicy) -> Result<(), DfuError> {
        if reset == ResetPolicy::Reset {
            self.state.borrow_mut().resets += 1;
        }
        Ok(())
    }
}

impl Drop for MockSession {
    fn drop(&mut self) {
        self.state.borrow_mut().closed += 1;
    }
}
