use std::time::Duration;

use log::debug;

use crate::DEFAULT_TIMEOUT;
use crate::transport::*;

const DFU_CMD_DOWNLOAD: u8 = 1;
const DFU_CMD_GETSTATUS: u8 = 3;
// iBoot treats CLRSTATUS as abort
const DFU_CMD_ABORT: u8 = 4;

const REQ_CLASS_OUT: u8 = 0x21;
const REQ_CLASS_IN: u8 = 0xa1;
const REQ_VENDOR_OUT: u8 = 0x40;

const RECOVERY_CMD: u8 = 0;

/// Fixed control request shapes on an open session
///
/// Failures are reported through the returned [Transfer], no request is
/// retried.
pub struct ControlTransferClient<'a, S: UsbSession> {
    session: &'a mut S,
}

impl<'a, S: UsbSession> ControlTransferClient<'a, S> {
    pub fn new(session: &'a mut S) -> Self {
        ControlTransferClient { session }
    }

    pub fn send_data(&mut self, data: &[u8]) -> Transfer {
        self.send_data_with_timeout(data, DEFAULT_TIMEOUT)
    }

    pub fn send_data_with_timeout(
        &mut self,
        data: &[u8],
        timeout: Duration,
    ) -> Transfer {
        self.cmd_out(
            ControlRequest::new(REQ_CLASS_OUT, DFU_CMD_DOWNLOAD),
            data,
            timeout,
        )
    }

    pub fn get_status(&mut self, buf: &mut [u8]) -> Transfer {
        let request = ControlRequest::new(REQ_CLASS_IN, DFU_CMD_GETSTATUS);
        let transfer = self.session.control_in(request, buf, DEFAULT_TIMEOUT);
        debug!("control in {:?}: {:?}", request, transfer);
        transfer
    }

    /// Fire-and-forget abort, its completion is not awaited
    pub fn send_abort(&mut self) -> Transfer {
        self.cmd_out(
            ControlRequest::new(REQ_CLASS_OUT, DFU_CMD_ABORT),
            &[],
            Duration::ZERO,
        )
    }

    /// Send a NUL terminated command to the Recovery mode console
    pub fn send_command(&mut self, command: &str) -> Transfer {
        let mut data = Vec::with_capacity(command.len() + 1);
        data.extend_from_slice(command.as_bytes());
        data.push(0);
        self.cmd_out(
            ControlRequest::new(REQ_VENDOR_OUT, RECOVERY_CMD),
            &data,
            DEFAULT_TIMEOUT,
        )
    }

    fn cmd_out(
        &mut self,
        request: ControlRequest,
        data: &[u8],
        timeout: Duration,
    ) -> Transfer {
        let transfer = self.session.control_out(request, data, timeout);
        debug!(
            "control out {:?} ({} bytes): {:?}",
            request,
            data.len(),
            transfer
        );
        transfer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockBus, MockSession, RecordedTransfer};

    fn session() -> (MockBus, MockSession) {
        let mut bus = MockBus::new();
        let session = bus.open(DeviceMode::Recovery, false).unwrap().unwrap();
        (bus, session)
    }

    #[test]
    fn test_request_shapes() {
        let (bus, mut session) = session();
        let mut client = ControlTransferClient::new(&mut session);
        let mut status = [0u8; 6];

        assert_eq!(client.send_data(&[1, 2, 3]), Transfer::completed(3));
        assert!(
            client
                .send_data_with_timeout(&[4], Duration::from_millis(7))
                .ok()
        );
        assert_eq!(client.get_status(&mut status), Transfer::completed(6));
        assert!(client.send_abort().ok());

        assert_eq!(
            bus.transfers(),
            vec![
                RecordedTransfer {
                    request: ControlRequest::new(0x21, 1),
                    data: vec![1, 2, 3],
                    timeout: DEFAULT_TIMEOUT,
                },
                RecordedTransfer {
                    request: ControlRequest::new(0x21, 1),
                    data: vec![4],
                    timeout: Duration::from_millis(7),
                },
                RecordedTransfer {
                    request: ControlRequest::new(0xa1, 3),
                    data: vec![0; 6],
                    timeout: DEFAULT_TIMEOUT,
                },
                RecordedTransfer {
                    request: ControlRequest::new(0x21, 4),
                    data: vec![],
                    timeout: Duration::ZERO,
                },
            ]
        );
    }

    #[test]
    fn test_send_command_is_nul_terminated() {
        let (bus, mut session) = session();
        let transfer =
            ControlTransferClient::new(&mut session).send_command("reboot");
        assert_eq!(transfer, Transfer::completed(7));
        let transfers = bus.transfers();
        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].request, ControlRequest::new(0x40, 0));
        assert_eq!(transfers[0].data, b"reboot\0");
    }

    #[test]
    fn test_failures_are_returned_not_retried() {
        let (bus, mut session) = session();
        bus.fail_transfers(TransferStatus::Stall);
        let transfer =
            ControlTransferClient::new(&mut session).send_data(&[0; 16]);
        assert_eq!(transfer, Transfer::failed(TransferStatus::Stall));
        assert!(!transfer.ok());
        assert_eq!(bus.transfers().len(), 1);
    }
}
