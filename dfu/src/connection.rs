use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::{
    CancelToken, ControlTransferClient, DeviceIdentity, DfuError, transport::*,
};

/// Pause between two lookups while waiting for a device to appear
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Open session to a device in a known [DeviceMode]
///
/// Created by [ConnectionManager::open] or [ConnectionManager::reconnect],
/// released by [ConnectionManager::close].
pub struct DeviceHandle<S: UsbSession> {
    session: S,
    mode: DeviceMode,
    identity: Option<DeviceIdentity>,
}

impl<S: UsbSession> DeviceHandle<S> {
    pub(crate) fn new(session: S, mode: DeviceMode) -> Self {
        DeviceHandle {
            session,
            mode,
            identity: None,
        }
    }

    pub fn mode(&self) -> DeviceMode {
        self.mode
    }

    pub fn identity(&self) -> Option<&DeviceIdentity> {
        self.identity.as_ref()
    }

    pub fn set_identity(&mut self, identity: DeviceIdentity) {
        self.identity = Some(identity);
    }

    /// Read and parse the serial number of the device
    pub fn read_identity(&mut self) -> Result<&DeviceIdentity, DfuError> {
        let serial = self.session.serial_number()?;
        debug!("serial number: {serial}");
        let identity = DeviceIdentity::parse(&serial)?;
        Ok(self.identity.insert(identity))
    }

    pub fn control(&mut self) -> ControlTransferClient<'_, S> {
        ControlTransferClient::new(&mut self.session)
    }

    fn release(self, reset: ResetPolicy) {
        if let Err(err) = self.session.release(reset) {
            warn!("failed to release {} mode device: {err}", self.mode);
        }
    }
}

/// Opens, closes and reconnects [DeviceHandle]s
pub struct ConnectionManager<B: UsbBus> {
    bus: B,
    cancel: CancelToken,
    poll_interval: Duration,
}

impl<B: UsbBus> ConnectionManager<B> {
    pub fn new(bus: B, cancel: CancelToken) -> Self {
        ConnectionManager {
            bus,
            cancel,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Look for a device enumerated in `mode`
    ///
    /// Returns `None` if there is none. With `wait`, a missed lookup pauses
    /// for the poll interval so callers can loop on it.
    pub fn open(
        &mut self,
        mode: DeviceMode,
        wait: bool,
    ) -> Result<Option<DeviceHandle<B::Session>>, DfuError> {
        match self.bus.open(mode, false)? {
            Some(session) => {
                debug!("opened device in {mode} mode");
                Ok(Some(DeviceHandle::new(session, mode)))
            }
            None => {
                if wait {
                    self.cancel.sleep(self.poll_interval)?;
                }
                Ok(None)
            }
        }
    }

    pub fn close(&mut self, handle: DeviceHandle<B::Session>) {
        debug!("closing device in {} mode", handle.mode());
        handle.release(ResetPolicy::NoReset);
    }

    /// Release `handle` and wait for the device to come back in `target` mode
    ///
    /// `timeout` is split evenly over `max_attempts`. Each attempt polls
    /// for the device every poll interval until its share of the timeout
    /// has passed. A failed lookup counts as a miss. Returns `None` once
    /// all attempts missed.
    pub fn reconnect(
        &mut self,
        handle: DeviceHandle<B::Session>,
        max_attempts: u32,
        target: DeviceMode,
        reset: ResetPolicy,
        pairing: bool,
        timeout: Duration,
    ) -> Result<Option<DeviceHandle<B::Session>>, DfuError> {
        handle.release(reset);

        let slice = timeout / max_attempts.max(1);
        for attempt in 1..=max_attempts {
            self.cancel.check()?;
            let deadline = Instant::now() + slice;
            loop {
                match self.bus.open(target, pairing) {
                    Ok(Some(session)) => {
                        info!(
                            "reconnected in {target} mode (attempt {attempt})"
                        );
                        return Ok(Some(DeviceHandle::new(session, target)));
                    }
                    Ok(None) => {}
                    Err(err) => debug!("attempt {attempt}: {err}"),
                }
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                self.cancel.sleep(self.poll_interval.min(deadline - now))?;
            }
            debug!(
                "attempt {attempt}/{max_attempts}: no device in {target} mode"
            );
        }
        Ok(None)
    }
}
