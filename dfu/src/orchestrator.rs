//! Recovery to DFU transition
//!
//! [DfuEntry] walks a device from Recovery mode into DFU mode:
//!
//! 1. wait for a device in Recovery mode and identify it
//! 2. classify it to pick the button procedure
//! 3. wait for the operator, count down, then pace the operator through the
//!    hold and release windows, rebooting the device at the second tick of
//!    the hold window
//! 4. wait for the device to re-enumerate in DFU mode
//!
//! Presentation is left to an [EntryObserver], operator readiness to an
//! [OperatorGate].

use std::{fmt, time::Duration};

use log::{debug, info, warn};

use crate::{
    ButtonProcedure, CancelToken, ConnectionManager, DeviceHandle,
    DeviceIdentity, DeviceTable, DfuError, EntryType, IntervalTimer,
    connection::DEFAULT_POLL_INTERVAL, transport::*,
};

/// Hold window tick at which the reboot request is sent
pub const REBOOT_TICK: u32 = 1;

const REBOOT_COMMAND: &str = "reboot";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryState {
    WaitRecovery,
    Connected,
    Classified,
    AwaitUserStart,
    CountdownPrep,
    ButtonHoldWindow,
    ButtonReleaseWindow,
    Reconnecting,
    DfuConfirmed,
}

/// Timed window paced by [DfuEntry]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Window {
    /// Side button and [ButtonProcedure::button] held together
    Hold,
    /// Only [ButtonProcedure::button] held
    Release,
}

/// Progress notification emitted by [DfuEntry]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EntryEvent {
    State(EntryState),
    Classified {
        identity: DeviceIdentity,
        entry_type: EntryType,
    },
    /// Instructions to show before the operator confirms readiness
    Instructions {
        identity: DeviceIdentity,
        entry_type: EntryType,
        procedure: ButtonProcedure,
    },
    /// Ticks left before the hold window starts
    Countdown { remaining: u32 },
    WindowStarted {
        window: Window,
        button: &'static str,
        ticks: u32,
    },
    Tick {
        window: Window,
        current: u32,
        total: u32,
    },
    WindowFinished(Window),
    RebootRequested(Transfer),
}

pub trait EntryObserver {
    fn on_event(&mut self, event: &EntryEvent);
}

/// Blocks until the operator is ready to start the timed sequence
pub trait OperatorGate {
    fn wait_ready(&mut self) -> Result<(), DfuError>;
}

/// Terminal failure of a transition attempt
#[derive(Debug)]
pub enum EntryError {
    Unsupported { cpid: u16, bdid: u8 },
    IdentityRead(DfuError),
    DfuTimeout,
    Cancelled,
    Transport(DfuError),
}

impl std::error::Error for EntryError {}

impl fmt::Display for EntryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryError::Unsupported { cpid, bdid } => write!(
                f,
                "This mode is not yet supported for this device \
                 (CPID: 0x{:04x} BDID: 0x{:02x})",
                cpid, bdid
            ),
            EntryError::IdentityRead(err) => {
                write!(f, "Failed to identify the device: {}", err)
            }
            EntryError::DfuTimeout => {
                write!(f, "Failed to put the device into DFU mode")
            }
            EntryError::Cancelled => write!(f, "Cancelled"),
            EntryError::Transport(err) => write!(f, "{}", err),
        }
    }
}

impl From<DfuError> for EntryError {
    fn from(err: DfuError) -> Self {
        match err {
            DfuError::Cancelled => EntryError::Cancelled,
            err => EntryError::Transport(err),
        }
    }
}

/// Timing and reconnection settings of a [DfuEntry]
#[derive(Clone, Debug)]
pub struct EntryConfig {
    /// Length of one tick of the countdown and button windows
    pub tick: Duration,
    pub countdown_ticks: u32,
    /// Override of [ButtonProcedure::hold_ticks], at least `REBOOT_TICK + 1`
    pub hold_ticks: Option<u32>,
    /// Override of [ButtonProcedure::release_ticks]
    pub release_ticks: Option<u32>,
    pub reconnect_attempts: u32,
    pub reconnect_timeout: Duration,
    pub reset_policy: ResetPolicy,
    pub pairing: bool,
    /// Pause between lookups while waiting for the Recovery mode device
    pub poll_interval: Duration,
    /// Identity to use instead of reading the serial number
    pub identity: Option<DeviceIdentity>,
}

impl Default for EntryConfig {
    fn default() -> Self {
        EntryConfig {
            tick: Duration::from_secs(1),
            countdown_ticks: 3,
            hold_ticks: None,
            release_ticks: None,
            reconnect_attempts: 5,
            reconnect_timeout: Duration::from_secs(10),
            reset_policy: ResetPolicy::NoReset,
            pairing: false,
            poll_interval: DEFAULT_POLL_INTERVAL,
            identity: None,
        }
    }
}

/// Successful transition
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntrySummary {
    pub identity: DeviceIdentity,
    pub entry_type: EntryType,
}

/// Recovery to DFU state machine
pub struct DfuEntry<'a, B: UsbBus> {
    connections: ConnectionManager<B>,
    table: &'a DeviceTable,
    config: EntryConfig,
    cancel: CancelToken,
    observer: &'a mut dyn EntryObserver,
    gate: &'a mut dyn OperatorGate,
}

impl<'a, B: UsbBus> DfuEntry<'a, B> {
    pub fn new(
        bus: B,
        table: &'a DeviceTable,
        config: EntryConfig,
        cancel: CancelToken,
        observer: &'a mut dyn EntryObserver,
        gate: &'a mut dyn OperatorGate,
    ) -> Self {
        let connections = ConnectionManager::new(bus, cancel.clone())
            .with_poll_interval(config.poll_interval);
        DfuEntry {
            connections,
            table,
            config,
            cancel,
            observer,
            gate,
        }
    }

    /// Run one transition attempt
    ///
    /// Every device handle opened along the way is closed before returning.
    pub fn run(&mut self) -> Result<EntrySummary, EntryError> {
        self.enter(EntryState::WaitRecovery);
        info!("Waiting for device in Recovery mode...");
        let mut handle = self.wait_recovery()?;

        self.enter(EntryState::Connected);
        info!("connected: Recovery mode");

        let summary = match self.prepare(&mut handle) {
            Ok(summary) => summary,
            Err(err) => {
                self.connections.close(handle);
                return Err(err);
            }
        };

        self.enter(EntryState::Reconnecting);
        info!("reconnecting");
        let handle = self
            .connections
            .reconnect(
                handle,
                self.config.reconnect_attempts,
                DeviceMode::Dfu,
                self.config.reset_policy,
                self.config.pairing,
                self.config.reconnect_timeout,
            )?
            .ok_or(EntryError::DfuTimeout)?;

        self.enter(EntryState::DfuConfirmed);
        info!("device is in DFU mode");
        self.connections.close(handle);
        Ok(summary)
    }

    fn enter(&mut self, state: EntryState) {
        debug!("state: {state:?}");
        self.observer.on_event(&EntryEvent::State(state));
    }

    fn wait_recovery(
        &mut self,
    ) -> Result<DeviceHandle<B::Session>, EntryError> {
        loop {
            self.cancel.check()?;
            if let Some(handle) =
                self.connections.open(DeviceMode::Recovery, true)?
            {
                return Ok(handle);
            }
        }
    }

    /// Identify the device and pace the operator through the button
    /// procedure, up to the point where the device reboots
    fn prepare(
        &mut self,
        handle: &mut DeviceHandle<B::Session>,
    ) -> Result<EntrySummary, EntryError> {
        if let Some(identity) = self.config.identity.clone() {
            handle.set_identity(identity);
        }
        let identity = match handle.identity() {
            Some(identity) => identity.clone(),
            None => handle
                .read_identity()
                .map_err(EntryError::IdentityRead)?
                .clone(),
        };
        debug!("{identity}");

        self.enter(EntryState::Classified);
        let entry_type = self.table.classify(identity.cpid, identity.bdid);
        self.observer.on_event(&EntryEvent::Classified {
            identity: identity.clone(),
            entry_type,
        });
        let Some(procedure) = entry_type.procedure() else {
            return Err(EntryError::Unsupported {
                cpid: identity.cpid,
                bdid: identity.bdid,
            });
        };
        let procedure = self.effective_procedure(procedure);

        self.enter(EntryState::AwaitUserStart);
        self.observer.on_event(&EntryEvent::Instructions {
            identity: identity.clone(),
            entry_type,
            procedure,
        });
        self.gate.wait_ready()?;

        let mut timer = IntervalTimer::new(self.cancel.clone());
        timer.reset();

        self.enter(EntryState::CountdownPrep);
        for i in 0..self.config.countdown_ticks {
            self.observer.on_event(&EntryEvent::Countdown {
                remaining: self.config.countdown_ticks - i,
            });
            timer.wait(self.config.tick)?;
        }

        self.enter(EntryState::ButtonHoldWindow);
        self.hold_window(handle, &mut timer, &procedure)?;

        self.enter(EntryState::ButtonReleaseWindow);
        self.release_window(&mut timer, &procedure)?;

        Ok(EntrySummary {
            identity,
            entry_type,
        })
    }

    fn effective_procedure(
        &self,
        procedure: ButtonProcedure,
    ) -> ButtonProcedure {
        ButtonProcedure {
            hold_ticks: self
                .config
                .hold_ticks
                .unwrap_or(procedure.hold_ticks)
                .max(REBOOT_TICK + 1),
            release_ticks: self
                .config
                .release_ticks
                .unwrap_or(procedure.release_ticks),
            ..procedure
        }
    }

    fn hold_window(
        &mut self,
        handle: &mut DeviceHandle<B::Session>,
        timer: &mut IntervalTimer,
        procedure: &ButtonProcedure,
    ) -> Result<(), EntryError> {
        let total = procedure.hold_ticks;
        self.observer.on_event(&EntryEvent::WindowStarted {
            window: Window::Hold,
            button: procedure.button,
            ticks: total,
        });
        for current in 0..total {
            if current == REBOOT_TICK {
                let transfer = handle.control().send_command(REBOOT_COMMAND);
                if !transfer.ok() {
                    // the device may drop off the bus before acknowledging
                    warn!("reboot request: {:?}", transfer.status);
                }
                self.observer
                    .on_event(&EntryEvent::RebootRequested(transfer));
            }
            self.observer.on_event(&EntryEvent::Tick {
                window: Window::Hold,
                current,
                total,
            });
            timer.wait(self.config.tick)?;
        }
        self.observer
            .on_event(&EntryEvent::WindowFinished(Window::Hold));
        Ok(())
    }

    fn release_window(
        &mut self,
        timer: &mut IntervalTimer,
        procedure: &ButtonProcedure,
    ) -> Result<(), EntryError> {
        self.observer.on_event(&EntryEvent::WindowStarted {
            window: Window::Release,
            button: procedure.button,
            ticks: procedure.release_ticks,
        });
        self.countdown(timer, Window::Release, procedure.release_ticks)?;
        self.observer
            .on_event(&EntryEvent::WindowFinished(Window::Release));
        Ok(())
    }

    /// Progress countdown of `total` ticks
    fn countdown(
        &mut self,
        timer: &mut IntervalTimer,
        window: Window,
        total: u32,
    ) -> Result<(), DfuError> {
        for current in 0..total {
            self.observer.on_event(&EntryEvent::Tick {
                window,
                current,
                total,
            });
            timer.wait(self.config.tick)?;
        }
        Ok(())
    }
}
