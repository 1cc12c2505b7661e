use std::io::{self, Write};

use console::style;
use log::debug;
use recdfu::{
    ButtonProcedure, CancelToken, DeviceIdentity, DfuError, EntryEvent,
    EntryObserver, EntryState, EntryType, OperatorGate, ProgressBar, Window,
};

/// Renders [EntryEvent]s on the terminal
pub(crate) struct ConsoleObserver {
    bar: ProgressBar<io::Stdout>,
}

impl ConsoleObserver {
    pub(crate) fn new() -> Self {
        ConsoleObserver {
            bar: ProgressBar::stdout(),
        }
    }
}

impl EntryObserver for ConsoleObserver {
    fn on_event(&mut self, event: &EntryEvent) {
        match event {
            EntryEvent::State(EntryState::WaitRecovery) => {
                println!("Waiting for device in Recovery mode...")
            }
            EntryEvent::State(EntryState::Connected) => {
                println!("CONNECTED: Recovery mode")
            }
            EntryEvent::State(EntryState::Reconnecting) => {
                println!("Reconnecting...")
            }
            EntryEvent::State(EntryState::DfuConfirmed) => {
                println!("{}", style("DONE!").green().bold())
            }
            EntryEvent::Instructions {
                identity,
                entry_type,
                procedure,
            } => print_instructions(identity, *entry_type, procedure),
            EntryEvent::Countdown { remaining } => {
                print!(
                    "\rpreparing... \
                     (STEP2 will start after {remaining} seconds)"
                );
                if let Err(err) = io::stdout().flush() {
                    debug!("failed to flush stdout: {err}");
                }
            }
            EntryEvent::WindowStarted {
                window: Window::Hold,
                button,
                ticks,
            } => {
                println!();
                println!(
                    "[STEP2] Press and hold Side(or Top) and {button}s \
                     together ({ticks}sec)"
                );
            }
            EntryEvent::WindowStarted {
                window: Window::Release,
                button,
                ticks,
            } => println!(
                "[STEP3] Release Side(or Top) button \
                 But keep holding {button} ({ticks}sec)"
            ),
            EntryEvent::Tick { current, total, .. } => {
                if let Err(err) = self.bar.render(*current, *total) {
                    debug!("failed to render progress: {err}");
                }
            }
            EntryEvent::WindowFinished(_) => {
                if let Err(err) = self.bar.finish() {
                    debug!("failed to finish progress: {err}");
                }
            }
            _ => {}
        }
    }
}

fn print_instructions(
    identity: &DeviceIdentity,
    entry_type: EntryType,
    procedure: &ButtonProcedure,
) {
    let button = procedure.button;
    println!();
    println!("================");
    println!("::");
    println!(":: {identity} TYPE: {entry_type:?}");
    println!("::");
    println!(":: {}", style("Time to put the device into DFU mode").blue());
    println!(
        ":: {}",
        style("Please follow the instructions below to operate the device.")
            .blue()
    );
    println!("::");
    println!(
        ":: {} {} {}",
        style("STEP1 Press").green(),
        style("<enter>").red(),
        style("key.").green()
    );
    println!(
        ":: {} {}",
        style(format!(
            "STEP2 Press and hold Side(or Top) and {button}s together"
        ))
        .green(),
        style(format!("({}sec)", procedure.hold_ticks)).red()
    );
    println!(
        ":: {} {}",
        style(format!(
            "STEP3 Release Side(or Top) button But keep holding {button}"
        ))
        .green(),
        style(format!("({}sec)", procedure.release_ticks)).red()
    );
    println!("================");
    println!();
    println!(
        "{}",
        style("ready? it starts 3 seconds after press <enter> key.").blue()
    );
}

/// Waits for the operator to press enter
pub(crate) struct StdinGate {
    cancel: CancelToken,
}

impl StdinGate {
    pub(crate) fn new(cancel: CancelToken) -> Self {
        StdinGate { cancel }
    }
}

impl OperatorGate for StdinGate {
    fn wait_ready(&mut self) -> Result<(), DfuError> {
        print!("{} >> ", style("[STEP1] Press <enter> key").green());
        io::stdout().flush()?;
        let mut line = String::new();
        io::stdin().read_line(&mut line)?;
        println!();
        self.cancel.check()
    }
}
