use std::{path::PathBuf, process::ExitCode};

use clap::{Parser, Subcommand, ValueEnum};
use clap_num::maybe_hex;
use log::debug;

use error::CliError;
use list::*;
use recdfu::{
    CancelToken, DeviceIdentity, DeviceMode, DeviceTable, DfuEntry,
    EntryConfig, NusbBus,
};
use terminal::{ConsoleObserver, StdinGate};

mod error;
mod list;
mod terminal;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// put a device from Recovery mode into DFU mode
    Enter {
        /// device table (TOML)
        #[clap(short, long)]
        table: Option<PathBuf>,
        /// chip ID, skips reading the serial number (ex: 0x8015)
        #[clap(long, value_parser=maybe_hex::<u16>, requires = "bdid")]
        cpid: Option<u16>,
        /// board ID, skips reading the serial number (ex: 0x0e)
        #[clap(long, value_parser=maybe_hex::<u8>, requires = "cpid")]
        bdid: Option<u8>,
        /// attempts to find the device in DFU mode
        #[clap(short, long, default_value_t = 5)]
        attempts: u32,
    },
    /// list devices in Recovery or DFU mode
    List {
        /// only list devices in this mode
        #[clap(short, long)]
        mode: Option<Mode>,
    },
    /// show the device class of a chip / board ID pair
    Classify {
        /// chip ID (ex: 0x8015)
        #[clap(value_parser=maybe_hex::<u16>)]
        cpid: u16,
        /// board ID (ex: 0x0e)
        #[clap(value_parser=maybe_hex::<u8>)]
        bdid: u8,
        /// device table (TOML)
        #[clap(short, long)]
        table: Option<PathBuf>,
    },
    /// print the device table
    Table {
        /// device table (TOML)
        #[clap(short, long)]
        table: Option<PathBuf>,
    },
}

impl Default for Commands {
    fn default() -> Self {
        Commands::Enter {
            table: None,
            cpid: None,
            bdid: None,
            attempts: 5,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    Recovery,
    Dfu,
}

impl From<Mode> for DeviceMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Recovery => DeviceMode::Recovery,
            Mode::Dfu => DeviceMode::Dfu,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    env_logger::init();

    if let Err(err) = match &cli.command.unwrap_or_default() {
        Commands::Enter {
            table,
            cpid,
            bdid,
            attempts,
        } => enter_dfu(table, cpid.zip(*bdid), *attempts),
        Commands::List { mode } => list_devices(mode.map(DeviceMode::from)),
        Commands::Classify { cpid, bdid, table } => {
            classify(table, *cpid, *bdid)
        }
        Commands::Table { table } => {
            load_table(table).map(|table| print_table(&table))
        }
    } {
        eprintln!("Error: {err}");
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn load_table(path: &Option<PathBuf>) -> Result<DeviceTable, CliError> {
    match path {
        Some(path) => {
            debug!("loading device table from {}", path.display());
            Ok(DeviceTable::load(path)?)
        }
        None => Ok(DeviceTable::default()),
    }
}

fn enter_dfu(
    table: &Option<PathBuf>,
    identity: Option<(u16, u8)>,
    attempts: u32,
) -> Result<(), CliError> {
    let table = load_table(table)?;
    let cancel = CancelToken::new();

    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        if handler_token.is_cancelled() {
            std::process::exit(130);
        }
        handler_token.cancel();
    })?;

    let config = EntryConfig {
        reconnect_attempts: attempts,
        identity: identity.map(|(cpid, bdid)| DeviceIdentity::new(cpid, bdid)),
        ..Default::default()
    };
    let mut observer = ConsoleObserver::new();
    let mut gate = StdinGate::new(cancel.clone());

    let summary = DfuEntry::new(
        NusbBus::new(),
        &table,
        config,
        cancel,
        &mut observer,
        &mut gate,
    )
    .run()?;
    debug!("{} ({:?}) is in DFU mode", summary.identity, summary.entry_type);
    Ok(())
}

fn classify(
    table: &Option<PathBuf>,
    cpid: u16,
    bdid: u8,
) -> Result<(), CliError> {
    let table = load_table(table)?;
    let entry_type = table.classify(cpid, bdid);
    print!("CPID 0x{cpid:04x} BDID 0x{bdid:02x}: {entry_type:?}");
    match entry_type.procedure() {
        Some(procedure) => println!(
            " ({}, hold {} s, release {} s)",
            procedure.button, procedure.hold_ticks, procedure.release_ticks
        ),
        None => println!(),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_enter_is_default() {
        let cli = Cli::try_parse_from(["recdfu"]).unwrap();
        assert!(matches!(
            cli.command.unwrap_or_default(),
            Commands::Enter {
                table: None,
                cpid: None,
                bdid: None,
                attempts: 5
            }
        ));
    }

    #[test]
    fn test_identity_override_needs_both_ids() {
        assert!(
            Cli::try_parse_from(["recdfu", "enter", "--cpid", "0x8015"])
                .is_err()
        );
        let cli = Cli::try_parse_from([
            "recdfu", "enter", "--cpid", "0x8015", "--bdid", "0x0e",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Enter {
                cpid: Some(0x8015),
                bdid: Some(0x0e),
                ..
            })
        ));
    }

    #[test]
    fn test_classify_parses_hex() {
        let cli =
            Cli::try_parse_from(["recdfu", "classify", "0x8010", "8"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Classify {
                cpid: 0x8010,
                bdid: 8,
                table: None
            })
        ));
    }
}
