use std::{fmt::Display, io};

use recdfu::{DfuError, EntryError};

pub enum CliError {
    IO(io::Error),
    Dfu(DfuError),
    Entry(EntryError),
    Signal(ctrlc::Error),
}

impl From<io::Error> for CliError {
    fn from(value: io::Error) -> Self {
        CliError::IO(value)
    }
}

impl From<DfuError> for CliError {
    fn from(value: DfuError) -> Self {
        CliError::Dfu(value)
    }
}

impl From<EntryError> for CliError {
    fn from(value: EntryError) -> Self {
        CliError::Entry(value)
    }
}

impl From<ctrlc::Error> for CliError {
    fn from(value: ctrlc::Error) -> Self {
        CliError::Signal(value)
    }
}

impl Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::IO(err) => write!(f, "IO error: {err}"),
            CliError::Dfu(err) => write!(f, "{err}"),
            CliError::Entry(err) => write!(f, "{err}"),
            CliError::Signal(err) => {
                write!(f, "Failed to install Ctrl-C handler: {err}")
            }
        }
    }
}
