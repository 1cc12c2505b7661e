#[derive(Debug)]
pub enum DfuError {
    Usb(nusb::Error),
    Io(std::io::Error),
    Config(toml::de::Error),
    NoSerialNumber,
    InvalidSerialNumber(String),
    Cancelled,
}

impl std::error::Error for DfuError {}

impl std::fmt::Display for DfuError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DfuError::Usb(err) => write!(f, "USB error: {}", err),
            DfuError::Io(err) => write!(f, "IO error: {}", err),
            DfuError::Config(err) => {
                write!(f, "Invalid device table: {}", err)
            }
            DfuError::NoSerialNumber => {
                write!(f, "Device did not report a serial number")
            }
            DfuError::InvalidSerialNumber(serial) => {
                write!(f, "Unrecognized serial number: {:?}", serial)
            }
            DfuError::Cancelled => write!(f, "Cancelled"),
        }
    }
}

impl From<nusb::Error> for DfuError {
    fn from(err: nusb::Error) -> Self {
        DfuError::Usb(err)
    }
}

impl From<std::io::Error> for DfuError {
    fn from(err: std::io::Error) -> Self {
        DfuError::Io(err)
    }
}

impl From<toml::de::Error> for DfuError {
    fn from(err: toml::de::Error) -> Self {
        DfuError::Config(err)
    }
}
