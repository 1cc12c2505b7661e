use std::{fmt, sync::LazyLock};

use log::warn;
use regex::Regex;

use crate::DfuError;

static SERIAL_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([A-Z]{4}):(\[[^\]]*\]|[0-9A-Fa-f]+)").unwrap()
});

/// Identification fields reported in the iBoot serial number string
///
/// Example string, on a single line:
///
/// ```text
/// CPID:8015 CPRV:11 CPFM:03 SCEP:01 BDID:0E ECID:001A2B3C4D5E6F70
/// IBFL:3C SRTG:[iBoot-3332.0.0.1.23]
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub cpid: u16,
    pub bdid: u8,
    pub cprv: Option<u8>,
    pub cpfm: Option<u8>,
    pub scep: Option<u8>,
    pub ecid: Option<u64>,
    pub ibfl: Option<u8>,
    pub srtg: Option<String>,
}

impl DeviceIdentity {
    pub fn new(cpid: u16, bdid: u8) -> Self {
        DeviceIdentity {
            cpid,
            bdid,
            ..Default::default()
        }
    }

    /// Parse a serial number string; `CPID` and `BDID` are mandatory
    pub fn parse(serial: &str) -> Result<Self, DfuError> {
        let mut cpid = None;
        let mut bdid = None;
        let mut identity = DeviceIdentity::default();

        for field in SERIAL_FIELD.captures_iter(serial) {
            let value = &field[2];
            match &field[1] {
                "CPID" => cpid = hex(value),
                "BDID" => bdid = hex(value),
                "CPRV" => identity.cprv = hex(value),
                "CPFM" => identity.cpfm = hex(value),
                "SCEP" => identity.scep = hex(value),
                "ECID" => identity.ecid = hex(value),
                "IBFL" => identity.ibfl = hex(value),
                "SRTG" => {
                    identity.srtg =
                        Some(value.trim_matches(['[', ']']).to_string())
                }
                _ => {}
            }
        }

        match (cpid, bdid) {
            (Some(cpid), Some(bdid)) => Ok(DeviceIdentity {
                cpid,
                bdid,
                ..identity
            }),
            _ => Err(DfuError::InvalidSerialNumber(serial.to_string())),
        }
    }
}

fn hex<T>(value: &str) -> Option<T>
where
    T: TryFrom<u64>,
{
    let parsed = u64::from_str_radix(value, 16)
        .ok()
        .and_then(|v| T::try_from(v).ok());
    if parsed.is_none() {
        warn!("ignoring out of range serial number field {value:?}");
    }
    parsed
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CPID: 0x{:04x} BDID: 0x{:02x}", self.cpid, self.bdid)?;
        if let Some(ecid) = self.ecid {
            write!(f, " ECID: 0x{:016x}", ecid)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FAMILY_B_SERIAL;

    #[test]
    fn test_parse_recovery_serial() {
        let identity = DeviceIdentity::parse(FAMILY_B_SERIAL).unwrap();
        assert_eq!(
            identity,
            DeviceIdentity {
                cpid: 0x8015,
                bdid: 0x0e,
                cprv: Some(0x11),
                cpfm: Some(0x03),
                scep: Some(0x01),
                ecid: Some(0x001A2B3C4D5E6F70),
                ibfl: Some(0x3c),
                srtg: Some("iBoot-3332.0.0.1.23".into()),
            }
        );
    }

    #[test]
    fn test_parse_minimal_serial() {
        let identity = DeviceIdentity::parse("CPID:8010 BDID:08").unwrap();
        assert_eq!(identity, DeviceIdentity::new(0x8010, 0x08));
    }

    #[test]
    fn test_parse_rejects_missing_fields() {
        assert!(matches!(
            DeviceIdentity::parse("CPID:8015 ECID:1234"),
            Err(DfuError::InvalidSerialNumber(_))
        ));
        // BDID does not fit into a byte
        assert!(DeviceIdentity::parse("CPID:8015 BDID:1FF").is_err());
    }

    #[test]
    fn test_display() {
        let mut identity = DeviceIdentity::new(0x8015, 0x0e);
        assert_eq!(identity.to_string(), "CPID: 0x8015 BDID: 0x0e");
        identity.ecid = Some(0xabc);
        assert_eq!(
            identity.to_string(),
            "CPID: 0x8015 BDID: 0x0e ECID: 0x0000000000000abc"
        );
    }
}
