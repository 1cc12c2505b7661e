use std::{fs, path::Path};

use log::debug;
use nonempty::NonEmpty;
use serde::Deserialize;

use crate::DfuError;

/// Reserved CPID terminating a device table
pub const SENTINEL_CPID: u16 = 0xffff;

/// BDID used by entries that apply to every board of a chip
pub const ANY_BDID: u8 = 0xff;

/// Chip IDs shared by boards needing different button sequences
pub const DEFAULT_MIXED_CPIDS: &[u16] = &[0x8010];

const BUILTIN_ENTRIES: &[DeviceClassEntry] = &[
    // Apple A11 Bionic (iPhone 8/X)
    DeviceClassEntry::new(0x8015, ANY_BDID, EntryType::FamilyB),
];

/// Button sequence strategy of a device class
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntryType {
    /// Devices with a physical home button
    Legacy,
    /// Home button replaced by a capacitive one (iPhone 7 generation)
    FamilyA,
    /// Devices without home button (iPhone 8/X generation)
    FamilyB,
    Unsupported,
}

/// Operator procedure for one [EntryType]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ButtonProcedure {
    /// Button held together with the side button
    pub button: &'static str,
    /// Length of the window holding both buttons, in ticks
    pub hold_ticks: u32,
    /// Length of the window holding only [ButtonProcedure::button], in ticks
    pub release_ticks: u32,
}

impl EntryType {
    pub fn procedure(&self) -> Option<ButtonProcedure> {
        let button = match self {
            EntryType::Legacy => "Home button",
            EntryType::FamilyA | EntryType::FamilyB => "Volume down button",
            EntryType::Unsupported => return None,
        };
        Some(ButtonProcedure {
            button,
            hold_ticks: 4,
            release_ticks: 10,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub struct DeviceClassEntry {
    pub cpid: u16,
    #[serde(default = "any_bdid")]
    pub bdid: u8,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
}

fn any_bdid() -> u8 {
    ANY_BDID
}

impl DeviceClassEntry {
    pub const fn new(cpid: u16, bdid: u8, entry_type: EntryType) -> Self {
        Self {
            cpid,
            bdid,
            entry_type,
        }
    }
}

/// Entries sharing one CPID, in table order
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceGroup {
    cpid: u16,
    mixed: bool,
    entries: NonEmpty<DeviceClassEntry>,
}

impl DeviceGroup {
    pub fn cpid(&self) -> u16 {
        self.cpid
    }

    /// Whether boards of this chip need a BDID lookup
    pub fn is_mixed(&self) -> bool {
        self.mixed
    }

    pub fn entries(&self) -> &NonEmpty<DeviceClassEntry> {
        &self.entries
    }

    fn select(&self, bdid: u8) -> EntryType {
        if self.mixed {
            self.entries
                .iter()
                .find(|entry| entry.bdid == bdid)
                .map_or(EntryType::Unsupported, |entry| entry.entry_type)
        } else {
            self.entries.first().entry_type
        }
    }
}

#[derive(Deserialize)]
struct TableFile {
    /// Leaving the key out keeps [DEFAULT_MIXED_CPIDS], `mixed = []`
    /// disables BDID lookups
    #[serde(default = "default_mixed")]
    mixed: Vec<u16>,
    #[serde(default, rename = "device")]
    devices: Vec<DeviceClassEntry>,
}

fn default_mixed() -> Vec<u16> {
    DEFAULT_MIXED_CPIDS.to_vec()
}

/// Ordered registry mapping chip and board IDs to [EntryType]
///
/// Entries are grouped by CPID in order of first appearance. A group of a
/// "mixed" CPID is searched for the board ID of the device, any other
/// group resolves to its first entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceTable {
    groups: Vec<DeviceGroup>,
}

impl DeviceTable {
    /// Build a table from ordered entries
    ///
    /// Entries following a [SENTINEL_CPID] entry are ignored.
    pub fn new<I>(entries: I, mixed: &[u16]) -> Self
    where
        I: IntoIterator<Item = DeviceClassEntry>,
    {
        let mut groups: Vec<DeviceGroup> = Vec::new();
        for entry in entries
            .into_iter()
            .take_while(|entry| entry.cpid != SENTINEL_CPID)
        {
            match groups.iter_mut().find(|group| group.cpid == entry.cpid) {
                Some(group) => group.entries.push(entry),
                None => groups.push(DeviceGroup {
                    cpid: entry.cpid,
                    mixed: mixed.contains(&entry.cpid),
                    entries: NonEmpty::new(entry),
                }),
            }
        }
        DeviceTable { groups }
    }

    pub fn from_toml_str(s: &str) -> Result<Self, DfuError> {
        let file: TableFile = toml::from_str(s)?;
        Ok(Self::new(file.devices, &file.mixed))
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, DfuError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn groups(&self) -> &[DeviceGroup] {
        &self.groups
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn classify(&self, cpid: u16, bdid: u8) -> EntryType {
        let entry_type = self
            .groups
            .iter()
            .find(|group| group.cpid == cpid)
            .map_or(EntryType::Unsupported, |group| group.select(bdid));
        debug!(
            "classify CPID 0x{:04x} BDID 0x{:02x}: {:?}",
            cpid, bdid, entry_type
        );
        entry_type
    }
}

impl Default for DeviceTable {
    fn default() -> Self {
        Self::new(BUILTIN_ENTRIES.iter().copied(), DEFAULT_MIXED_CPIDS)
    }
}
