// Copyright 2024 Kevin Ludwig
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::time::SystemTime;

use chrono::{DateTime, Datelike, Local, Timelike};
use civet_err::{Error, Result};
use zerocopy::{
    little_endian::{U16, U32},
    FromBytes, Immutable, IntoBytes, KnownLayout,
};

/// ATTR_HIDDEN. Entries carrying it are invisible to every walker.
pub const ATTR_HIDDEN: u8 = 0x02;
/// ATTR_VOLUME_ID. At most one root entry, holding the volume label.
pub const ATTR_VOLUME_LABEL: u8 = 0x08;
/// ATTR_DIRECTORY.
pub const ATTR_DIRECTORY: u8 = 0x10;
/// ATTR_ARCHIVE. Set on every file this engine creates.
pub const ATTR_ARCHIVE: u8 = 0x20;

/// First name byte of a never-used directory slot.
pub const NAME_FREE: u8 = 0x00;
/// First name byte of a deleted directory slot.
pub const NAME_DELETED: u8 = 0xE5;

pub const ENTRY_SIZE: usize = 32;

/// "Short" (8.3 format) directory entry, 32 bytes on disk.
#[repr(C)]
#[derive(Debug, Clone, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct DirEntry {
    /// File name limited to 8 characters, ASCII, space padded. The first
    /// byte doubles as the slot state: 0x00 never used, 0xE5 deleted, '.'
    /// the self/parent entries of a subdirectory.
    pub name: [u8; 8],
    /// File name extension, 3 characters, ASCII, space padded.
    pub extension: [u8; 3],
    /// Attribute flags; see the ATTR_* constants.
    pub attributes: u8,
    /// Reserved. Must be set to 0.
    pub reserved: u8,
    /// Component of the file creation time, in counts of tenths of a
    /// second. Valid range is 0..=199.
    pub creation_time_tenths: u8,
    /// Creation time. Granularity is 2 seconds.
    pub creation_time: U16,
    /// Creation date.
    pub creation_date: U16,
    /// Last access date; must equal the last write date after a write.
    pub last_access_date: U16,
    /// High word of the first data cluster number. Must be set to 0 on
    /// volumes formatted FAT12/FAT16.
    pub first_cluster_high: U16,
    /// Last modification (write) time.
    pub last_write_time: U16,
    /// Last modification (write) date.
    pub last_write_date: U16,
    /// Low word of the first data cluster number for the file or directory
    /// described by this entry.
    pub first_cluster: U16,
    /// Size in bytes of the file described by this entry.
    pub file_size: U32,
}

/// How a walker treats one directory slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Slot never used (first name byte 0x00).
    Free,
    /// Slot held a deleted entry (first name byte 0xE5).
    Deleted,
    /// The '.' or '..' entry of a subdirectory.
    Dot,
    /// The root volume-label entry.
    VolumeLabel,
    /// Carries ATTR_HIDDEN; skipped by every walker.
    Hidden,
    Directory,
    File,
}

impl DirEntry {
    pub fn kind(&self) -> EntryKind {
        match self.name[0] {
            NAME_FREE => EntryKind::Free,
            NAME_DELETED => EntryKind::Deleted,
            b'.' if matches!(self.name[1], b' ' | b'.') => EntryKind::Dot,
            _ => {
                if self.attributes & ATTR_HIDDEN != 0 {
                    EntryKind::Hidden
                } else if self.attributes & ATTR_VOLUME_LABEL != 0 {
                    EntryKind::VolumeLabel
                } else if self.attributes & ATTR_DIRECTORY != 0 {
                    EntryKind::Directory
                } else {
                    EntryKind::File
                }
            }
        }
    }

    /// Whether this slot can hold a new entry.
    pub fn is_free_slot(&self) -> bool {
        matches!(self.name[0], NAME_FREE | NAME_DELETED)
    }

    /// A file entry must also point at a plausible chain; first cluster 0
    /// and 1 are reserved FAT entries, not data.
    pub fn is_file(&self) -> bool {
        self.kind() == EntryKind::File && !matches!(self.first_cluster.get(), 0 | 1)
    }

    /// The 8-character half of the name with trailing spaces removed.
    pub fn base_name(&self) -> String {
        trimmed(&self.name)
    }

    /// Canonical `NAME.EXT` form: both halves trimmed of trailing spaces,
    /// joined with '.' when an extension is present, upper case.
    pub fn canonical_name(&self) -> String {
        let base = trimmed(&self.name);
        let extension = trimmed(&self.extension);
        let joined = if extension.is_empty() {
            base
        } else {
            format!("{base}.{extension}")
        };

        joined.to_uppercase()
    }
}

fn trimmed(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).trim_end_matches(' ').to_string()
}

/// Splits `name` at its first '.' into the space-padded, upper-cased 8.3
/// on-disk halves. Overlong halves are truncated, matching what the disk
/// format can hold.
pub fn encode_8_3(name: &str) -> Result<([u8; 8], [u8; 3])> {
    let (base, extension) = match name.split_once('.') {
        Some((base, extension)) => (base, extension),
        None => (name, ""),
    };
    if base.is_empty() {
        return Err(Error::InvalidInput(format!("empty file name in {name:?}")));
    }

    let mut name_bytes = [b' '; 8];
    for (slot, byte) in name_bytes.iter_mut().zip(base.bytes()) {
        *slot = byte.to_ascii_uppercase();
    }
    let mut extension_bytes = [b' '; 3];
    for (slot, byte) in extension_bytes.iter_mut().zip(extension.bytes()) {
        *slot = byte.to_ascii_uppercase();
    }

    Ok((name_bytes, extension_bytes))
}

/// Calendar fields of a FAT timestamp. Seconds carry the format's 2-second
/// granularity through encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl Timestamp {
    /// Packs into the on-disk (date, time) pair:
    /// date = (year - 1980) << 9 | month << 5 | day,
    /// time = hour << 11 | minute << 5 | second / 2.
    pub fn encode(&self) -> (u16, u16) {
        let date =
            (self.year.saturating_sub(1980) << 9) | ((self.month as u16) << 5) | self.day as u16;
        let time =
            ((self.hour as u16) << 11) | ((self.minute as u16) << 5) | (self.second as u16 / 2);

        (date, time)
    }

    pub fn decode(date: u16, time: u16) -> Self {
        Self {
            year: ((date >> 9) & 0x7F) + 1980,
            month: ((date >> 5) & 0x0F) as u8,
            day: (date & 0x1F) as u8,
            hour: ((time >> 11) & 0x1F) as u8,
            minute: ((time >> 5) & 0x3F) as u8,
            second: ((time & 0x1F) * 2) as u8,
        }
    }
}

impl From<SystemTime> for Timestamp {
    fn from(time: SystemTime) -> Self {
        let local: DateTime<Local> = time.into();
        Self {
            // The representable range starts at 1980; earlier mtimes clamp.
            year: local.year().clamp(1980, 2107) as u16,
            month: local.month() as u8,
            day: local.day() as u8,
            hour: local.hour() as u8,
            minute: local.minute() as u8,
            second: local.second() as u8,
        }
    }
}

#[cfg(test)]
mod tests {
    use zerocopy::FromZeros;

    use super::*;

    fn entry(name: &[u8; 8], extension: &[u8; 3], attributes: u8) -> DirEntry {
        let mut entry = DirEntry::new_zeroed();
        entry.name = *name;
        entry.extension = *extension;
        entry.attributes = attributes;
        entry
    }

    #[test]
    fn dir_entry_layout_is_32_bytes() {
        assert_eq!(size_of::<DirEntry>(), ENTRY_SIZE);
    }

    #[test]
    fn canonical_name_trims_and_joins() {
        let entry = entry(b"README  ", b"MD ", ATTR_ARCHIVE);
        assert_eq!(entry.canonical_name(), "README.MD");
    }

    #[test]
    fn canonical_name_without_extension_has_no_dot() {
        let entry = entry(b"SUBDIR  ", b"   ", ATTR_DIRECTORY);
        assert_eq!(entry.canonical_name(), "SUBDIR");
    }

    #[test]
    fn kind_classifies_slot_states() {
        let mut slot = entry(b"FOO     ", b"TXT", ATTR_ARCHIVE);
        assert_eq!(slot.kind(), EntryKind::File);

        slot.name[0] = NAME_FREE;
        assert_eq!(slot.kind(), EntryKind::Free);
        slot.name[0] = NAME_DELETED;
        assert_eq!(slot.kind(), EntryKind::Deleted);

        assert_eq!(entry(b".       ", b"   ", ATTR_DIRECTORY).kind(), EntryKind::Dot);
        assert_eq!(entry(b"..      ", b"   ", ATTR_DIRECTORY).kind(), EntryKind::Dot);
        assert_eq!(entry(b"NO NAME ", b"   ", ATTR_VOLUME_LABEL).kind(), EntryKind::VolumeLabel);
        assert_eq!(entry(b"SECRET  ", b"TXT", ATTR_HIDDEN).kind(), EntryKind::Hidden);
        assert_eq!(entry(b"SUBDIR  ", b"   ", ATTR_DIRECTORY).kind(), EntryKind::Directory);
    }

    #[test]
    fn file_entries_require_a_data_cluster() {
        let mut slot = entry(b"FOO     ", b"TXT", ATTR_ARCHIVE);
        assert!(!slot.is_file());
        slot.first_cluster = U16::new(2);
        assert!(slot.is_file());
    }

    #[test]
    fn encode_8_3_uppercases_and_pads() {
        assert_eq!(
            encode_8_3("readme.md").unwrap(),
            (*b"README  ", *b"MD ")
        );
        assert_eq!(encode_8_3("KERNEL").unwrap(), (*b"KERNEL  ", *b"   "));
    }

    #[test]
    fn encode_8_3_truncates_overlong_halves() {
        assert_eq!(
            encode_8_3("verylongname.text").unwrap(),
            (*b"VERYLONG", *b"TEX")
        );
    }

    #[test]
    fn encode_8_3_rejects_empty_base() {
        assert!(encode_8_3(".md").is_err());
        assert!(encode_8_3("").is_err());
    }

    #[test]
    fn timestamp_packs_bit_exact() {
        let timestamp = Timestamp {
            year: 2024,
            month: 3,
            day: 5,
            hour: 14,
            minute: 30,
            second: 20,
        };
        let (date, time) = timestamp.encode();
        assert_eq!(date, (44 << 9) | (3 << 5) | 5);
        assert_eq!(time, (14 << 11) | (30 << 5) | 10);
    }

    #[test]
    fn timestamp_round_trips_modulo_two_seconds() {
        let timestamp = Timestamp {
            year: 1999,
            month: 12,
            day: 31,
            hour: 23,
            minute: 59,
            second: 31,
        };
        let (date, time) = timestamp.encode();
        let decoded = Timestamp::decode(date, time);
        assert_eq!(decoded.second, 30);
        assert_eq!(
            Timestamp {
                second: 30,
                ..timestamp
            },
            decoded
        );

        // Re-encoding the decoded value is a fixed point.
        assert_eq!(decoded.encode(), (date, time));
    }
}
