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

use zerocopy::{
    little_endian::{U16, U32},
    FromBytes, Immutable, IntoBytes, KnownLayout,
};

/// The structurally significant prefix of sector 0 on a FAT12 volume (the
/// BPB plus the extended boot signature block, 62 bytes). The remainder of
/// the sector is bootstrap code and the 0x55 0xAA signature word, neither of
/// which this engine interprets.
#[repr(C)]
#[derive(Debug, Clone, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct BootSector {
    /// Jump instruction to boot code, either 0xEB 0x?? 0x90 or 0xE9 0x?? 0x??.
    pub jump: [u8; 3],
    /// OEM name identifier, ASCII, space padded. Typically an indication of
    /// what system formatted the volume.
    pub oem_name: [u8; 8],

    /// Count of bytes per sector. May take on only the values 512, 1024,
    /// 2048 or 4096.
    pub bytes_per_sector: U16,
    /// Number of sectors per allocation unit. Must be a power of 2 that is
    /// greater than 0.
    pub sectors_per_cluster: u8,
    /// Number of sectors in the reserved region, starting at the first
    /// sector of the volume. Must not be 0; the FAT region begins directly
    /// after it.
    pub reserved_sector_count: U16,
    /// The count of file allocation tables on the volume. A value of 2 is
    /// recommended although a value of 1 is acceptable.
    pub fat_copies: u8,
    /// Count of 32-byte directory entries in the root directory. The value
    /// multiplied by 32 must be an even multiple of bytes per sector.
    pub max_root_entries: U16,
    /// The 16-bit total count of sectors on the volume, all regions
    /// included. If 0, the 32-bit count must be non-zero.
    pub total_sectors_16: U16,
    /// Media descriptor. 0xF8 for fixed media, 0xF0 for removable.
    pub media_descriptor: u8,
    /// The FAT12/FAT16 16-bit count of sectors occupied by one FAT.
    pub sectors_per_fat: U16,

    /// Sectors per track for interrupt 0x13, only relevant for media with a
    /// geometry.
    pub sectors_per_track: U16,
    /// Number of heads for interrupt 0x13. On a 1.44 MB 3.5-inch floppy this
    /// value is 2.
    pub head_count: U16,
    /// Count of hidden sectors preceding the partition that contains this
    /// volume. Must be zero on unpartitioned media.
    pub hidden_sectors: U32,
    /// The 32-bit total count of sectors, used when the 16-bit count does
    /// not fit.
    pub total_sectors_32: U32,

    /// Interrupt 0x13 drive number, 0x80 or 0x00.
    pub drive_number: u8,
    /// Reserved. Set value to 0x0.
    pub reserved: u8,
    /// Extended boot signature, 0x29 if the following three fields are
    /// present.
    pub extended_boot_signature: u8,
    /// Volume serial number, generated from the date and time of formatting.
    pub volume_id: U32,
    /// Volume label. Matches the 11-byte volume label recorded in the root
    /// directory; "NO NAME    " (or blank) when the label lives only there.
    pub volume_label: [u8; 11],
    /// One of the strings "FAT12   ", "FAT16   ", or "FAT     ".
    /// Informational only; does not determine the FAT type.
    pub filesystem_type: [u8; 8],
}

/// Volume geometry derived from the boot sector, with every region resolved
/// to absolute byte offsets.
#[derive(Debug, Clone)]
pub struct Geometry {
    pub bytes_per_sector: u32,
    pub sectors_per_cluster: u32,
    pub fat_copies: u8,
    pub max_root_entries: u32,
    pub total_sectors: u32,
    pub sectors_per_fat: u32,
    pub oem_name: [u8; 8],
    pub volume_label: [u8; 11],

    /// Byte offset of the first FAT copy.
    pub fat_offset: u64,
    /// Byte length of one FAT copy.
    pub fat_len: usize,
    /// Byte offset of the root directory region.
    pub root_offset: u64,
    /// Byte length of the root directory region.
    pub root_len: usize,
    /// First sector of the data area (sector 33 on the standard layout).
    pub data_start_sector: u32,
    /// Exclusive upper bound on FAT entry indices backed by the data area.
    /// Entries 0 and 1 are reserved, so cluster N occupies data sectors
    /// starting at `data_start_sector + (N - 2) * sectors_per_cluster`.
    pub cluster_count: u16,
}

impl Geometry {
    pub fn cluster_size(&self) -> usize {
        (self.sectors_per_cluster * self.bytes_per_sector) as usize
    }

    /// Absolute byte offset of the first sector of a data cluster.
    pub fn cluster_offset(&self, cluster: u16) -> u64 {
        let sector = self.data_start_sector + (cluster as u32 - 2) * self.sectors_per_cluster;
        sector as u64 * self.bytes_per_sector as u64
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_sectors as u64 * self.bytes_per_sector as u64
    }
}

#[cfg(test)]
mod tests {
    use zerocopy::IntoBytes;

    use super::*;

    #[test]
    fn boot_sector_layout_is_62_bytes() {
        assert_eq!(size_of::<BootSector>(), 62);
    }

    #[test]
    fn boot_sector_fields_decode_little_endian() {
        let mut bytes = [0u8; 62];
        bytes[3..11].copy_from_slice(b"mkfs.fat");
        bytes[11..13].copy_from_slice(&512u16.to_le_bytes());
        bytes[13] = 1;
        bytes[14..16].copy_from_slice(&1u16.to_le_bytes());
        bytes[16] = 2;
        bytes[17..19].copy_from_slice(&224u16.to_le_bytes());
        bytes[19..21].copy_from_slice(&2880u16.to_le_bytes());
        bytes[22..24].copy_from_slice(&9u16.to_le_bytes());

        let boot = BootSector::read_from_bytes(&bytes[..]).unwrap();
        assert_eq!(&boot.oem_name, b"mkfs.fat");
        assert_eq!(boot.bytes_per_sector.get(), 512);
        assert_eq!(boot.sectors_per_cluster, 1);
        assert_eq!(boot.reserved_sector_count.get(), 1);
        assert_eq!(boot.fat_copies, 2);
        assert_eq!(boot.max_root_entries.get(), 224);
        assert_eq!(boot.total_sectors_16.get(), 2880);
        assert_eq!(boot.sectors_per_fat.get(), 9);
        assert_eq!(boot.as_bytes(), &bytes[..]);
    }
}
