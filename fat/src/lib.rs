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

pub mod boot;
pub mod dir;
pub mod table;

use civet_ds::DataStorage;
pub use civet_err::{Error, Result};
use log::{debug, error};
use zerocopy::{
    little_endian::{U16, U32},
    FromBytes, FromZeros, IntoBytes,
};

use crate::{
    boot::{BootSector, Geometry},
    dir::{DirEntry, EntryKind, Timestamp, ATTR_ARCHIVE, ENTRY_SIZE},
    table::Fat,
};

/// Bound on directory nesting; a corrupt tree that references an ancestor
/// cluster terminates here instead of recursing forever.
const MAX_DIR_DEPTH: usize = 32;

/// The largest cluster index a FAT12 table can address; larger data areas
/// belong to FAT16/FAT32 volumes.
const FAT12_MAX_CLUSTER_COUNT: u32 = 0xFF7;

/// A FAT12 volume on top of offset-addressed storage.
pub struct Volume<DS: DataStorage> {
    storage: DS,
    geometry: Geometry,
}

/// Capacity and content summary of a volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeInfo {
    pub os_name: String,
    pub volume_label: String,
    pub total_bytes: u64,
    pub free_bytes: u64,
    /// Files in the root directory and every subdirectory; directories
    /// themselves are not counted.
    pub file_count: u32,
    pub fat_copies: u8,
    pub sectors_per_fat: u32,
}

/// One directory's visible entries, in on-disk order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirListing {
    /// `ROOT` for the root directory, `/NAME` for a subdirectory.
    pub path: String,
    pub entries: Vec<ListEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    pub directory: bool,
    pub size: u32,
    pub name: String,
    pub created: Timestamp,
}

/// Where an insertion places its directory entry.
#[derive(Debug, Clone, Copy)]
pub enum Target {
    Root,
    /// First cluster of an existing subdirectory, from [`Volume::resolve_dir`].
    Directory(u16),
}

impl<DS: DataStorage> Volume<DS> {
    /// Decodes and validates the boot sector, deriving the volume geometry.
    pub fn open(storage: DS) -> Result<Self> {
        let mut sector = [0; 512];
        storage.read(0, &mut sector)?;
        let (boot, _) = BootSector::read_from_prefix(&sector[..])
            .map_err(|_| Error::Format("boot sector truncated"))?;

        let bytes_per_sector = boot.bytes_per_sector.get() as u32;
        if !bytes_per_sector.is_power_of_two() || !(512..=4096).contains(&bytes_per_sector) {
            error!("Bytes per sector ({bytes_per_sector}) shall be 512, 1024, 2048 or 4096");
            return Err(Error::Format("bytes per sector"));
        }
        let sectors_per_cluster = boot.sectors_per_cluster as u32;
        if !sectors_per_cluster.is_power_of_two() {
            error!("Sectors per cluster ({sectors_per_cluster}) shall be a power of 2");
            return Err(Error::Format("sectors per cluster"));
        }
        let reserved_sector_count = boot.reserved_sector_count.get() as u32;
        if reserved_sector_count == 0 {
            error!("Reserved sector count shall not be 0");
            return Err(Error::Format("reserved sector count"));
        }
        let fat_copies = boot.fat_copies;
        if fat_copies != 1 && fat_copies != 2 {
            error!("Number of FATs ({fat_copies}) shall be 1 or 2");
            return Err(Error::Format("number of FATs"));
        }
        let sectors_per_fat = boot.sectors_per_fat.get() as u32;
        if sectors_per_fat == 0 {
            error!("Sectors per FAT shall not be 0");
            return Err(Error::Format("sectors per FAT"));
        }
        let max_root_entries = boot.max_root_entries.get() as u32;
        let root_len = max_root_entries as usize * ENTRY_SIZE;
        if max_root_entries == 0 || root_len % bytes_per_sector as usize != 0 {
            error!("Root directory entries ({max_root_entries}) shall fill whole sectors");
            return Err(Error::Format("root directory entries"));
        }
        let total_sectors = if boot.total_sectors_16.get() != 0 {
            boot.total_sectors_16.get() as u32
        } else {
            boot.total_sectors_32.get()
        };

        let root_sectors = root_len as u32 / bytes_per_sector;
        let data_start_sector =
            reserved_sector_count + fat_copies as u32 * sectors_per_fat + root_sectors;
        if total_sectors <= data_start_sector {
            error!("Total sectors ({total_sectors}) shall extend past the root directory ({data_start_sector})");
            return Err(Error::Format("no data area"));
        }
        let cluster_count = (total_sectors - data_start_sector) / sectors_per_cluster + 2;
        if cluster_count > FAT12_MAX_CLUSTER_COUNT {
            error!("Cluster count ({cluster_count}) shall be addressable by 12-bit entries");
            return Err(Error::Format("not a FAT12 volume"));
        }
        let fat_len = (sectors_per_fat * bytes_per_sector) as usize;
        if fat_len * 2 / 3 < cluster_count as usize {
            error!("FAT region ({fat_len} bytes) shall cover the data area ({cluster_count} entries)");
            return Err(Error::Format("FAT region too small"));
        }

        Ok(Self {
            storage,
            geometry: Geometry {
                bytes_per_sector,
                sectors_per_cluster,
                fat_copies,
                max_root_entries,
                total_sectors,
                sectors_per_fat,
                oem_name: boot.oem_name,
                volume_label: boot.volume_label,
                fat_offset: (reserved_sector_count * bytes_per_sector) as u64,
                fat_len,
                root_offset: ((reserved_sector_count + fat_copies as u32 * sectors_per_fat)
                    * bytes_per_sector) as u64,
                root_len,
                data_start_sector,
                cluster_count: cluster_count as u16,
            },
        })
    }

    /// Capacity report: identity, total/free bytes and the recursive file
    /// count. When the boot sector's label is blank the root directory is
    /// scanned for the volume-label entry instead.
    pub fn info(&self) -> Result<VolumeInfo> {
        let fat = self.read_fat()?;
        let root = self.root_entries()?;

        let volume_label = if is_blank(&self.geometry.volume_label) {
            root.iter()
                .find(|entry| entry.kind() == EntryKind::VolumeLabel)
                .map(label_text)
                .unwrap_or_default()
        } else {
            String::from_utf8_lossy(&self.geometry.volume_label)
                .trim_end_matches(' ')
                .to_string()
        };

        let mut file_count = 0;
        self.count_files(&fat, &root, 0, &mut file_count)?;

        Ok(VolumeInfo {
            os_name: String::from_utf8_lossy(&self.geometry.oem_name)
                .trim_end_matches(' ')
                .to_string(),
            volume_label,
            total_bytes: self.geometry.total_bytes(),
            free_bytes: (fat.free_count() * self.geometry.cluster_size()) as u64,
            file_count,
            fat_copies: self.geometry.fat_copies,
            sectors_per_fat: self.geometry.sectors_per_fat,
        })
    }

    /// Lists the root directory and every subdirectory. The root block comes
    /// first; below it, every directory cluster contributes a block of its
    /// visible entries followed immediately by the blocks of that cluster's
    /// subdirectories, before the next cluster of the chain is read. A
    /// directory spanning several clusters therefore repeats its `/NAME`
    /// block once per cluster.
    pub fn list(&self) -> Result<Vec<DirListing>> {
        let fat = self.read_fat()?;
        let root = self.root_entries()?;

        let mut listings = vec![DirListing {
            path: "ROOT".to_string(),
            entries: root.iter().filter_map(visible).collect(),
        }];
        for entry in &root {
            if entry.kind() == EntryKind::Directory {
                self.list_dir(&fat, entry, 1, &mut listings)?;
            }
        }

        Ok(listings)
    }

    fn list_dir(
        &self,
        fat: &Fat,
        dir_entry: &DirEntry,
        depth: usize,
        listings: &mut Vec<DirListing>,
    ) -> Result<()> {
        if depth > MAX_DIR_DEPTH {
            error!("Directory tree deeper than {MAX_DIR_DEPTH} levels");
            return Err(Error::Format("directory tree too deep"));
        }

        // One cluster at a time: emit this cluster's entries, then descend
        // into this cluster's subdirectories, then advance the chain.
        for cluster in fat.chain(dir_entry.first_cluster.get()) {
            let entries = self.cluster_entries(cluster)?;
            listings.push(DirListing {
                path: format!("/{}", dir_entry.base_name()),
                entries: entries.iter().filter_map(visible).collect(),
            });
            for entry in &entries {
                if entry.kind() == EntryKind::Directory {
                    self.list_dir(fat, entry, depth + 1, listings)?;
                }
            }
        }

        Ok(())
    }

    /// Copies out the file named `name` (canonical `NAME.EXT` form, matched
    /// case-insensitively) from the root directory.
    pub fn extract(&self, name: &str) -> Result<Vec<u8>> {
        let target = name.to_uppercase();
        let entry = self
            .root_entries()?
            .into_iter()
            .find(|entry| entry.is_file() && entry.canonical_name() == target)
            .ok_or(Error::NotFound)?;

        let fat = self.read_fat()?;
        let size = entry.file_size.get() as usize;
        let mut contents = Vec::with_capacity(size);
        for cluster in fat.chain(entry.first_cluster.get()) {
            if contents.len() == size {
                break;
            }
            let bytes = self.read_cluster(cluster)?;
            // The final cluster holds allocation padding past the file size.
            let take = (size - contents.len()).min(bytes.len());
            contents.extend_from_slice(&bytes[..take]);
        }
        if contents.len() < size {
            error!(
                "Cluster chain of {target} ends after {} of {size} bytes",
                contents.len()
            );
            return Err(Error::Format("cluster chain shorter than file size"));
        }

        Ok(contents)
    }

    /// Walks `path` ('/'-separated, case-insensitive) from the root and
    /// returns the named directory's first cluster.
    pub fn resolve_dir(&self, path: &str) -> Result<u16> {
        let fat = self.read_fat()?;
        let mut entries = self.root_entries()?;
        let mut cluster = None;
        'segments: for segment in path.split('/').filter(|segment| !segment.is_empty()) {
            let target = segment.to_uppercase();
            for entry in &entries {
                if entry.kind() == EntryKind::Directory
                    && entry.base_name().to_uppercase() == target
                {
                    let first_cluster = entry.first_cluster.get();
                    entries = self.dir_entries(&fat, first_cluster)?;
                    cluster = Some(first_cluster);
                    continue 'segments;
                }
            }

            debug!("No directory {target} along {path}");
            return Err(Error::NotFound);
        }

        cluster.ok_or_else(|| Error::InvalidInput(format!("empty directory path {path:?}")))
    }

    /// Writes a new file into the target directory: claims a directory slot,
    /// allocates and links a cluster chain, copies the contents cluster by
    /// cluster, then writes the directory entry and flushes every FAT copy.
    ///
    /// No rollback is attempted when an I/O error interrupts the sequence;
    /// the FAT copies on disk only change in the final flush, so earlier
    /// failures leave the previous allocation state intact.
    pub fn insert(
        &self,
        target: Target,
        name: &str,
        contents: &[u8],
        modified: Timestamp,
    ) -> Result<()> {
        let mut fat = self.read_fat()?;
        let canonical = name.to_uppercase();
        let slot_offset = self.find_free_slot(&fat, target, &canonical)?;

        let cluster_size = self.geometry.cluster_size();
        let clusters_needed = contents.len().div_ceil(cluster_size);
        if clusters_needed > fat.free_count() {
            return Err(Error::NoSpace);
        }

        let chain = fat.allocate_chain(clusters_needed)?;
        for (index, &cluster) in chain.iter().enumerate() {
            let start = index * cluster_size;
            let end = contents.len().min(start + cluster_size);
            let mut buffer = vec![0; cluster_size];
            buffer[..end - start].copy_from_slice(&contents[start..end]);
            self.storage
                .write(self.geometry.cluster_offset(cluster), &buffer)?;
        }

        let (name_bytes, extension_bytes) = dir::encode_8_3(&canonical)?;
        let (date, time) = modified.encode();
        let mut entry = DirEntry::new_zeroed();
        entry.name = name_bytes;
        entry.extension = extension_bytes;
        entry.attributes = ATTR_ARCHIVE;
        entry.creation_time = U16::new(time);
        entry.creation_date = U16::new(date);
        entry.last_write_time = U16::new(time);
        entry.last_write_date = U16::new(date);
        entry.first_cluster = U16::new(chain.first().copied().unwrap_or(0));
        entry.file_size = U32::new(contents.len() as u32);

        self.storage.write(slot_offset, entry.as_bytes())?;
        fat.write_both(&self.storage, &self.geometry)?;
        debug!(
            "Inserted {canonical} ({} bytes, {clusters_needed} clusters)",
            contents.len()
        );

        Ok(())
    }

    /// Scans the whole target directory: any active entry matching `name` is
    /// a collision, and the first free slot anywhere in the chain is where
    /// the new entry will go.
    fn find_free_slot(&self, fat: &Fat, target: Target, name: &str) -> Result<u64> {
        let mut slot = None;
        match target {
            Target::Root => {
                for (index, entry) in self.root_entries()?.iter().enumerate() {
                    if entry.is_free_slot() {
                        slot.get_or_insert(
                            self.geometry.root_offset + (index * ENTRY_SIZE) as u64,
                        );
                        continue;
                    }
                    if entry.canonical_name() == name {
                        return Err(Error::AlreadyExists);
                    }
                }
            }
            Target::Directory(first_cluster) => {
                for cluster in fat.chain(first_cluster) {
                    for (index, entry) in self.cluster_entries(cluster)?.iter().enumerate() {
                        if entry.is_free_slot() {
                            slot.get_or_insert(
                                self.geometry.cluster_offset(cluster)
                                    + (index * ENTRY_SIZE) as u64,
                            );
                            continue;
                        }
                        if entry.canonical_name() == name {
                            return Err(Error::AlreadyExists);
                        }
                    }
                }
            }
        }

        slot.ok_or_else(|| {
            error!("No free directory slot for {name}");
            Error::NoSpace
        })
    }

    fn count_files(
        &self,
        fat: &Fat,
        entries: &[DirEntry],
        depth: usize,
        count: &mut u32,
    ) -> Result<()> {
        if depth > MAX_DIR_DEPTH {
            error!("Directory tree deeper than {MAX_DIR_DEPTH} levels");
            return Err(Error::Format("directory tree too deep"));
        }

        for entry in entries {
            match entry.kind() {
                EntryKind::File if entry.is_file() => *count += 1,
                EntryKind::Directory => {
                    let entries = self.dir_entries(fat, entry.first_cluster.get())?;
                    self.count_files(fat, &entries, depth + 1, count)?;
                }
                _ => {}
            }
        }

        Ok(())
    }

    fn read_fat(&self) -> Result<Fat> {
        Fat::read(&self.storage, &self.geometry)
    }

    fn read_cluster(&self, cluster: u16) -> Result<Vec<u8>> {
        let mut bytes = vec![0; self.geometry.cluster_size()];
        self.storage
            .read(self.geometry.cluster_offset(cluster), &mut bytes)?;
        Ok(bytes)
    }

    /// Every slot of the root directory region. The region is fixed size;
    /// walking does not stop at a never-used slot because slots past it may
    /// still be active.
    fn root_entries(&self) -> Result<Vec<DirEntry>> {
        let mut bytes = vec![0; self.geometry.root_len];
        self.storage.read(self.geometry.root_offset, &mut bytes)?;
        Ok(parse_entries(&bytes))
    }

    fn cluster_entries(&self, cluster: u16) -> Result<Vec<DirEntry>> {
        Ok(parse_entries(&self.read_cluster(cluster)?))
    }

    /// Every slot of a subdirectory, across its whole cluster chain.
    fn dir_entries(&self, fat: &Fat, first_cluster: u16) -> Result<Vec<DirEntry>> {
        let mut entries = Vec::new();
        for cluster in fat.chain(first_cluster) {
            entries.extend(self.cluster_entries(cluster)?);
        }
        Ok(entries)
    }
}

fn parse_entries(bytes: &[u8]) -> Vec<DirEntry> {
    bytes
        .chunks_exact(ENTRY_SIZE)
        .filter_map(|chunk| DirEntry::read_from_bytes(chunk).ok())
        .collect()
}

fn visible(entry: &DirEntry) -> Option<ListEntry> {
    let directory = match entry.kind() {
        EntryKind::Directory => true,
        EntryKind::File if entry.is_file() => false,
        _ => return None,
    };

    Some(ListEntry {
        directory,
        size: entry.file_size.get(),
        name: entry.canonical_name(),
        created: Timestamp::decode(entry.creation_date.get(), entry.creation_time.get()),
    })
}

fn is_blank(label: &[u8; 11]) -> bool {
    label.iter().all(|&byte| byte == b' ' || byte == 0)
}

fn label_text(entry: &DirEntry) -> String {
    let mut raw = [0; 11];
    raw[..8].copy_from_slice(&entry.name);
    raw[8..].copy_from_slice(&entry.extension);
    String::from_utf8_lossy(&raw).trim_end_matches(' ').to_string()
}
