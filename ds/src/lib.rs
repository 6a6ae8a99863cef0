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

use std::{
    cell::RefCell,
    fs::{File, OpenOptions},
    io,
    os::unix::fs::FileExt,
    path::Path,
    rc::Rc,
};

pub use civet_err::{Error, Result};

use log::debug;

/// Offset-addressed access to a raw disk image.
///
/// All offsets are absolute byte positions from the start of the volume.
/// Implementations take `&self`; positional reads and writes do not share a
/// seek cursor, so concurrent walkers never have to save and restore one.
pub trait DataStorage {
    fn read(&self, offset: u64, buffer: &mut [u8]) -> Result<()>;

    fn write(&self, offset: u64, buffer: &[u8]) -> Result<()>;
}

/// A disk image backed by a host file.
pub struct ImageStorage {
    file: File,
}

impl ImageStorage {
    /// Opens an image read-only.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        debug!("Opening image {} read-only", path.as_ref().display());
        Ok(Self {
            file: File::open(path)?,
        })
    }

    /// Opens an image for reading and writing.
    pub fn open_rw(path: impl AsRef<Path>) -> Result<Self> {
        debug!("Opening image {} read-write", path.as_ref().display());
        Ok(Self {
            file: OpenOptions::new().read(true).write(true).open(path)?,
        })
    }
}

impl DataStorage for ImageStorage {
    fn read(&self, offset: u64, buffer: &mut [u8]) -> Result<()> {
        self.file.read_exact_at(buffer, offset)?;
        Ok(())
    }

    fn write(&self, offset: u64, buffer: &[u8]) -> Result<()> {
        self.file.write_all_at(buffer, offset)?;
        Ok(())
    }
}

/// An in-memory image, shared by clone. Used by tests in place of host files.
#[derive(Clone)]
pub struct MemStorage {
    bytes: Rc<RefCell<Vec<u8>>>,
}

impl MemStorage {
    pub fn new(size: usize) -> Self {
        Self {
            bytes: Rc::new(RefCell::new(vec![0; size])),
        }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Rc::new(RefCell::new(bytes)),
        }
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.bytes.borrow().clone()
    }
}

impl DataStorage for MemStorage {
    fn read(&self, offset: u64, buffer: &mut [u8]) -> Result<()> {
        let bytes = self.bytes.borrow();
        let start = offset as usize;
        let end = start
            .checked_add(buffer.len())
            .filter(|&end| end <= bytes.len())
            .ok_or_else(|| {
                Error::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "read past end of image",
                ))
            })?;
        buffer.copy_from_slice(&bytes[start..end]);
        Ok(())
    }

    fn write(&self, offset: u64, buffer: &[u8]) -> Result<()> {
        let mut bytes = self.bytes.borrow_mut();
        let start = offset as usize;
        let end = start
            .checked_add(buffer.len())
            .filter(|&end| end <= bytes.len())
            .ok_or_else(|| {
                Error::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "write past end of image",
                ))
            })?;
        bytes[start..end].copy_from_slice(buffer);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mem_storage_round_trip() {
        let storage = MemStorage::new(1024);
        storage.write(512, &[0xAB; 16]).unwrap();

        let mut buffer = [0; 16];
        storage.read(512, &mut buffer).unwrap();
        assert_eq!(buffer, [0xAB; 16]);
    }

    #[test]
    fn mem_storage_rejects_out_of_range() {
        let storage = MemStorage::new(1024);
        let mut buffer = [0; 16];
        assert!(storage.read(1020, &mut buffer).is_err());
        assert!(storage.write(1020, &buffer).is_err());
    }

    #[test]
    fn mem_storage_clones_share_bytes() {
        let storage = MemStorage::new(64);
        let alias = storage.clone();
        storage.write(0, &[1, 2, 3]).unwrap();

        let mut buffer = [0; 3];
        alias.read(0, &mut buffer).unwrap();
        assert_eq!(buffer, [1, 2, 3]);
    }
}
