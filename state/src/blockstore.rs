//! Append-only flat-file storage for raw block bytes, `blk00000.dat` and
//! friends, addressed by `(file_num, offset, length)`.
//!
//! Blocks are immutable once committed, so there is no need for the
//! overwrite-in-place or compaction machinery a general-purpose KV store
//! would need: we just keep appending, and roll over to a new file once the
//! current one crosses [`MAX_FILE_SIZE`].

use std::{
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::StateError;

/// Roll over to a new file once the current one reaches this size.
const MAX_FILE_SIZE: u64 = 128 * 1024 * 1024;

/// Where a block's serialized bytes live on disk.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockLocation {
    pub file_num: u32,
    pub offset: u64,
    pub length: u32,
}

pub struct BlockStore {
    dir: PathBuf,
    current_file_num: u32,
    current_file: File,
    current_offset: u64,
}

impl BlockStore {
    pub fn new(dir: &Path) -> Result<Self, StateError> {
        std::fs::create_dir_all(dir)?;
        let current_file_num = Self::latest_file_num(dir)?;
        let path = Self::file_path(dir, current_file_num);
        let mut current_file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;
        let current_offset = current_file.seek(SeekFrom::End(0))?;
        Ok(BlockStore {
            dir: dir.to_owned(),
            current_file_num,
            current_file,
            current_offset,
        })
    }

    fn file_path(dir: &Path, file_num: u32) -> PathBuf {
        dir.join(format!("blk{:05}.dat", file_num))
    }

    /// Resume from the highest-numbered `blk*.dat` already on disk, or
    /// start at file 0 if the directory is empty.
    fn latest_file_num(dir: &Path) -> Result<u32, StateError> {
        let mut highest = 0u32;
        for entry in std::fs::read_dir(dir)? {
            let name = entry?.file_name();
            let name = name.to_string_lossy();
            if let Some(digits) = name.strip_prefix("blk").and_then(|s| s.strip_suffix(".dat")) {
                if let Ok(num) = digits.parse::<u32>() {
                    highest = highest.max(num);
                }
            }
        }
        Ok(highest)
    }

    /// Append `bytes` to the current file, rolling over first if it would
    /// push the file past [`MAX_FILE_SIZE`]. Returns where the block landed.
    pub fn write_block(&mut self, bytes: &[u8]) -> Result<BlockLocation, StateError> {
        if self.current_offset + bytes.len() as u64 > MAX_FILE_SIZE && self.current_offset > 0 {
            self.roll_over()?;
        }
        self.current_file.write_all(bytes)?;
        self.current_file.flush()?;
        let location = BlockLocation {
            file_num: self.current_file_num,
            offset: self.current_offset,
            length: bytes.len() as u32,
        };
        self.current_offset += bytes.len() as u64;
        Ok(location)
    }

    fn roll_over(&mut self) -> Result<(), StateError> {
        self.current_file_num += 1;
        let path = Self::file_path(&self.dir, self.current_file_num);
        self.current_file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;
        self.current_offset = 0;
        Ok(())
    }

    pub fn read_block(&self, location: BlockLocation) -> Result<Vec<u8>, StateError> {
        let path = Self::file_path(&self.dir, location.file_num);
        let mut file = File::open(path)?;
        file.seek(SeekFrom::Start(location.offset))?;
        let mut buf = vec![0u8; location.length as usize];
        file.read_exact(&mut buf)?;
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempdir::TempDir::new("blockstore").unwrap();
        let mut store = BlockStore::new(dir.path()).unwrap();
        let location = store.write_block(b"a block's worth of bytes").unwrap();
        assert_eq!(location.file_num, 0);
        assert_eq!(location.offset, 0);
        assert_eq!(store.read_block(location).unwrap(), b"a block's worth of bytes");
    }

    #[test]
    fn second_write_appends_after_the_first() {
        let dir = tempdir::TempDir::new("blockstore").unwrap();
        let mut store = BlockStore::new(dir.path()).unwrap();
        let first = store.write_block(b"first").unwrap();
        let second = store.write_block(b"second").unwrap();
        assert_eq!(second.file_num, first.file_num);
        assert_eq!(second.offset, first.offset + first.length as u64);
        assert_eq!(store.read_block(first).unwrap(), b"first");
        assert_eq!(store.read_block(second).unwrap(), b"second");
    }

    #[test]
    fn resuming_picks_up_the_highest_numbered_file() {
        let dir = tempdir::TempDir::new("blockstore").unwrap();
        {
            let mut store = BlockStore::new(dir.path()).unwrap();
            store.write_block(b"before restart").unwrap();
        }
        let store = BlockStore::new(dir.path()).unwrap();
        assert_eq!(store.current_file_num, 0);
        assert_eq!(store.current_offset, "before restart".len() as u64);
    }
}
