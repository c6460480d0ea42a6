//! Raw image save/load
//!
//! The file is the cluster array byte for byte: `cluster_count * 32` bytes,
//! no header, no checksum, no version. `load` derives the table size from the
//! file length. Images written by a build with a different entry layout load
//! without error but hold meaningless data; slots still self-describe by key
//! and generation, so that costs hit rate, not correctness.

use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use log::info;
use thiserror::Error;

use super::CLUSTER_BYTES;
use super::table::{TranspositionTable, floor_pow2};

/// Clusters serialized per write call
const SAVE_CHUNK_CLUSTERS: usize = 4096;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("failed to write hash file {path}: {source}")]
    Save {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to read hash file {path}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("hash file {path} holds {len} bytes, less than one cluster")]
    TooSmall { path: PathBuf, len: u64 },
}

impl TranspositionTable {
    /// Writes the raw table image to `path`
    ///
    /// Intended to run between searches; stores racing with a save end up in
    /// the image or not, slot by slot.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), PersistError> {
        let path = path.as_ref();
        let wrap = |source| PersistError::Save {
            path: path.to_path_buf(),
            source,
        };

        let file = File::create(path).map_err(wrap)?;
        let mut writer = BufWriter::new(file);
        let mut buf = Vec::with_capacity(SAVE_CHUNK_CLUSTERS * CLUSTER_BYTES);

        for chunk in (0..self.cluster_count()).step_by(SAVE_CHUNK_CLUSTERS) {
            buf.clear();
            let end = (chunk + SAVE_CHUNK_CLUSTERS).min(self.cluster_count());
            for index in chunk..end {
                buf.extend_from_slice(&self.cluster_at(index).to_bytes());
            }
            writer.write_all(&buf).map_err(wrap)?;
        }
        writer.flush().map_err(wrap)?;

        info!("saved {} bytes of hash to {}", self.size_bytes(), path.display());
        Ok(())
    }

    /// Replaces the table with the image stored at `path`
    ///
    /// The cluster count is the file length divided by the cluster size,
    /// rounded down to a power of two; trailing bytes beyond that are ignored.
    /// The current large page mode is kept. On a read error the table is left
    /// cleared at the new size.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<(), PersistError> {
        let path = path.as_ref();
        let wrap = |source| PersistError::Load {
            path: path.to_path_buf(),
            source,
        };

        let mut file = File::open(path).map_err(wrap)?;
        let len = file.metadata().map_err(wrap)?.len();
        let clusters = usize::try_from(len / CLUSTER_BYTES as u64).unwrap_or(usize::MAX);
        if clusters == 0 {
            return Err(PersistError::TooSmall {
                path: path.to_path_buf(),
                len,
            });
        }

        let clusters = floor_pow2(clusters);
        if clusters != self.cluster_count() {
            let large_pages = self.large_pages_requested();
            self.reallocate(clusters, large_pages);
        }

        let Some(table) = self.table_mut() else {
            return Ok(());
        };
        if let Err(source) = file.read_exact(table.as_bytes_mut()) {
            self.clear();
            return Err(wrap(source));
        }

        info!("loaded {} bytes of hash from {}", self.size_bytes(), path.display());
        Ok(())
    }
}
