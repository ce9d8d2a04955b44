//! czi
//!
//! Reader for uncompressed grayscale Zeiss CZI containers. Only what the
//! segmentation pipeline needs is decoded: the sub-block directory, the
//! pixel data of full resolution sub-blocks and the voxel spacing stored in
//! the XML metadata.
#![deny(missing_docs)]

mod metadata;
mod segment;
#[cfg(test)]
mod testing;

use anyhow::{bail, ensure, Context, Result};
use log::debug;
use ndarray::{s, Array3};
use neuroscan::io::{ScaleMetadata, VolumeLoader};
use neuroscan::{Channel, NeuroscanError, ScaleVector, Volume};
use segment::{read_directory, read_file_header, read_metadata_xml, read_subblock_data};
use segment::{DirectoryEntry, FileHeader};
use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

pub use metadata::parse_scaling;
pub use segment::PixelType;

/// An open CZI container.
pub struct CziReader<R> {
    reader: R,
    header: FileHeader,
    entries: Vec<DirectoryEntry>,
}

impl CziReader<BufReader<File>> {
    /// Open the container at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Error opening {path:?}"))?;
        CziReader::new(BufReader::new(file)).with_context(|| path.display().to_string())
    }
}

impl<R: Read + Seek> CziReader<R> {
    /// Parse the file header and the sub-block directory.
    pub fn new(mut reader: R) -> Result<Self> {
        let header = read_file_header(&mut reader)?;
        let entries = read_directory(&mut reader, header.directory_position)
            .context("unreadable sub-block directory")?;
        debug!(
            "CZI {}.{} with {} sub-blocks",
            header.major,
            header.minor,
            entries.len()
        );
        Ok(CziReader {
            reader,
            header,
            entries,
        })
    }

    /// Distinct channel indices present in the directory.
    pub fn channels(&self) -> Vec<usize> {
        let channels: BTreeSet<_> = self
            .entries
            .iter()
            .map(|entry| entry.coordinate("C").max(0) as usize)
            .collect();
        channels.into_iter().collect()
    }

    /// The raw XML metadata document.
    pub fn metadata_xml(&mut self) -> Result<String> {
        ensure!(
            self.header.metadata_position != 0,
            "the file has no metadata segment"
        );
        read_metadata_xml(&mut self.reader, self.header.metadata_position)
    }

    /// Voxel spacing in microns per axis id.
    pub fn scaling(&mut self) -> Result<HashMap<String, f64>> {
        parse_scaling(&self.metadata_xml()?)
    }

    /// Stack every Z plane of `channel` into a (Z, Y, X) volume.
    ///
    /// Tiles of a mosaic are placed at their X/Y start. Only the first scene
    /// and first time point are read; pyramid sub-blocks are ignored.
    pub fn read_channel(&mut self, channel: usize) -> Result<Array3<f32>> {
        let first = |axis: &str| {
            self.entries
                .iter()
                .filter(|entry| entry.is_full_resolution())
                .map(|entry| entry.coordinate(axis))
                .min()
                .unwrap_or(0)
        };
        let (scene, time) = (first("S"), first("T"));
        let selected: Vec<DirectoryEntry> = self
            .entries
            .iter()
            .filter(|entry| {
                entry.is_full_resolution()
                    && entry.coordinate("C") == channel as i32
                    && entry.coordinate("S") == scene
                    && entry.coordinate("T") == time
            })
            .cloned()
            .collect();
        if selected.is_empty() {
            bail!(
                "no sub-blocks for channel {channel}, available channels are {:?}",
                self.channels()
            );
        }

        let bounds = |axis: &str| {
            let lo = selected.iter().map(|e| e.extent(axis).0).min().unwrap_or(0);
            let hi = selected
                .iter()
                .map(|e| {
                    let (start, size) = e.extent(axis);
                    start + size
                })
                .max()
                .unwrap_or(0);
            (lo, (hi - lo).max(0) as usize)
        };
        let (z0, depth) = bounds("Z");
        let (y0, height) = bounds("Y");
        let (x0, width) = bounds("X");
        let mut volume = Array3::<f32>::zeros((depth, height, width));

        for entry in &selected {
            ensure!(
                entry.compression == 0,
                "compressed sub-blocks are not supported (compression mode {})",
                entry.compression
            );
            let pixel_type = PixelType::from_code(entry.pixel_type)?;
            let (z, nz) = entry.extent("Z");
            let (y, ny) = entry.extent("Y");
            let (x, nx) = entry.extent("X");
            let shape = (nz as usize, ny as usize, nx as usize);
            let expected = shape.0 * shape.1 * shape.2 * pixel_type.bytes_per_pixel();

            let data = read_subblock_data(&mut self.reader, entry)?;
            ensure!(
                data.len() >= expected,
                "sub-block at offset {} holds {} bytes, expected {expected}",
                entry.file_position,
                data.len()
            );
            let block = Array3::from_shape_vec(shape, pixel_type.decode(&data[..expected]))?;
            let (z, y, x) = ((z - z0) as usize, (y - y0) as usize, (x - x0) as usize);
            volume
                .slice_mut(s![z..z + shape.0, y..y + shape.1, x..x + shape.2])
                .assign(&block);
        }
        Ok(volume)
    }
}

/// Reads channel volumes and voxel spacing from CZI files on disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct CziLoader;

impl VolumeLoader for CziLoader {
    fn load(&self, path: &Path, channel: Channel) -> Result<Volume, NeuroscanError> {
        CziReader::open(path)
            .and_then(|mut reader| reader.read_channel(channel.container_index()))
            .map_err(|source| NeuroscanError::VolumeLoadFailure {
                path: path.to_path_buf(),
                source,
            })
    }
}

impl ScaleMetadata for CziLoader {
    fn get(&self, path: &Path) -> Result<ScaleVector, NeuroscanError> {
        let axes = CziReader::open(path)
            .and_then(|mut reader| reader.scaling())
            .map_err(|source| NeuroscanError::VolumeLoadFailure {
                path: path.to_path_buf(),
                source,
            })?;
        ScaleVector::from_axis_map(&axes)
    }
}
