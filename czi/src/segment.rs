//! Low level layout of the ZISRAW segments making up a CZI file. Every
//! segment starts with a 32 byte header: a 16 byte NUL padded id followed
//! by the allocated and used sizes of its data part. Integers are little
//! endian.

use anyhow::{bail, ensure, Context, Result};
use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use std::io::{Read, Seek, SeekFrom};

pub(crate) const SEGMENT_HEADER_LEN: u64 = 32;
pub(crate) const FILE_HEADER_ID: &str = "ZISRAWFILE";
pub(crate) const DIRECTORY_ID: &str = "ZISRAWDIRECTORY";
pub(crate) const METADATA_ID: &str = "ZISRAWMETADATA";
pub(crate) const SUBBLOCK_ID: &str = "ZISRAWSUBBLOCK";

const DIRECTORY_RESERVED: i64 = 124;
const METADATA_SPARE: i64 = 248;
const ENTRY_FIXED_LEN: u64 = 32;
const DIMENSION_ENTRY_LEN: u64 = 20;
const SUBBLOCK_MIN_HEADER_LEN: u64 = 256;

#[derive(Debug)]
pub(crate) struct SegmentHeader {
    pub(crate) id: String,
    pub(crate) used_size: i64,
}

fn read_segment_header<R: Read>(reader: &mut R) -> Result<SegmentHeader> {
    let mut id = [0u8; 16];
    reader.read_exact(&mut id)?;
    let end = id.iter().position(|&b| b == 0).unwrap_or(id.len());
    let id = std::str::from_utf8(&id[..end])
        .context("segment id is not ASCII")?
        .to_string();
    let _allocated_size = reader.read_i64::<LittleEndian>()?;
    let used_size = reader.read_i64::<LittleEndian>()?;
    Ok(SegmentHeader { id, used_size })
}

/// Seek to `position` and check that a segment `id` starts there.
fn expect_segment<R: Read + Seek>(
    reader: &mut R,
    position: u64,
    id: &str,
) -> Result<SegmentHeader> {
    reader.seek(SeekFrom::Start(position))?;
    let header = read_segment_header(reader)
        .with_context(|| format!("truncated segment header at offset {position}"))?;
    ensure!(
        header.id == id,
        "expected a {id} segment at offset {position}, found {:?}",
        header.id
    );
    Ok(header)
}

fn offset(value: i64, what: &str) -> Result<u64> {
    u64::try_from(value).with_context(|| format!("negative {what} {value}"))
}

/// The fields of the ZISRAWFILE segment that locate everything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FileHeader {
    pub(crate) major: i32,
    pub(crate) minor: i32,
    pub(crate) directory_position: u64,
    pub(crate) metadata_position: u64,
}

pub(crate) fn read_file_header<R: Read + Seek>(reader: &mut R) -> Result<FileHeader> {
    expect_segment(reader, 0, FILE_HEADER_ID).context("not a CZI file")?;
    let major = reader.read_i32::<LittleEndian>()?;
    let minor = reader.read_i32::<LittleEndian>()?;
    // reserved words, primary and file GUIDs, file part
    reader.seek(SeekFrom::Current(8 + 16 + 16 + 4))?;
    let directory_position = offset(reader.read_i64::<LittleEndian>()?, "directory position")?;
    let metadata_position = offset(reader.read_i64::<LittleEndian>()?, "metadata position")?;
    Ok(FileHeader {
        major,
        minor,
        directory_position,
        metadata_position,
    })
}

/// Pixel layouts the reader can turn into intensities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelType {
    /// Unsigned 8 bit
    Gray8,
    /// Unsigned 16 bit
    Gray16,
    /// 32 bit float
    Gray32Float,
}

impl PixelType {
    pub(crate) fn from_code(code: i32) -> Result<Self> {
        Ok(match code {
            0 => PixelType::Gray8,
            1 => PixelType::Gray16,
            2 => PixelType::Gray32Float,
            _ => bail!("unsupported pixel type {code}, only grayscale 8/16 bit and float images are read"),
        })
    }

    pub(crate) fn bytes_per_pixel(self) -> usize {
        match self {
            PixelType::Gray8 => 1,
            PixelType::Gray16 => 2,
            PixelType::Gray32Float => 4,
        }
    }

    pub(crate) fn decode(self, bytes: &[u8]) -> Vec<f32> {
        match self {
            PixelType::Gray8 => bytes.iter().map(|&v| f32::from(v)).collect(),
            PixelType::Gray16 => bytes
                .chunks_exact(2)
                .map(|v| f32::from(LittleEndian::read_u16(v)))
                .collect(),
            PixelType::Gray32Float => bytes.chunks_exact(4).map(LittleEndian::read_f32).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DimensionEntry {
    pub(crate) dimension: String,
    pub(crate) start: i32,
    pub(crate) size: i32,
    pub(crate) stored_size: i32,
}

/// A "DV" directory entry, one per sub-block.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DirectoryEntry {
    pub(crate) pixel_type: i32,
    pub(crate) file_position: u64,
    pub(crate) compression: i32,
    pub(crate) pyramid_type: u8,
    pub(crate) dimensions: Vec<DimensionEntry>,
}

impl DirectoryEntry {
    pub(crate) fn dimension(&self, name: &str) -> Option<&DimensionEntry> {
        self.dimensions.iter().find(|d| d.dimension == name)
    }

    /// Start index along `name`, 0 when the dimension is absent.
    pub(crate) fn coordinate(&self, name: &str) -> i32 {
        self.dimension(name).map_or(0, |d| d.start)
    }

    /// `(start, size)` along `name`, a single plane when absent.
    pub(crate) fn extent(&self, name: &str) -> (i32, i32) {
        self.dimension(name).map_or((0, 1), |d| (d.start, d.size))
    }

    /// Pyramid sub-blocks store fewer pixels than they cover.
    pub(crate) fn is_full_resolution(&self) -> bool {
        self.pyramid_type == 0
            && ["X", "Y"].iter().all(|axis| {
                self.dimension(axis)
                    .is_some_and(|d| d.size == d.stored_size)
            })
    }

    fn encoded_len(&self) -> u64 {
        ENTRY_FIXED_LEN + DIMENSION_ENTRY_LEN * self.dimensions.len() as u64
    }
}

fn read_directory_entry<R: Read>(reader: &mut R) -> Result<DirectoryEntry> {
    let mut schema = [0u8; 2];
    reader.read_exact(&mut schema)?;
    ensure!(&schema == b"DV", "unknown directory entry schema {schema:?}");
    let pixel_type = reader.read_i32::<LittleEndian>()?;
    let file_position = offset(reader.read_i64::<LittleEndian>()?, "sub-block position")?;
    let _file_part = reader.read_i32::<LittleEndian>()?;
    let compression = reader.read_i32::<LittleEndian>()?;
    let pyramid_type = reader.read_u8()?;
    let mut spare = [0u8; 5];
    reader.read_exact(&mut spare)?;
    let count = reader.read_i32::<LittleEndian>()?;
    ensure!(count >= 0, "negative dimension count {count}");

    let mut dimensions = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let mut name = [0u8; 4];
        reader.read_exact(&mut name)?;
        let end = name.iter().position(|&b| b == 0).unwrap_or(name.len());
        let start = reader.read_i32::<LittleEndian>()?;
        let size = reader.read_i32::<LittleEndian>()?;
        let _start_coordinate = reader.read_f32::<LittleEndian>()?;
        let stored_size = reader.read_i32::<LittleEndian>()?;
        dimensions.push(DimensionEntry {
            dimension: String::from_utf8_lossy(&name[..end]).into_owned(),
            start,
            size,
            stored_size,
        });
    }
    Ok(DirectoryEntry {
        pixel_type,
        file_position,
        compression,
        pyramid_type,
        dimensions,
    })
}

pub(crate) fn read_directory<R: Read + Seek>(
    reader: &mut R,
    position: u64,
) -> Result<Vec<DirectoryEntry>> {
    expect_segment(reader, position, DIRECTORY_ID)?;
    let count = reader.read_i32::<LittleEndian>()?;
    ensure!(count >= 0, "negative directory entry count {count}");
    reader.seek(SeekFrom::Current(DIRECTORY_RESERVED))?;
    (0..count)
        .map(|i| {
            read_directory_entry(reader).with_context(|| format!("directory entry {i}"))
        })
        .collect()
}

pub(crate) fn read_metadata_xml<R: Read + Seek>(reader: &mut R, position: u64) -> Result<String> {
    expect_segment(reader, position, METADATA_ID)?;
    let xml_size = reader.read_i32::<LittleEndian>()?;
    ensure!(xml_size >= 0, "negative metadata size {xml_size}");
    let _attachment_size = reader.read_i32::<LittleEndian>()?;
    reader.seek(SeekFrom::Current(METADATA_SPARE))?;
    let mut xml = vec![0u8; xml_size as usize];
    reader
        .read_exact(&mut xml)
        .context("truncated metadata segment")?;
    let xml = String::from_utf8(xml).context("metadata is not UTF-8")?;
    Ok(xml.trim_end_matches('\0').to_string())
}

/// Raw pixel bytes of the sub-block described by `entry`.
pub(crate) fn read_subblock_data<R: Read + Seek>(
    reader: &mut R,
    entry: &DirectoryEntry,
) -> Result<Vec<u8>> {
    let header = expect_segment(reader, entry.file_position, SUBBLOCK_ID)?;
    let metadata_size = reader.read_i32::<LittleEndian>()?;
    let _attachment_size = reader.read_i32::<LittleEndian>()?;
    let data_size = reader.read_i64::<LittleEndian>()?;
    ensure!(
        metadata_size >= 0 && data_size >= 0,
        "corrupt sub-block sizes at offset {}",
        entry.file_position
    );
    let own_entry = read_directory_entry(reader)?;
    let header_len = SUBBLOCK_MIN_HEADER_LEN.max(16 + own_entry.encoded_len());
    ensure!(
        header_len as i64 + i64::from(metadata_size) + data_size <= header.used_size,
        "sub-block at offset {} overflows its segment",
        entry.file_position
    );

    reader.seek(SeekFrom::Start(
        entry.file_position + SEGMENT_HEADER_LEN + header_len + metadata_size as u64,
    ))?;
    let mut data = vec![0u8; data_size as usize];
    reader
        .read_exact(&mut data)
        .with_context(|| format!("truncated sub-block at offset {}", entry.file_position))?;
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Plane, SyntheticCzi};
    use std::io::Cursor;

    #[test]
    fn test_file_header_and_directory() -> Result<()> {
        let bytes = SyntheticCzi::new("<ImageDocument/>")
            .plane(Plane::gray16(1, 0, 3, 2, &[1, 2, 3, 4, 5, 6]))
            .plane(Plane::gray16(2, 0, 3, 2, &[7, 8, 9, 10, 11, 12]))
            .build();
        let mut reader = Cursor::new(bytes);
        let header = read_file_header(&mut reader)?;
        assert_eq!((header.major, header.minor), (1, 0));

        let entries = read_directory(&mut reader, header.directory_position)?;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].coordinate("C"), 2);
        assert_eq!(entries[1].extent("X"), (0, 3));
        assert_eq!(entries[1].extent("T"), (0, 1));
        assert!(entries[0].is_full_resolution());

        let data = read_subblock_data(&mut reader, &entries[1])?;
        assert_eq!(PixelType::Gray16.decode(&data), vec![7.0, 8.0, 9.0, 10.0, 11.0, 12.0]);

        let xml = read_metadata_xml(&mut reader, header.metadata_position)?;
        assert_eq!(xml, "<ImageDocument/>");
        Ok(())
    }

    #[test]
    fn test_rejects_other_files() {
        let mut reader = Cursor::new(b"II*\0 definitely a tiff, not a zeiss container".to_vec());
        let err = read_file_header(&mut reader).unwrap_err();
        assert!(format!("{err:#}").contains("not a CZI file"));
    }

    #[test]
    fn test_pixel_types() {
        assert_eq!(PixelType::from_code(0).unwrap(), PixelType::Gray8);
        assert_eq!(PixelType::from_code(2).unwrap().bytes_per_pixel(), 4);
        assert!(PixelType::from_code(3).is_err());
        assert_eq!(PixelType::Gray8.decode(&[0, 255]), vec![0.0, 255.0]);
        assert_eq!(
            PixelType::Gray32Float.decode(&1.5f32.to_le_bytes()),
            vec![1.5]
        );
    }
}
