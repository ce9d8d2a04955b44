//! Builder for small in-memory CZI files.

use crate::segment::{DIRECTORY_ID, FILE_HEADER_ID, METADATA_ID, SUBBLOCK_ID};
use byteorder::{LittleEndian, WriteBytesExt};
use std::io::{Cursor, Seek, SeekFrom, Write};

const FILE_HEADER_DATA_LEN: u64 = 512;

pub(crate) struct Plane {
    pub(crate) channel: i32,
    pub(crate) z: i32,
    pub(crate) x_start: i32,
    pub(crate) width: i32,
    pub(crate) height: i32,
    pub(crate) pixel_type: i32,
    pub(crate) compression: i32,
    pub(crate) stored_width: i32,
    pub(crate) data: Vec<u8>,
}

impl Plane {
    pub(crate) fn gray16(channel: i32, z: i32, width: i32, height: i32, pixels: &[u16]) -> Self {
        assert_eq!(pixels.len(), (width * height) as usize);
        Plane {
            channel,
            z,
            x_start: 0,
            width,
            height,
            pixel_type: 1,
            compression: 0,
            stored_width: width,
            data: pixels.iter().flat_map(|p| p.to_le_bytes()).collect(),
        }
    }

    pub(crate) fn gray8(channel: i32, z: i32, width: i32, height: i32, pixels: &[u8]) -> Self {
        Plane {
            pixel_type: 0,
            data: pixels.to_vec(),
            ..Plane::gray16(channel, z, width, height, &vec![0; pixels.len()])
        }
    }

    pub(crate) fn float(channel: i32, z: i32, width: i32, height: i32, pixels: &[f32]) -> Self {
        Plane {
            pixel_type: 2,
            data: pixels.iter().flat_map(|p| p.to_le_bytes()).collect(),
            ..Plane::gray16(channel, z, width, height, &vec![0; pixels.len()])
        }
    }

    pub(crate) fn at_x(mut self, x_start: i32) -> Self {
        self.x_start = x_start;
        self
    }

    pub(crate) fn compressed(mut self, mode: i32) -> Self {
        self.compression = mode;
        self
    }

    /// Mark as a half resolution pyramid tile.
    pub(crate) fn downsampled(mut self) -> Self {
        self.stored_width = self.width / 2;
        self
    }

    fn dimensions(&self) -> [(&'static [u8; 4], i32, i32, i32); 4] {
        [
            (b"X\0\0\0", self.x_start, self.width, self.stored_width),
            (b"Y\0\0\0", 0, self.height, self.height),
            (b"Z\0\0\0", self.z, 1, 1),
            (b"C\0\0\0", self.channel, 1, 1),
        ]
    }

    fn write_entry<W: Write>(&self, w: &mut W, position: u64) -> std::io::Result<()> {
        w.write_all(b"DV")?;
        w.write_i32::<LittleEndian>(self.pixel_type)?;
        w.write_i64::<LittleEndian>(position as i64)?;
        w.write_i32::<LittleEndian>(0)?;
        w.write_i32::<LittleEndian>(self.compression)?;
        w.write_u8(0)?;
        w.write_all(&[0; 5])?;
        let dims = self.dimensions();
        w.write_i32::<LittleEndian>(dims.len() as i32)?;
        for (name, start, size, stored) in dims {
            w.write_all(name)?;
            w.write_i32::<LittleEndian>(start)?;
            w.write_i32::<LittleEndian>(size)?;
            w.write_f32::<LittleEndian>(0.0)?;
            w.write_i32::<LittleEndian>(stored)?;
        }
        Ok(())
    }

    fn entry_len(&self) -> usize {
        32 + 20 * self.dimensions().len()
    }
}

pub(crate) struct SyntheticCzi {
    xml: String,
    planes: Vec<Plane>,
}

fn write_segment_header<W: Write>(w: &mut W, id: &str, size: u64) -> std::io::Result<()> {
    let mut padded = [0u8; 16];
    padded[..id.len()].copy_from_slice(id.as_bytes());
    w.write_all(&padded)?;
    w.write_i64::<LittleEndian>(size as i64)?;
    w.write_i64::<LittleEndian>(size as i64)
}

impl SyntheticCzi {
    pub(crate) fn new(xml: &str) -> Self {
        SyntheticCzi {
            xml: xml.to_string(),
            planes: Vec::new(),
        }
    }

    pub(crate) fn plane(mut self, plane: Plane) -> Self {
        self.planes.push(plane);
        self
    }

    pub(crate) fn build(&self) -> Vec<u8> {
        self.try_build().unwrap()
    }

    fn try_build(&self) -> std::io::Result<Vec<u8>> {
        let mut w = Cursor::new(vec![0u8; (32 + FILE_HEADER_DATA_LEN) as usize]);
        w.seek(SeekFrom::End(0))?;

        let mut positions = Vec::new();
        for plane in &self.planes {
            let position = w.stream_position()?;
            positions.push(position);
            let header_len = 256.max(16 + plane.entry_len());
            write_segment_header(
                &mut w,
                SUBBLOCK_ID,
                (header_len + plane.data.len()) as u64,
            )?;
            w.write_i32::<LittleEndian>(0)?;
            w.write_i32::<LittleEndian>(0)?;
            w.write_i64::<LittleEndian>(plane.data.len() as i64)?;
            plane.write_entry(&mut w, position)?;
            w.write_all(&vec![0; header_len - 16 - plane.entry_len()])?;
            w.write_all(&plane.data)?;
        }

        let metadata_position = w.stream_position()?;
        write_segment_header(&mut w, METADATA_ID, 256 + self.xml.len() as u64)?;
        w.write_i32::<LittleEndian>(self.xml.len() as i32)?;
        w.write_i32::<LittleEndian>(0)?;
        w.write_all(&[0; 248])?;
        w.write_all(self.xml.as_bytes())?;

        let directory_position = w.stream_position()?;
        let entries_len: usize = self.planes.iter().map(Plane::entry_len).sum();
        write_segment_header(&mut w, DIRECTORY_ID, 128 + entries_len as u64)?;
        w.write_i32::<LittleEndian>(self.planes.len() as i32)?;
        w.write_all(&[0; 124])?;
        for (plane, &position) in self.planes.iter().zip(&positions) {
            plane.write_entry(&mut w, position)?;
        }

        w.seek(SeekFrom::Start(0))?;
        write_segment_header(&mut w, FILE_HEADER_ID, FILE_HEADER_DATA_LEN)?;
        w.write_i32::<LittleEndian>(1)?;
        w.write_i32::<LittleEndian>(0)?;
        w.write_all(&[0; 8 + 16 + 16 + 4])?;
        w.write_i64::<LittleEndian>(directory_position as i64)?;
        w.write_i64::<LittleEndian>(metadata_position as i64)?;
        Ok(w.into_inner())
    }
}

/// Metadata with the given spacings, in metres, under `Scaling/Items`.
pub(crate) fn scaling_xml(axes: &[(&str, &str)]) -> String {
    let distances: String = axes
        .iter()
        .map(|(axis, value)| {
            format!(
                "<Distance Id=\"{axis}\"><Value>{value}</Value>\
                 <DefaultUnitFormat>µm</DefaultUnitFormat></Distance>"
            )
        })
        .collect();
    format!(
        "<ImageDocument><Metadata><Information><Image><SizeX>4</SizeX></Image></Information>\
         <Scaling><Items>{distances}</Items></Scaling></Metadata></ImageDocument>"
    )
}
