use crate::io::LabelWriter;
use crate::{LabelVolume, NeuroscanError, Volume};
use anyhow::{bail, Context, Result};
use ndarray::Array3;
use std::fs::File;
use std::io::{BufReader, BufWriter, Seek, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::{colortype, TiffEncoder};
use tiff::tags::Tag;

/// Writes label volumes as 16-bit ImageJ-compatible TIFF stacks.
#[derive(Debug, Default, Clone, Copy)]
pub struct TiffLabelWriter;

impl LabelWriter for TiffLabelWriter {
    fn save(&self, path: &Path, labels: &LabelVolume) -> Result<(), NeuroscanError> {
        write_label_stack(path, labels).map_err(|source| NeuroscanError::WriteFailure {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn imagej_description(depth: usize, max: f64) -> String {
    format!(
        "ImageJ=1.11a\nimages={depth}\nslices={depth}\nloop=false\nmin=0.0\nmax={max:.1}\n"
    )
}

/// Write `labels` as an unsigned 16-bit multi-page TIFF, one page per Z plane.
///
/// The stack goes to a temporary file next to `path` which is renamed into
/// place once complete, so a crash never leaves a truncated output behind.
pub fn write_label_stack(path: &Path, labels: &LabelVolume) -> Result<()> {
    let max = labels.iter().copied().max().unwrap_or(0);
    if max > u32::from(u16::MAX) {
        bail!("label {max} does not fit in a 16-bit image");
    }
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("Unable to create a temporary file in {dir:?}"))?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        let description = imagej_description(labels.len_of(ndarray::Axis(0)), f64::from(max));
        write_pages::<colortype::Gray16, _, _>(&mut writer, labels, &description, |&label| {
            label as u16
        })?;
        writer.flush()?;
    }
    tmp.persist(path)
        .with_context(|| format!("Unable to move labels into {path:?}"))?;
    Ok(())
}

/// Write a float32 stack, used to hand volumes to external tools.
pub fn write_float_stack(path: &Path, volume: &Volume) -> Result<()> {
    let mut writer = BufWriter::new(
        File::create(path).with_context(|| format!("Unable to create {path:?}"))?,
    );
    let description = imagej_description(volume.len_of(ndarray::Axis(0)), 0.0);
    write_pages::<colortype::Gray32Float, _, _>(&mut writer, volume, &description, |&v| v)?;
    writer.flush()?;
    Ok(())
}

fn write_pages<C, T, W>(
    writer: &mut W,
    stack: &Array3<T>,
    description: &str,
    convert: impl Fn(&T) -> C::Inner,
) -> Result<()>
where
    C: colortype::ColorType,
    [C::Inner]: tiff::encoder::TiffValue,
    W: Write + Seek,
{
    let (_, height, width) = stack.dim();
    let mut encoder = TiffEncoder::new(writer)?;
    for (index, plane) in stack.outer_iter().enumerate() {
        let data: Vec<C::Inner> = plane.iter().map(&convert).collect();
        let mut image = encoder.new_image::<C>(width as u32, height as u32)?;
        if index == 0 {
            image.encoder().write_tag(Tag::ImageDescription, description)?;
        }
        image.write_data(&data)?;
    }
    Ok(())
}

/// Read a multi-page integer TIFF into a (Z, Y, X) label volume.
pub fn read_label_stack(path: &Path) -> Result<LabelVolume> {
    let mut decoder = Decoder::new(BufReader::new(
        File::open(path).with_context(|| format!("Error opening {path:?}"))?,
    ))?
    .with_limits(Limits::unlimited());
    let (width, height) = decoder.dimensions()?;
    let mut data = Vec::new();
    let mut depth = 0;
    loop {
        let dims = decoder.dimensions()?;
        if dims != (width, height) {
            bail!(
                "page {depth} of {path:?} is {}x{}, expected {width}x{height}",
                dims.0,
                dims.1
            );
        }
        match decoder.read_image()? {
            DecodingResult::U8(page) => data.extend(page.into_iter().map(u32::from)),
            DecodingResult::U16(page) => data.extend(page.into_iter().map(u32::from)),
            DecodingResult::U32(page) => data.extend(page),
            _ => bail!("Only accepting label TIFFs of datatype Uint8, Uint16 and Uint32."),
        }
        depth += 1;
        if !decoder.more_images() {
            break;
        }
        decoder.next_image()?;
    }
    Ok(Array3::from_shape_vec(
        (depth, height as usize, width as usize),
        data,
    )?)
}
