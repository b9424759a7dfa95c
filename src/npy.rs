//! Minimal NumPy `.npy` I/O for the predictions artifact
//!
//! Writes the v1.0 format, little-endian float32, C order. The reader
//! exists for round-trip verification and covers exactly what the writer
//! produces.
//!
//! Reference: <https://numpy.org/devdocs/reference/generated/numpy.lib.format.html>

use anyhow::{bail, Context, Result};
use ndarray::Array2;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

const MAGIC: &[u8; 6] = b"\x93NUMPY";

/// Write a 2-D float32 array as `.npy` v1.0.
pub fn write_npy_f32(path: &Path, array: &Array2<f32>) -> Result<()> {
    let (rows, cols) = array.dim();
    let mut header = format!(
        "{{'descr': '<f4', 'fortran_order': False, 'shape': ({rows}, {cols}), }}"
    );
    // Magic + version + u16 length prefix is 10 bytes; the header (newline
    // included) pads the total to a multiple of 64.
    let unpadded = MAGIC.len() + 2 + 2 + header.len() + 1;
    let pad = (64 - unpadded % 64) % 64;
    header.extend(std::iter::repeat(' ').take(pad));
    header.push('\n');

    let file = File::create(path)
        .with_context(|| format!("creating npy file {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    writer.write_all(MAGIC)?;
    writer.write_all(&[1, 0])?;
    writer.write_all(&(header.len() as u16).to_le_bytes())?;
    writer.write_all(header.as_bytes())?;
    for &value in array.iter() {
        writer.write_all(&value.to_le_bytes())?;
    }
    writer.flush()?;
    Ok(())
}

/// Read back a 2-D float32 `.npy` file produced by [`write_npy_f32`].
pub fn read_npy_f32(path: &Path) -> Result<Array2<f32>> {
    let file =
        File::open(path).with_context(|| format!("opening npy file {}", path.display()))?;
    let mut reader = BufReader::new(file);

    let mut magic = [0u8; 6];
    reader.read_exact(&mut magic)?;
    if &magic != MAGIC {
        bail!("{} is not a valid .npy file (bad magic)", path.display());
    }
    let mut version = [0u8; 2];
    reader.read_exact(&mut version)?;
    let mut len_bytes = [0u8; 2];
    reader.read_exact(&mut len_bytes)?;
    let header_len = u16::from_le_bytes(len_bytes) as usize;

    let mut header_bytes = vec![0u8; header_len];
    reader.read_exact(&mut header_bytes)?;
    let header = std::str::from_utf8(&header_bytes).context("npy header is not utf8")?;
    if !header.contains("'<f4'") {
        bail!("unsupported npy dtype, expected '<f4': {header}");
    }
    let (rows, cols) = parse_shape(header)?;

    let mut data = vec![0u8; rows * cols * 4];
    reader.read_exact(&mut data)?;
    let values: Vec<f32> = data
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    Array2::from_shape_vec((rows, cols), values).context("npy shape mismatch")
}

fn parse_shape(header: &str) -> Result<(usize, usize)> {
    let start = header
        .find('(')
        .context("npy header has no shape tuple")?;
    let end = header[start..]
        .find(')')
        .context("npy header shape tuple is unterminated")?
        + start;
    let dims: Vec<usize> = header[start + 1..end]
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<usize>().context("bad npy shape dimension"))
        .collect::<Result<_>>()?;
    match dims.as_slice() {
        [rows, cols] => Ok((*rows, *cols)),
        other => bail!("expected a 2-D npy shape, got {other:?}"),
    }
}
