//! Canonical header writer.
//! See: http://soundfile.sapp.org/doc/WaveFormat/

use std::io::{Error, ErrorKind, Write};

use super::{FormatDescriptor, CANONICAL_HEADER_SIZE};

/// Size of the `fmt ` chunk body for plain PCM.
const FMT_CHUNK_SIZE: u32 = 16;

/// Writes a 44-byte `RIFF`/`fmt `/`data` header for `format`.
///
/// The payload itself is not written; `format.payload_size` bytes of
/// little-endian PCM are expected to follow. Sizes above `u32::MAX` are
/// saturated, which no conforming reader accepts anyway.
///
/// # Errors
///
/// Returns [`ErrorKind::InvalidInput`] if the byte rate does not fit the
/// 32-bit header field, and otherwise any error from `writer`.
///
/// # Example
///
/// ```
/// use stream_wav::container::{write_header, FormatDescriptor};
///
/// let mut bytes = Vec::new();
/// write_header(&mut bytes, &FormatDescriptor::pcm16(2, 44100, 0)).unwrap();
/// assert_eq!(bytes.len(), 44);
/// assert_eq!(&bytes[0..4], b"RIFF");
/// ```
pub fn write_header<W: Write>(writer: &mut W, format: &FormatDescriptor) -> std::io::Result<()> {
    let byte_rate = format.byte_rate().ok_or_else(|| {
        Error::new(
            ErrorKind::InvalidInput,
            format!("byte rate of {}Hz x {} bytes overflows", format.sample_rate, format.block_align()),
        )
    })?;
    let data_size = u32::try_from(format.payload_size).unwrap_or(u32::MAX);

    // RIFF container header
    writer.write_all(b"RIFF")?;
    let riff_size = (CANONICAL_HEADER_SIZE as u32 - 8).saturating_add(data_size);
    writer.write_all(&riff_size.to_le_bytes())?;
    writer.write_all(b"WAVE")?;

    // fmt subchunk
    writer.write_all(b"fmt ")?;
    writer.write_all(&FMT_CHUNK_SIZE.to_le_bytes())?;
    writer.write_all(&format.format_tag.to_le_bytes())?;
    writer.write_all(&format.channels.to_le_bytes())?;
    writer.write_all(&format.sample_rate.to_le_bytes())?;
    writer.write_all(&byte_rate.to_le_bytes())?;
    writer.write_all(&format.block_align().to_le_bytes())?;
    writer.write_all(&format.bits_per_sample.to_le_bytes())?;

    // data subchunk header
    writer.write_all(b"data")?;
    writer.write_all(&data_size.to_le_bytes())?;

    Ok(())
}
