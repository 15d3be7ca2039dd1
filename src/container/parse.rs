//! Header parsing.

use std::io::{ErrorKind, Read, Seek, SeekFrom};

use super::{
    FormatDescriptor, WavHeader, CHUNK_HEADER_SIZE, FORMAT_PCM, MAX_SAMPLE_RATE,
    RIFF_HEADER_SIZE, SUPPORTED_BITS_PER_SAMPLE,
};
use crate::StreamWavError;

/// Offsets inside the `fmt ` chunk body.
const FMT_FORMAT_TAG: usize = 0;
const FMT_CHANNELS: usize = 2;
const FMT_SAMPLE_RATE: usize = 4;
const FMT_BITS_PER_SAMPLE: usize = 14;

/// Smallest `fmt ` body that carries every field we read.
const FMT_MIN_SIZE: u32 = 16;

/// Upper bound for a `fmt ` body. Anything larger is not a format chunk.
const FMT_MAX_SIZE: u32 = 1024;

/// Parses the container header and validates the encoding.
///
/// Chunk order is not fixed by the format, so each required chunk is located
/// by scanning chunk headers from the end of the `RIFF` preamble. On success
/// the source is left positioned at the first payload byte.
///
/// A `data` size that runs past the end of the source is clamped to the bytes
/// actually present.
///
/// # Errors
///
/// - [`StreamWavError::UnrecognizedContainer`] if the magic is not `RIFF`/`WAVE`
/// - [`StreamWavError::MissingChunk`] if `fmt ` or `data` is absent
/// - [`StreamWavError::MalformedChunk`] if `fmt ` is too short to read
/// - [`StreamWavError::UnsupportedFormat`] unless the encoding is 16-bit linear PCM
/// - [`StreamWavError::UnsupportedLayout`] unless there are one or two channels
///   at a sample rate in `1..=MAX_SAMPLE_RATE`
pub fn parse_header<R: Read + Seek>(source: &mut R) -> Result<WavHeader, StreamWavError> {
    source.seek(SeekFrom::Start(0))?;

    let mut preamble = [0u8; RIFF_HEADER_SIZE as usize];
    read_or_unrecognized(source, &mut preamble)?;
    if &preamble[0..4] != b"RIFF" {
        return Err(unrecognized(&preamble[0..4]));
    }
    if &preamble[8..12] != b"WAVE" {
        return Err(unrecognized(&preamble[8..12]));
    }

    let fmt_size = find_chunk(source, b"fmt ")?.ok_or(StreamWavError::MissingChunk { tag: "fmt " })?;
    if !(FMT_MIN_SIZE..=FMT_MAX_SIZE).contains(&fmt_size) {
        return Err(StreamWavError::MalformedChunk {
            tag: "fmt ",
            reason: format!("size {fmt_size} outside {FMT_MIN_SIZE}..={FMT_MAX_SIZE}"),
        });
    }
    let mut fmt = vec![0u8; fmt_size as usize];
    source.read_exact(&mut fmt).map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof => StreamWavError::MalformedChunk {
            tag: "fmt ",
            reason: "truncated".to_string(),
        },
        _ => StreamWavError::Io(e),
    })?;

    let format_tag = le_u16(&fmt, FMT_FORMAT_TAG);
    let channels = le_u16(&fmt, FMT_CHANNELS);
    let sample_rate = le_u32(&fmt, FMT_SAMPLE_RATE);
    let bits_per_sample = le_u16(&fmt, FMT_BITS_PER_SAMPLE);

    if format_tag != FORMAT_PCM || bits_per_sample != SUPPORTED_BITS_PER_SAMPLE {
        return Err(StreamWavError::UnsupportedFormat {
            format_tag,
            bits_per_sample,
        });
    }
    if !(1..=2).contains(&channels) || !(1..=MAX_SAMPLE_RATE).contains(&sample_rate) {
        return Err(StreamWavError::UnsupportedLayout {
            channels,
            sample_rate,
        });
    }

    let declared =
        u64::from(find_chunk(source, b"data")?.ok_or(StreamWavError::MissingChunk { tag: "data" })?);
    let payload_offset = source.stream_position()?;
    let end = source.seek(SeekFrom::End(0))?;
    let available = end.saturating_sub(payload_offset);
    let present = if declared > available {
        tracing::warn!(
            declared,
            available,
            "data chunk overruns the source, clamping payload size"
        );
        available
    } else {
        declared
    };
    // Whole frames only, so a looping read wraps on a frame boundary
    let block_align = u64::from(channels * (bits_per_sample / 8));
    let payload_size = present - present % block_align;
    if payload_size != present {
        tracing::warn!(
            present,
            payload_size,
            "data chunk ends mid-frame, dropping the partial frame"
        );
    }
    source.seek(SeekFrom::Start(payload_offset))?;

    let format = FormatDescriptor {
        format_tag,
        channels,
        sample_rate,
        bits_per_sample,
        payload_size,
    };

    tracing::debug!(
        channels,
        sample_rate,
        payload_size,
        payload_offset,
        "parsed WAVE header"
    );

    Ok(WavHeader {
        format,
        payload_offset,
    })
}

/// Scans chunk headers from the start of the chunk list for `tag`.
///
/// Returns the chunk size with the source positioned at the chunk body, or
/// `None` once the source runs out. Odd-sized chunks carry a pad byte.
fn find_chunk<R: Read + Seek>(source: &mut R, tag: &[u8; 4]) -> Result<Option<u32>, StreamWavError> {
    source.seek(SeekFrom::Start(RIFF_HEADER_SIZE))?;

    let mut header = [0u8; CHUNK_HEADER_SIZE as usize];
    loop {
        match source.read_exact(&mut header) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let size = le_u32(&header, 4);
        if &header[0..4] == tag {
            return Ok(Some(size));
        }

        let skip = i64::from(size) + i64::from(size & 1);
        source.seek(SeekFrom::Current(skip))?;
    }
}

fn read_or_unrecognized<R: Read>(source: &mut R, buf: &mut [u8]) -> Result<(), StreamWavError> {
    match source.read_exact(buf) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => Err(StreamWavError::UnrecognizedContainer {
            magic: "<truncated>".to_string(),
        }),
        Err(e) => Err(e.into()),
    }
}

fn unrecognized(magic: &[u8]) -> StreamWavError {
    StreamWavError::UnrecognizedContainer {
        magic: String::from_utf8_lossy(magic).into_owned(),
    }
}

fn le_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

fn le_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}
