//! Payload reader with loop-on-exhaustion semantics.

use std::io::{Read, Seek, SeekFrom};

use crate::container::{parse_header, FormatDescriptor};
use crate::StreamWavError;

/// Read position within the payload.
///
/// Owned by whoever owns the [`ChunkedReader`]; only `read` and `rewind`
/// mutate it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamCursor {
    /// Bytes left in the current pass.
    pub remaining: u64,
    /// Absolute offset of the first payload byte.
    pub payload_start: u64,
    /// Whether reads wrap to the payload start at the end.
    pub looping: bool,
}

/// Streams the PCM payload of an open container.
///
/// Never reads past the declared payload size. With looping enabled a
/// single [`read`](Self::read) wraps transparently to the payload start and
/// always fills the whole buffer, unless the payload is empty or the source
/// fails.
///
/// # Example
///
/// ```
/// use std::io::Cursor;
/// use stream_wav::container::{write_header, FormatDescriptor};
/// use stream_wav::ChunkedReader;
///
/// let mut bytes = Vec::new();
/// write_header(&mut bytes, &FormatDescriptor::pcm16(1, 8000, 4)).unwrap();
/// bytes.extend_from_slice(&[1, 2, 3, 4]);
///
/// let mut reader = ChunkedReader::open(Cursor::new(bytes)).unwrap();
/// reader.set_looping(true);
///
/// let mut buf = [0u8; 6];
/// assert_eq!(reader.read(&mut buf).unwrap(), 6);
/// assert_eq!(buf, [1, 2, 3, 4, 1, 2]);
/// ```
pub struct ChunkedReader<R> {
    source: R,
    format: FormatDescriptor,
    cursor: StreamCursor,
    loops_completed: u64,
}

impl<R: Read + Seek> ChunkedReader<R> {
    /// Parses the container header and positions the reader at the payload.
    ///
    /// Looping is off initially.
    ///
    /// # Errors
    ///
    /// Returns any header or validation error from
    /// [`parse_header`](crate::container::parse_header).
    pub fn open(mut source: R) -> Result<Self, StreamWavError> {
        let header = parse_header(&mut source)?;
        Ok(Self {
            source,
            format: header.format,
            cursor: StreamCursor {
                remaining: header.format.payload_size,
                payload_start: header.payload_offset,
                looping: false,
            },
            loops_completed: 0,
        })
    }

    /// Copies up to `buf.len()` payload bytes into `buf`.
    ///
    /// Without looping, returns fewer bytes only once the payload runs out
    /// (and `0` after that). With looping, wraps to the payload start as
    /// often as needed to fill `buf`.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if the source fails or ends before
    /// the declared payload size. The cursor is then unspecified within the
    /// current pass.
    pub fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.format.payload_size == 0 {
            return Ok(0);
        }

        let mut want = buf.len();
        if !self.cursor.looping {
            want = want.min(usize::try_from(self.cursor.remaining).unwrap_or(usize::MAX));
        }

        let mut filled = 0;
        while filled < want {
            if self.cursor.remaining == 0 {
                if !self.cursor.looping {
                    break;
                }
                self.rewind()?;
                self.loops_completed += 1;
            }

            let take = (want - filled).min(usize::try_from(self.cursor.remaining).unwrap_or(usize::MAX));
            self.source.read_exact(&mut buf[filled..filled + take])?;
            filled += take;
            self.cursor.remaining -= take as u64;
        }

        Ok(filled)
    }

    /// Moves back to the first payload byte and restores the full pass size.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if seeking fails.
    pub fn rewind(&mut self) -> std::io::Result<()> {
        self.source
            .seek(SeekFrom::Start(self.cursor.payload_start))?;
        self.cursor.remaining = self.format.payload_size;
        Ok(())
    }
}

impl<R> ChunkedReader<R> {
    /// Enables or disables wrapping at the end of the payload.
    pub fn set_looping(&mut self, looping: bool) {
        self.cursor.looping = looping;
    }

    /// Returns whether the reader wraps at the end of the payload.
    pub fn is_looping(&self) -> bool {
        self.cursor.looping
    }

    /// `true` once no further bytes will ever be returned.
    ///
    /// That is the end of a non-looping pass, or an empty payload.
    pub fn is_exhausted(&self) -> bool {
        self.cursor.remaining == 0 && (!self.cursor.looping || self.format.payload_size == 0)
    }

    /// Bytes left in the current pass.
    pub fn remaining(&self) -> u64 {
        self.cursor.remaining
    }

    /// Declared payload size of one pass.
    pub fn payload_size(&self) -> u64 {
        self.format.payload_size
    }

    /// Byte offset within the current pass.
    pub fn position(&self) -> u64 {
        self.format.payload_size - self.cursor.remaining
    }

    /// Number of times a looping read wrapped to the payload start.
    pub fn loops_completed(&self) -> u64 {
        self.loops_completed
    }

    /// Format of the underlying container.
    pub fn format(&self) -> &FormatDescriptor {
        &self.format
    }

    /// Snapshot of the read cursor.
    pub fn cursor(&self) -> StreamCursor {
        self.cursor
    }
}
