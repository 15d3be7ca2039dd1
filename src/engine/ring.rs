//! Buffer Slot ring.

use std::collections::VecDeque;

use crate::backend::{AudioBackend, BufferId};
use crate::BackendError;

/// N hardware buffers plus one scratch region for refills.
///
/// Slots are indexed by position; `in_flight` keeps slot indices in
/// submission order, so a finished buffer always maps back to the front
/// entry. A slot is refilled only after [`retire`](Self::retire) returns it.
pub(crate) struct BufferRing {
    slots: Vec<BufferId>,
    in_flight: VecDeque<usize>,
    scratch: Vec<u8>,
}

impl BufferRing {
    /// Allocates `count` buffers and a `scratch_bytes` refill region.
    ///
    /// On failure every buffer allocated so far is released again.
    pub fn allocate<B: AudioBackend + ?Sized>(
        backend: &mut B,
        count: usize,
        scratch_bytes: usize,
    ) -> Result<Self, BackendError> {
        let mut scratch = Vec::new();
        scratch.try_reserve_exact(scratch_bytes).map_err(|e| {
            BackendError::allocation(format!("{scratch_bytes} byte refill buffer: {e}"))
        })?;
        scratch.resize(scratch_bytes, 0);

        let mut slots = Vec::with_capacity(count);
        for _ in 0..count {
            match backend.create_buffer() {
                Ok(buffer) => slots.push(buffer),
                Err(e) => {
                    for buffer in slots {
                        if let Err(release) = backend.release_buffer(buffer) {
                            tracing::warn!(?buffer, error = %release, "Failed to release buffer");
                        }
                    }
                    return Err(e);
                }
            }
        }

        Ok(Self {
            slots,
            in_flight: VecDeque::with_capacity(count),
            scratch,
        })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn buffer(&self, slot: usize) -> BufferId {
        self.slots[slot]
    }

    pub fn scratch(&self) -> &[u8] {
        &self.scratch
    }

    pub fn scratch_mut(&mut self) -> &mut [u8] {
        &mut self.scratch
    }

    /// Slots queued on the voice and not yet retired.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_idle(&self) -> bool {
        self.in_flight.is_empty()
    }

    /// Records that `slot` was queued on the voice.
    pub fn submitted(&mut self, slot: usize) {
        debug_assert!(!self.in_flight.contains(&slot), "slot {slot} queued twice");
        self.in_flight.push_back(slot);
    }

    /// Maps a finished buffer back to its slot, freeing it for refill.
    ///
    /// Buffers must finish in submission order.
    pub fn retire(&mut self, buffer: BufferId) -> Result<usize, BackendError> {
        let slot = self
            .in_flight
            .front()
            .copied()
            .ok_or(BackendError::UnknownBuffer(buffer))?;
        let expected = self.slots[slot];
        if expected != buffer {
            return Err(BackendError::OutOfOrder {
                expected,
                actual: buffer,
            });
        }
        self.in_flight.pop_front();
        Ok(slot)
    }

    /// Releases every buffer. A second call does nothing.
    pub fn release_all<B: AudioBackend + ?Sized>(&mut self, backend: &mut B) {
        self.in_flight.clear();
        for buffer in self.slots.drain(..) {
            if let Err(e) = backend.release_buffer(buffer) {
                tracing::warn!(?buffer, error = %e, "Failed to release buffer");
            }
        }
    }
}
