use ndarray::{Array2, Array3, ArrayView2, Axis};
use num_complex::Complex64;

use crate::prelude::{StageError, StageResult};

/// Range profiles of every selected channel for one trigger, shaped (bin × channel).
pub type ProfileFrame = Array2<Complex64>;

/// Slow-time history shaped (slow-time × range bin × channel), oldest row first.
pub type SignalMatrix = Array3<Complex64>;

/// Fixed-capacity FIFO of profile frames backed by one preallocated arena.
///
/// Rows are written at `head` modulo the capacity; once full, every push
/// overwrites the oldest row.
pub struct SlowTimeBuffer {
    capacity: usize,
    arena: Option<Array3<Complex64>>,
    head: usize,
    len: usize,
}

impl SlowTimeBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            arena: None,
            head: 0,
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// (range bins, channels) of the held rows, if any were ever pushed.
    pub fn row_shape(&self) -> Option<(usize, usize)> {
        self.arena.as_ref().map(|arena| {
            let (_, bins, channels) = arena.dim();
            (bins, channels)
        })
    }

    /// Appends the newest frame, evicting the oldest when at capacity.
    ///
    /// A frame whose channel or bin count differs from the held rows is rejected;
    /// the caller must clear the history before mixing shapes.
    pub fn push(&mut self, frame: ArrayView2<Complex64>) -> StageResult<()> {
        let (bins, channels) = frame.dim();
        match self.row_shape() {
            Some(shape) if shape == (bins, channels) => {}
            Some((held_bins, held_channels)) if self.len > 0 => {
                if held_channels != channels {
                    return Err(StageError::SelectionMismatch {
                        expected: held_channels,
                        found: channels,
                    });
                }
                return Err(StageError::ProfileLengthMismatch {
                    expected: held_bins,
                    found: bins,
                });
            }
            _ => {
                self.arena = Some(Array3::zeros((self.capacity, bins, channels)));
                self.head = 0;
                self.len = 0;
            }
        }

        let arena = self
            .arena
            .as_mut()
            .ok_or_else(|| StageError::Internal("slow-time arena missing".into()))?;
        arena.index_axis_mut(Axis(0), self.head).assign(&frame);
        self.head = (self.head + 1) % self.capacity;
        self.len = (self.len + 1).min(self.capacity);
        Ok(())
    }

    /// Most recently pushed frame.
    pub fn latest(&self) -> Option<ArrayView2<Complex64>> {
        if self.len == 0 {
            return None;
        }
        let newest = (self.head + self.capacity - 1) % self.capacity;
        self.arena
            .as_ref()
            .map(|arena| arena.index_axis(Axis(0), newest))
    }

    /// Stacks the held rows into a signal matrix in chronological order.
    pub fn materialize(&self) -> StageResult<SignalMatrix> {
        let arena = match self.arena.as_ref() {
            Some(arena) if self.len > 0 => arena,
            _ => return Err(StageError::InsufficientHistory { rows: 0 }),
        };
        let oldest = (self.head + self.capacity - self.len) % self.capacity;
        let order: Vec<usize> = (0..self.len)
            .map(|offset| (oldest + offset) % self.capacity)
            .collect();
        Ok(arena.select(Axis(0), &order))
    }

    /// Forgets every held row; the arena is kept for the next frame of the same shape.
    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
    }
}
