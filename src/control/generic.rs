use super::BitMask;
use super::EMPTY;

/// A group of control bytes compared one byte at a time.
#[derive(Copy, Clone)]
pub(crate) struct Group([u8; Group::WIDTH]);

impl Group {
    /// Number of control bytes in the group.
    pub(crate) const WIDTH: usize = 8;

    /// Loads a group of control bytes starting at `ptr`.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for reads of `WIDTH` bytes. No alignment is
    /// required.
    #[inline(always)]
    pub(crate) unsafe fn load(ptr: *const u8) -> Self {
        // SAFETY: The caller guarantees `WIDTH` readable bytes at `ptr`.
        unsafe { Group(ptr.cast::<[u8; Group::WIDTH]>().read_unaligned()) }
    }

    #[inline(always)]
    pub(crate) fn match_byte(self, byte: u8) -> BitMask {
        let mut bits = 0u32;
        for (lane, &ctrl) in self.0.iter().enumerate() {
            if ctrl == byte {
                bits |= 1 << lane;
            }
        }
        BitMask(bits)
    }

    #[inline(always)]
    pub(crate) fn match_empty(self) -> BitMask {
        self.match_byte(EMPTY)
    }

    #[inline(always)]
    pub(crate) fn match_empty_or_deleted(self) -> BitMask {
        let mut bits = 0u32;
        for (lane, &ctrl) in self.0.iter().enumerate() {
            if ctrl & 0x80 != 0 {
                bits |= 1 << lane;
            }
        }
        BitMask(bits)
    }
}
