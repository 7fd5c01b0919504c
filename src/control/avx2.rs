#[cfg(target_arch = "x86")]
use core::arch::x86;
#[cfg(target_arch = "x86_64")]
use core::arch::x86_64 as x86;
use core::mem;

use super::BitMask;
use super::EMPTY;

/// A group of control bytes scanned in parallel with a 256-bit AVX2 value.
#[derive(Copy, Clone)]
pub(crate) struct Group(x86::__m256i);

impl Group {
    /// Number of control bytes in the group.
    pub(crate) const WIDTH: usize = mem::size_of::<Self>();

    /// Loads a group of control bytes starting at `ptr`.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for reads of `WIDTH` bytes. No alignment is
    /// required.
    #[inline(always)]
    pub(crate) unsafe fn load(ptr: *const u8) -> Self {
        // SAFETY: The caller guarantees `WIDTH` readable bytes at `ptr`.
        unsafe { Group(x86::_mm256_loadu_si256(ptr.cast())) }
    }

    /// Returns the lanes whose control byte equals `byte`.
    #[inline(always)]
    pub(crate) fn match_byte(self, byte: u8) -> BitMask {
        // SAFETY: AVX2 is statically enabled for this build.
        unsafe {
            let cmp = x86::_mm256_cmpeq_epi8(self.0, x86::_mm256_set1_epi8(byte as i8));
            BitMask(x86::_mm256_movemask_epi8(cmp) as u32)
        }
    }

    #[inline(always)]
    pub(crate) fn match_empty(self) -> BitMask {
        self.match_byte(EMPTY)
    }

    /// Returns the lanes holding `EMPTY` or `DELETED`. Both have the sign bit
    /// set and no fragment does.
    #[inline(always)]
    pub(crate) fn match_empty_or_deleted(self) -> BitMask {
        // SAFETY: AVX2 is statically enabled for this build.
        unsafe { BitMask(x86::_mm256_movemask_epi8(self.0) as u32) }
    }
}
