//! Control bytes and the group scan over them.
//!
//! Every slot of a table has one control byte. Occupied slots store a 7-bit
//! hash fragment with the top bit clear, so both special values can be
//! recognised from the sign bit alone.

/// Special control byte marking a slot that has never held a value (or was
/// reset by a clear or a rehash).
///
/// Chosen as 0x80 so `movemask`-based scans can pick out specials from the
/// sign bit.
pub(crate) const EMPTY: u8 = 0x80;

/// Special control byte marking a tombstone. Probes must continue past it.
pub(crate) const DELETED: u8 = 0xFE;

#[inline(always)]
pub(crate) fn is_full(ctrl: u8) -> bool {
    ctrl & 0x80 == 0
}

cfg_if::cfg_if! {
    // AVX2 scans 32 control bytes at once, SSE2 16. Everything else (and
    // miri, which cannot run the intrinsics) falls back to an 8-byte scan.
    if #[cfg(all(
        not(feature = "scalar"),
        target_feature = "avx2",
        any(target_arch = "x86", target_arch = "x86_64"),
        not(miri),
    ))] {
        mod avx2;
        use avx2 as imp;
    } else if #[cfg(all(
        not(feature = "scalar"),
        target_feature = "sse2",
        any(target_arch = "x86", target_arch = "x86_64"),
        not(miri),
    ))] {
        mod sse2;
        use sse2 as imp;
    } else {
        mod generic;
        use generic as imp;
    }
}

pub(crate) use self::imp::Group;

/// Set of lanes in a [`Group`], one bit per lane, lowest lane first.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct BitMask(pub(crate) u32);

impl BitMask {
    #[inline(always)]
    pub(crate) fn any_bit_set(self) -> bool {
        self.0 != 0
    }

    #[inline(always)]
    pub(crate) fn lowest_set_bit(self) -> Option<usize> {
        if self.0 == 0 {
            None
        } else {
            Some(self.0.trailing_zeros() as usize)
        }
    }
}

impl Iterator for BitMask {
    type Item = usize;

    #[inline(always)]
    fn next(&mut self) -> Option<usize> {
        let bit = self.lowest_set_bit()?;
        self.0 &= self.0 - 1;
        Some(bit)
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;
    use alloc::vec::Vec;

    use super::*;

    #[test]
    fn bitmask_iterates_low_to_high() {
        let lanes: Vec<usize> = BitMask(0b1010_0101).collect();
        assert_eq!(lanes, vec![0, 2, 5, 7]);
        assert_eq!(BitMask(0).lowest_set_bit(), None);
        assert!(!BitMask(0).any_bit_set());
    }

    #[test]
    fn group_matches_fragment_and_specials() {
        let mut ctrl = vec![EMPTY; Group::WIDTH * 2];
        ctrl[1] = 0x15;
        ctrl[3] = DELETED;
        ctrl[4] = 0x15;
        ctrl[Group::WIDTH - 1] = 0x7F;

        // SAFETY: `ctrl` holds two full groups.
        let group = unsafe { Group::load(ctrl.as_ptr()) };

        assert_eq!(group.match_byte(0x15).collect::<Vec<_>>(), vec![1, 4]);
        assert_eq!(group.match_byte(DELETED).collect::<Vec<_>>(), vec![3]);
        assert_eq!(group.match_byte(0x7F).lowest_set_bit(), Some(Group::WIDTH - 1));

        let empties: Vec<usize> = group.match_empty().collect();
        assert_eq!(empties.len(), Group::WIDTH - 4);
        assert!(!empties.contains(&3));
        assert_eq!(group.match_empty().lowest_set_bit(), Some(0));

        let specials: Vec<usize> = group.match_empty_or_deleted().collect();
        assert_eq!(specials.len(), Group::WIDTH - 3);
        assert!(specials.contains(&3));
        assert!(!specials.contains(&1));
    }

    #[test]
    fn unaligned_group_load() {
        let mut ctrl = vec![EMPTY; Group::WIDTH + 3];
        ctrl[3] = 0x01;
        ctrl[Group::WIDTH + 2] = 0x02;

        // SAFETY: `ctrl[3..]` holds exactly one group.
        let group = unsafe { Group::load(ctrl.as_ptr().add(3)) };
        assert_eq!(group.match_byte(0x01).lowest_set_bit(), Some(0));
        assert_eq!(group.match_byte(0x02).lowest_set_bit(), Some(Group::WIDTH - 1));
    }

    #[test]
    fn group_width_follows_target_features() {
        let expected = if cfg!(any(feature = "scalar", miri))
            || !cfg!(any(target_arch = "x86", target_arch = "x86_64"))
        {
            8
        } else if cfg!(target_feature = "avx2") {
            32
        } else if cfg!(target_feature = "sse2") {
            16
        } else {
            8
        };
        assert_eq!(Group::WIDTH, expected);
    }

    #[test]
    fn fullness_from_top_bit() {
        assert!(is_full(0x00));
        assert!(is_full(0x7F));
        assert!(!is_full(EMPTY));
        assert!(!is_full(DELETED));
    }
}
