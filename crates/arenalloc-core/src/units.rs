//! Size-unit helpers.
//!
//! Binary multiples for sizing an arena: `kib(4)` is 4096 bytes. The plain
//! forms are `const fn` so they can size statics; the `checked_*` forms return
//! `None` instead of overflowing.

const KIB_SHIFT: u32 = 10;
const MIB_SHIFT: u32 = 20;
const GIB_SHIFT: u32 = 30;

/// `n` kibibytes in bytes.
#[must_use]
pub const fn kib(n: usize) -> usize {
    n * (1 << KIB_SHIFT)
}

/// `n` mebibytes in bytes.
#[must_use]
pub const fn mib(n: usize) -> usize {
    n * (1 << MIB_SHIFT)
}

/// `n` gibibytes in bytes.
///
/// On 32-bit targets anything above 3 GiB overflows; use [`checked_gib`].
#[must_use]
pub const fn gib(n: usize) -> usize {
    n * (1 << GIB_SHIFT)
}

#[must_use]
pub const fn checked_kib(n: usize) -> Option<usize> {
    n.checked_mul(1 << KIB_SHIFT)
}

#[must_use]
pub const fn checked_mib(n: usize) -> Option<usize> {
    n.checked_mul(1 << MIB_SHIFT)
}

#[must_use]
pub const fn checked_gib(n: usize) -> Option<usize> {
    n.checked_mul(1 << GIB_SHIFT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_multiples() {
        assert_eq!(kib(1), 1024);
        assert_eq!(kib(3), 3 * 1024);
        assert_eq!(mib(5), 5 * 1024 * 1024);
        assert_eq!(mib(1), kib(1024));
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn gib_on_64_bit() {
        assert_eq!(gib(2), 2 * 1024 * 1024 * 1024);
        assert_eq!(gib(1), mib(1024));
    }

    #[test]
    fn zero_is_zero() {
        assert_eq!(kib(0), 0);
        assert_eq!(mib(0), 0);
        assert_eq!(gib(0), 0);
    }

    #[test]
    fn checked_variants_catch_overflow() {
        assert_eq!(checked_kib(2), Some(2048));
        assert_eq!(checked_mib(usize::MAX), None);
        assert_eq!(checked_gib(usize::MAX / 2), None);
        assert_eq!(checked_kib(usize::MAX >> KIB_SHIFT), Some((usize::MAX >> KIB_SHIFT) << KIB_SHIFT));
    }
}
