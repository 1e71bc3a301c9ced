//! # Share Math
//!
//! `a * b / d` over `u128` without intermediate overflow. Share conversions
//! multiply two 18-decimal quantities, which easily exceeds `u128` before
//! the division brings the result back into range.

/// Rounding direction for [`mul_div`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounding {
    /// Toward zero.
    Down,
    /// Away from zero when there is a remainder.
    Up,
}

const LOW_MASK: u128 = u64::MAX as u128;

/// Full 256-bit product as `(high, low)` halves.
fn mul_wide(a: u128, b: u128) -> (u128, u128) {
    let (a_hi, a_lo) = (a >> 64, a & LOW_MASK);
    let (b_hi, b_lo) = (b >> 64, b & LOW_MASK);

    let lo_lo = a_lo * b_lo;
    let lo_hi = a_lo * b_hi;
    let hi_lo = a_hi * b_lo;
    let hi_hi = a_hi * b_hi;

    // Each term is below 2^64, so three of them fit in a u128.
    let mid = (lo_lo >> 64) + (lo_hi & LOW_MASK) + (hi_lo & LOW_MASK);
    let low = (lo_lo & LOW_MASK) | ((mid & LOW_MASK) << 64);
    let high = hi_hi + (lo_hi >> 64) + (hi_lo >> 64) + (mid >> 64);
    (high, low)
}

/// Computes `a * b / denominator` with the given rounding.
///
/// Returns `None` when `denominator` is zero or the quotient does not fit
/// in a `u128`.
pub fn mul_div(a: u128, b: u128, denominator: u128, rounding: Rounding) -> Option<u128> {
    if denominator == 0 {
        return None;
    }
    let (high, low) = mul_wide(a, b);

    let (quotient, remainder) = if high == 0 {
        (low / denominator, low % denominator)
    } else {
        if high >= denominator {
            return None;
        }
        // Binary long division of (high:low) by the denominator. `high` is
        // already reduced below the denominator, so the quotient fits.
        let mut rem = high;
        let mut quotient = 0u128;
        for bit in (0..128).rev() {
            let carry = rem >> 127;
            rem = (rem << 1) | ((low >> bit) & 1);
            if carry == 1 || rem >= denominator {
                rem = rem.wrapping_sub(denominator);
                quotient |= 1u128 << bit;
            }
        }
        (quotient, rem)
    };

    match rounding {
        Rounding::Down => Some(quotient),
        Rounding::Up if remainder > 0 => quotient.checked_add(1),
        Rounding::Up => Some(quotient),
    }
}
