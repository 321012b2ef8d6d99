// value.rs — Width-tagged runtime values
//
// A `Word` is a bit vector of up to 64 bits stored in a `u64`, always kept
// masked to its width. All arithmetic wraps within the result width;
// signed operations sign-extend to 64 bits first.
//
// Preconditions: widths are 1..=64 (the builder enforces this).
// Postconditions: the raw payload never has bits set above the width.
// Failure modes: none; shifts past the width produce zero.
// Side effects: none.

use crate::ir::{BinOp, CastOp, CmpOp, UnOp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Word {
    width: u16,
    raw: u64,
}

fn mask(width: u16) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

impl Word {
    pub fn new(width: u16, raw: u64) -> Self {
        Self {
            width,
            raw: raw & mask(width),
        }
    }

    pub fn zero(width: u16) -> Self {
        Self { width, raw: 0 }
    }

    pub fn bool(v: bool) -> Self {
        Self::new(1, v as u64)
    }

    pub fn width(self) -> u16 {
        self.width
    }

    pub fn raw(self) -> u64 {
        self.raw
    }

    pub fn as_bool(self) -> bool {
        self.raw != 0
    }

    /// The payload sign-extended from its width into an `i64`.
    pub fn sext64(self) -> i64 {
        if self.width >= 64 {
            return self.raw as i64;
        }
        let shift = 64 - self.width as u32;
        ((self.raw << shift) as i64) >> shift
    }
}

/// Apply a binary operator. The result is masked to `width`; shifts use
/// the rhs payload as the shift amount and saturate to zero (or the sign
/// fill, for signed right shifts) past the word size.
pub fn binary(op: BinOp, signed: bool, lhs: Word, rhs: Word, width: u16) -> Word {
    let raw = match op {
        BinOp::Add => lhs.raw.wrapping_add(rhs.raw),
        BinOp::Sub => lhs.raw.wrapping_sub(rhs.raw),
        BinOp::Mul => lhs.raw.wrapping_mul(rhs.raw),
        BinOp::BitAnd => lhs.raw & rhs.raw,
        BinOp::BitOr => lhs.raw | rhs.raw,
        BinOp::BitXor => lhs.raw ^ rhs.raw,
        BinOp::Shl => {
            if rhs.raw >= 64 {
                0
            } else {
                lhs.raw << rhs.raw
            }
        }
        BinOp::Shr => {
            if signed {
                let x = lhs.sext64();
                let amt = rhs.raw.min(63) as u32;
                (x >> amt) as u64
            } else if rhs.raw >= 64 {
                0
            } else {
                lhs.raw >> rhs.raw
            }
        }
    };
    Word::new(width, raw)
}

/// Apply a comparison; the result is a 1-bit flag.
pub fn compare(op: CmpOp, signed: bool, lhs: Word, rhs: Word) -> Word {
    let r = if signed {
        let (a, b) = (lhs.sext64(), rhs.sext64());
        match op {
            CmpOp::Eq => a == b,
            CmpOp::Ne => a != b,
            CmpOp::Lt => a < b,
            CmpOp::Le => a <= b,
            CmpOp::Gt => a > b,
            CmpOp::Ge => a >= b,
        }
    } else {
        let (a, b) = (lhs.raw, rhs.raw);
        match op {
            CmpOp::Eq => a == b,
            CmpOp::Ne => a != b,
            CmpOp::Lt => a < b,
            CmpOp::Le => a <= b,
            CmpOp::Gt => a > b,
            CmpOp::Ge => a >= b,
        }
    };
    Word::bool(r)
}

pub fn unary(op: UnOp, x: Word, width: u16) -> Word {
    let raw = match op {
        UnOp::Not => !x.raw,
        UnOp::Neg => x.raw.wrapping_neg(),
    };
    Word::new(width, raw)
}

/// Extract bits `lo..=hi` (inclusive, lo <= hi < x.width).
pub fn slice(x: Word, lo: u16, hi: u16) -> Word {
    Word::new(hi - lo + 1, x.raw >> lo)
}

/// Concatenate with `msb` in the high bits.
pub fn concat(msb: Word, lsb: Word) -> Word {
    Word::new(
        msb.width + lsb.width,
        (msb.raw << lsb.width) | lsb.raw,
    )
}

pub fn cast(op: CastOp, x: Word, width: u16) -> Word {
    match op {
        CastOp::ZExt | CastOp::BitCast => Word::new(width, x.raw),
        CastOp::SExt => Word::new(width, x.sext64() as u64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_wraps_within_width() {
        let a = Word::new(8, 0xFF);
        let b = Word::new(8, 2);
        assert_eq!(binary(BinOp::Add, false, a, b, 8).raw(), 1);
    }

    #[test]
    fn signed_compare_uses_sign_extension() {
        let neg1 = Word::new(8, 0xFF);
        let one = Word::new(8, 1);
        assert!(compare(CmpOp::Lt, true, neg1, one).as_bool());
        assert!(!compare(CmpOp::Lt, false, neg1, one).as_bool());
    }

    #[test]
    fn signed_shr_fills_with_sign() {
        let neg4 = Word::new(8, 0xFC);
        let two = Word::new(8, 2);
        assert_eq!(binary(BinOp::Shr, true, neg4, two, 8).raw(), 0xFF);
    }

    #[test]
    fn slice_and_concat_round() {
        let x = Word::new(16, 0xABCD);
        let hi = slice(x, 8, 15);
        let lo = slice(x, 0, 7);
        assert_eq!(hi.raw(), 0xAB);
        assert_eq!(concat(hi, lo), x);
    }

    #[test]
    fn sext_cast_widens_negatives() {
        let neg1 = Word::new(4, 0xF);
        assert_eq!(cast(CastOp::SExt, neg1, 8).raw(), 0xFF);
        assert_eq!(cast(CastOp::ZExt, neg1, 8).raw(), 0x0F);
    }

    #[test]
    fn full_width_mask_is_total() {
        let x = Word::new(64, u64::MAX);
        assert_eq!(x.raw(), u64::MAX);
        assert_eq!(x.sext64(), -1);
    }
}
