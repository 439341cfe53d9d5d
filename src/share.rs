// Copyright (C) myl7
// SPDX-License-Identifier: Apache-2.0

//! Secret-share registers.
//!
//! A register holds one party's share.
//! Only `share_P0 + share_P1` (resp. `^`) is meaningful; anything else is arithmetic on random-looking values.
//! Constants are held by P0, so adding a public constant is done by P0 alone (see `constant`).

use std::ops::{Add, AddAssign, BitAnd, BitXor, BitXorAssign, Mul, Neg, Shl, Shr, Sub, SubAssign};

use rand::Rng;

use crate::{Player, Value};

/// Additive share: `$x = x_0 + x_1 \bmod 2^{64}$`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AShare(pub Value);

/// XOR share: `$x = x_0 \oplus x_1$`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct XShare(pub Value);

/// Single-bit XOR share.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BShare(pub bool);

impl AShare {
    /// Share of the public `v`.
    pub fn constant(player: Player, v: Value) -> Self {
        Self(if player == 0 { v } else { 0 })
    }

    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self(rng.gen())
    }

    /// Local product of the two shares held by the same party.
    /// Not a secure multiplication.
    pub fn mulshare(self, rhs: Self) -> Self {
        Self(self.0.wrapping_mul(rhs.0))
    }
}

impl XShare {
    pub fn constant(player: Player, v: Value) -> Self {
        Self(if player == 0 { v } else { 0 })
    }

    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self(rng.gen())
    }

    pub fn bit(self, i: u32) -> BShare {
        BShare((self.0 >> i) & 1 == 1)
    }

    /// Local AND of the two shares held by the same party.
    /// Not a secure AND.
    pub fn andshare(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl BShare {
    pub fn constant(player: Player, b: bool) -> Self {
        Self(player == 0 && b)
    }

    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self(rng.gen())
    }

    /// Share of `!b`: P0 flips its share.
    pub fn not(self, player: Player) -> Self {
        self ^ Self::constant(player, true)
    }
}

impl Add for AShare {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0.wrapping_add(rhs.0))
    }
}

impl AddAssign for AShare {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sub for AShare {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0.wrapping_sub(rhs.0))
    }
}

impl SubAssign for AShare {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl Neg for AShare {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self(self.0.wrapping_neg())
    }
}

/// Scalar multiplication by a public value.
impl Mul<Value> for AShare {
    type Output = Self;

    fn mul(self, rhs: Value) -> Self::Output {
        Self(self.0.wrapping_mul(rhs))
    }
}

impl BitXor for XShare {
    type Output = Self;

    fn bitxor(self, rhs: Self) -> Self::Output {
        Self(self.0 ^ rhs.0)
    }
}

impl BitXorAssign for XShare {
    fn bitxor_assign(&mut self, rhs: Self) {
        self.0 ^= rhs.0;
    }
}

/// AND with a public mask.
impl BitAnd<Value> for XShare {
    type Output = Self;

    fn bitand(self, rhs: Value) -> Self::Output {
        Self(self.0 & rhs)
    }
}

impl Shl<u32> for XShare {
    type Output = Self;

    fn shl(self, rhs: u32) -> Self::Output {
        Self(self.0 << rhs)
    }
}

impl Shr<u32> for XShare {
    type Output = Self;

    fn shr(self, rhs: u32) -> Self::Output {
        Self(self.0 >> rhs)
    }
}

/// Expand a bit share to all-zeros or all-ones.
impl From<BShare> for XShare {
    fn from(b: BShare) -> Self {
        Self(if b.0 { Value::MAX } else { 0 })
    }
}

impl BitXor for BShare {
    type Output = Self;

    fn bitxor(self, rhs: Self) -> Self::Output {
        Self(self.0 ^ rhs.0)
    }
}

impl BitXorAssign for BShare {
    fn bitxor_assign(&mut self, rhs: Self) {
        self.0 ^= rhs.0;
    }
}

/// AND with a public bit.
impl BitAnd<bool> for BShare {
    type Output = Self;

    fn bitand(self, rhs: bool) -> Self::Output {
        Self(self.0 & rhs)
    }
}

#[cfg(test)]
mod tests {
    use rand::prelude::*;

    use super::*;

    #[test]
    fn test_additive_reconstruction() {
        let mut rng = StdRng::seed_from_u64(0);
        let x: Value = rng.gen();
        let x0 = AShare::random(&mut rng);
        let x1 = AShare(x) - x0;
        assert_eq!((x0 + x1).0, x);
        let y0 = x0 * 3 + AShare::constant(0, 5);
        let y1 = x1 * 3 + AShare::constant(1, 5);
        assert_eq!((y0 + y1).0, x.wrapping_mul(3).wrapping_add(5));
        assert_eq!((-x0 + -x1).0, x.wrapping_neg());
    }

    #[test]
    fn test_xor_and_bit_reconstruction() {
        let mut rng = StdRng::seed_from_u64(1);
        let x: Value = rng.gen();
        let x0 = XShare::random(&mut rng);
        let x1 = XShare(x) ^ x0;
        assert_eq!((x0 ^ x1).0, x);
        assert_eq!(((x0 >> 3) ^ (x1 >> 3)).0, x >> 3);
        assert_eq!((x0.bit(5) ^ x1.bit(5)).0, (x >> 5) & 1 == 1);

        let b0 = BShare::random(&mut rng);
        let b1 = BShare(true) ^ b0;
        assert!(!(b0.not(0) ^ b1.not(1)).0);
        let e0 = XShare::from(b0);
        let e1 = XShare::from(b1);
        assert_eq!((e0 ^ e1).0, Value::MAX);
    }
}
