// SPDX-License-Identifier: Apache-2.0
// Copyright (C) 2023 Yulong Ming (myl7)

use crate::Value;

pub fn xor<const BLEN: usize>(xs: &[&[u8; BLEN]]) -> [u8; BLEN] {
    let mut res = [0; BLEN];
    xor_inplace(&mut res, xs);
    res
}

pub fn xor_inplace<const BLEN: usize>(lhs: &mut [u8; BLEN], rhss: &[&[u8; BLEN]]) {
    rhss.iter().fold(lhs, |lhs, &rhs| {
        lhs.iter_mut().zip(rhs.iter()).for_each(|(l, r)| *l ^= r);
        lhs
    });
}

/// Inverse of an odd `x` modulo `$2^{64}$`.
///
/// Newton iteration: `x * x = 1 (mod 8)` gives 3 correct bits to start with,
/// and every round doubles them.
pub fn inverse_value(x: Value) -> Value {
    assert_eq!(x & 1, 1, "only odd values are invertible");
    let mut inv = x;
    for _ in 0..5 {
        inv = inv.wrapping_mul((2 as Value).wrapping_sub(x.wrapping_mul(inv)));
    }
    inv
}

/// Bit `i` (0 is the LSB) of a value.
pub fn bit(x: Value, i: u32) -> bool {
    (x >> i) & 1 == 1
}

#[cfg(test)]
mod tests {
    use rand::prelude::*;

    use super::*;

    #[test]
    fn test_xor() {
        let a = [0b1010u8, 0xff, 0];
        let b = [0b0110u8, 0x0f, 0x11];
        assert_eq!(xor(&[&a, &b]), [0b1100, 0xf0, 0x11]);
        let mut c = a;
        xor_inplace(&mut c, &[&b, &b]);
        assert_eq!(c, a);
    }

    #[test]
    fn test_inverse_value() {
        let mut rng = StdRng::seed_from_u64(0);
        for _ in 0..1000 {
            let x: Value = rng.gen::<Value>() | 1;
            assert_eq!(x.wrapping_mul(inverse_value(x)), 1);
        }
        assert_eq!(inverse_value(1), 1);
        assert_eq!(inverse_value(Value::MAX), Value::MAX);
    }
}
