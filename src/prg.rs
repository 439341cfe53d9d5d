// Copyright (C) myl7
// SPDX-License-Identifier: Apache-2.0

//! Fixed-key AES-128 PRG expanding a DPF node into its children.
//!
//! `$G_c(s) = AES_k(s') \oplus s'$` where `$s'$` is `$s$` with its LSB set to `$c$`,
//! i.e., [`MatyasMeyerOseas`] over AES with a constant key.
//! Internal levels use one key made of the digits of e.
//! Leaf levels use up to 3 keys made of the digits of pi, one per output word.

use aes::cipher::generic_array::GenericArray;
use aes::cipher::KeyInit;
use aes::Aes128;
use once_cell::sync::Lazy;

use crate::dpf::DpfNode;
use crate::owcf::MatyasMeyerOseas;

/// Max number of nodes in a leaf vector
pub const MAX_LEAF_WIDTH: usize = 3;

fn key_from_halves(high: u64, low: u64) -> Aes128 {
    let mut key = [0; 16];
    key[..8].copy_from_slice(&low.to_le_bytes());
    key[8..].copy_from_slice(&high.to_le_bytes());
    Aes128::new(GenericArray::from_slice(&key))
}

static INTERNAL_KEY: Lazy<Aes128> =
    Lazy::new(|| key_from_halves(2718281828459045235, 3602874713526624977));

static LEAF_KEYS: Lazy<[Aes128; MAX_LEAF_WIDTH]> = Lazy::new(|| {
    [
        key_from_halves(3141592653589793238, 4626433832795028841),
        key_from_halves(9716939937510582097, 4944592307816406286),
        key_from_halves(2089986280348253421, 1706798214808651328),
    ]
});

fn gen_node(cipher: &Aes128, input: &DpfNode, aes_ops: &mut usize) -> DpfNode {
    let mut out = DpfNode::ZERO;
    cipher.gen_blk(&mut out.0, &input.0);
    *aes_ops += 1;
    out
}

/// The `whichchild` child of `seed` on an internal level.
pub fn prg(seed: &DpfNode, whichchild: bool, aes_ops: &mut usize) -> DpfNode {
    gen_node(&INTERNAL_KEY, &seed.with_lsb(whichchild), aes_ops)
}

/// Both children of `seed` on an internal level.
pub fn prgboth(seed: &DpfNode, aes_ops: &mut usize) -> (DpfNode, DpfNode) {
    (prg(seed, false, aes_ops), prg(seed, true, aes_ops))
}

/// The `whichchild` leaf vector of `seed`, `W` nodes wide.
pub fn prg_leaf<const W: usize>(
    seed: &DpfNode,
    whichchild: bool,
    aes_ops: &mut usize,
) -> [DpfNode; W] {
    assert!(W >= 1 && W <= MAX_LEAF_WIDTH);
    let input = seed.with_lsb(whichchild);
    std::array::from_fn(|i| gen_node(&LEAF_KEYS[i], &input, aes_ops))
}

/// Both leaf vectors of `seed`, `W` nodes wide.
pub fn prgboth_leaf<const W: usize>(
    seed: &DpfNode,
    aes_ops: &mut usize,
) -> ([DpfNode; W], [DpfNode; W]) {
    (
        prg_leaf(seed, false, aes_ops),
        prg_leaf(seed, true, aes_ops),
    )
}

#[cfg(test)]
mod tests {
    use aes::cipher::BlockEncrypt;
    use rand::prelude::*;

    use super::*;

    #[test]
    fn test_prg_ignores_seed_lsb() {
        let mut aes_ops = 0;
        let seed: DpfNode = StdRng::seed_from_u64(0).gen();
        for c in [false, true] {
            assert_eq!(
                prg(&seed.with_lsb(false), c, &mut aes_ops),
                prg(&seed.with_lsb(true), c, &mut aes_ops)
            );
        }
        let (l, r) = prgboth(&seed, &mut aes_ops);
        assert_ne!(l, r);
        assert_eq!(aes_ops, 6);
    }

    #[test]
    fn test_prg_is_davies_meyer_over_fixed_key() {
        let mut aes_ops = 0;
        let seed = DpfNode::from_words(0x1234, 0x5678).with_lsb(true);
        let mut block = GenericArray::clone_from_slice(&seed.0);
        INTERNAL_KEY.encrypt_block(&mut block);
        let mut expected = DpfNode::ZERO;
        expected.0.copy_from_slice(&block);
        expected ^= seed;
        assert_eq!(prg(&seed, true, &mut aes_ops), expected);
    }

    #[test]
    fn test_prg_leaf_widths() {
        let mut aes_ops = 0;
        let seed: DpfNode = StdRng::seed_from_u64(1).gen();
        let [one] = prg_leaf::<1>(&seed, true, &mut aes_ops);
        let three = prg_leaf::<3>(&seed, true, &mut aes_ops);
        assert_eq!(aes_ops, 4);
        assert_eq!(one, three[0]);
        assert_ne!(three[0], three[1]);
        assert_ne!(three[1], three[2]);
        assert_ne!(one, prg(&seed, true, &mut aes_ops));
        let (l, r) = prgboth_leaf::<2>(&seed, &mut aes_ops);
        assert_eq!(r, [three[0], three[1]]);
        assert_ne!(l, r);
    }
}
