// SPDX-License-Identifier: Apache-2.0
// Copyright (C) 2023 Yulong Ming (myl7)

//! See [`Dpf`].

use std::ops::{BitXor, BitXorAssign};

use bitvec::prelude::*;
use rand::distributions::{Distribution, Standard};
use rand::Rng;
use subtle::{Choice, ConditionallySelectable};

use crate::prg::{prg, prgboth};
use crate::utils::{xor, xor_inplace};
use crate::wire::{WireFormat, WireRead};
use crate::{MpcError, Value};

/// Byte length of a DPF node.
pub const NODE_BLEN: usize = 16;
const WORD_BLEN: usize = (Value::BITS / 8) as usize;

/// A DPF tree node.
///
/// Bits are numbered little-endian: bit 0 is the LSB of byte 0.
/// The LSB is the _flag bit_ on internal levels.
/// The low word (bits `0..64`) and the high word (bits `64..128`) are the payload of RDPF leaves.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct DpfNode(pub [u8; NODE_BLEN]);

impl DpfNode {
    pub const ZERO: Self = Self([0; NODE_BLEN]);

    pub fn from_words(low: Value, high: Value) -> Self {
        let mut buf = [0; NODE_BLEN];
        buf[..WORD_BLEN].copy_from_slice(&low.to_le_bytes());
        buf[WORD_BLEN..2 * WORD_BLEN].copy_from_slice(&high.to_le_bytes());
        Self(buf)
    }

    pub fn low_word(&self) -> Value {
        let mut word = [0; WORD_BLEN];
        word.copy_from_slice(&self.0[..WORD_BLEN]);
        Value::from_le_bytes(word)
    }

    pub fn high_word(&self) -> Value {
        let mut word = [0; WORD_BLEN];
        word.copy_from_slice(&self.0[WORD_BLEN..2 * WORD_BLEN]);
        Value::from_le_bytes(word)
    }

    /// The node with only the LSB possibly set.
    pub fn lsb_mask(bit: bool) -> Self {
        Self::from_words(bit as Value, 0)
    }

    /// The node with only bit `pos` set.
    pub fn single_bit(pos: usize) -> Self {
        let mut node = Self::ZERO;
        node.0.view_bits_mut::<Lsb0>().set(pos, true);
        node
    }

    pub fn lsb(&self) -> bool {
        self.0.view_bits::<Lsb0>()[0]
    }

    pub fn with_lsb(mut self, bit: bool) -> Self {
        self.0.view_bits_mut::<Lsb0>().set(0, bit);
        self
    }

    pub fn bit_at(&self, pos: usize) -> bool {
        self.0.view_bits::<Lsb0>()[pos]
    }

    pub fn parity(&self) -> bool {
        self.0.view_bits::<Lsb0>().count_ones() & 1 == 1
    }

    /// Parity of the bits strictly above `pos`.
    pub fn parity_above(&self, pos: usize) -> bool {
        self.0.view_bits::<Lsb0>()[pos + 1..].count_ones() & 1 == 1
    }

    /// Parity of the bits strictly below `pos`.
    pub fn parity_below(&self, pos: usize) -> bool {
        self.0.view_bits::<Lsb0>()[..pos].count_ones() & 1 == 1
    }

    /// `self ^ rhs` if `flag`, otherwise `self`, without branching on `flag`.
    pub fn xor_if(self, rhs: &Self, flag: bool) -> Self {
        self ^ Self::conditional_select(&Self::ZERO, rhs, Choice::from(flag as u8))
    }
}

impl ConditionallySelectable for DpfNode {
    fn conditional_select(a: &Self, b: &Self, choice: Choice) -> Self {
        Self(std::array::from_fn(|i| {
            u8::conditional_select(&a.0[i], &b.0[i], choice)
        }))
    }
}

impl BitXor for DpfNode {
    type Output = Self;

    fn bitxor(self, rhs: Self) -> Self::Output {
        Self(xor(&[&self.0, &rhs.0]))
    }
}

impl BitXorAssign for DpfNode {
    fn bitxor_assign(&mut self, rhs: Self) {
        xor_inplace(&mut self.0, &[&rhs.0]);
    }
}

impl Distribution<DpfNode> for Standard {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> DpfNode {
        DpfNode(rng.gen())
    }
}

/// The DPF tree shared by [`crate::cdpf::Cdpf`] and [`crate::rdpf::Rdpf`].
///
/// The two halves of a DPF differ only in `seed` and `whichhalf`.
/// Walking down in lockstep, the two parties' nodes on the path to the target always have different flag bits,
/// and every node off the path is identical for both parties.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Dpf {
    /// The root node
    pub seed: DpfNode,
    /// Which of the two halves this is.
    /// The root flag bit equals it.
    pub whichhalf: bool,
    /// Correction words, one per level
    pub cw: Vec<DpfNode>,
    /// Correction flag bits, bit `i` for level `i`.
    /// The right correction word of level `i` is `cw[i]` with its LSB flipped by bit `i`.
    pub cfbits: Value,
}

impl Dpf {
    pub fn depth(&self) -> usize {
        self.cw.len()
    }

    pub fn cfbit(&self, level: usize) -> bool {
        (self.cfbits >> level) & 1 == 1
    }

    /// Correction word for the `whichchild` child of a node at `level`.
    pub fn correction(&self, level: usize, whichchild: bool) -> DpfNode {
        if whichchild {
            self.cw[level] ^ DpfNode::lsb_mask(self.cfbit(level))
        } else {
            self.cw[level]
        }
    }

    /// Apply the correction of `level` to raw PRG children if the parent flag is set.
    pub fn correct(
        &self,
        parent: &DpfNode,
        level: usize,
        children: (DpfNode, DpfNode),
    ) -> (DpfNode, DpfNode) {
        let flag = parent.lsb();
        (
            children.0.xor_if(&self.correction(level, false), flag),
            children.1.xor_if(&self.correction(level, true), flag),
        )
    }

    /// Both corrected children of an internal node at `level`.
    pub fn children(
        &self,
        parent: &DpfNode,
        level: usize,
        aes_ops: &mut usize,
    ) -> (DpfNode, DpfNode) {
        self.correct(parent, level, prgboth(parent, aes_ops))
    }

    /// Descend from a node at `parentdepth` to its `whichchild` child.
    pub fn descend(
        &self,
        parent: &DpfNode,
        parentdepth: usize,
        whichchild: bool,
        aes_ops: &mut usize,
    ) -> DpfNode {
        assert!(parentdepth < self.depth());
        let prgout = prg(parent, whichchild, aes_ops);
        prgout.xor_if(&self.correction(parentdepth, whichchild), parent.lsb())
    }
}

impl WireFormat for Dpf {
    fn write_to(&self, out: &mut Vec<u8>) {
        self.seed.write_to(out);
        self.whichhalf.write_to(out);
        (self.cw.len() as u8).write_to(out);
        for cw in &self.cw {
            cw.write_to(out);
        }
        self.cfbits.write_to(out);
    }

    fn read_from<R: WireRead + ?Sized>(input: &mut R) -> Result<Self, MpcError> {
        let seed = DpfNode::read_from(input)?;
        let whichhalf = bool::read_from(input)?;
        let depth = u8::read_from(input)?;
        if depth == 0 || depth as usize > Value::BITS as usize {
            return Err(MpcError::DepthOutOfRange(depth));
        }
        let cw = (0..depth)
            .map(|_| DpfNode::read_from(input))
            .collect::<Result<Vec<_>, _>>()?;
        let cfbits = Value::read_from(input)?;
        Ok(Self {
            seed,
            whichhalf,
            cw,
            cfbits,
        })
    }
}
