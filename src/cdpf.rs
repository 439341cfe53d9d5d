// SPDX-License-Identifier: Apache-2.0
// Copyright (C) 2023 Yulong Ming (myl7)

//! Comparison DPF (CDPF).
//!
//! A CDPF is a DPF over the 64-bit domain whose last 7 levels are folded into the 128 bits of a leaf node:
//! the leaf at path `x >> 7` has only bit `x & 0x7f` set (XOR-shared) when `x` is the target.
//! Together with additive and XOR shares of the random target,
//! it answers `$x < 0$`, `$x = 0$`, and `$x > 0$` for a secret `x` with one word exchanged by each party.
//!
//! For the comparison, both parties reveal `$S = r - x$` where `r` is the target.
//! With `$T = S + 2^{63}$`, `$x > 0$` iff `$S < r < T$` on the wrapped domain,
//! which is the XOR of the subtrees hanging strictly between the paths to `S` and `T`.
//! Every such subtree is the sibling of a node on one of the two paths,
//! and the XOR of all leaves below a node is its flag bit, or its parity for a leaf.

use rand::Rng;

use crate::dpf::{Dpf, DpfNode};
use crate::mpcio::MpcTio;
use crate::prg::{prg, prgboth};
use crate::share::{AShare, BShare, XShare};
use crate::utils::bit;
use crate::wire::{WireFormat, WireRead};
use crate::{MpcError, Value, CDPF_DEPTH, CDPF_LEAF_BITS, VALUE_BITS};

const LEAF_MASK: Value = (1 << CDPF_LEAF_BITS) - 1;

/// One party's half of a CDPF.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Cdpf {
    pub dpf: Dpf,
    /// Correction word of the right child on the last level.
    /// `dpf.cw` holds the left one.
    pub leaf_cwr: DpfNode,
    pub as_target: AShare,
    pub xs_target: XShare,
}

impl Cdpf {
    /// Generate both halves of a CDPF with the given target.
    pub fn generate<R: Rng + ?Sized>(
        target: Value,
        rng: &mut R,
        aes_ops: &mut usize,
    ) -> (Self, Self) {
        let seeds = [
            rng.gen::<DpfNode>().with_lsb(false),
            rng.gen::<DpfNode>().with_lsb(true),
        ];
        let mut cur = seeds;
        let mut cw = Vec::with_capacity(CDPF_DEPTH);
        let mut cfbits: Value = 0;
        let mut leaf_cwr = DpfNode::ZERO;

        for level in 0..CDPF_DEPTH {
            let (l0, r0) = prgboth(&cur[0], aes_ops);
            let (l1, r1) = prgboth(&cur[1], aes_ops);
            let cfbit = !(l0 ^ l1 ^ r0 ^ r1).lsb();
            cfbits |= (cfbit as Value) << level;
            let targetdir = bit(target, VALUE_BITS - 1 - level as u32);

            if level + 1 < CDPF_DEPTH {
                // Keep the off-path child identical and the on-path child flag bits different
                let (lcw, next) = if targetdir {
                    let lcw = l0 ^ l1;
                    let rcw = lcw ^ DpfNode::lsb_mask(cfbit);
                    (lcw, [r0.xor_if(&rcw, cur[0].lsb()), r1.xor_if(&rcw, cur[1].lsb())])
                } else {
                    let lcw = r0 ^ r1 ^ DpfNode::lsb_mask(cfbit);
                    (lcw, [l0.xor_if(&lcw, cur[0].lsb()), l1.xor_if(&lcw, cur[1].lsb())])
                };
                cw.push(lcw);
                cur = next;
            } else {
                let tsb = DpfNode::single_bit((target & LEAF_MASK) as usize);
                if targetdir {
                    cw.push(l0 ^ l1);
                    leaf_cwr = r0 ^ r1 ^ tsb;
                } else {
                    cw.push(l0 ^ l1 ^ tsb);
                    leaf_cwr = r0 ^ r1;
                }
            }
        }

        let as_target0 = AShare::random(rng);
        let xs_target0 = XShare::random(rng);
        let half = |i: usize, as_target, xs_target| Self {
            dpf: Dpf {
                seed: seeds[i],
                whichhalf: i == 1,
                cw: cw.clone(),
                cfbits,
            },
            leaf_cwr,
            as_target,
            xs_target,
        };
        (
            half(0, as_target0, xs_target0),
            half(1, AShare(target) - as_target0, XShare(target) ^ xs_target0),
        )
    }

    /// Descend from a node on the last internal level to a leaf.
    pub fn descend_to_leaf(
        &self,
        parent: &DpfNode,
        whichchild: bool,
        aes_ops: &mut usize,
    ) -> DpfNode {
        let prgout = prg(parent, whichchild, aes_ops);
        let cw = if whichchild {
            &self.leaf_cwr
        } else {
            &self.dpf.cw[CDPF_DEPTH - 1]
        };
        prgout.xor_if(cw, parent.lsb())
    }

    fn leaf_children(&self, parent: &DpfNode, aes_ops: &mut usize) -> (DpfNode, DpfNode) {
        (
            self.descend_to_leaf(parent, false, aes_ops),
            self.descend_to_leaf(parent, true, aes_ops),
        )
    }

    /// The leaf covering `input`.
    pub fn leaf(&self, input: Value, aes_ops: &mut usize) -> DpfNode {
        let mut node = self.dpf.seed;
        for level in 0..CDPF_DEPTH - 1 {
            let dir = bit(input, VALUE_BITS - 1 - level as u32);
            node = self.dpf.descend(&node, level, dir, aes_ops);
        }
        self.descend_to_leaf(&node, bit(input, CDPF_LEAF_BITS), aes_ops)
    }

    /// Shares of `$(r < s, r = s, r > s)$` for the target `r` and a public `s`,
    /// i.e., the sign of `$r - s$` read as a signed integer.
    pub fn compare_public(&self, s: Value, aes_ops: &mut usize) -> (BShare, BShare, BShare) {
        let mut gt = false;

        // The T path goes to `s + 2^63`, so the two paths split at the root and never meet again
        let (l, r) = self.dpf.children(&self.dpf.seed, 0, aes_ops);
        let (mut snode, mut tnode) = if bit(s, VALUE_BITS - 1) {
            (r, l)
        } else {
            (l, r)
        };

        for level in 1..CDPF_DEPTH - 1 {
            let (sl, sr) = self.dpf.children(&snode, level, aes_ops);
            let (tl, tr) = self.dpf.children(&tnode, level, aes_ops);
            if bit(s, VALUE_BITS - 1 - level as u32) {
                gt ^= tl.lsb();
                (snode, tnode) = (sr, tr);
            } else {
                gt ^= sr.lsb();
                (snode, tnode) = (sl, tl);
            }
        }

        let (sl, sr) = self.leaf_children(&snode, aes_ops);
        let (tl, tr) = self.leaf_children(&tnode, aes_ops);
        let (sleaf, tleaf) = if bit(s, CDPF_LEAF_BITS) {
            gt ^= tl.parity();
            (sr, tr)
        } else {
            gt ^= sr.parity();
            (sl, tl)
        };

        // S and T share the low bits
        let pos = (s & LEAF_MASK) as usize;
        gt ^= sleaf.parity_above(pos) ^ tleaf.parity_below(pos);
        let eq = sleaf.bit_at(pos);
        let lt = eq ^ gt ^ !self.dpf.whichhalf;
        (BShare(lt), BShare(eq), BShare(gt))
    }

    /// Shares of `$(x < 0, x = 0, x > 0)$` for an additively shared `x` read as a signed integer.
    ///
    /// Consumes the CDPF: the revealed difference must never be reused with the same target.
    pub fn compare(
        self,
        tio: &mut MpcTio,
        x: AShare,
    ) -> Result<(BShare, BShare, BShare), MpcError> {
        let s_share = self.as_target - x;
        tio.queue_peer(&s_share)?;
        tio.send()?;
        let peer: AShare = tio.recv_peer()?;
        let s = (s_share + peer).0;
        log::trace!("P{} cdpf compare", tio.player());
        Ok(self.compare_public(s, tio.aes_ops()))
    }

    /// Shares of `$x = 0$` for an XOR-shared `x`.
    pub fn is_zero(self, tio: &mut MpcTio, x: XShare) -> Result<BShare, MpcError> {
        let s_share = self.xs_target ^ x;
        tio.queue_peer(&s_share)?;
        tio.send()?;
        let peer: XShare = tio.recv_peer()?;
        let s = (s_share ^ peer).0;
        let leaf = self.leaf(s, tio.aes_ops());
        Ok(BShare(leaf.bit_at((s & LEAF_MASK) as usize)))
    }
}

impl WireFormat for Cdpf {
    fn write_to(&self, out: &mut Vec<u8>) {
        self.dpf.write_to(out);
        self.leaf_cwr.write_to(out);
        self.as_target.write_to(out);
        self.xs_target.write_to(out);
    }

    fn read_from<R: WireRead + ?Sized>(input: &mut R) -> Result<Self, MpcError> {
        let dpf = Dpf::read_from(input)?;
        if dpf.depth() != CDPF_DEPTH {
            return Err(MpcError::DepthOutOfRange(dpf.depth() as u8));
        }
        Ok(Self {
            dpf,
            leaf_cwr: DpfNode::read_from(input)?,
            as_target: AShare::read_from(input)?,
            xs_target: XShare::read_from(input)?,
        })
    }
}
