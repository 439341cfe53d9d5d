// SPDX-License-Identifier: Apache-2.0
// Copyright (C) 2023 Yulong Ming (myl7)

//! Random DPF (RDPF) with a target no single party knows.
//!
//! P0 and P1 generate an RDPF together, level by level, from XOR shares of the target,
//! with P2 dealing one select triple per level and learning nothing.
//! Each leaf is a 128-bit node read as:
//!
//! - its LSB: XOR shares of the unit vector `$e_r$` ([`Rdpf::unit_bs`])
//! - its low word: additive shares of `$W e_r$` for an odd random `W`,
//!   scaled back by `$W^{-1}$` to the unit vector ([`Rdpf::unit_as`])
//! - its high word: shares of `$M e_r$` for a random `M`, the _scaled_ vector
//!   used to write a secret delta ([`Rdpf::scaled_as`], [`Rdpf::scaled_xs`])
//!
//! The leaf level uses the leaf PRG so the payload words are independent of the internal levels.

use rand::Rng;

use crate::dpf::{Dpf, DpfNode};
use crate::mpcio::MpcTio;
use crate::mpcops::mpc_xs_to_as;
use crate::prg::{prg_leaf, prgboth, prgboth_leaf};
use crate::share::{AShare, BShare, XShare};
use crate::utils::inverse_value;
use crate::wire::{WireFormat, WireRead};
use crate::{Address, MpcError, Value, ADDRESS_MAX_BITS};

/// One party's half of an RDPF.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Rdpf {
    pub dpf: Dpf,
    /// `$W^{-1}$` for the (public) sum `W` of the low words of the target leaf
    pub unit_sum_inverse: Value,
    /// Additive share of `M`
    pub scaled_sum: AShare,
    /// XOR share of `M`
    pub scaled_xor: XShare,
    /// All leaves in order, if expanded
    pub expansion: Vec<DpfNode>,
}

fn check_depth(depth: u8) -> Result<usize, MpcError> {
    if depth == 0 || depth > ADDRESS_MAX_BITS {
        return Err(MpcError::DepthOutOfRange(depth));
    }
    Ok(depth as usize)
}

fn raw_children(node: &DpfNode, leaf_level: bool, aes_ops: &mut usize) -> (DpfNode, DpfNode) {
    if leaf_level {
        let ([l], [r]) = prgboth_leaf::<1>(node, aes_ops);
        (l, r)
    } else {
        prgboth(node, aes_ops)
    }
}

impl Rdpf {
    /// Jointly generate an RDPF of `depth` at P0 or P1 with XOR shares of `target` as the target.
    ///
    /// P2 must call [`Rdpf::serve_generation`] at the same time.
    /// Costs 2 rounds per level plus 1.
    pub fn generate(
        tio: &mut MpcTio,
        target: XShare,
        depth: u8,
        save_expansion: bool,
    ) -> Result<Self, MpcError> {
        let depth = check_depth(depth)?;
        if tio.is_server() {
            return Err(MpcError::InvalidPlayer(tio.player()));
        }
        let player = tio.player();
        let whichhalf = player == 1;
        let seed = tio.rng().gen::<DpfNode>().with_lsb(whichhalf);
        let mut dpf = Dpf {
            seed,
            whichhalf,
            cw: Vec::with_capacity(depth),
            cfbits: 0,
        };
        let mut aes_ops = 0;
        let mut nodes = vec![seed];

        for level in 0..depth {
            let children: Vec<(DpfNode, DpfNode)> = nodes
                .iter()
                .map(|n| raw_children(n, level + 1 == depth, &mut aes_ops))
                .collect();
            let (l, r) = children
                .iter()
                .fold((DpfNode::ZERO, DpfNode::ZERO), |(l, r), (cl, cr)| {
                    (l ^ *cl, r ^ *cr)
                });
            let d = l ^ r;
            let b = target.bit((depth - 1 - level) as u32);

            // Round 1: b * (L ^ R), plus the LSBs of L ^ R for the correction flag bit
            let t = tio.select_triple::<DpfNode>()?;
            tio.queue_peer(&(b.0 ^ t.x))?;
            tio.queue_peer(&(d ^ t.y))?;
            tio.queue_peer(&d.lsb())?;
            tio.send()?;
            let peer_b: bool = tio.recv_peer()?;
            let peer_d: DpfNode = tio.recv_peer()?;
            let peer_dlsb: bool = tio.recv_peer()?;
            let bd = DpfNode::ZERO.xor_if(&d, b.0)
                ^ DpfNode::ZERO.xor_if(&peer_d, b.0)
                ^ DpfNode::ZERO.xor_if(&t.y, peer_b)
                ^ t.z;
            let cfbit = !(d.lsb() ^ peer_dlsb);

            // Round 2: CW = b ? L : R ^ lsb(cfbit)
            let notb = b.not(player);
            let cw_share = r ^ bd ^ DpfNode::lsb_mask(notb.0 & cfbit);
            tio.queue_peer(&cw_share)?;
            tio.send()?;
            let peer_cw: DpfNode = tio.recv_peer()?;
            dpf.cw.push(cw_share ^ peer_cw);
            dpf.cfbits |= (cfbit as Value) << level;
            log::trace!("P{} rdpf level {}/{} corrected", player, level + 1, depth);

            nodes = nodes
                .iter()
                .zip(children)
                .flat_map(|(n, c)| {
                    let (cl, cr) = dpf.correct(n, level, c);
                    [cl, cr]
                })
                .collect();
        }

        let signed = |w: Value| if whichhalf { w.wrapping_neg() } else { w };
        let low_sum = signed(
            nodes
                .iter()
                .fold(0 as Value, |acc, n| acc.wrapping_add(n.low_word())),
        );
        tio.queue_peer(&low_sum)?;
        tio.send()?;
        let peer_low_sum: Value = tio.recv_peer()?;
        let unit_sum_inverse = inverse_value(low_sum.wrapping_add(peer_low_sum));
        let scaled_sum = AShare(signed(
            nodes
                .iter()
                .fold(0 as Value, |acc, n| acc.wrapping_add(n.high_word())),
        ));
        let scaled_xor = XShare(nodes.iter().fold(0, |acc, n| acc ^ n.high_word()));
        *tio.aes_ops() += aes_ops;

        Ok(Self {
            dpf,
            unit_sum_inverse,
            scaled_sum,
            scaled_xor,
            expansion: if save_expansion { nodes } else { Vec::new() },
        })
    }

    /// P2's side of [`Rdpf::generate`].
    pub fn serve_generation(tio: &mut MpcTio, depth: u8) -> Result<(), MpcError> {
        let depth = check_depth(depth)?;
        for _ in 0..depth {
            tio.select_triple::<DpfNode>()?;
        }
        Ok(())
    }

    pub fn depth(&self) -> usize {
        self.dpf.depth()
    }

    pub fn has_expansion(&self) -> bool {
        !self.expansion.is_empty()
    }

    /// Descend from a node at `parentdepth`, using the leaf PRG on the last level.
    pub fn descend(
        &self,
        parent: &DpfNode,
        parentdepth: usize,
        whichchild: bool,
        aes_ops: &mut usize,
    ) -> DpfNode {
        if parentdepth + 1 < self.depth() {
            return self.dpf.descend(parent, parentdepth, whichchild, aes_ops);
        }
        let [prgout] = prg_leaf::<1>(parent, whichchild, aes_ops);
        prgout.xor_if(
            &self.dpf.correction(parentdepth, whichchild),
            parent.lsb(),
        )
    }

    /// The leaf at `input`.
    pub fn leaf(&self, input: Address, aes_ops: &mut usize) -> DpfNode {
        if let Some(node) = self.expansion.get(input as usize) {
            return *node;
        }
        let depth = self.depth();
        (0..depth).fold(self.dpf.seed, |node, level| {
            let dir = (input >> (depth - 1 - level)) & 1 == 1;
            self.descend(&node, level, dir, aes_ops)
        })
    }

    /// Compute and keep all leaves.
    pub fn expand(&mut self, aes_ops: &mut usize) {
        let depth = self.depth();
        let mut nodes = vec![self.dpf.seed];
        for level in 0..depth {
            nodes = nodes
                .iter()
                .flat_map(|n| {
                    [
                        self.descend(n, level, false, aes_ops),
                        self.descend(n, level, true, aes_ops),
                    ]
                })
                .collect();
        }
        self.expansion = nodes;
    }

    pub fn unit_bs(&self, leaf: &DpfNode) -> BShare {
        BShare(leaf.lsb())
    }

    pub fn unit_as(&self, leaf: &DpfNode) -> AShare {
        let low = leaf.low_word();
        let signed = if self.dpf.whichhalf {
            low.wrapping_neg()
        } else {
            low
        };
        AShare(signed.wrapping_mul(self.unit_sum_inverse))
    }

    pub fn scaled_xs(&self, leaf: &DpfNode) -> XShare {
        XShare(leaf.high_word())
    }

    pub fn scaled_as(&self, leaf: &DpfNode) -> AShare {
        let high = leaf.high_word();
        AShare(if self.dpf.whichhalf {
            high.wrapping_neg()
        } else {
            high
        })
    }
}

/// The expansion is not sent.
impl WireFormat for Rdpf {
    fn write_to(&self, out: &mut Vec<u8>) {
        self.dpf.write_to(out);
        self.unit_sum_inverse.write_to(out);
        self.scaled_sum.write_to(out);
        self.scaled_xor.write_to(out);
    }

    fn read_from<R: WireRead + ?Sized>(input: &mut R) -> Result<Self, MpcError> {
        let dpf = Dpf::read_from(input)?;
        check_depth(dpf.depth() as u8)?;
        Ok(Self {
            dpf,
            unit_sum_inverse: Value::read_from(input)?,
            scaled_sum: AShare::read_from(input)?,
            scaled_xor: XShare::read_from(input)?,
            expansion: Vec::new(),
        })
    }
}

/// Three RDPFs with the same target held by P0 or P1, with additive and XOR shares of the target.
#[derive(Clone, Debug, Default)]
pub struct RdpfTriple {
    pub dpf: [Rdpf; 3],
    pub as_target: AShare,
    pub xs_target: XShare,
}

impl RdpfTriple {
    /// Generate at P0 or P1 with a fresh random target.
    ///
    /// P0 hands its half of `dpf[1]` and P1 its half of `dpf[2]` to P2,
    /// so P2 ends up with both halves of one RDPF it cannot tie to the target.
    /// P2 must call [`RdpfPair::generate`] at the same time.
    pub fn generate(tio: &mut MpcTio, depth: u8, save_expansion: bool) -> Result<Self, MpcError> {
        let ndepth = check_depth(depth)?;
        let mask = Value::MAX >> (Value::BITS as usize - ndepth);
        let xs_target = XShare(tio.rng().gen::<Value>() & mask);
        let as_target = mpc_xs_to_as(tio, xs_target, ndepth as u32)?;
        let dpf = [
            Rdpf::generate(tio, xs_target, depth, save_expansion)?,
            Rdpf::generate(tio, xs_target, depth, save_expansion)?,
            Rdpf::generate(tio, xs_target, depth, save_expansion)?,
        ];
        let handed = if tio.player() == 0 { &dpf[1] } else { &dpf[2] };
        tio.queue_server(handed)?;
        tio.send()?;
        Ok(Self {
            dpf,
            as_target,
            xs_target,
        })
    }

    pub fn depth(&self) -> usize {
        self.dpf[0].depth()
    }
}

/// P2's two RDPF halves from one [`RdpfTriple`] generation, one from each of P0 and P1.
#[derive(Clone, Debug, Default)]
pub struct RdpfPair {
    pub dpf: [Rdpf; 2],
}

impl RdpfPair {
    pub fn generate(tio: &mut MpcTio, depth: u8, save_expansion: bool) -> Result<Self, MpcError> {
        let ndepth = check_depth(depth)?;
        mpc_xs_to_as(tio, XShare(0), ndepth as u32)?;
        for _ in 0..3 {
            Rdpf::serve_generation(tio, depth)?;
        }
        let mut dpf = [tio.recv_p0::<Rdpf>()?, tio.recv_p1::<Rdpf>()?];
        if save_expansion {
            let mut aes_ops = 0;
            for d in dpf.iter_mut() {
                d.expand(&mut aes_ops);
            }
            *tio.aes_ops() += aes_ops;
        }
        Ok(Self { dpf })
    }

    pub fn depth(&self) -> usize {
        self.dpf[0].depth()
    }
}

/// Leaf accessors applied to each RDPF of a group, on leaves walked in lockstep.
macro_rules! impl_leaf_accessors_for_group {
    ($group:ty, $n:literal) => {
        impl $group {
            pub fn unit_bs(&self, leaves: &[DpfNode; $n]) -> [BShare; $n] {
                std::array::from_fn(|i| self.dpf[i].unit_bs(&leaves[i]))
            }

            pub fn unit_as(&self, leaves: &[DpfNode; $n]) -> [AShare; $n] {
                std::array::from_fn(|i| self.dpf[i].unit_as(&leaves[i]))
            }

            pub fn scaled_xs(&self, leaves: &[DpfNode; $n]) -> [XShare; $n] {
                std::array::from_fn(|i| self.dpf[i].scaled_xs(&leaves[i]))
            }

            pub fn scaled_as(&self, leaves: &[DpfNode; $n]) -> [AShare; $n] {
                std::array::from_fn(|i| self.dpf[i].scaled_as(&leaves[i]))
            }
        }
    };
}

impl_leaf_accessors_for_group!(RdpfPair, 2);
impl_leaf_accessors_for_group!(RdpfTriple, 3);

impl WireFormat for RdpfTriple {
    fn write_to(&self, out: &mut Vec<u8>) {
        for dpf in &self.dpf {
            dpf.write_to(out);
        }
        self.as_target.write_to(out);
        self.xs_target.write_to(out);
    }

    fn read_from<R: WireRead + ?Sized>(input: &mut R) -> Result<Self, MpcError> {
        Ok(Self {
            dpf: [
                Rdpf::read_from(input)?,
                Rdpf::read_from(input)?,
                Rdpf::read_from(input)?,
            ],
            as_target: AShare::read_from(input)?,
            xs_target: XShare::read_from(input)?,
        })
    }
}
