// Copyright (C) myl7
// SPDX-License-Identifier: Apache-2.0

//! Correlated randomness dealt by P2.
//!
//! Every kind can be produced online, right when a protocol asks for it,
//! or ahead of time by [`preprocessing_server`] / [`preprocessing_comp`] into the [`PrecompStore`] of each party.
//! Either way all three parties consume it in the same order.
//!
//! The preprocessing stream from P2 to P0 and P1 is a sequence of requests,
//! each a 1-byte tag and a `u32` LE count followed by that many objects, terminated by tag `0x00`:
//!
//! - `0x80`: multiplication triples
//! - `0x81`: half-triples
//! - `0x40`: CDPFs
//! - `0x01..=0x30`: RDPF triples of that depth, generated jointly by P0 and P1 with P2's help

use std::collections::{BTreeMap, VecDeque};
use std::ops::BitXor;
use std::str::FromStr;

use rand::Rng;

use crate::cdpf::Cdpf;
use crate::dpf::DpfNode;
use crate::mpcio::MpcTio;
use crate::rdpf::{RdpfPair, RdpfTriple};
use crate::wire::{WireFormat, WireRead};
use crate::{MpcError, Value, ADDRESS_MAX_BITS};

const TAG_END: u8 = 0x00;
const TAG_TRIPLE: u8 = 0x80;
const TAG_HALFTRIPLE: u8 = 0x81;
const TAG_CDPF: u8 = 0x40;

/// Beaver triple: `$X_0 Y_1 + Y_0 X_1 = Z_0 + Z_1$`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MultTriple {
    pub x: Value,
    pub y: Value,
    pub z: Value,
}

/// Half-triple: P0 holds `$(X_0, Z_0)$`, P1 holds `$(Y_1, Z_1)$`, and `$X_0 Y_1 = Z_0 + Z_1$`.
/// `x` is `$X_0$` at P0 and `$Y_1$` at P1.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HalfTriple {
    pub x: Value,
    pub z: Value,
}

/// Select triple: `$(X_0 \cdot Y_1) \oplus (Y_0 \cdot X_1) = Z_0 \oplus Z_1$` for a bit `X` and a payload `Y`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SelectTriple<V> {
    pub x: bool,
    pub y: V,
    pub z: V,
}

/// Payloads a secret bit can select: a bit, a word, or a DPF node.
pub trait SelectValue: Copy + Default + BitXor<Output = Self> + WireFormat + Send + Sync {
    fn random<R: Rng + ?Sized>(rng: &mut R) -> Self;

    /// `self` if `bit`, otherwise zero.
    fn times(self, bit: bool) -> Self;
}

impl SelectValue for bool {
    fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        rng.gen()
    }

    fn times(self, bit: bool) -> Self {
        self & bit
    }
}

impl SelectValue for Value {
    fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        rng.gen()
    }

    fn times(self, bit: bool) -> Self {
        self & (bit as Value).wrapping_neg()
    }
}

impl SelectValue for DpfNode {
    fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        rng.gen()
    }

    fn times(self, bit: bool) -> Self {
        DpfNode::ZERO.xor_if(&self, bit)
    }
}

impl MultTriple {
    pub fn deal<R: Rng + ?Sized>(rng: &mut R) -> (Self, Self) {
        let (x0, y0, z0): (Value, Value, Value) = rng.gen();
        let (x1, y1): (Value, Value) = rng.gen();
        let z1 = x0
            .wrapping_mul(y1)
            .wrapping_add(y0.wrapping_mul(x1))
            .wrapping_sub(z0);
        (
            Self {
                x: x0,
                y: y0,
                z: z0,
            },
            Self {
                x: x1,
                y: y1,
                z: z1,
            },
        )
    }
}

impl HalfTriple {
    pub fn deal<R: Rng + ?Sized>(rng: &mut R) -> (Self, Self) {
        let (x0, z0, y1): (Value, Value, Value) = rng.gen();
        let z1 = x0.wrapping_mul(y1).wrapping_sub(z0);
        (Self { x: x0, z: z0 }, Self { x: y1, z: z1 })
    }
}

impl<V: SelectValue> SelectTriple<V> {
    pub fn deal<R: Rng + ?Sized>(rng: &mut R) -> (Self, Self) {
        let (x0, x1): (bool, bool) = rng.gen();
        let (y0, y1, z0) = (V::random(rng), V::random(rng), V::random(rng));
        let z1 = y1.times(x0) ^ y0.times(x1) ^ z0;
        (
            Self {
                x: x0,
                y: y0,
                z: z0,
            },
            Self {
                x: x1,
                y: y1,
                z: z1,
            },
        )
    }
}

impl WireFormat for MultTriple {
    fn write_to(&self, out: &mut Vec<u8>) {
        self.x.write_to(out);
        self.y.write_to(out);
        self.z.write_to(out);
    }

    fn read_from<R: WireRead + ?Sized>(input: &mut R) -> Result<Self, MpcError> {
        Ok(Self {
            x: Value::read_from(input)?,
            y: Value::read_from(input)?,
            z: Value::read_from(input)?,
        })
    }
}

impl WireFormat for HalfTriple {
    fn write_to(&self, out: &mut Vec<u8>) {
        self.x.write_to(out);
        self.z.write_to(out);
    }

    fn read_from<R: WireRead + ?Sized>(input: &mut R) -> Result<Self, MpcError> {
        Ok(Self {
            x: Value::read_from(input)?,
            z: Value::read_from(input)?,
        })
    }
}

impl<V: SelectValue> WireFormat for SelectTriple<V> {
    fn write_to(&self, out: &mut Vec<u8>) {
        self.x.write_to(out);
        self.y.write_to(out);
        self.z.write_to(out);
    }

    fn read_from<R: WireRead + ?Sized>(input: &mut R) -> Result<Self, MpcError> {
        Ok(Self {
            x: bool::read_from(input)?,
            y: V::read_from(input)?,
            z: V::read_from(input)?,
        })
    }
}

/// Precomputed values of one party.
///
/// P0 and P1 store the objects themselves.
/// P2 only keeps counts of what it already dealt for triples, half-triples, and CDPFs,
/// and keeps the [`RdpfPair`]s it needs for its own side of the protocols.
#[derive(Default)]
pub struct PrecompStore {
    triples: VecDeque<MultTriple>,
    halftriples: VecDeque<HalfTriple>,
    cdpfs: VecDeque<Cdpf>,
    rdpf_triples: BTreeMap<u8, VecDeque<RdpfTriple>>,
    rdpf_pairs: BTreeMap<u8, VecDeque<RdpfPair>>,
    dealt_triples: usize,
    dealt_halftriples: usize,
    dealt_cdpfs: usize,
}

impl PrecompStore {
    pub fn num_triples(&self) -> usize {
        self.triples.len() + self.dealt_triples
    }

    pub fn num_halftriples(&self) -> usize {
        self.halftriples.len() + self.dealt_halftriples
    }

    pub fn num_cdpfs(&self) -> usize {
        self.cdpfs.len() + self.dealt_cdpfs
    }

    pub fn num_rdpfs(&self, depth: u8) -> usize {
        self.rdpf_triples.get(&depth).map_or(0, VecDeque::len)
            + self.rdpf_pairs.get(&depth).map_or(0, VecDeque::len)
    }
}

fn take_dealt(count: &mut usize) -> bool {
    if *count > 0 {
        *count -= 1;
        true
    } else {
        false
    }
}

impl MpcTio {
    pub fn store(&self) -> &PrecompStore {
        &self.store
    }

    /// Next multiplication triple.
    /// P2 gets a zero triple.
    pub fn triple(&mut self) -> Result<MultTriple, MpcError> {
        if self.is_server() {
            if self.preprocessing || !take_dealt(&mut self.store.dealt_triples) {
                let (t0, t1) = MultTriple::deal(self.rng());
                self.deal_pair(&t0, &t1)?;
            }
            return Ok(MultTriple::default());
        }
        let stored = if self.preprocessing {
            None
        } else {
            self.store.triples.pop_front()
        };
        match stored {
            Some(t) => Ok(t),
            None => self.recv_server(),
        }
    }

    /// Next half-triple.
    /// P2 gets a zero half-triple.
    pub fn halftriple(&mut self) -> Result<HalfTriple, MpcError> {
        if self.is_server() {
            if self.preprocessing || !take_dealt(&mut self.store.dealt_halftriples) {
                let (t0, t1) = HalfTriple::deal(self.rng());
                self.deal_pair(&t0, &t1)?;
            }
            return Ok(HalfTriple::default());
        }
        let stored = if self.preprocessing {
            None
        } else {
            self.store.halftriples.pop_front()
        };
        match stored {
            Some(t) => Ok(t),
            None => self.recv_server(),
        }
    }

    /// Next select triple.
    /// These are cheap and always dealt online.
    pub fn select_triple<V: SelectValue>(&mut self) -> Result<SelectTriple<V>, MpcError> {
        if self.is_server() {
            let (t0, t1) = SelectTriple::<V>::deal(self.rng());
            self.deal_pair(&t0, &t1)?;
            return Ok(SelectTriple::default());
        }
        self.recv_server()
    }

    /// Next comparison DPF.
    /// P2 gets an empty one.
    pub fn cdpf(&mut self) -> Result<Cdpf, MpcError> {
        if self.is_server() {
            if self.preprocessing || !take_dealt(&mut self.store.dealt_cdpfs) {
                self.deal_cdpf()?;
            }
            return Ok(Cdpf::default());
        }
        let stored = if self.preprocessing {
            None
        } else {
            self.store.cdpfs.pop_front()
        };
        match stored {
            Some(c) => Ok(c),
            None => self.recv_server(),
        }
    }

    /// Next RDPF triple of `depth` at P0 or P1.
    pub fn rdpf_triple(&mut self, depth: u8) -> Result<RdpfTriple, MpcError> {
        let stored = self
            .store
            .rdpf_triples
            .get_mut(&depth)
            .and_then(VecDeque::pop_front);
        match stored {
            Some(t) => Ok(t),
            None => RdpfTriple::generate(self, depth, true),
        }
    }

    /// Next RDPF pair of `depth` at P2.
    pub fn rdpf_pair(&mut self, depth: u8) -> Result<RdpfPair, MpcError> {
        let stored = self
            .store
            .rdpf_pairs
            .get_mut(&depth)
            .and_then(VecDeque::pop_front);
        match stored {
            Some(p) => Ok(p),
            None => RdpfPair::generate(self, depth, true),
        }
    }

    fn deal_pair<T: WireFormat>(&mut self, t0: &T, t1: &T) -> Result<(), MpcError> {
        self.queue_p0(t0)?;
        self.queue_p1(t1)?;
        self.send()
    }

    fn deal_cdpf(&mut self) -> Result<(), MpcError> {
        let target: Value = self.rng().gen();
        let mut aes_ops = 0;
        let (c0, c1) = Cdpf::generate(target, self.rng(), &mut aes_ops);
        *self.aes_ops() += aes_ops;
        self.deal_pair(&c0, &c1)
    }
}

/// One request of a preprocessing run, e.g., `t:100` for 100 multiplication triples.
///
/// Parsed from `t:N` (triples), `h:N` (half-triples), `c:N` (CDPFs), or `rD:N` (RDPFs of depth D).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PreprocRequest {
    Triples(u32),
    HalfTriples(u32),
    Cdpfs(u32),
    Rdpfs { depth: u8, count: u32 },
}

impl PreprocRequest {
    fn tag(&self) -> u8 {
        match self {
            Self::Triples(_) => TAG_TRIPLE,
            Self::HalfTriples(_) => TAG_HALFTRIPLE,
            Self::Cdpfs(_) => TAG_CDPF,
            Self::Rdpfs { depth, .. } => *depth,
        }
    }

    fn count(&self) -> u32 {
        match self {
            Self::Triples(n) | Self::HalfTriples(n) | Self::Cdpfs(n) => *n,
            Self::Rdpfs { count, .. } => *count,
        }
    }
}

impl FromStr for PreprocRequest {
    type Err = MpcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || MpcError::BadRequest(s.to_owned());
        let (kind, count) = s.split_once(':').ok_or_else(bad)?;
        let count: u32 = count.parse().map_err(|_| bad())?;
        match kind {
            "t" => Ok(Self::Triples(count)),
            "h" => Ok(Self::HalfTriples(count)),
            "c" => Ok(Self::Cdpfs(count)),
            _ => {
                let depth: u8 = kind
                    .strip_prefix('r')
                    .and_then(|d| d.parse().ok())
                    .ok_or_else(bad)?;
                if depth == 0 || depth > ADDRESS_MAX_BITS {
                    return Err(MpcError::DepthOutOfRange(depth));
                }
                Ok(Self::Rdpfs { depth, count })
            }
        }
    }
}

/// P2's side of a preprocessing run.
///
/// Correlations the run itself needs, e.g. for RDPF generation, are dealt online and leave the stores untouched.
pub fn preprocessing_server(tio: &mut MpcTio, reqs: &[PreprocRequest]) -> Result<(), MpcError> {
    tio.preprocessing = true;
    let res = serve_requests(tio, reqs);
    tio.preprocessing = false;
    res
}

fn serve_requests(tio: &mut MpcTio, reqs: &[PreprocRequest]) -> Result<(), MpcError> {
    for req in reqs {
        let (tag, count) = (req.tag(), req.count());
        tio.queue_p0(&tag)?;
        tio.queue_p1(&tag)?;
        tio.queue_p0(&count)?;
        tio.queue_p1(&count)?;
        tio.send()?;
        match *req {
            PreprocRequest::Triples(n) => {
                for _ in 0..n {
                    let (t0, t1) = MultTriple::deal(tio.rng());
                    tio.queue_p0(&t0)?;
                    tio.queue_p1(&t1)?;
                }
                tio.send()?;
                tio.store.dealt_triples += n as usize;
            }
            PreprocRequest::HalfTriples(n) => {
                for _ in 0..n {
                    let (t0, t1) = HalfTriple::deal(tio.rng());
                    tio.queue_p0(&t0)?;
                    tio.queue_p1(&t1)?;
                }
                tio.send()?;
                tio.store.dealt_halftriples += n as usize;
            }
            PreprocRequest::Cdpfs(n) => {
                for _ in 0..n {
                    tio.deal_cdpf()?;
                }
                tio.store.dealt_cdpfs += n as usize;
            }
            PreprocRequest::Rdpfs { depth, count } => {
                for _ in 0..count {
                    let pair = RdpfPair::generate(tio, depth, false)?;
                    tio.store
                        .rdpf_pairs
                        .entry(depth)
                        .or_default()
                        .push_back(pair);
                }
            }
        }
        log::debug!("P2 dealt {} objects of tag {:#04x}", count, tag);
    }
    tio.queue_p0(&TAG_END)?;
    tio.queue_p1(&TAG_END)?;
    tio.send()
}

/// P0's or P1's side of a preprocessing run, storing whatever P2 requests.
pub fn preprocessing_comp(tio: &mut MpcTio) -> Result<(), MpcError> {
    tio.preprocessing = true;
    let res = store_requests(tio);
    tio.preprocessing = false;
    res
}

fn store_requests(tio: &mut MpcTio) -> Result<(), MpcError> {
    loop {
        let tag: u8 = tio.recv_server()?;
        if tag == TAG_END {
            return Ok(());
        }
        let count: u32 = tio.recv_server()?;
        for _ in 0..count {
            match tag {
                TAG_TRIPLE => {
                    let t = tio.recv_server()?;
                    tio.store.triples.push_back(t);
                }
                TAG_HALFTRIPLE => {
                    let t = tio.recv_server()?;
                    tio.store.halftriples.push_back(t);
                }
                TAG_CDPF => {
                    let c = tio.recv_server()?;
                    tio.store.cdpfs.push_back(c);
                }
                depth if depth >= 1 && depth <= ADDRESS_MAX_BITS => {
                    let t = RdpfTriple::generate(tio, depth, false)?;
                    tio.store
                        .rdpf_triples
                        .entry(depth)
                        .or_default()
                        .push_back(t);
                }
                _ => return Err(MpcError::BadTag(tag)),
            }
        }
        log::debug!(
            "P{} stored {} objects of tag {:#04x}",
            tio.player(),
            count,
            tag
        );
    }
}
