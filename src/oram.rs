// Copyright (C) myl7
// SPDX-License-Identifier: Apache-2.0

//! A simple linear-time flat view of secret-shared memory.
//!
//! Every access touches every cell through one RDPF triple, so neither the index nor the written data leaks.
//! Reads fold the cells with the secret unit vector.
//! Updates add `$\Delta e_r$` to the memory using the scaled vector, with only masked values revealed.

use crate::avl::Node;
use crate::eval::{ParallelEval, StreamEval};
use crate::mpcio::MpcTio;
use crate::mpcops::{mpc_mul_vec, mpc_select_mult};
use crate::rdpf::RdpfTriple;
use crate::share::{AShare, BShare, XShare};
use crate::{Address, MpcError, Value, ADDRESS_MAX_BITS};

/// Threads used to evaluate an RDPF over the memory on a read.
pub const DEFAULT_EVAL_THREADS: usize = 4;

#[derive(Debug)]
pub struct LinearOram {
    depth: u8,
    /// This party's shares.
    /// All zero at P2.
    cells: Vec<Node>,
    num_threads: usize,
}

impl LinearOram {
    /// A zeroed memory of at least `capacity` cells, rounded up to a power of 2.
    pub fn new(capacity: usize) -> Result<Self, MpcError> {
        let depth = capacity.max(2).next_power_of_two().trailing_zeros();
        if depth > ADDRESS_MAX_BITS as u32 {
            return Err(MpcError::DepthOutOfRange(depth.min(u8::MAX as u32) as u8));
        }
        Ok(Self {
            depth: depth as u8,
            cells: vec![Node::default(); 1 << depth],
            num_threads: DEFAULT_EVAL_THREADS,
        })
    }

    pub fn with_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = num_threads.max(1);
        self
    }

    pub fn depth(&self) -> u8 {
        self.depth
    }

    pub fn capacity(&self) -> usize {
        self.cells.len()
    }

    /// This party's share of the cell at a public index.
    pub fn get(&self, idx: Address) -> Node {
        self.cells[idx as usize]
    }

    /// Overwrite this party's share of the cell at a public index.
    pub fn set(&mut self, idx: Address, node: Node) {
        self.cells[idx as usize] = node;
    }

    /// Reveal `idx ^ r` for the RDPF target `r` between P0 and P1.
    fn reveal_offset(tio: &mut MpcTio, masked: XShare) -> Result<Address, MpcError> {
        tio.queue_peer(&masked)?;
        tio.send()?;
        let peer: XShare = tio.recv_peer()?;
        Ok((masked ^ peer).0)
    }

    /// Read the cell at a secret index.
    pub fn read(&mut self, tio: &mut MpcTio, idx: XShare) -> Result<Node, MpcError> {
        let n = self.capacity();
        let (unit_as, unit_bs): (Vec<AShare>, Vec<BShare>) = if tio.is_server() {
            tio.rdpf_pair(self.depth)?;
            (vec![AShare::default(); n], vec![BShare::default(); n])
        } else {
            let triple = tio.rdpf_triple(self.depth)?;
            let offset = Self::reveal_offset(tio, idx ^ triple.xs_target)?;
            let dpf = &triple.dpf[0];
            let mut eval = ParallelEval::new(dpf, 0, offset, n, self.num_threads, true);
            let units = eval.reduce(
                Vec::with_capacity(n),
                |_, _, leaf| vec![(dpf.unit_as(leaf), dpf.unit_bs(leaf))],
                |acc, v| acc.extend(v),
            );
            *tio.aes_ops() += eval.aes_ops();
            units.into_iter().unzip()
        };

        let keys: Vec<AShare> = self.cells.iter().map(|c| c.key).collect();
        let key = mpc_mul_vec(tio, &unit_as, &keys)?
            .into_iter()
            .fold(AShare(0), |acc, k| acc + k);

        let flags: Vec<BShare> = unit_bs.iter().chain(&unit_bs).copied().collect();
        let words: Vec<Value> = self
            .cells
            .iter()
            .map(|c| c.pointers.0)
            .chain(self.cells.iter().map(|c| c.value.0))
            .collect();
        let picked = mpc_select_mult(tio, &flags, &words)?;
        let (pointers, value) = picked.split_at(n);
        Ok(Node {
            key,
            pointers: XShare(pointers.iter().fold(0, |acc: Value, w| acc ^ w)),
            value: XShare(value.iter().fold(0, |acc: Value, w| acc ^ w)),
        })
    }

    /// Add `delta` to the cell at a secret index: the key additively, the pointers and value by XOR.
    pub fn update(&mut self, tio: &mut MpcTio, idx: XShare, delta: &Node) -> Result<(), MpcError> {
        if tio.is_server() {
            tio.rdpf_pair(self.depth)?;
            return Ok(());
        }
        let triple: RdpfTriple = tio.rdpf_triple(self.depth)?;
        let [d0, d1, d2] = &triple.dpf;

        let masked_idx = idx ^ triple.xs_target;
        let masked_key = delta.key - d0.scaled_sum;
        let masked_pointers = delta.pointers ^ d1.scaled_xor;
        let masked_value = delta.value ^ d2.scaled_xor;
        tio.queue_peer(&masked_idx)?;
        tio.queue_peer(&masked_key)?;
        tio.queue_peer(&masked_pointers)?;
        tio.queue_peer(&masked_value)?;
        tio.send()?;
        let offset = (masked_idx ^ tio.recv_peer::<XShare>()?).0;
        let m_key = (masked_key + tio.recv_peer::<AShare>()?).0;
        let m_pointers = (masked_pointers ^ tio.recv_peer::<XShare>()?).0;
        let m_value = (masked_value ^ tio.recv_peer::<XShare>()?).0;

        log::trace!("P{} oram update over {} cells", tio.player(), self.cells.len());
        let mut eval = StreamEval::new(&triple, 0, offset, true);
        for (cell, [l0, l1, l2]) in self.cells.iter_mut().zip(eval.by_ref()) {
            cell.key += d0.scaled_as(&l0) + d0.unit_as(&l0) * m_key;
            cell.pointers ^= d1.scaled_xs(&l1) ^ (XShare::from(d1.unit_bs(&l1)) & m_pointers);
            cell.value ^= d2.scaled_xs(&l2) ^ (XShare::from(d2.unit_bs(&l2)) & m_value);
        }
        *tio.aes_ops() += eval.aes_ops();
        Ok(())
    }

    /// Overwrite the cell at a secret index, returning the old shares.
    pub fn write(&mut self, tio: &mut MpcTio, idx: XShare, new: &Node) -> Result<Node, MpcError> {
        let old = self.read(tio, idx)?;
        self.update(tio, idx, &Node::delta(&old, new))?;
        Ok(old)
    }

    /// The plaintext memory at P0, `None` elsewhere.
    /// Only for testing and debugging.
    pub fn reconstruct(&self, tio: &mut MpcTio) -> Result<Option<Vec<Node>>, MpcError> {
        match tio.player() {
            0 => {
                let mut out = Vec::with_capacity(self.cells.len());
                for cell in &self.cells {
                    let peer: Node = tio.recv_p1()?;
                    out.push(Node::open(cell, &peer));
                }
                Ok(Some(out))
            }
            1 => {
                for cell in &self.cells {
                    tio.queue_p0(cell)?;
                }
                tio.send()?;
                Ok(None)
            }
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::prelude::*;

    use super::*;
    use crate::test_utils::{run_parties, share_a, share_x};

    fn shared_node<R: Rng>(rng: &mut R, key: Value, pointers: Value, value: Value) -> [Node; 3] {
        let k = share_a(rng, key);
        let p = share_x(rng, pointers);
        let v = share_x(rng, value);
        std::array::from_fn(|i| Node {
            key: k[i],
            pointers: p[i],
            value: v[i],
        })
    }

    #[test]
    fn test_capacity_rounds_up() {
        assert_eq!(LinearOram::new(0).unwrap().capacity(), 2);
        assert_eq!(LinearOram::new(5).unwrap().depth(), 3);
        assert_eq!(LinearOram::new(8).unwrap().capacity(), 8);
        assert!(matches!(
            LinearOram::new(1 << 49),
            Err(MpcError::DepthOutOfRange(49))
        ));
    }

    #[test]
    fn test_secret_index_read_write() {
        let mut rng = StdRng::seed_from_u64(0);
        let nodes: Vec<[Node; 3]> = (0..8)
            .map(|i| shared_node(&mut rng, 100 + i, 0x10 + i, 0x20 + i))
            .collect();
        let idx = share_x(&mut rng, 5);
        let other = share_x(&mut rng, 2);
        let new = shared_node(&mut rng, (-9i64) as Value, 0xabc, 0xdef);

        let res = run_parties(|tio| {
            let p = tio.player() as usize;
            let mut oram = LinearOram::new(8)?.with_threads(3);
            for (i, node) in nodes.iter().enumerate() {
                oram.set(i as Address, node[p]);
            }
            let read = oram.read(tio, idx[p])?;
            let old = oram.write(tio, other[p], &new[p])?;
            let after = oram.read(tio, other[p])?;
            let mem = oram.reconstruct(tio)?;
            Ok((read, old, after, mem))
        });

        let read = Node::open(&res[0].0, &res[1].0);
        assert_eq!((read.key.0, read.pointers.0, read.value.0), (105, 0x15, 0x25));
        let old = Node::open(&res[0].1, &res[1].1);
        assert_eq!((old.key.0, old.pointers.0, old.value.0), (102, 0x12, 0x22));
        let after = Node::open(&res[0].2, &res[1].2);
        assert_eq!(
            (after.key.0, after.pointers.0, after.value.0),
            ((-9i64) as Value, 0xabc, 0xdef)
        );

        let mem = res[0].3.as_ref().unwrap();
        for (i, cell) in mem.iter().enumerate() {
            if i == 2 {
                assert_eq!(cell.key.0, (-9i64) as Value);
            } else {
                assert_eq!(cell.key.0, 100 + i as Value);
                assert_eq!(cell.pointers.0, 0x10 + i as Value);
            }
        }
        assert!(res[1].3.is_none() && res[2].3.is_none());
    }

    #[test]
    fn test_update_adds_delta() {
        let mut rng = StdRng::seed_from_u64(1);
        let idx = share_x(&mut rng, 3);
        let delta = shared_node(&mut rng, 7, 0b1010, 0xff);
        let [mem, _, _] = run_parties(|tio| {
            let p = tio.player() as usize;
            let mut oram = LinearOram::new(4)?;
            oram.update(tio, idx[p], &delta[p])?;
            oram.update(tio, idx[p], &delta[p])?;
            oram.reconstruct(tio)
        });
        let mem = mem.unwrap();
        assert_eq!(mem[3].key.0, 14);
        assert_eq!(mem[3].pointers.0, 0);
        assert_eq!(mem[3].value.0, 0);
        for i in 0..3 {
            assert_eq!(mem[i], Node::default());
        }
    }
}
