// SPDX-License-Identifier: Apache-2.0
// Copyright (C) 2023 Yulong Ming (myl7)

//! Evaluating RDPFs over ranges of leaves.
//!
//! [`StreamEval`] walks consecutive leaves, recomputing only the part of the path below the highest changed bit,
//! so a full pass costs about 2 PRG calls per leaf.
//! [`ParallelEval`] splits a range into contiguous chunks, one [`StreamEval`] each, and reduces the results in order.

#[cfg(feature = "multi-thread")]
use rayon::prelude::*;

use crate::dpf::DpfNode;
use crate::rdpf::{Rdpf, RdpfPair, RdpfTriple};
use crate::Address;

/// An RDPF, or several RDPFs of the same depth walked in lockstep.
pub trait RdpfEval: Sync {
    type Node: Copy + Send;

    fn depth(&self) -> usize;
    fn seed(&self) -> Self::Node;
    fn descend(
        &self,
        parent: &Self::Node,
        parentdepth: usize,
        whichchild: bool,
        aes_ops: &mut usize,
    ) -> Self::Node;
    fn has_expansion(&self) -> bool;

    /// The stored leaf at `index`.
    /// Only called when [`RdpfEval::has_expansion`] holds.
    fn expansion_at(&self, index: Address) -> Self::Node;
}

impl RdpfEval for Rdpf {
    type Node = DpfNode;

    fn depth(&self) -> usize {
        Rdpf::depth(self)
    }

    fn seed(&self) -> Self::Node {
        self.dpf.seed
    }

    fn descend(
        &self,
        parent: &Self::Node,
        parentdepth: usize,
        whichchild: bool,
        aes_ops: &mut usize,
    ) -> Self::Node {
        Rdpf::descend(self, parent, parentdepth, whichchild, aes_ops)
    }

    fn has_expansion(&self) -> bool {
        Rdpf::has_expansion(self)
    }

    fn expansion_at(&self, index: Address) -> Self::Node {
        self.expansion[index as usize]
    }
}

macro_rules! impl_rdpf_eval_for_group {
    ($group:ty, $n:literal) => {
        impl RdpfEval for $group {
            type Node = [DpfNode; $n];

            fn depth(&self) -> usize {
                self.dpf[0].depth()
            }

            fn seed(&self) -> Self::Node {
                std::array::from_fn(|i| self.dpf[i].dpf.seed)
            }

            fn descend(
                &self,
                parent: &Self::Node,
                parentdepth: usize,
                whichchild: bool,
                aes_ops: &mut usize,
            ) -> Self::Node {
                std::array::from_fn(|i| {
                    self.dpf[i].descend(&parent[i], parentdepth, whichchild, aes_ops)
                })
            }

            fn has_expansion(&self) -> bool {
                self.dpf.iter().all(Rdpf::has_expansion)
            }

            fn expansion_at(&self, index: Address) -> Self::Node {
                std::array::from_fn(|i| self.dpf[i].expansion[index as usize])
            }
        }
    };
}

impl_rdpf_eval_for_group!(RdpfPair, 2);
impl_rdpf_eval_for_group!(RdpfTriple, 3);

/// Infinite iterator over the leaves at `start, start + 1, ...` (wrapping) with every index XORed by `xor_offset`.
pub struct StreamEval<'a, T: RdpfEval> {
    rdpf: &'a T,
    depth: usize,
    indexmask: Address,
    nextindex: Address,
    xor_offset: Address,
    use_expansion: bool,
    path: Vec<T::Node>,
    pathindex: Address,
    aes_ops: usize,
}

impl<'a, T: RdpfEval> StreamEval<'a, T> {
    /// `use_expansion` only takes effect when the RDPF has its expansion.
    pub fn new(rdpf: &'a T, start: Address, xor_offset: Address, use_expansion: bool) -> Self {
        let depth = rdpf.depth();
        let indexmask = Address::MAX >> (Address::BITS as usize - depth);
        let mut eval = Self {
            rdpf,
            depth,
            indexmask,
            nextindex: start & indexmask,
            xor_offset: xor_offset & indexmask,
            use_expansion: use_expansion && rdpf.has_expansion(),
            path: Vec::new(),
            pathindex: 0,
            aes_ops: 0,
        };
        if !eval.use_expansion {
            let index = eval.nextindex ^ eval.xor_offset;
            eval.path = vec![rdpf.seed(); depth + 1];
            eval.descend_from(0, index);
        }
        eval
    }

    pub fn aes_ops(&self) -> usize {
        self.aes_ops
    }

    fn descend_from(&mut self, level: usize, index: Address) {
        for l in level..self.depth {
            let dir = (index >> (self.depth - 1 - l)) & 1 == 1;
            let child = self
                .rdpf
                .descend(&self.path[l], l, dir, &mut self.aes_ops);
            self.path[l + 1] = child;
        }
        self.pathindex = index;
    }
}

impl<T: RdpfEval> Iterator for StreamEval<'_, T> {
    type Item = T::Node;

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.nextindex ^ self.xor_offset;
        self.nextindex = (self.nextindex + 1) & self.indexmask;
        if self.use_expansion {
            return Some(self.rdpf.expansion_at(index));
        }
        let diff = index ^ self.pathindex;
        if diff != 0 {
            // Levels above the highest changed bit keep their nodes
            let top = Address::BITS - 1 - diff.leading_zeros();
            self.descend_from(self.depth - 1 - top as usize, index);
        }
        Some(self.path[self.depth])
    }
}

/// Evaluate `num_evals` leaves from `start` on `num_threads` chunks and reduce them.
pub struct ParallelEval<'a, T: RdpfEval> {
    rdpf: &'a T,
    start: Address,
    xor_offset: Address,
    num_evals: usize,
    num_threads: usize,
    use_expansion: bool,
    aes_ops: usize,
}

impl<'a, T: RdpfEval> ParallelEval<'a, T> {
    pub fn new(
        rdpf: &'a T,
        start: Address,
        xor_offset: Address,
        num_evals: usize,
        num_threads: usize,
        use_expansion: bool,
    ) -> Self {
        Self {
            rdpf,
            start,
            xor_offset,
            num_evals,
            num_threads,
            use_expansion,
            aes_ops: 0,
        }
    }

    pub fn aes_ops(&self) -> usize {
        self.aes_ops
    }

    /// Contiguous `(first, len)` chunks, the first `num_evals % num_threads` of them one longer.
    fn chunks(&self) -> Vec<(usize, usize)> {
        let num_threads = self.num_threads.clamp(1, self.num_evals.max(1));
        let base = self.num_evals / num_threads;
        let extra = self.num_evals % num_threads;
        let mut first = 0;
        (0..num_threads)
            .map(|t| {
                let len = base + (t < extra) as usize;
                let chunk = (first, len);
                first += len;
                chunk
            })
            .collect()
    }

    fn run_chunk<V, P, A>(
        &self,
        thread_num: usize,
        (first, len): (usize, usize),
        init: &V,
        process: &P,
        accumulate: &A,
    ) -> (V, usize)
    where
        V: Clone,
        P: Fn(usize, Address, &T::Node) -> V,
        A: Fn(&mut V, V),
    {
        let chunk_start = self.start.wrapping_add(first as Address);
        let mut eval = StreamEval::new(self.rdpf, chunk_start, self.xor_offset, self.use_expansion);
        let indexmask = eval.indexmask;
        let mut acc = init.clone();
        for (i, leaf) in eval.by_ref().take(len).enumerate() {
            let index = chunk_start.wrapping_add(i as Address) & indexmask;
            accumulate(&mut acc, process(thread_num, index, &leaf));
        }
        (acc, eval.aes_ops())
    }

    /// Fold `process(thread_num, index, leaf)` of every leaf into `init` with `accumulate`.
    ///
    /// `index` is the position before XORing with the offset.
    /// Every chunk starts from a clone of `init` and the chunk results are folded into `init` in index order,
    /// so `accumulate` only needs to be associative.
    pub fn reduce<V, P, A>(&mut self, init: V, process: P, accumulate: A) -> V
    where
        V: Clone + Send + Sync,
        P: Fn(usize, Address, &T::Node) -> V + Sync,
        A: Fn(&mut V, V) + Sync,
    {
        #[cfg(feature = "multi-thread")]
        let partials = self.reduce_mt(&init, &process, &accumulate);
        #[cfg(not(feature = "multi-thread"))]
        let partials = self.reduce_st(&init, &process, &accumulate);

        let mut total = init;
        for (v, aes_ops) in partials {
            accumulate(&mut total, v);
            self.aes_ops += aes_ops;
        }
        total
    }

    /// Chunk results with single-threading.
    pub fn reduce_st<V, P, A>(&self, init: &V, process: &P, accumulate: &A) -> Vec<(V, usize)>
    where
        V: Clone,
        P: Fn(usize, Address, &T::Node) -> V,
        A: Fn(&mut V, V),
    {
        self.chunks()
            .into_iter()
            .enumerate()
            .map(|(t, chunk)| self.run_chunk(t, chunk, init, process, accumulate))
            .collect()
    }

    #[cfg(feature = "multi-thread")]
    /// Chunk results with multi-threading.
    pub fn reduce_mt<V, P, A>(&self, init: &V, process: &P, accumulate: &A) -> Vec<(V, usize)>
    where
        V: Clone + Send + Sync,
        P: Fn(usize, Address, &T::Node) -> V + Sync,
        A: Fn(&mut V, V) + Sync,
    {
        self.chunks()
            .into_par_iter()
            .enumerate()
            .map(|(t, chunk)| self.run_chunk(t, chunk, init, process, accumulate))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use rand::prelude::*;

    use super::*;
    use crate::share::AShare;
    use crate::test_utils::{run_parties, share_x};
    use crate::Value;

    fn generate_pair(target: Address, depth: u8) -> (Rdpf, Rdpf) {
        let mut rng = StdRng::seed_from_u64(target);
        let shares = share_x(&mut rng, target);
        let [r0, r1, _] = run_parties(|tio| {
            if tio.is_server() {
                Rdpf::serve_generation(tio, depth)?;
                return Ok(Rdpf::default());
            }
            Rdpf::generate(tio, shares[tio.player() as usize], depth, true)
        });
        (r0, r1)
    }

    fn without_expansion(rdpf: &Rdpf) -> Rdpf {
        Rdpf {
            expansion: Vec::new(),
            ..rdpf.clone()
        }
    }

    #[test]
    fn test_stream_matches_point_eval() {
        let (r0, _) = generate_pair(9, 5);
        let bare = without_expansion(&r0);
        let mut aes_ops = 0;
        for (start, offset) in [(0, 0), (7, 0), (30, 5), (3, 31)] {
            let leaves: Vec<_> = StreamEval::new(&bare, start, offset, false)
                .take(40)
                .collect();
            for (i, leaf) in leaves.iter().enumerate() {
                let index = ((start + i as Address) % 32) ^ offset;
                assert_eq!(*leaf, bare.leaf(index, &mut aes_ops));
                assert_eq!(*leaf, r0.expansion[index as usize]);
            }
            let expanded: Vec<_> = StreamEval::new(&r0, start, offset, true)
                .take(40)
                .collect();
            assert_eq!(expanded, leaves);
        }
    }

    #[test]
    fn test_stream_cost_is_about_two_prgs_per_leaf() {
        let (r0, _) = generate_pair(1, 6);
        let bare = without_expansion(&r0);
        let mut eval = StreamEval::new(&bare, 0, 0, false);
        eval.by_ref().take(64).for_each(drop);
        // 6 for the first path, then trailing_zeros(i) + 1 for each later i
        assert_eq!(eval.aes_ops(), 6 + 63 + 57);
    }

    #[test]
    fn test_parallel_reduce_is_thread_count_independent() {
        let target = 21;
        let (r0, r1) = generate_pair(target, 6);
        let sum_units = |rdpf: &Rdpf, num_threads| {
            ParallelEval::new(rdpf, 0, 0, 64, num_threads, false).reduce(
                Vec::new(),
                |_, index, leaf| vec![(index, rdpf.unit_as(leaf))],
                |acc, v| acc.extend(v),
            )
        };
        let single0 = sum_units(&r0, 1);
        let single1 = sum_units(&r1, 1);
        for num_threads in [2, 5, 64, 100] {
            assert_eq!(sum_units(&r0, num_threads), single0);
        }
        assert_eq!(single0.len(), 64);
        for (i, ((idx0, u0), (idx1, u1))) in single0.iter().zip(&single1).enumerate() {
            assert_eq!(*idx0, i as Address);
            assert_eq!(idx0, idx1);
            assert_eq!((*u0 + *u1).0, (i as Address == target) as Value);
        }
    }

    #[test]
    fn test_parallel_reduce_over_triple() {
        let depth = 3;
        let res = run_parties(|tio| {
            if tio.is_server() {
                crate::rdpf::RdpfPair::generate(tio, depth, false)?;
                return Ok(None);
            }
            Ok(Some(RdpfTriple::generate(tio, depth, false)?))
        });
        let (Some(t0), Some(t1)) = (&res[0], &res[1]) else {
            panic!("missing generation output");
        };
        let target = (t0.xs_target ^ t1.xs_target).0;
        let offset = 5;
        let sums: Vec<AShare> = [t0, t1]
            .iter()
            .map(|t| {
                ParallelEval::new(*t, 0, offset, 8, 3, false).reduce(
                    AShare(0),
                    |_, index, leaves| t.dpf[2].unit_as(&leaves[2]) * index,
                    |acc, v| *acc += v,
                )
            })
            .collect();
        // Only index ^ offset == target contributes
        assert_eq!((sums[0] + sums[1]).0, target ^ offset);
    }
}
