// Copyright (C) myl7
// SPDX-License-Identifier: Apache-2.0

//! Oblivious AVL tree over a [`LinearOram`].
//!
//! Nodes live in memory slots `1..=max_size`; slot 0 is the null pointer.
//! Every operation walks a fixed number of levels (the TTL, a height bound for the current item count)
//! and does the same work whether or not a level is real,
//! so the access pattern depends only on the public item count.
//! Conditional steps are done with secret flags: a step "if F" is a select between the old and the new value.

use std::fmt::Write as _;

use crate::mpcio::MpcTio;
use crate::mpcops::{
    mpc_and, mpc_compare, mpc_flagmult_vec, mpc_is_zero, mpc_reveal_bit, mpc_select,
    mpc_select_as, mpc_select_bit, mpc_select_mult,
};
use crate::oram::LinearOram;
use crate::share::{AShare, BShare, XShare};
use crate::wire::{WireFormat, WireRead};
use crate::{Address, MpcError, Player, Value};

/// A tree node: an additively shared key, packed XOR-shared pointers, and an XOR-shared value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Node {
    pub key: AShare,
    pub pointers: XShare,
    pub value: XShare,
}

impl Node {
    /// A node with public contents held by P0.
    pub fn constant(player: Player, key: Value, value: Value) -> Self {
        Self {
            key: AShare::constant(player, key),
            pointers: XShare(0),
            value: XShare::constant(player, value),
        }
    }

    /// The delta turning `old` into `new` under [`LinearOram::update`].
    pub fn delta(old: &Self, new: &Self) -> Self {
        Self {
            key: new.key - old.key,
            pointers: old.pointers ^ new.pointers,
            value: old.value ^ new.value,
        }
    }

    /// Combine the two computational parties' shares.
    pub fn open(a: &Self, b: &Self) -> Self {
        Self {
            key: a.key + b.key,
            pointers: a.pointers ^ b.pointers,
            value: a.value ^ b.value,
        }
    }
}

impl WireFormat for Node {
    fn write_to(&self, out: &mut Vec<u8>) {
        self.key.write_to(out);
        self.pointers.write_to(out);
        self.value.write_to(out);
    }

    fn read_from<R: WireRead + ?Sized>(input: &mut R) -> Result<Self, MpcError> {
        Ok(Self {
            key: AShare::read_from(input)?,
            pointers: XShare::read_from(input)?,
            value: XShare::read_from(input)?,
        })
    }
}

const ADDR_BITS: u32 = 31;
const ADDR_MASK: Value = (1 << ADDR_BITS) - 1;
const LEFT_SHIFT: u32 = 33;
const RIGHT_SHIFT: u32 = 2;

/// Unpacked pointer word.
///
/// Packed as left child in bits 33..64, right child in bits 2..33,
/// left-heavy in bit 1, and right-heavy in bit 0.
/// Packing works share-wise since the fields are disjoint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AvlPointers {
    pub left: XShare,
    pub right: XShare,
    pub bal_l: BShare,
    pub bal_r: BShare,
}

impl AvlPointers {
    pub fn unpack(p: XShare) -> Self {
        Self {
            left: (p >> LEFT_SHIFT) & ADDR_MASK,
            right: (p >> RIGHT_SHIFT) & ADDR_MASK,
            bal_l: p.bit(1),
            bal_r: p.bit(0),
        }
    }

    pub fn pack(&self) -> XShare {
        ((self.left & ADDR_MASK) << LEFT_SHIFT)
            ^ ((self.right & ADDR_MASK) << RIGHT_SHIFT)
            ^ (XShare(self.bal_l.0 as Value) << 1)
            ^ XShare(self.bal_r.0 as Value)
    }
}

/// Max number of levels of an AVL tree with `n` items, `$\lceil 1.44 \log_2 (n + 1) \rceil$`.
pub fn avl_ttl(n: usize) -> usize {
    if n == 0 {
        return 0;
    }
    (1.44 * ((n + 1) as f64).log2()).ceil() as usize
}

/// `p.left` if `dir` is 0, `p.right` if 1.
fn child(tio: &mut MpcTio, p: &AvlPointers, dir: BShare) -> Result<XShare, MpcError> {
    mpc_select(tio, dir, p.left, p.right)
}

/// Set the `dir` child of `p` to `v` if `f`.
fn set_child_if(
    tio: &mut MpcTio,
    p: &mut AvlPointers,
    dir: BShare,
    f: BShare,
    v: XShare,
) -> Result<(), MpcError> {
    let f_r = mpc_and(tio, f, dir)?;
    let f_l = f ^ f_r;
    let d = mpc_select_mult(tio, &[f_l, f_r], &[(p.left ^ v).0, (p.right ^ v).0])?;
    p.left ^= XShare(d[0]);
    p.right ^= XShare(d[1]);
    Ok(())
}

/// Map (heavy on `h`, heavy on `!h`) back to (left-heavy, right-heavy).
fn from_dir(
    tio: &mut MpcTio,
    h: BShare,
    heavy_h: BShare,
    heavy_nh: BShare,
) -> Result<(BShare, BShare), MpcError> {
    let bal_l = mpc_select_bit(tio, h, heavy_h, heavy_nh)?;
    Ok((bal_l, heavy_h ^ heavy_nh ^ bal_l))
}

/// Balance of a node after its `c` subtree grew if `upd`.
///
/// Returns the new (left-heavy, right-heavy), whether the subtree rooted here grew, and whether it is now unbalanced.
fn update_balance_ins(
    tio: &mut MpcTio,
    p: &AvlPointers,
    upd: BShare,
    c: BShare,
) -> Result<(BShare, BShare, BShare, BShare), MpcError> {
    let bal_c = mpc_select_bit(tio, c, p.bal_l, p.bal_r)?;
    let bal_o = bal_c ^ p.bal_l ^ p.bal_r;
    let imb = mpc_and(tio, upd, bal_c)?;
    let clear_o = mpc_and(tio, upd, bal_o)?;
    let set_c = upd ^ imb ^ clear_o;
    let (d_l, d_r) = from_dir(tio, c, set_c, clear_o)?;
    Ok((p.bal_l ^ d_l, p.bal_r ^ d_r, set_c, imb))
}

/// Balance of a node after its `c` subtree shrank if `upd`.
///
/// Returns the new (left-heavy, right-heavy), whether the subtree rooted here shrank without a rotation,
/// and whether it is now unbalanced.
fn update_balance_del(
    tio: &mut MpcTio,
    p: &AvlPointers,
    upd: BShare,
    c: BShare,
) -> Result<(BShare, BShare, BShare, BShare), MpcError> {
    let bal_c = mpc_select_bit(tio, c, p.bal_l, p.bal_r)?;
    let bal_o = bal_c ^ p.bal_l ^ p.bal_r;
    let clear_c = mpc_and(tio, upd, bal_c)?;
    let imb = mpc_and(tio, upd, bal_o)?;
    let set_o = upd ^ clear_c ^ imb;
    let (d_l, d_r) = from_dir(tio, c, clear_c, set_o)?;
    Ok((p.bal_l ^ d_l, p.bal_r ^ d_r, clear_c, imb))
}

/// Rotate the subtree at `x`, heavy on side `h`, where `s = x.child(h)` and `g = s.child(!h)`.
///
/// A single rotation if `f_s`, a double one if `f_d`, and nothing if neither.
/// `single_balanced` is `f_s` with `s` balanced, which only happens on deletion.
/// Returns the new subtree root.
#[allow(clippy::too_many_arguments)]
fn rotate(
    tio: &mut MpcTio,
    x: &mut AvlPointers,
    x_ptr: XShare,
    s: &mut AvlPointers,
    s_ptr: XShare,
    g: &mut AvlPointers,
    g_ptr: XShare,
    h: BShare,
    f_s: BShare,
    f_d: BShare,
    single_balanced: BShare,
) -> Result<XShare, MpcError> {
    let player = tio.player();
    let nh = h.not(player);
    let f = f_s ^ f_d;

    let s_nh = child(tio, s, nh)?;
    let g_h = child(tio, g, h)?;
    let g_nh = child(tio, g, nh)?;
    let g_heavy_h = mpc_select_bit(tio, h, g.bal_l, g.bal_r)?;
    let g_heavy_nh = g.bal_l ^ g.bal_r ^ g_heavy_h;

    let x_child = mpc_select(tio, f_d, s_nh, g_nh)?;
    set_child_if(tio, x, h, f, x_child)?;
    let s_child = mpc_select(tio, f_d, x_ptr, g_h)?;
    set_child_if(tio, s, nh, f, s_child)?;
    set_child_if(tio, g, nh, f_d, x_ptr)?;
    set_child_if(tio, g, h, f_d, s_ptr)?;

    let x_heavy_nh = mpc_and(tio, f_d, g_heavy_h)?;
    let s_heavy_h = mpc_and(tio, f_d, g_heavy_nh)?;
    let (x_l, x_r) = from_dir(tio, h, single_balanced, x_heavy_nh)?;
    let (s_l, s_r) = from_dir(tio, h, s_heavy_h, single_balanced)?;
    x.bal_l = mpc_select_bit(tio, f, x.bal_l, x_l)?;
    x.bal_r = mpc_select_bit(tio, f, x.bal_r, x_r)?;
    s.bal_l = mpc_select_bit(tio, f, s.bal_l, s_l)?;
    s.bal_r = mpc_select_bit(tio, f, s.bal_r, s_r)?;
    g.bal_l = mpc_select_bit(tio, f_d, g.bal_l, BShare(false))?;
    g.bal_r = mpc_select_bit(tio, f_d, g.bal_r, BShare(false))?;

    mpc_select(tio, f_d, s_ptr, g_ptr)
}

/// Result of [`Avl::check_avl`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AvlCheck {
    /// In-order keys are sorted (as signed integers)
    pub ordered: bool,
    /// Every node has subtree heights within 1 and balance bits matching them
    pub balanced: bool,
    pub height: usize,
    pub num_nodes: usize,
}

#[derive(Debug)]
pub struct Avl {
    oram: LinearOram,
    root: XShare,
    num_items: usize,
    max_size: usize,
    empty_locations: Vec<XShare>,
}

impl Avl {
    pub fn new(max_size: usize) -> Result<Self, MpcError> {
        Ok(Self {
            oram: LinearOram::new(max_size + 1)?,
            root: XShare(0),
            num_items: 0,
            max_size,
            empty_locations: Vec::new(),
        })
    }

    pub fn with_threads(mut self, num_threads: usize) -> Self {
        self.oram = self.oram.with_threads(num_threads);
        self
    }

    pub fn num_items(&self) -> usize {
        self.num_items
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Freed slots waiting for reuse.
    pub fn num_empty_locations(&self) -> usize {
        self.empty_locations.len()
    }

    /// This party's share of the root pointer.
    pub fn root(&self) -> XShare {
        self.root
    }

    /// Empty the tree.
    pub fn init(&mut self) -> Result<(), MpcError> {
        *self = Self::new(self.max_size)?;
        Ok(())
    }

    /// The parent of path level `l` points to `ptr` instead if `f`.
    fn relink_parent(
        &mut self,
        tio: &mut MpcTio,
        pts: &mut [AvlPointers],
        dirs: &[BShare],
        l: usize,
        f: BShare,
        ptr: XShare,
    ) -> Result<(), MpcError> {
        if l == 0 {
            self.root = mpc_select(tio, f, self.root, ptr)?;
            Ok(())
        } else {
            set_child_if(tio, &mut pts[l - 1], dirs[l - 1], f, ptr)
        }
    }

    fn write_pointers(
        &mut self,
        tio: &mut MpcTio,
        ptr: XShare,
        old: XShare,
        new: &AvlPointers,
    ) -> Result<(), MpcError> {
        let delta = Node {
            pointers: old ^ new.pack(),
            ..Node::default()
        };
        self.oram.update(tio, ptr, &delta)
    }

    /// Insert a node, ignoring its pointers.
    /// Equal keys go to the left.
    ///
    /// Panics if the tree is full.
    pub fn insert(&mut self, tio: &mut MpcTio, node: Node) -> Result<(), MpcError> {
        assert!(self.num_items < self.max_size, "the tree is full");
        let player = tio.player();
        let node = Node {
            pointers: XShare(0),
            ..node
        };

        let new_addr = match self.empty_locations.pop() {
            Some(addr) => {
                self.oram.write(tio, addr, &node)?;
                addr
            }
            None => {
                let slot = (self.num_items + 1) as Address;
                self.oram.set(slot, node);
                XShare::constant(player, slot)
            }
        };
        if self.num_items == 0 {
            self.root = new_addr;
            self.num_items = 1;
            return Ok(());
        }

        let ttl = avl_ttl(self.num_items);
        let mut ptrs = Vec::with_capacity(ttl + 1);
        let mut orig = Vec::with_capacity(ttl + 1);
        let mut pts = Vec::with_capacity(ttl + 1);
        let mut dirs = Vec::with_capacity(ttl);
        let mut f_ins = Vec::with_capacity(ttl);

        let mut cur = self.root;
        let mut inserted = BShare(false);
        for _ in 0..ttl {
            let n = self.oram.read(tio, cur)?;
            let p = AvlPointers::unpack(n.pointers);
            let (_, _, gt) = mpc_compare(tio, node.key - n.key)?;
            let next = child(tio, &p, gt)?;
            let next_null = mpc_is_zero(tio, next)?;
            let f = mpc_and(tio, next_null, inserted.not(player))?;
            inserted ^= f;
            ptrs.push(cur);
            orig.push(n.pointers);
            pts.push(p);
            dirs.push(gt);
            f_ins.push(f);
            cur = next;
        }
        // Null below the last level, or the new node
        ptrs.push(cur);
        orig.push(XShare(0));
        pts.push(AvlPointers::default());

        for l in 0..ttl {
            ptrs[l + 1] = mpc_select(tio, f_ins[l], ptrs[l + 1], new_addr)?;
            set_child_if(tio, &mut pts[l], dirs[l], f_ins[l], new_addr)?;
        }

        let mut upd_below = BShare(false);
        for l in (0..ttl).rev() {
            let upd = f_ins[l] ^ upd_below;
            let (bal_l, bal_r, grew, imb) = update_balance_ins(tio, &pts[l], upd, dirs[l])?;
            pts[l].bal_l = bal_l;
            pts[l].bal_r = bal_r;
            if l + 2 <= ttl {
                let f_d = mpc_and(tio, imb, dirs[l] ^ dirs[l + 1])?;
                let f_s = imb ^ f_d;
                let (mut x, mut s, mut g) = (pts[l], pts[l + 1], pts[l + 2]);
                let newroot = rotate(
                    tio,
                    &mut x,
                    ptrs[l],
                    &mut s,
                    ptrs[l + 1],
                    &mut g,
                    ptrs[l + 2],
                    dirs[l],
                    f_s,
                    f_d,
                    BShare(false),
                )?;
                (pts[l], pts[l + 1], pts[l + 2]) = (x, s, g);
                self.relink_parent(tio, &mut pts, &dirs, l, imb, newroot)?;
            }
            upd_below = grew;
        }

        for l in 0..=ttl {
            self.write_pointers(tio, ptrs[l], orig[l], &pts[l])?;
        }
        self.num_items += 1;
        log::debug!("P{} inserted, {} items", player, self.num_items);
        Ok(())
    }

    /// Delete one node with the given key.
    ///
    /// Returns whether one was found, which is revealed to all parties.
    pub fn delete(&mut self, tio: &mut MpcTio, key: AShare) -> Result<bool, MpcError> {
        if self.num_items == 0 {
            return Ok(false);
        }
        let player = tio.player();
        let ttl = avl_ttl(self.num_items);
        let mut ptrs = Vec::with_capacity(ttl);
        let mut nodes = Vec::with_capacity(ttl);
        let mut pts = Vec::with_capacity(ttl);
        let mut dirs = Vec::with_capacity(ttl);
        let mut rets = Vec::with_capacity(ttl);
        let mut f_splice = Vec::with_capacity(ttl);
        let mut f_two = Vec::with_capacity(ttl);
        let mut f_succ = Vec::with_capacity(ttl);

        let mut cur = self.root;
        let mut found = BShare(false);
        let mut succ_mode = BShare(false);
        for _ in 0..ttl {
            let n = self.oram.read(tio, cur)?;
            let p = AvlPointers::unpack(n.pointers);
            let cur_null = mpc_is_zero(tio, cur)?;
            let l_null = mpc_is_zero(tio, p.left)?;
            let r_null = mpc_is_zero(tio, p.right)?;
            let (_, eq, gt) = mpc_compare(tio, key - n.key)?;

            let hit = mpc_and(tio, eq, cur_null.not(player))?;
            let f_found = mpc_and(tio, found.not(player), hit)?;
            let both = mpc_and(tio, l_null.not(player), r_null.not(player))?;
            let f_2c = mpc_and(tio, f_found, both)?;
            let f_s = mpc_and(tio, succ_mode, l_null)?;
            // Splice out the found node itself unless it has two children, then its successor
            let f_sp = f_found ^ f_2c ^ f_s;
            // The successor is the leftmost node of the right subtree
            let dir = mpc_and(tio, gt, succ_mode.not(player))? ^ f_2c;
            let ret = mpc_select(tio, l_null, p.left, p.right)?;
            let next = child(tio, &p, dir)?;
            succ_mode ^= f_2c ^ f_s;
            found ^= f_found;

            ptrs.push(cur);
            nodes.push(n);
            pts.push(p);
            dirs.push(dir);
            rets.push(ret);
            f_splice.push(f_sp);
            f_two.push(f_2c);
            f_succ.push(f_s);
            cur = next;
        }

        // Move the successor's key and value into the node with two children
        let keys: Vec<AShare> = nodes.iter().map(|n| n.key).collect();
        let flags: Vec<BShare> = f_succ.iter().chain(&f_two).copied().collect();
        let moved = mpc_flagmult_vec(tio, &flags, &[&keys[..], &keys[..]].concat())?;
        let (succ_keys, d_keys) = moved.split_at(ttl);
        let key_delta = succ_keys.iter().fold(AShare(0), |acc, k| acc + *k)
            - d_keys.iter().fold(AShare(0), |acc, k| acc + *k);

        let values: Vec<Value> = nodes.iter().map(|n| n.value.0).collect();
        let addrs: Vec<Value> = ptrs.iter().map(|p: &XShare| p.0).collect();
        let flags: Vec<BShare> = [&f_succ[..], &f_two[..], &f_two[..], &f_splice[..]].concat();
        let words = [&values[..], &values[..], &addrs[..], &addrs[..]].concat();
        let picked = mpc_select_mult(tio, &flags, &words)?;
        let xor_chunk = |i: usize| {
            picked[i * ttl..(i + 1) * ttl]
                .iter()
                .fold(0, |acc: Value, w| acc ^ w)
        };
        let value_delta = xor_chunk(0) ^ xor_chunk(1);
        let two_ptr = XShare(xor_chunk(2));
        let freed = XShare(xor_chunk(3));
        let moved = Node {
            key: key_delta,
            pointers: XShare(0),
            value: XShare(value_delta),
        };
        self.oram.update(tio, two_ptr, &moved)?;

        for l in 0..ttl {
            self.relink_parent(tio, &mut pts, &dirs, l, f_splice[l], rets[l])?;
        }

        let mut upd_below = BShare(false);
        for l in (0..ttl.saturating_sub(1)).rev() {
            let upd = f_splice[l + 1] ^ upd_below;
            let c = dirs[l];
            let (bal_l, bal_r, shrank, imb) = update_balance_del(tio, &pts[l], upd, c)?;
            pts[l].bal_l = bal_l;
            pts[l].bal_r = bal_r;

            // The sibling subtree is now the heavy one
            let h = c.not(player);
            let s_ptr = child(tio, &pts[l], h)?;
            let s_node = self.oram.read(tio, s_ptr)?;
            let mut s = AvlPointers::unpack(s_node.pointers);
            let g_ptr = child(tio, &s, c)?;
            let g_node = self.oram.read(tio, g_ptr)?;
            let mut g = AvlPointers::unpack(g_node.pointers);

            let s_heavy_c = mpc_select_bit(tio, c, s.bal_l, s.bal_r)?;
            let s_balanced = (s.bal_l ^ s.bal_r).not(player);
            let f_d = mpc_and(tio, imb, s_heavy_c)?;
            let f_s = imb ^ f_d;
            let single_balanced = mpc_and(tio, f_s, s_balanced)?;
            let mut x = pts[l];
            let newroot = rotate(
                tio,
                &mut x,
                ptrs[l],
                &mut s,
                s_ptr,
                &mut g,
                g_ptr,
                h,
                f_s,
                f_d,
                single_balanced,
            )?;
            pts[l] = x;
            self.relink_parent(tio, &mut pts, &dirs, l, imb, newroot)?;
            self.write_pointers(tio, s_ptr, s_node.pointers, &s)?;
            self.write_pointers(tio, g_ptr, g_node.pointers, &g)?;

            // A single rotation with a balanced sibling keeps the height
            upd_below = shrank ^ imb ^ single_balanced;
        }

        for l in 0..ttl {
            self.write_pointers(tio, ptrs[l], nodes[l].pointers, &pts[l])?;
        }

        let found = mpc_reveal_bit(tio, found)?;
        if found {
            self.empty_locations.push(freed);
            self.num_items -= 1;
        }
        log::debug!("P{} deleted: {}, {} items", player, found, self.num_items);
        Ok(found)
    }

    /// Find a node with the given key.
    ///
    /// Returns whether one was found, which is revealed to all parties, and shares of the node
    /// (zero if not found).
    pub fn lookup(&mut self, tio: &mut MpcTio, key: AShare) -> Result<(bool, Node), MpcError> {
        if self.num_items == 0 {
            return Ok((false, Node::default()));
        }
        let player = tio.player();
        let ttl = avl_ttl(self.num_items);
        let mut cur = self.root;
        let mut found = BShare(false);
        let mut out = Node::default();
        for _ in 0..ttl {
            let n = self.oram.read(tio, cur)?;
            let p = AvlPointers::unpack(n.pointers);
            let cur_null = mpc_is_zero(tio, cur)?;
            let (_, eq, gt) = mpc_compare(tio, key - n.key)?;
            let hit = mpc_and(tio, eq, cur_null.not(player))?;
            let f = mpc_and(tio, hit, found.not(player))?;
            out.key = mpc_select_as(tio, f, out.key, n.key)?;
            out.pointers = mpc_select(tio, f, out.pointers, n.pointers)?;
            out.value = mpc_select(tio, f, out.value, n.value)?;
            found ^= f;
            cur = child(tio, &p, gt)?;
        }
        Ok((mpc_reveal_bit(tio, found)?, out))
    }

    /// The root pointer and the plaintext memory at P0, `None` elsewhere.
    fn open_at_p0(&self, tio: &mut MpcTio) -> Result<Option<(Address, Vec<Node>)>, MpcError> {
        let root = match tio.player() {
            0 => Some((self.root ^ tio.recv_p1::<XShare>()?).0),
            1 => {
                tio.queue_p0(&self.root)?;
                tio.send()?;
                None
            }
            _ => None,
        };
        let mem = self.oram.reconstruct(tio)?;
        Ok(root.zip(mem))
    }

    /// Check the tree shape at P0, `None` elsewhere.
    /// Only for testing and debugging.
    pub fn check_avl(&self, tio: &mut MpcTio) -> Result<Option<AvlCheck>, MpcError> {
        let Some((root, mem)) = self.open_at_p0(tio)? else {
            return Ok(None);
        };
        let mut check = AvlCheck {
            ordered: true,
            balanced: true,
            ..AvlCheck::default()
        };
        let mut keys = Vec::new();
        check.height = check_subtree(&mem, root, mem.len(), &mut check, &mut keys);
        check.ordered = keys.windows(2).all(|w| w[0] <= w[1]);
        Ok(Some(check))
    }

    /// In-order (key, value) pairs at P0, `None` elsewhere.
    pub fn inorder(&self, tio: &mut MpcTio) -> Result<Option<Vec<(Value, Value)>>, MpcError> {
        let Some((root, mem)) = self.open_at_p0(tio)? else {
            return Ok(None);
        };
        let mut out = Vec::new();
        inorder_subtree(&mem, root, mem.len(), &mut out);
        Ok(Some(out))
    }

    /// The tree drawn sideways at P0, `None` elsewhere.
    pub fn pretty_print(&self, tio: &mut MpcTio) -> Result<Option<String>, MpcError> {
        let Some((root, mem)) = self.open_at_p0(tio)? else {
            return Ok(None);
        };
        let mut out = String::new();
        print_subtree(&mem, root, 0, mem.len(), &mut out);
        Ok(Some(out))
    }

    /// Every memory slot at P0, `None` elsewhere.
    pub fn print_oram(&self, tio: &mut MpcTio) -> Result<Option<String>, MpcError> {
        let Some((root, mem)) = self.open_at_p0(tio)? else {
            return Ok(None);
        };
        let mut out = format!("root: {root}\n");
        for (i, n) in mem.iter().enumerate() {
            let p = AvlPointers::unpack(n.pointers);
            let _ = writeln!(
                out,
                "{i}: key {} value {:#x} left {} right {} bal {}{}",
                n.key.0 as i64, n.value.0, p.left.0, p.right.0, p.bal_l.0 as u8, p.bal_r.0 as u8
            );
        }
        Ok(Some(out))
    }
}

/// Height of the subtree, also recording keys in order.
/// `fuel` bounds the recursion on a corrupted memory.
fn check_subtree(
    mem: &[Node],
    idx: Address,
    fuel: usize,
    check: &mut AvlCheck,
    keys: &mut Vec<i64>,
) -> usize {
    if idx == 0 || fuel == 0 || idx as usize >= mem.len() {
        return 0;
    }
    let n = &mem[idx as usize];
    let p = AvlPointers::unpack(n.pointers);
    let hl = check_subtree(mem, p.left.0, fuel - 1, check, keys);
    keys.push(n.key.0 as i64);
    let hr = check_subtree(mem, p.right.0, fuel - 1, check, keys);
    check.num_nodes += 1;
    if hl.abs_diff(hr) > 1 || p.bal_l.0 != (hl > hr) || p.bal_r.0 != (hr > hl) {
        check.balanced = false;
    }
    1 + hl.max(hr)
}

fn inorder_subtree(mem: &[Node], idx: Address, fuel: usize, out: &mut Vec<(Value, Value)>) {
    if idx == 0 || fuel == 0 || idx as usize >= mem.len() {
        return;
    }
    let n = &mem[idx as usize];
    let p = AvlPointers::unpack(n.pointers);
    inorder_subtree(mem, p.left.0, fuel - 1, out);
    out.push((n.key.0, n.value.0));
    inorder_subtree(mem, p.right.0, fuel - 1, out);
}

fn print_subtree(mem: &[Node], idx: Address, indent: usize, fuel: usize, out: &mut String) {
    if idx == 0 || fuel == 0 || idx as usize >= mem.len() {
        return;
    }
    let n = &mem[idx as usize];
    let p = AvlPointers::unpack(n.pointers);
    print_subtree(mem, p.right.0, indent + 1, fuel - 1, out);
    let bal = match (p.bal_l.0, p.bal_r.0) {
        (false, false) => "",
        (true, false) => " <",
        (false, true) => " >",
        (true, true) => " !",
    };
    let _ = writeln!(out, "{:width$}{}{} @{}", "", n.key.0 as i64, bal, idx, width = 4 * indent);
    print_subtree(mem, p.left.0, indent + 1, fuel - 1, out);
}
