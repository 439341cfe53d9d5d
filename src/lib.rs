// Copyright (C) myl7
// SPDX-License-Identifier: Apache-2.0

//! Three-party oblivious data structures built from distributed point functions (DPFs).
//!
//! Two computational parties P0 and P1 hold secret shares of everything.
//! The helper party P2 never learns any share and only deals correlated randomness:
//! multiplication triples, select triples, and comparison DPFs.
//!
//! - [`cdpf`] turns a DPF with a hidden target into a constant-round `$<$`/`$=$`/`$>$` comparison.
//! - [`rdpf`] and [`eval`] turn jointly generated DPFs into secret-shared unit vectors for oblivious memory access.
//! - [`avl`] is an oblivious AVL tree on top of an [`oram`] flat view of nodes.

use static_assertions::const_assert;
use thiserror::Error;

pub mod avl;
pub mod cdpf;
pub mod dpf;
pub mod eval;
pub mod mpcio;
pub mod mpcops;
pub mod oram;
pub mod owcf;
pub mod preproc;
pub mod prg;
pub mod rdpf;
pub mod share;
pub mod utils;
pub mod wire;

#[cfg(test)]
pub(crate) mod test_utils;

/// The value width.
/// Every share register, key, and pointer word has this type.
pub type Value = u64;
/// Bit length of [`Value`].
pub const VALUE_BITS: u32 = Value::BITS;

/// Plaintext memory address, i.e., an index into a flat view.
pub type Address = u64;
/// Max supported RDPF depth.
/// Also the upper bound of the RDPF preprocessing tags.
pub const ADDRESS_MAX_BITS: u8 = 48;

/// Bit length of the leaf blocks subsumed by the last CDPF level.
pub const CDPF_LEAF_BITS: u32 = 7;
/// Depth of a CDPF.
pub const CDPF_DEPTH: usize = (VALUE_BITS - CDPF_LEAF_BITS) as usize;

const_assert!(ADDRESS_MAX_BITS as u32 <= VALUE_BITS);
const_assert!(2 * VALUE_BITS as usize <= 8 * dpf::NODE_BLEN);

/// Party number.
/// 0 and 1 are the computational parties, 2 is the helper party.
pub type Player = u8;
/// The helper party.
pub const SERVER: Player = 2;

#[derive(Error, Debug)]
pub enum MpcError {
    #[error("Invalid player number {0}")]
    InvalidPlayer(Player),
    #[error("DPF depth {0} is out of the supported range")]
    DepthOutOfRange(u8),
    #[error("Connection to party {0} is closed")]
    Disconnected(Player),
    #[error("Message is shorter than expected")]
    Truncated,
    #[error("Unknown preprocessing tag {0:#04x}")]
    BadTag(u8),
    #[error("Invalid preprocessing request {0:?}")]
    BadRequest(String),
}
