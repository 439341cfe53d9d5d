// Copyright (C) myl7
// SPDX-License-Identifier: Apache-2.0

//! Shared helpers for the unit tests.

use std::sync::Once;

use rand::Rng;
use simplelog::{Config, WriteLogger};

use crate::mpcio::{run_local, MpcTio};
use crate::share::{AShare, BShare, XShare};
use crate::{MpcError, Value};

static INIT: Once = Once::new();

// For use in manual testing and inspection.
pub(crate) fn init_logger() {
    INIT.call_once(|| {
        WriteLogger::init(log::LevelFilter::Info, Config::default(), std::io::stdout()).unwrap()
    })
}

/// [`run_local`] that panics on protocol errors.
pub(crate) fn run_parties<F, R>(f: F) -> [R; 3]
where
    F: Fn(&mut MpcTio) -> Result<R, MpcError> + Sync,
    R: Send,
{
    init_logger();
    run_local(f).unwrap()
}

/// Random sharings of `x`, indexed by party.
/// P2 gets zero shares.
pub(crate) fn share_a<R: Rng>(rng: &mut R, x: Value) -> [AShare; 3] {
    let x0 = AShare::random(rng);
    [x0, AShare(x) - x0, AShare(0)]
}

pub(crate) fn share_x<R: Rng>(rng: &mut R, x: Value) -> [XShare; 3] {
    let x0 = XShare::random(rng);
    [x0, XShare(x) ^ x0, XShare(0)]
}

pub(crate) fn share_b<R: Rng>(rng: &mut R, b: bool) -> [BShare; 3] {
    let b0 = BShare::random(rng);
    [b0, BShare(b) ^ b0, BShare(false)]
}

pub(crate) fn open_a(shares: &[AShare; 3]) -> Value {
    (shares[0] + shares[1]).0
}

pub(crate) fn open_x(shares: &[XShare; 3]) -> Value {
    (shares[0] ^ shares[1]).0
}

pub(crate) fn open_b(shares: &[BShare; 3]) -> bool {
    (shares[0] ^ shares[1]).0
}
