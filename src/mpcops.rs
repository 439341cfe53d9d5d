// Copyright (C) myl7
// SPDX-License-Identifier: Apache-2.0

//! Two-party operations on shares with help from P2.
//!
//! All three parties call the same function with the same public arguments.
//! P0 and P1 pass their shares and get shares of the result.
//! P2 passes placeholder shares of the right count, deals the correlated randomness, and gets zero shares.
//! The batched `*_vec` forms cost one round however many items they process.

use crate::mpcio::MpcTio;
use crate::preproc::SelectValue;
use crate::share::{AShare, BShare, XShare};
use crate::wire::WireFormat;
use crate::{MpcError, Value};

/// Shares of `$f_i \cdot d_i$` for secret bits `$f_i$` and XOR-shared payloads `$d_i$`.
pub fn mpc_select_mult<V: SelectValue>(
    tio: &mut MpcTio,
    f: &[BShare],
    d: &[V],
) -> Result<Vec<V>, MpcError> {
    assert_eq!(f.len(), d.len());
    let triples = (0..f.len())
        .map(|_| tio.select_triple::<V>())
        .collect::<Result<Vec<_>, _>>()?;
    if tio.is_server() {
        return Ok(vec![V::default(); f.len()]);
    }

    for ((fi, di), t) in f.iter().zip(d).zip(&triples) {
        tio.queue_peer(&(fi.0 ^ t.x))?;
        tio.queue_peer(&(*di ^ t.y))?;
    }
    tio.send()?;

    let mut out = Vec::with_capacity(f.len());
    for ((fi, di), t) in f.iter().zip(d).zip(&triples) {
        let peer_f: bool = tio.recv_peer()?;
        let peer_d: V = tio.recv_peer()?;
        out.push(di.times(fi.0) ^ peer_d.times(fi.0) ^ t.y.times(peer_f) ^ t.z);
    }
    Ok(out)
}

pub fn mpc_and(tio: &mut MpcTio, a: BShare, b: BShare) -> Result<BShare, MpcError> {
    let res = mpc_select_mult(tio, &[a], &[b.0])?[0];
    Ok(BShare(res))
}

pub fn mpc_or(tio: &mut MpcTio, a: BShare, b: BShare) -> Result<BShare, MpcError> {
    Ok(a ^ b ^ mpc_and(tio, a, b)?)
}

/// `f ? y : x` on XOR-shared words.
pub fn mpc_select(tio: &mut MpcTio, f: BShare, x: XShare, y: XShare) -> Result<XShare, MpcError> {
    let d = mpc_select_mult(tio, &[f], &[(x ^ y).0])?[0];
    Ok(x ^ XShare(d))
}

/// `f ? y : x` on bits.
pub fn mpc_select_bit(
    tio: &mut MpcTio,
    f: BShare,
    x: BShare,
    y: BShare,
) -> Result<BShare, MpcError> {
    Ok(x ^ mpc_and(tio, f, x ^ y)?)
}

/// Beaver multiplication, `$z_i = x_i y_i$`.
pub fn mpc_mul_vec(
    tio: &mut MpcTio,
    x: &[AShare],
    y: &[AShare],
) -> Result<Vec<AShare>, MpcError> {
    assert_eq!(x.len(), y.len());
    let triples = (0..x.len())
        .map(|_| tio.triple())
        .collect::<Result<Vec<_>, _>>()?;
    if tio.is_server() {
        return Ok(vec![AShare::default(); x.len()]);
    }

    for ((xi, yi), t) in x.iter().zip(y).zip(&triples) {
        tio.queue_peer(&xi.0.wrapping_add(t.x))?;
        tio.queue_peer(&yi.0.wrapping_add(t.y))?;
    }
    tio.send()?;

    let mut out = Vec::with_capacity(x.len());
    for ((xi, yi), t) in x.iter().zip(y).zip(&triples) {
        let peer_x: Value = tio.recv_peer()?;
        let peer_y: Value = tio.recv_peer()?;
        let z = xi
            .0
            .wrapping_mul(yi.0)
            .wrapping_add(xi.0.wrapping_mul(peer_y))
            .wrapping_sub(peer_x.wrapping_mul(t.y))
            .wrapping_add(t.z);
        out.push(AShare(z));
    }
    Ok(out)
}

pub fn mpc_mul(tio: &mut MpcTio, x: AShare, y: AShare) -> Result<AShare, MpcError> {
    Ok(mpc_mul_vec(tio, &[x], &[y])?[0])
}

/// Additive shares of `$a_i b_i$` where P0 knows every `$a_i$` and P1 knows every `$b_i$` in plaintext.
pub fn mpc_valuemul_vec(tio: &mut MpcTio, inputs: &[Value]) -> Result<Vec<AShare>, MpcError> {
    let triples = (0..inputs.len())
        .map(|_| tio.halftriple())
        .collect::<Result<Vec<_>, _>>()?;
    if tio.is_server() {
        return Ok(vec![AShare::default(); inputs.len()]);
    }

    for (v, t) in inputs.iter().zip(&triples) {
        tio.queue_peer(&v.wrapping_add(t.x))?;
    }
    tio.send()?;

    let player = tio.player();
    let mut out = Vec::with_capacity(inputs.len());
    for (v, t) in inputs.iter().zip(&triples) {
        let peer: Value = tio.recv_peer()?;
        let z = if player == 0 {
            v.wrapping_mul(peer).wrapping_add(t.z)
        } else {
            t.z.wrapping_sub(t.x.wrapping_mul(peer))
        };
        out.push(AShare(z));
    }
    Ok(out)
}

pub fn mpc_valuemul(tio: &mut MpcTio, input: Value) -> Result<AShare, MpcError> {
    Ok(mpc_valuemul_vec(tio, &[input])?[0])
}

/// Convert XOR shares of values below `$2^{nbits}$` into additive shares.
///
/// Uses `$x_0 \oplus x_1 = x_0 + x_1 - 2 \sum_k 2^k x_{0,k} x_{1,k}$`
/// with all bit products in one batch.
pub fn mpc_xs_to_as_vec(
    tio: &mut MpcTio,
    x: &[XShare],
    nbits: u32,
) -> Result<Vec<AShare>, MpcError> {
    let nbits = nbits.clamp(1, Value::BITS);
    let mask = Value::MAX >> (Value::BITS - nbits);
    let inputs: Vec<Value> = x
        .iter()
        .flat_map(|xi| (0..nbits).map(move |k| (xi.0 & mask) >> k & 1))
        .collect();
    let prods = mpc_valuemul_vec(tio, &inputs)?;
    if tio.is_server() {
        return Ok(vec![AShare::default(); x.len()]);
    }
    Ok(x.iter()
        .zip(prods.chunks(nbits as usize))
        .map(|(xi, bits)| {
            let carries = bits
                .iter()
                .enumerate()
                .fold(AShare(0), |acc, (k, s)| acc + *s * (2 << k));
            AShare(xi.0 & mask) - carries
        })
        .collect())
}

pub fn mpc_xs_to_as(tio: &mut MpcTio, x: XShare, nbits: u32) -> Result<AShare, MpcError> {
    Ok(mpc_xs_to_as_vec(tio, &[x], nbits)?[0])
}

/// Shares of `$f_i \cdot y_i$` for secret bits `$f_i$` and additively shared `$y_i$`.
pub fn mpc_flagmult_vec(
    tio: &mut MpcTio,
    f: &[BShare],
    y: &[AShare],
) -> Result<Vec<AShare>, MpcError> {
    let f: Vec<XShare> = f.iter().map(|b| XShare(b.0 as Value)).collect();
    let f_as = mpc_xs_to_as_vec(tio, &f, 1)?;
    mpc_mul_vec(tio, &f_as, y)
}

pub fn mpc_flagmult(tio: &mut MpcTio, f: BShare, y: AShare) -> Result<AShare, MpcError> {
    Ok(mpc_flagmult_vec(tio, &[f], &[y])?[0])
}

/// `f ? y : x` on additively shared words.
pub fn mpc_select_as(
    tio: &mut MpcTio,
    f: BShare,
    x: AShare,
    y: AShare,
) -> Result<AShare, MpcError> {
    Ok(x + mpc_flagmult(tio, f, y - x)?)
}

/// Shares of `$(x < 0, x = 0, x > 0)$` with `x` read as a signed 64-bit integer.
///
/// Compare `a` and `b` by passing `a - b`.
pub fn mpc_compare(tio: &mut MpcTio, x: AShare) -> Result<(BShare, BShare, BShare), MpcError> {
    let cdpf = tio.cdpf()?;
    if tio.is_server() {
        return Ok(Default::default());
    }
    cdpf.compare(tio, x)
}

pub fn mpc_is_zero(tio: &mut MpcTio, x: XShare) -> Result<BShare, MpcError> {
    let cdpf = tio.cdpf()?;
    if tio.is_server() {
        return Ok(BShare::default());
    }
    cdpf.is_zero(tio, x)
}

fn reveal<T: WireFormat + Copy>(
    tio: &mut MpcTio,
    share: T,
    combine: fn(T, T) -> T,
) -> Result<T, MpcError> {
    if tio.is_server() {
        let s0: T = tio.recv_p0()?;
        let s1: T = tio.recv_p1()?;
        return Ok(combine(s0, s1));
    }
    tio.queue_peer(&share)?;
    tio.queue_server(&share)?;
    tio.send()?;
    let peer: T = tio.recv_peer()?;
    Ok(combine(share, peer))
}

/// Open a shared value to all three parties.
pub fn mpc_reveal_as(tio: &mut MpcTio, x: AShare) -> Result<Value, MpcError> {
    Ok(reveal(tio, x, |a, b| a + b)?.0)
}

pub fn mpc_reveal_xs(tio: &mut MpcTio, x: XShare) -> Result<Value, MpcError> {
    Ok(reveal(tio, x, |a, b| a ^ b)?.0)
}

pub fn mpc_reveal_bit(tio: &mut MpcTio, b: BShare) -> Result<bool, MpcError> {
    Ok(reveal(tio, b, |a, b| a ^ b)?.0)
}

#[cfg(test)]
mod tests {
    use rand::prelude::*;

    use super::*;
    use crate::test_utils::{open_a, open_b, open_x, run_parties, share_a, share_b, share_x};

    #[test]
    fn test_and_or_select() {
        let mut rng = StdRng::seed_from_u64(0);
        for (a, b) in [(false, false), (false, true), (true, false), (true, true)] {
            let sa = share_b(&mut rng, a);
            let sb = share_b(&mut rng, b);
            let x = share_x(&mut rng, 0x1111);
            let y = share_x(&mut rng, 0x2222);
            let res = run_parties(|tio| {
                let p = tio.player() as usize;
                Ok((
                    mpc_and(tio, sa[p], sb[p])?,
                    mpc_or(tio, sa[p], sb[p])?,
                    mpc_select(tio, sa[p], x[p], y[p])?,
                    mpc_select_bit(tio, sa[p], sb[p], sb[p].not(p as u8))?,
                ))
            });
            assert_eq!(open_b(&res.map(|r| r.0)), a & b);
            assert_eq!(open_b(&res.map(|r| r.1)), a | b);
            assert_eq!(open_x(&res.map(|r| r.2)), if a { 0x2222 } else { 0x1111 });
            assert_eq!(open_b(&res.map(|r| r.3)), a ^ b);
        }
    }

    #[test]
    fn test_mul_and_valuemul() {
        let mut rng = StdRng::seed_from_u64(1);
        let (x, y): (Value, Value) = rng.gen();
        let (a, b): (Value, Value) = rng.gen();
        let sx = share_a(&mut rng, x);
        let sy = share_a(&mut rng, y);
        let res = run_parties(|tio| {
            let p = tio.player() as usize;
            let input = [a, b, 0][p];
            Ok((mpc_mul(tio, sx[p], sy[p])?, mpc_valuemul(tio, input)?))
        });
        assert_eq!(open_a(&res.map(|r| r.0)), x.wrapping_mul(y));
        assert_eq!(open_a(&res.map(|r| r.1)), a.wrapping_mul(b));
    }

    #[test]
    fn test_xs_to_as() {
        arbtest::arbtest(|u| {
            let nbits: u32 = u.int_in_range(1..=64)?;
            let x: Value = u.arbitrary::<Value>()? & (Value::MAX >> (64 - nbits));
            let mut rng = StdRng::seed_from_u64(u.arbitrary()?);
            let sx = share_x(&mut rng, x);
            let res = run_parties(|tio| mpc_xs_to_as(tio, sx[tio.player() as usize], nbits));
            assert_eq!(open_a(&res), x);
            Ok(())
        })
        .budget_ms(2_000);
    }

    #[test]
    fn test_flagmult_and_select_as() {
        let mut rng = StdRng::seed_from_u64(2);
        for f in [false, true] {
            let sf = share_b(&mut rng, f);
            let sx = share_a(&mut rng, 100);
            let sy = share_a(&mut rng, (-7i64) as Value);
            let res = run_parties(|tio| {
                let p = tio.player() as usize;
                Ok((
                    mpc_flagmult(tio, sf[p], sy[p])?,
                    mpc_select_as(tio, sf[p], sx[p], sy[p])?,
                ))
            });
            assert_eq!(open_a(&res.map(|r| r.0)), if f { (-7i64) as Value } else { 0 });
            assert_eq!(open_a(&res.map(|r| r.1)), if f { (-7i64) as Value } else { 100 });
        }
    }

    #[test]
    fn test_compare_signs() {
        let mut rng = StdRng::seed_from_u64(3);
        let cases: [i64; 8] = [0, 1, -1, 42, -42, i64::MAX, i64::MIN, 1 << 40];
        for x in cases {
            let sx = share_a(&mut rng, x as Value);
            let res = run_parties(|tio| mpc_compare(tio, sx[tio.player() as usize]));
            assert_eq!(open_b(&res.map(|r| r.0)), x < 0, "lt of {x}");
            assert_eq!(open_b(&res.map(|r| r.1)), x == 0, "eq of {x}");
            assert_eq!(open_b(&res.map(|r| r.2)), x > 0, "gt of {x}");
        }
    }

    #[test]
    fn test_is_zero() {
        let mut rng = StdRng::seed_from_u64(4);
        for x in [0, 1, 0x80, 0xdead_beef, Value::MAX] {
            let sx = share_x(&mut rng, x);
            let res = run_parties(|tio| mpc_is_zero(tio, sx[tio.player() as usize]));
            assert_eq!(open_b(&res), x == 0);
        }
    }

    #[test]
    fn test_reveal_reaches_all_parties() {
        let mut rng = StdRng::seed_from_u64(5);
        let sx = share_a(&mut rng, 1234);
        let sb = share_b(&mut rng, true);
        let res = run_parties(|tio| {
            let p = tio.player() as usize;
            Ok((mpc_reveal_as(tio, sx[p])?, mpc_reveal_bit(tio, sb[p])?))
        });
        assert_eq!(res, [(1234, true); 3]);
    }
}
