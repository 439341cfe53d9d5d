// Copyright (C) myl7
// SPDX-License-Identifier: Apache-2.0

use criterion::{criterion_group, criterion_main, Criterion};

use oblivds::eval::{ParallelEval, StreamEval};
use oblivds::mpcio::run_local;
use oblivds::rdpf::{RdpfPair, RdpfTriple};

const DEPTH: u8 = 16;

fn gen_triple(save_expansion: bool) -> RdpfTriple {
    let [r0, _, _] = run_local(|tio| {
        if tio.is_server() {
            RdpfPair::generate(tio, DEPTH, false)?;
            Ok(None)
        } else {
            Ok(Some(RdpfTriple::generate(tio, DEPTH, save_expansion)?))
        }
    })
    .unwrap();
    r0.unwrap()
}

pub fn bench_stream(c: &mut Criterion) {
    let triple = gen_triple(false);
    let rdpf = &triple.dpf[0];

    c.bench_function("rdpf stream eval 2^16", |b| {
        b.iter(|| {
            let eval = StreamEval::new(rdpf, 0, 0, false);
            eval.take(1 << DEPTH).fold(0, |acc, leaf| acc ^ rdpf.unit_bs(&leaf).0 as u8)
        })
    });
}

pub fn bench_parallel(c: &mut Criterion) {
    let triple = gen_triple(true);
    let rdpf = &triple.dpf[0];

    for (name, use_expansion) in [("rdpf parallel eval 2^16", false), ("rdpf expansion 2^16", true)] {
        c.bench_function(name, |b| {
            b.iter(|| {
                let mut eval = ParallelEval::new(rdpf, 0, 0, 1 << DEPTH, 4, use_expansion);
                eval.reduce(
                    0u64,
                    |_, _, leaf| rdpf.unit_as(leaf).0,
                    |acc, v| *acc = acc.wrapping_add(v),
                )
            })
        });
    }
}

criterion_group!(benches, bench_stream, bench_parallel);
criterion_main!(benches);
