// Copyright (C) myl7
// SPDX-License-Identifier: Apache-2.0

use criterion::{criterion_group, criterion_main, Criterion};
use rand::prelude::*;

use oblivds::cdpf::Cdpf;
use oblivds::Value;

pub fn bench_gen(c: &mut Criterion) {
    let mut rng = thread_rng();
    let target: Value = rng.gen();
    let mut aes_ops = 0;

    c.bench_function("cdpf gen", |b| {
        b.iter(|| {
            Cdpf::generate(target, &mut rng, &mut aes_ops);
        })
    });
}

pub fn bench_compare(c: &mut Criterion) {
    let mut rng = thread_rng();
    let mut aes_ops = 0;
    let (cdpf, _) = Cdpf::generate(rng.gen(), &mut rng, &mut aes_ops);
    let s: Value = rng.gen();

    c.bench_function("cdpf compare", |b| {
        b.iter(|| {
            cdpf.compare_public(s, &mut aes_ops);
        })
    });
}

criterion_group!(benches, bench_gen, bench_compare);
criterion_main!(benches);
