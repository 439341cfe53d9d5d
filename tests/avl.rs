// Copyright (C) myl7
// SPDX-License-Identifier: Apache-2.0

use std::sync::Once;

use rand::prelude::*;
use simplelog::{Config, WriteLogger};

use oblivds::avl::{avl_ttl, Avl, AvlCheck, Node};
use oblivds::mpcio::run_local;
use oblivds::share::AShare;
use oblivds::Value;

static INIT: Once = Once::new();

fn init_logger() {
    INIT.call_once(|| {
        WriteLogger::init(log::LevelFilter::Info, Config::default(), std::io::stdout()).unwrap()
    })
}

#[test]
fn test_avl_insert_lookup_delete() {
    init_logger();
    let keys: [Value; 7] = [5, 3, 8, 1, 4, 7, 9];
    let [r0, r1, r2] = run_local(|tio| {
        let player = tio.player();
        let mut avl = Avl::new(16)?;
        for key in keys {
            avl.insert(tio, Node::constant(player, key, key * 10))?;
        }
        let shape = avl.check_avl(tio)?;
        if let Some(tree) = avl.pretty_print(tio)? {
            log::info!("after inserts:\n{tree}");
        }

        let (hit, node) = avl.lookup(tio, AShare::constant(player, 4))?;
        let deleted = avl.delete(tio, AShare::constant(player, 3))?;
        let (gone, _) = avl.lookup(tio, AShare::constant(player, 3))?;
        let missing = avl.delete(tio, AShare::constant(player, 6))?;
        let after = avl.check_avl(tio)?;
        let inorder = avl.inorder(tio)?;
        Ok((hit, node, deleted, gone, missing, shape, after, inorder, avl.num_items()))
    })
    .unwrap();

    for r in [&r0, &r1, &r2] {
        // Revealed to every party
        assert!(r.0);
        assert!(r.2);
        assert!(!r.3);
        assert!(!r.4);
        assert_eq!(r.8, 6);
    }

    let node = Node::open(&r0.1, &r1.1);
    assert_eq!((node.key.0, node.value.0), (4, 40));

    let shape = r0.5.unwrap();
    assert!(shape.ordered && shape.balanced);
    assert_eq!(shape.num_nodes, 7);
    assert_eq!(shape.height, 3);

    let after = r0.6.unwrap();
    assert!(after.ordered && after.balanced);
    assert_eq!(after.num_nodes, 6);
    let keys: Vec<Value> = r0.7.unwrap().iter().map(|(k, _)| *k).collect();
    assert_eq!(keys, vec![1, 4, 5, 7, 8, 9]);
    assert!(r1.5.is_none() && r2.7.is_none());
}

#[test]
fn test_avl_signed_keys_stay_ordered() {
    init_logger();
    // Keys compare by the sign of their wrapping difference, so keep them within half the range
    let keys: Vec<i64> = vec![0, -5, 12, -100, 7, -(1 << 40), 1 << 40, -1];
    let [r0, _, _] = run_local(|tio| {
        let player = tio.player();
        let mut avl = Avl::new(keys.len())?.with_threads(2);
        for (i, key) in keys.iter().enumerate() {
            avl.insert(tio, Node::constant(player, *key as Value, i as Value))?;
        }
        Ok((avl.check_avl(tio)?, avl.inorder(tio)?))
    })
    .unwrap();
    let (check, inorder) = r0;
    let check = check.unwrap();
    assert!(check.ordered && check.balanced, "{check:?}");
    let mut sorted = keys.clone();
    sorted.sort();
    let got: Vec<i64> = inorder.unwrap().iter().map(|(k, _)| *k as i64).collect();
    assert_eq!(got, sorted);
}

#[derive(Clone, Copy, Debug)]
enum Op {
    Insert(Value),
    Delete(Value),
    Lookup(Value),
}

fn value_of(key: Value) -> Value {
    key * 7 + 1
}

/// What P0 sees after one operation.
struct Step {
    found: Option<bool>,
    node: Node,
    check: Option<AvlCheck>,
    inorder: Option<Vec<(Value, Value)>>,
}

fn random_ops(seed: u64, len: usize, max_size: usize) -> Vec<Op> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut size = 0;
    (0..len)
        .map(|_| {
            // Few distinct keys so deletes and lookups often hit, and duplicates happen
            let key = rng.gen_range(1..=20);
            match rng.gen_range(0..4) {
                0 | 1 if size < max_size => {
                    size += 1;
                    Op::Insert(key)
                }
                2 => Op::Lookup(key),
                _ => Op::Delete(key),
            }
        })
        .collect()
}

#[test]
fn test_avl_random_workloads_match_multiset() {
    init_logger();
    let max_size = 12;
    for seed in 0..2 {
        let ops = random_ops(seed, 30, max_size);
        let [r0, r1, _] = run_local(|tio| {
            let player = tio.player();
            let mut avl = Avl::new(max_size)?;
            let mut steps = Vec::with_capacity(ops.len());
            for op in &ops {
                let (found, node) = match *op {
                    Op::Insert(k) => {
                        avl.insert(tio, Node::constant(player, k, value_of(k)))?;
                        (None, Node::default())
                    }
                    Op::Delete(k) => {
                        let found = avl.delete(tio, AShare::constant(player, k))?;
                        (Some(found), Node::default())
                    }
                    Op::Lookup(k) => {
                        let (found, node) = avl.lookup(tio, AShare::constant(player, k))?;
                        (Some(found), node)
                    }
                };
                steps.push(Step {
                    found,
                    node,
                    check: avl.check_avl(tio)?,
                    inorder: avl.inorder(tio)?,
                });
            }
            Ok(steps)
        })
        .unwrap();

        let mut model: Vec<Value> = Vec::new();
        for (i, op) in ops.iter().enumerate() {
            let (s0, s1) = (&r0[i], &r1[i]);
            assert_eq!(s0.found, s1.found, "{op:?}");
            match *op {
                Op::Insert(k) => model.push(k),
                Op::Delete(k) => {
                    let pos = model.iter().position(|m| *m == k);
                    assert_eq!(s0.found, Some(pos.is_some()), "seed {seed} op {i}: {op:?}");
                    if let Some(pos) = pos {
                        model.swap_remove(pos);
                    }
                }
                Op::Lookup(k) => {
                    let hit = model.contains(&k);
                    assert_eq!(s0.found, Some(hit), "seed {seed} op {i}: {op:?}");
                    let node = Node::open(&s0.node, &s1.node);
                    if hit {
                        assert_eq!((node.key.0, node.value.0), (k, value_of(k)));
                    } else {
                        assert_eq!(node, Node::default());
                    }
                }
            }
            model.sort();

            let check = s0.check.unwrap();
            assert!(check.ordered && check.balanced, "seed {seed} op {i}: {check:?}");
            assert_eq!(check.num_nodes, model.len());
            assert!(check.height <= avl_ttl(model.len()));
            let expected: Vec<(Value, Value)> = model.iter().map(|k| (*k, value_of(*k))).collect();
            assert_eq!(s0.inorder.as_ref().unwrap(), &expected, "seed {seed} op {i}: {op:?}");
        }
    }
}
