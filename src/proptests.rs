use super::*;

use proptest::prelude::*;
use proptest_derive::Arbitrary;

fn validate_pma<K: Ord>(pma: &PackedMemoryArray<K>) {
    let p = match &pma.state {
        State::Buffering(buffer) => {
            assert_eq!(buffer.len(), pma.len, "buffer must hold every key");
            assert!(
                buffer.len() < pma.config.warm_up_size,
                "buffer outlived its warm-up size"
            );
            assert_eq!(pma.capacity(), 0);
            return;
        }
        State::Packed(p) => p,
    };

    let layout = p.layout;
    assert_eq!(p.slots.len(), layout.capacity);
    assert_eq!(p.occupancy.len(), layout.capacity);
    assert_eq!(layout.chunk_size * layout.chunk_count, layout.capacity);
    assert!(layout.chunk_count.is_power_of_two());
    assert_eq!(1usize << layout.level_count, layout.chunk_count);

    for (i, slot) in p.slots.iter().enumerate() {
        assert_eq!(
            slot.is_some(),
            p.occupancy.get(i),
            "slot {i} disagrees with its occupancy bit"
        );
    }
    assert_eq!(p.occupancy.count(), pma.len, "occupied slots must match len");
    assert!(pma.verify_sorted(), "occupied slots must be non-decreasing");

    // The chunk locator assumes no chunk is ever empty.
    for chunk in 0..layout.chunk_count {
        assert_ne!(
            p.occupancy.count_range(layout.chunk_range(chunk)),
            0,
            "chunk {chunk} is empty"
        );
    }

    let mut capacity = pma.config.bootstrap_capacity().unwrap();
    while capacity < layout.capacity {
        capacity *= pma.config.resize_growth;
    }
    assert_eq!(
        capacity, layout.capacity,
        "capacity must be the bootstrap capacity times a power of the growth factor"
    );
}

/// Inserts `key` and checks the step that absorbed it.
fn place_checked(pma: &mut PackedMemoryArray<i32>, key: i32) {
    let before = pma.capacity();
    let placement = pma.place(key).unwrap();
    let config = pma.config;
    let State::Packed(p) = &pma.state else {
        assert_eq!(placement, Placement::Buffered);
        return;
    };

    match placement {
        Placement::Buffered => panic!("key buffered after bootstrap"),
        Placement::Bootstrapped { capacity } => {
            assert_eq!(before, 0);
            assert_eq!(capacity, p.layout.capacity);
            assert_eq!(p.occupancy.count(), config.warm_up_size);
        }
        Placement::Chunk { chunk } => {
            let range = p.layout.chunk_range(chunk);
            assert!(
                p.slots[range].iter().flatten().any(|k| *k == key),
                "key missing from chunk {chunk}"
            );
        }
        Placement::Segment { level, start, end } => {
            assert!(level >= 1 && level <= p.layout.level_count);
            assert_eq!(end - start, p.layout.segment_len(level));
            let density = p.occupancy.count_range(start..end) as f64 / (end - start) as f64;
            let threshold = p.layout.upper_threshold_at(
                level,
                config.upper_density_high,
                config.upper_density_low,
            );
            assert!(
                density <= threshold,
                "level {level} segment {start}..{end} left at {density} > {threshold}"
            );
        }
        Placement::Resized { capacity } => {
            assert_eq!(capacity, before * config.resize_growth);
            assert_eq!(p.layout.capacity, capacity);
        }
    }
}

#[derive(Clone, Debug, Arbitrary)]
enum Op {
    #[proptest(weight = 8)]
    Insert(i16),
    #[proptest(weight = 2)]
    InsertRun {
        start: i16,
        #[proptest(strategy = "1usize..48")]
        len: usize,
        descending: bool,
    },
    #[proptest(weight = 1)]
    Snapshot,
}

fn config_strategy() -> impl Strategy<Value = PmaConfig> {
    (
        2u32..=7,
        0u32..=3,
        prop_oneof![Just((2usize, 0.5f64)), Just((2, 0.75)), Just((4, 1.0))],
        0.0f64..=0.25,
    )
        .prop_filter_map(
            "configuration must validate",
            |(warm_exp, boot_exp, (resize, low), slack)| {
                let config = PmaConfig::default()
                    .with_warm_up_size(1 << warm_exp)
                    .with_bootstrap_growth(1 << boot_exp)
                    .with_resize_growth(resize)
                    .with_density_bounds((low + slack).min(1.0), low);
                config.validate().ok().map(|()| config)
            },
        )
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 128,
        max_shrink_iters: 10_000,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_matches_sorted_oracle(ops in prop::collection::vec(any::<Op>(), 0..=400)) {
        let mut pma = PackedMemoryArray::new();
        let mut oracle: Vec<i32> = Vec::new();

        for op in ops {
            match op {
                Op::Insert(k) => {
                    place_checked(&mut pma, i32::from(k));
                    oracle.push(i32::from(k));
                }
                Op::InsertRun { start, len, descending } => {
                    for i in 0..len as i32 {
                        let k = if descending { i32::from(start) - i } else { i32::from(start) + i };
                        place_checked(&mut pma, k);
                        oracle.push(k);
                    }
                }
                Op::Snapshot => {
                    oracle.sort();
                    let first = pma.to_sorted_vec();
                    let second = pma.to_sorted_vec();
                    prop_assert_eq!(&first, &second);
                    prop_assert_eq!(&first, &oracle);
                }
            }
            prop_assert_eq!(pma.len(), oracle.len());
        }

        validate_pma(&pma);
        oracle.sort();
        prop_assert_eq!(pma.to_sorted_vec(), oracle);
    }

    #[test]
    fn prop_config_variants(
        config in config_strategy(),
        keys in prop::collection::vec(-300i32..300, 0..=1500),
    ) {
        let mut pma = PackedMemoryArray::with_config(config).unwrap();
        for (i, &k) in keys.iter().enumerate() {
            place_checked(&mut pma, k);
            if i % 97 == 0 {
                validate_pma(&pma);
            }
        }

        validate_pma(&pma);
        let mut expected = keys;
        expected.sort();
        prop_assert_eq!(pma.to_sorted_vec(), expected);
    }
}

fn for_each_permutation<T: Clone>(items: &[T], mut f: impl FnMut(Vec<T>)) {
    fn rec<T: Clone>(items: &[T], used: &mut [bool], out: &mut Vec<T>, f: &mut impl FnMut(Vec<T>)) {
        if out.len() == items.len() {
            f(out.clone());
            return;
        }
        for i in 0..items.len() {
            if used[i] {
                continue;
            }
            used[i] = true;
            out.push(items[i].clone());
            rec(items, used, out, f);
            out.pop();
            used[i] = false;
        }
    }

    let mut used = vec![false; items.len()];
    let mut out = Vec::with_capacity(items.len());
    rec(items, &mut used, &mut out, &mut f);
}

#[test]
fn exhaustive_insert_order_tiny_array() {
    // Four slots at bootstrap, so most of these orders climb or resize.
    let config = PmaConfig::default()
        .with_warm_up_size(4)
        .with_bootstrap_growth(1);
    let keys = [3, 1, 4, 1, 5, 9, 2];
    let mut expected = keys.to_vec();
    expected.sort();

    for_each_permutation(&keys, |perm| {
        let mut pma = PackedMemoryArray::with_config(config).unwrap();
        for k in perm {
            place_checked(&mut pma, k);
            validate_pma(&pma);
        }
        assert_eq!(pma.to_sorted_vec(), expected);
    });
}

#[test]
fn density_of_redistributed_segments_default_config() {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    let mut rng = StdRng::seed_from_u64(4);
    let mut pma = PackedMemoryArray::new();
    for i in 0..20_000 {
        place_checked(&mut pma, rng.gen_range(0..5_000));
        if i % 1_000 == 0 {
            validate_pma(&pma);
        }
    }
    validate_pma(&pma);
}
