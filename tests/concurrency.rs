use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use seriesflow::series::{PlotDataMap, SampleValue, SharedDataMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

const RANGE: f64 = 10.0;
const CHANNELS: [&str; 3] = ["a/x", "a/y", "b/z"];

fn assert_invariants(map: &PlotDataMap) {
    for series in map.numeric_series() {
        let timestamps: Vec<f64> = series.iter().map(|s| s.timestamp).collect();
        assert!(
            timestamps.windows(2).all(|w| w[0] <= w[1]),
            "channel {} is not sorted",
            series.name()
        );
        if let Some((lo, hi)) = series.range_x() {
            assert!(hi - lo <= RANGE, "channel {} spans {}", series.name(), hi - lo);
        }
    }
}

#[test]
fn test_concurrent_writer_and_snapshot_reader() {
    let shared = SharedDataMap::new(PlotDataMap::with_maximum_range_x(RANGE));
    let done = Arc::new(AtomicBool::new(false));

    let writer = {
        let shared = shared.clone();
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let mut rng = StdRng::seed_from_u64(7);
            for i in 0..10_000 {
                let channel = CHANNELS[i % CHANNELS.len()];
                let group = channel.split('/').next();
                // Mostly increasing with occasional late arrivals
                let jitter: f64 = rng.random_range(-0.05..0.0);
                let timestamp = i as f64 * 0.01 + jitter;
                let value: f64 = rng.random_range(-1.0..1.0);

                let mut map = shared.lock();
                map.add_sample(channel, group, timestamp, SampleValue::Numeric(value))
                    .unwrap();
            }
            done.store(true, Ordering::SeqCst);
        })
    };

    let reader = {
        let shared = shared.clone();
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let mut snapshots = 0usize;
            while !done.load(Ordering::SeqCst) {
                let snapshot = shared.snapshot();
                assert_invariants(&snapshot);
                snapshots += 1;
                thread::yield_now();
            }
            snapshots
        })
    };

    writer.join().unwrap();
    let snapshots = reader.join().unwrap();
    assert!(snapshots > 0);

    let final_map = shared.snapshot();
    assert_invariants(&final_map);
    assert_eq!(final_map.len(), CHANNELS.len());
    for name in CHANNELS {
        let series = final_map.numeric(name).unwrap();
        assert!(!series.is_empty());
        // Last 10s of a 100s run at ~33 samples/s per channel
        assert!(series.len() <= 350, "{} holds {}", name, series.len());
    }
}

#[test]
fn test_set_range_while_writing() {
    let shared = SharedDataMap::new(PlotDataMap::with_maximum_range_x(60.0));

    let writer = {
        let shared = shared.clone();
        thread::spawn(move || {
            for i in 0..5_000 {
                shared
                    .lock()
                    .add_sample("x", None, i as f64 * 0.02, SampleValue::Numeric(i as f64))
                    .unwrap();
            }
        })
    };

    shared.set_maximum_range_x(RANGE);
    writer.join().unwrap();

    let map = shared.snapshot();
    assert_eq!(map.max_range_x(), RANGE);
    assert_invariants(&map);
}
