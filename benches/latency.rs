use chrono::{Duration, TimeZone, Utc};
use criterion::{Criterion, black_box, criterion_group, criterion_main};
use pump_scanner::detector::{Detector, Metrics, Thresholds};
use pump_scanner::scorer::score;
use pump_scanner::store::ObservationStore;

fn bench_record(c: &mut Criterion) {
    let store = ObservationStore::default();
    let t0 = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
    let mut tick = 0i64;

    c.bench_function("store_record_prune", |b| {
        b.iter(|| {
            tick += 1;
            let symbol = if tick % 2 == 0 { "A/USDT" } else { "B/USDT" };
            store.record(symbol, t0 + Duration::seconds(tick * 30), 1.0 + (tick % 7) as f64, 1_000.0);
        })
    });
}

fn bench_local_gates(c: &mut Criterion) {
    let store = ObservationStore::default();
    let t0 = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
    for i in 0..120 {
        let price = if i == 119 { 1.2 } else { 1.0 };
        let volume = if i == 119 { 40_000.0 } else { 1_000.0 };
        store.record("PUMP/USDT", t0 + Duration::seconds(i * 2), price, volume);
    }
    let detector = Detector::new(Thresholds::default());

    c.bench_function("detector_local_gates", |b| {
        b.iter(|| {
            let snap = store.snapshot(black_box("PUMP/USDT")).unwrap();
            detector.local_gates(&snap)
        })
    });
}

fn bench_score(c: &mut Criterion) {
    let m = Metrics {
        change_pct: 9.5,
        vol_now: 48_000.0,
        vol_avg: 9_000.0,
        latest_price: 0.0042,
        quote_volume_24h: 3_200_000.0,
    };
    c.bench_function("score", |b| b.iter(|| score(black_box(&m))));
}

criterion_group!(benches, bench_record, bench_local_gates, bench_score);
criterion_main!(benches);
