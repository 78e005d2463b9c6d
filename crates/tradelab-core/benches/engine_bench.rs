//! Bar-throughput benchmarks for the matching engine.

use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tradelab_core::prelude::*;

fn make_bars(count: usize) -> Vec<Bar> {
    let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    (0..count)
        .map(|i| {
            // Deterministic wobble so both trajectory branches get exercised.
            let base = 100.0 + 10.0 * ((i as f64) * 0.05).sin();
            let up = i % 3 != 0;
            let (high, low) = if up {
                (base + 0.4, base - 1.1)
            } else {
                (base + 1.1, base - 0.4)
            };
            Bar::new(t0 + Duration::minutes(i as i64), base, high, low, base + 0.2)
        })
        .collect()
}

fn bench_market_round_trips(c: &mut Criterion) {
    let bars = make_bars(2_000);
    c.bench_function("market_round_trips_2000_bars", |b| {
        b.iter(|| {
            let mut engine = Engine::new(
                StrategyConfig {
                    initial_capital: 100_000.0,
                    ..Default::default()
                },
                SymbolInfo::default(),
            )
            .unwrap();
            for (i, bar) in bars.iter().enumerate() {
                engine.process_bar(bar);
                if i % 2 == 0 {
                    engine.entry(
                        "long",
                        Direction::Long,
                        EntryParams { qty: Some(1.0), ..Default::default() },
                    );
                } else {
                    engine.close_all(None, None, false);
                }
            }
            black_box(engine.netprofit())
        })
    });
}

fn bench_bracket_exits(c: &mut Criterion) {
    let bars = make_bars(2_000);
    c.bench_function("bracket_exits_2000_bars", |b| {
        b.iter(|| {
            let mut engine = Engine::new(
                StrategyConfig {
                    initial_capital: 100_000.0,
                    ..Default::default()
                },
                SymbolInfo::default(),
            )
            .unwrap();
            for (i, bar) in bars.iter().enumerate() {
                engine.process_bar(bar);
                if engine.position_size() == 0.0 {
                    engine.entry(
                        "long",
                        Direction::Long,
                        EntryParams { qty: Some(1.0), ..Default::default() },
                    );
                    engine.exit(
                        "bracket",
                        ExitParams {
                            from_entry: Some("long".into()),
                            profit: Some(120.0),
                            loss: Some(80.0),
                            ..Default::default()
                        },
                    );
                }
                black_box(i);
            }
            black_box(engine.closed_trades_count())
        })
    });
}

criterion_group!(benches, bench_market_round_trips, bench_bracket_exits);
criterion_main!(benches);
