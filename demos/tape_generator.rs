/// Synthetic tape generator and replay driver
///
/// Records a random-walk quote tape in memory, then replays it through a
/// subscription channel in chronological order and logs channel stats.
/// Usage: tape_generator [tickers] [ticks-per-ticker]

use mdd_channel::{
    FieldType, FieldValue, MemoryTape, RawField, SchemaEntry, SubscriberCallbacks, SubscriberConfig,
    SubscriptionChannel, TapeTick, TapeTransport,
};
use rand::Rng;
use std::env;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const SERVICE: &str = "bloomberg";
const BID: i32 = 22;
const ASK: i32 = 25;
const TRDVOL_1: i32 = 178;

fn generate(tickers: &[String], ticks: usize) -> MemoryTape {
    let mut rng = rand::thread_rng();
    let mut tape = MemoryTape::new().with_schema(vec![
        SchemaEntry::new(BID, "BID", Some(FieldType::Double)),
        SchemaEntry::new(ASK, "ASK", Some(FieldType::Double)),
        SchemaEntry::new(TRDVOL_1, "TRDVOL_1", Some(FieldType::Int)),
    ]);

    // 2024-01-02 09:30:00 UTC
    let open = 1_704_187_800.0;
    for tkr in tickers {
        let mut mid: f64 = rng.gen_range(20.0..500.0);
        let mut t = open;
        for _ in 0..ticks {
            t += rng.gen_range(0.001..0.5);
            mid = (mid + rng.gen_range(-0.05..0.05)).max(0.01);
            let half = rng.gen_range(1..10) as f64 * 0.005;
            let fields = vec![
                RawField::new(BID, FieldValue::Double(mid - half), FieldType::Double),
                RawField::new(ASK, FieldValue::Double(mid + half), FieldType::Double),
                RawField::new(TRDVOL_1, FieldValue::Int(rng.gen_range(1..1000) * 100), FieldType::Int),
            ];
            tape.record(TapeTick::new(t, SERVICE, tkr, fields));
        }
    }
    tape
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().collect();
    let ticker_count: usize = args.get(1).and_then(|a| a.parse().ok()).unwrap_or(20);
    let ticks: usize = args.get(2).and_then(|a| a.parse().ok()).unwrap_or(5000);

    let tickers: Vec<String> = (0..ticker_count).map(|i| format!("SYN{:03} US EQUITY", i)).collect();
    println!("Generating {} ticks for {} tickers", ticks * ticker_count, ticker_count);
    let tape = generate(&tickers, ticks);

    let received = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&received);
    let callbacks = SubscriberCallbacks::new()
        .on_data(move |_| {
            counter.fetch_add(1, Ordering::Relaxed);
        })
        .on_stream_done(|msg, text| println!("{}: {}", msg.ticker(), text));

    let transport = Arc::new(TapeTransport::new(tape));
    let config = SubscriberConfig::default().with_poll_interval(Duration::from_millis(10));
    let mut channel = SubscriptionChannel::with_config(transport, callbacks, config);
    channel.start("synthetic.tape", "tape_generator", false)?;

    for (i, tkr) in tickers.iter().enumerate() {
        channel.subscribe(SERVICE, tkr, i as u64)?;
    }
    channel.set_tape_direction(false)?;

    let started = Instant::now();
    channel.pump_tape(None, None)?;
    while channel.replay_progress().0 < tickers.len() {
        thread::sleep(Duration::from_millis(20));
    }
    let elapsed = started.elapsed();

    let stats = channel.stats();
    channel.stop()?;
    stats.log_summary();

    println!(
        "Replayed {} updates in {:.3}s",
        received.load(Ordering::Relaxed),
        elapsed.as_secs_f64()
    );
    Ok(())
}
