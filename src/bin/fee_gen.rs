use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::Serialize;
use std::io::Write;

// --- Config ---
const DEFAULT_HOURS: u64 = 24 * 7;
const DEFAULT_ENTITY: &str = "0x00000000000000000000000000000000000000b1";
const TXS_PER_HOUR: u64 = 30;
const BLOCK_TIME_SECS: i64 = 12;
const DAILY_AMPLITUDE: f64 = 0.6; // Fee swing around the base over one day
const TIP_GWEI: f64 = 2.0;
const BLOCK_BASE_FEE_GWEI: f64 = 30.0;
const WEI_PER_GWEI: f64 = 1e9;
const SPIKE_PROBABILITY: f64 = 0.002;
// 2022-03-01T00:00:00Z
const START: i64 = 1_646_092_800;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FeeEvent<'a> {
    entity: &'a str,
    sender: String,
    t: i64,
    block: u64,
    max_priority_fee_per_gas: u128,
    max_fee_per_gas: u128,
    base_fee_per_gas: u128,
}

fn to_wei(gwei: f64) -> u128 {
    (gwei * WEI_PER_GWEI).round() as u128
}

fn parse_arg<T: std::str::FromStr>(args: &[String], idx: usize, default: T) -> T {
    args.get(idx)
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}

fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    // fee_gen [hours] [entity] [seed]
    let args: Vec<String> = std::env::args().skip(1).collect();
    let hours: u64 = parse_arg(&args, 0, DEFAULT_HOURS);
    let entity = args.get(1).map(String::as_str).unwrap_or(DEFAULT_ENTITY);
    let seed: u64 = parse_arg(&args, 2, 42);

    tracing::info!(hours, entity, seed, "Generating synthetic fee stream.");

    let mut rng = StdRng::seed_from_u64(seed);
    let Ok(noise) = Normal::new(0.0, 0.15) else {
        return Err(std::io::Error::other("invalid noise distribution"));
    };

    let stdout = std::io::stdout();
    let mut out = std::io::BufWriter::new(stdout.lock());
    let mut spikes = 0u64;

    for hour in 0..hours {
        let phase = (hour % 24) as f64 / 24.0 * std::f64::consts::TAU;
        let expected = TIP_GWEI * (1.0 + DAILY_AMPLITUDE * phase.sin());

        let mut times: Vec<i64> = (0..TXS_PER_HOUR)
            .map(|_| START + hour as i64 * 3600 + rng.random_range(0..3600))
            .collect();
        times.sort_unstable();

        for t in times {
            let mut v = (expected * (1.0 + noise.sample(&mut rng))).max(0.0);
            if rng.random_bool(SPIKE_PROBABILITY) {
                v *= rng.random_range(4.0..20.0);
                spikes += 1;
            }

            // Fee cap leaves enough headroom that the full tip is paid
            let base_fee = BLOCK_BASE_FEE_GWEI * rng.random_range(0.8..1.2);
            let max_fee = base_fee + v * rng.random_range(1.0..2.0);
            let event = FeeEvent {
                entity,
                sender: format!("0x{:040x}", rng.random::<u32>()),
                t,
                block: ((t - START) / BLOCK_TIME_SECS) as u64,
                max_priority_fee_per_gas: to_wei(v),
                max_fee_per_gas: to_wei(max_fee),
                base_fee_per_gas: to_wei(base_fee),
            };
            serde_json::to_writer(&mut out, &event)?;
            writeln!(out)?;
        }
    }

    out.flush()?;
    tracing::info!(events = hours * TXS_PER_HOUR, spikes, "Done.");
    Ok(())
}
