use crossbeam_channel::{bounded, Receiver, Sender};
use feewatch::{
    effective_priority_fee, metrics, AnalyserRegistry, FeeMonitor, Finding, MonitorConfig,
    Observation,
};
use serde::Deserialize;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::sync::Arc;
use std::thread;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

// --- 1. Data Types ---

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
struct FeeEvent {
    entity: String,
    #[serde(default)]
    sender: Option<String>,
    t: i64,
    /// Priority fee in gwei, when the producer already computed it
    #[serde(default)]
    v: Option<f64>,
    #[serde(default)]
    block: Option<u64>,
    // Raw EIP-1559 fields in wei
    #[serde(default)]
    max_priority_fee_per_gas: Option<u128>,
    #[serde(default)]
    max_fee_per_gas: Option<u128>,
    #[serde(default)]
    base_fee_per_gas: Option<u128>,
}

impl FeeEvent {
    fn observation(&self) -> Observation {
        let value = self.v.or_else(|| {
            effective_priority_fee(
                self.max_priority_fee_per_gas,
                self.max_fee_per_gas,
                self.base_fee_per_gas,
            )
        });
        Observation {
            timestamp: self.t,
            value,
        }
    }
}

enum ShardMessage {
    Sample(FeeEvent),
    Block(u64),
}

fn shard_of(entity: &str, shard_count: usize) -> usize {
    let hash = xxhash_rust::xxh3::xxh3_64(entity.to_lowercase().as_bytes());
    (hash as usize) % shard_count
}

// --- 2. Shard Worker (Actor Model) ---

struct ShardWorker {
    id: usize,
    rx: Receiver<ShardMessage>,
    monitor: FeeMonitor,
    findings_tx: Sender<Finding>,
}

impl ShardWorker {
    fn spawn(
        id: usize,
        shard_count: usize,
        config: Arc<MonitorConfig>,
        rx: Receiver<ShardMessage>,
        findings_tx: Sender<Finding>,
    ) -> std::io::Result<thread::JoinHandle<()>> {
        thread::Builder::new()
            .name(format!("feewatch-shard-{}", id))
            .spawn(move || {
                let registry = AnalyserRegistry::builtin();
                let monitor = match FeeMonitor::with_filter(&config, &registry, |entity| {
                    shard_of(entity, shard_count) == id
                }) {
                    Ok(monitor) => monitor,
                    Err(e) => {
                        error!(shard = id, error = %e, "Shard failed to build its monitor.");
                        return;
                    }
                };

                let mut worker = ShardWorker {
                    id,
                    rx,
                    monitor,
                    findings_tx,
                };
                worker.run();
                info!(shard = id, "Shard worker stopped.");
            })
    }

    fn run(&mut self) {
        info!(shard = self.id, "Shard worker active.");

        while let Ok(message) = self.rx.recv() {
            match message {
                ShardMessage::Block(number) => {
                    let trained = self.monitor.on_block();
                    if trained > 0 {
                        info!(shard = self.id, block = number, entities = trained, "Retrained.");
                    }
                }
                ShardMessage::Sample(event) => {
                    let observation = event.observation();
                    let findings =
                        self.monitor
                            .observe(&event.entity, event.sender.as_deref(), observation);
                    for finding in findings {
                        if self.findings_tx.send(finding).is_err() {
                            warn!(shard = self.id, "Finding writer is gone.");
                            return;
                        }
                    }
                }
            }
        }
    }
}

// --- 3. Finding Writer ---

struct FindingWriter;

impl FindingWriter {
    fn spawn(rx: Receiver<Finding>) -> std::io::Result<thread::JoinHandle<usize>> {
        thread::Builder::new()
            .name("feewatch-findings".into())
            .spawn(move || {
                let stdout = std::io::stdout();
                let mut out = std::io::BufWriter::new(stdout.lock());
                let mut written = 0;

                while let Ok(finding) = rx.recv() {
                    match serde_json::to_string(&finding) {
                        Ok(line) => {
                            if writeln!(out, "{}", line).is_err() {
                                break;
                            }
                            written += 1;
                        }
                        Err(e) => warn!(error = %e, "Failed to encode finding."),
                    }
                }

                let _ = out.flush();
                written
            })
    }
}

// --- 4. Main ---

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let mut args = std::env::args().skip(1);
    let config_path = args
        .next()
        .ok_or("usage: watcher <config.json> [events.jsonl]")?;
    let input: Box<dyn BufRead> = match args.next() {
        Some(path) => Box::new(BufReader::new(std::fs::File::open(path)?)),
        None => Box::new(BufReader::new(std::io::stdin())),
    };

    let config = Arc::new(MonitorConfig::from_path(&config_path)?);
    // Fail fast on bad analyser settings before any thread starts
    FeeMonitor::new(&config, &AnalyserRegistry::builtin())?;
    metrics::init();

    let shard_count = thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
        .min(config.entities.len().max(1));
    info!(shards = shard_count, entities = config.entities.len(), "Starting watcher.");

    let (findings_tx, findings_rx) = bounded::<Finding>(10_000);
    let writer_handle = FindingWriter::spawn(findings_rx)?;

    let mut txs = Vec::with_capacity(shard_count);
    let mut worker_handles = Vec::with_capacity(shard_count);
    for i in 0..shard_count {
        let (tx, rx) = bounded::<ShardMessage>(10_000);
        txs.push(tx);
        worker_handles.push(ShardWorker::spawn(
            i,
            shard_count,
            Arc::clone(&config),
            rx,
            findings_tx.clone(),
        )?);
    }
    // Only workers hold the findings sender from here on
    drop(findings_tx);

    let mut current_block: Option<u64> = None;
    let mut events = 0u64;
    for (line_no, line) in input.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let event: FeeEvent = match serde_json::from_str(&line) {
            Ok(event) => event,
            Err(e) => {
                warn!(line = line_no + 1, error = %e, "Skipping malformed event.");
                continue;
            }
        };

        // A new block retrains before its transactions are scored
        if let Some(block) = event.block {
            if current_block.is_none_or(|current| block > current) {
                current_block = Some(block);
                for tx in &txs {
                    tx.send(ShardMessage::Block(block))?;
                }
            }
        }

        let shard = shard_of(&event.entity, shard_count);
        txs[shard].send(ShardMessage::Sample(event))?;
        events += 1;
    }

    drop(txs);
    for handle in worker_handles {
        let _ = handle.join();
    }
    let findings = writer_handle.join().unwrap_or(0);

    info!(events, findings, "Watcher finished.");
    let metrics_path = std::env::var_os("FEEWATCH_METRICS_PATH");
    export_metrics(metrics_path.as_deref().map(Path::new))?;
    Ok(())
}

/// Writes the Prometheus text exposition to `path`, or to stderr.
fn export_metrics(path: Option<&Path>) -> std::io::Result<()> {
    let rendered = metrics::render();
    match path {
        Some(path) => {
            std::fs::write(path, rendered)?;
            info!(path = %path.display(), "Metrics written.");
        }
        None => std::io::stderr().write_all(rendered.as_bytes())?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precomputed_fee_wins() {
        let event: FeeEvent = serde_json::from_str(
            r#"{"entity":"0xb1","t":100,"v":3.5,"maxPriorityFeePerGas":1000000000,"maxFeePerGas":9000000000,"baseFeePerGas":1000000000}"#,
        )
        .unwrap();
        assert_eq!(event.observation().value, Some(3.5));
    }

    #[test]
    fn test_fee_from_wei_fields() {
        let event: FeeEvent = serde_json::from_str(
            r#"{"entity":"0xb1","t":100,"block":7,"maxPriorityFeePerGas":5000000000,"maxFeePerGas":33000000000,"baseFeePerGas":30000000000}"#,
        )
        .unwrap();
        let observation = event.observation();
        assert_eq!(observation.timestamp, 100);
        assert_eq!(observation.value, Some(3.0));
    }

    #[test]
    fn test_legacy_transaction_has_no_fee() {
        let event: FeeEvent =
            serde_json::from_str(r#"{"entity":"0xb1","t":100,"maxFeePerGas":1}"#).unwrap();
        assert_eq!(event.observation().value, None);
    }

    #[test]
    fn test_metrics_exported_to_file() {
        metrics::init();
        let path =
            std::env::temp_dir().join(format!("feewatch-metrics-{}.prom", std::process::id()));
        export_metrics(Some(path.as_path())).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert!(written.contains("feewatch_samples_total"));
        assert!(written.contains("feewatch_training_duration_seconds"));
    }

    #[test]
    fn test_shard_routing_ignores_case() {
        assert_eq!(shard_of("0xABC", 7), shard_of("0xabc", 7));
    }
}
