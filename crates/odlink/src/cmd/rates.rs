use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use odlink_frame::type_name;
use odlink_node::{Node, NodeConfig};
use serde::Serialize;

use crate::cmd::echo::install_ctrlc_handler;
use crate::cmd::RatesArgs;
use crate::exit::{node_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::OutputFormat;

#[derive(Serialize)]
struct RateRow {
    data_type: i32,
    type_name: &'static str,
    count: u64,
    hz: f64,
}

pub fn run(args: RatesArgs, port: u16, format: OutputFormat) -> CliResult<i32> {
    if !args.interval.is_finite() || args.interval <= 0.0 {
        return Err(CliError::new(
            USAGE,
            format!("invalid sampling interval {}", args.interval),
        ));
    }

    let config = NodeConfig {
        port,
        ..NodeConfig::new(args.cid)
    };
    let mut node = Node::with_config(config).map_err(|err| node_error("join failed", err))?;

    let counts: Arc<Mutex<HashMap<i32, u64>>> = Arc::new(Mutex::new(HashMap::new()));
    let sink = counts.clone();
    node.register_container(move |container| {
        let mut counts = sink.lock().unwrap_or_else(|e| e.into_inner());
        *counts.entry(container.data_type).or_insert(0) += 1;
    });

    node.start().map_err(|err| node_error("start failed", err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let interval = Duration::from_secs_f64(args.interval);
    while running.load(Ordering::SeqCst) {
        let started = Instant::now();
        while running.load(Ordering::SeqCst) && started.elapsed() < interval {
            std::thread::sleep(Duration::from_millis(50));
        }
        if !running.load(Ordering::SeqCst) {
            break;
        }

        let elapsed = started.elapsed().as_secs_f64();
        let sample = {
            let mut counts = counts.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *counts)
        };
        // Every type ever observed gets a row; quiet ones read 0 Hz.
        print_sample(&node.known_type_ids(), &sample, elapsed, format);
    }

    node.shutdown()
        .map_err(|err| node_error("shutdown failed", err))?;
    Ok(SUCCESS)
}

fn print_sample(known: &[i32], sample: &HashMap<i32, u64>, elapsed: f64, format: OutputFormat) {
    let rows: Vec<RateRow> = known
        .iter()
        .map(|&id| {
            let count = sample.get(&id).copied().unwrap_or(0);
            RateRow {
                data_type: id,
                type_name: type_name(id),
                count,
                hz: count as f64 / elapsed,
            }
        })
        .collect();

    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(&rows).unwrap_or_else(|_| "[]".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["TYPE", "NAME", "COUNT", "HZ"]);
            for row in &rows {
                table.add_row(vec![
                    row.data_type.to_string(),
                    row.type_name.to_string(),
                    row.count.to_string(),
                    format!("{:.1}", row.hz),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            for row in &rows {
                println!(
                    "type={} ({}) count={} hz={:.1}",
                    row.data_type, row.type_name, row.count, row.hz
                );
            }
        }
    }
}
