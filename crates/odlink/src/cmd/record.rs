use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use odlink_node::{Node, NodeConfig, Recorder};
use tracing::warn;

use crate::cmd::echo::install_ctrlc_handler;
use crate::cmd::RecordArgs;
use crate::exit::{node_error, CliResult, SUCCESS};

pub fn run(args: RecordArgs, port: u16) -> CliResult<i32> {
    let recorder =
        Recorder::create(&args.output).map_err(|err| node_error("open recording failed", err))?;
    let recorder = Arc::new(Mutex::new(recorder));

    let config = NodeConfig {
        port,
        ..NodeConfig::new(args.cid)
    };
    let mut node = Node::with_config(config).map_err(|err| node_error("join failed", err))?;

    let ids = args.ids.clone();
    let sink = recorder.clone();
    node.register_container(move |container| {
        if let Some(ids) = &ids {
            if !ids.contains(&container.data_type) {
                return;
            }
        }
        let mut recorder = sink.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(err) = recorder.record(container) {
            warn!(error = %err, "failed to record container");
        }
    });

    node.start().map_err(|err| node_error("start failed", err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    while running.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(50));
    }

    node.shutdown()
        .map_err(|err| node_error("shutdown failed", err))?;

    let recorder = recorder.lock().unwrap_or_else(|e| e.into_inner());
    println!(
        "recorded {} containers to {}",
        recorder.frames(),
        recorder.path().display()
    );
    Ok(SUCCESS)
}
