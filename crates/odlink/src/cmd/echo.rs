use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use odlink_node::{Node, NodeConfig};

use crate::cmd::EchoArgs;
use crate::exit::{node_error, CliError, CliResult, SUCCESS};
use crate::output::{print_container, OutputFormat};

pub fn run(args: EchoArgs, port: u16, format: OutputFormat) -> CliResult<i32> {
    let config = NodeConfig {
        port,
        ..NodeConfig::new(args.cid)
    };
    let mut node = Node::with_config(config).map_err(|err| node_error("join failed", err))?;

    let printed = Arc::new(AtomicUsize::new(0));
    let ids = args.ids.clone();
    let counter = printed.clone();
    node.register_container(move |container| {
        if let Some(ids) = &ids {
            if !ids.contains(&container.data_type) {
                return;
            }
        }
        print_container(container, format);
        counter.fetch_add(1, Ordering::SeqCst);
    });

    node.start().map_err(|err| node_error("start failed", err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    while running.load(Ordering::SeqCst) {
        if let Some(count) = args.count {
            if printed.load(Ordering::SeqCst) >= count {
                break;
            }
        }
        std::thread::sleep(Duration::from_millis(50));
    }

    node.shutdown()
        .map_err(|err| node_error("shutdown failed", err))?;
    Ok(SUCCESS)
}

pub(crate) fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| {
        CliError::new(
            crate::exit::INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}
