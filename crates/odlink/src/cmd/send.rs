use odlink_frame::Container;
use odlink_node::{Node, NodeConfig};

use crate::cmd::SendArgs;
use crate::exit::{io_error, node_error, CliError, CliResult, SUCCESS, USAGE};

pub fn run(args: SendArgs, port: u16) -> CliResult<i32> {
    let payload = match (&args.data, &args.file) {
        (Some(data), None) => data.clone().into_bytes(),
        (None, Some(path)) => {
            std::fs::read(path).map_err(|err| io_error("read payload failed", err))?
        }
        (None, None) => {
            return Err(CliError::new(USAGE, "one of --data or --file is required"));
        }
        (Some(_), Some(_)) => unreachable!("clap rejects conflicting payload args"),
    };

    let config = NodeConfig {
        port,
        ..NodeConfig::new(args.cid)
    };
    let node = Node::with_config(config).map_err(|err| node_error("join failed", err))?;

    let container = Container::new(args.id, payload);
    node.publish_container(&container)
        .map_err(|err| node_error("publish failed", err))?;

    Ok(SUCCESS)
}
