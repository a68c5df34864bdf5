use odlink_node::{Node, NodeConfig, Player};

use crate::cmd::PlayArgs;
use crate::exit::{node_error, CliResult, SUCCESS};

pub fn run(args: PlayArgs, port: u16) -> CliResult<i32> {
    let config = NodeConfig {
        port,
        ..NodeConfig::new(args.cid)
    };
    let node = Node::with_config(config).map_err(|err| node_error("join failed", err))?;

    let player =
        Player::open(&args.input, args.speed).map_err(|err| node_error("open recording failed", err))?;
    let summary = player
        .play(|payload| node.publish_raw(payload))
        .map_err(|err| node_error("playback failed", err))?;

    println!(
        "replayed {} containers ({} behind schedule)",
        summary.frames, summary.behind_schedule
    );
    Ok(SUCCESS)
}
