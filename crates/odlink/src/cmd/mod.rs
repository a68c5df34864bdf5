use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod echo;
pub mod play;
pub mod rates;
pub mod record;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print every container received on a conference.
    Echo(EchoArgs),
    /// Sample per-type message rates on a conference.
    Rates(RatesArgs),
    /// Record received containers to a file.
    Record(RecordArgs),
    /// Replay a recording into a conference.
    Play(PlayArgs),
    /// Publish a single container.
    Send(SendArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, port: u16, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Echo(args) => echo::run(args, port, format),
        Command::Rates(args) => rates::run(args, port, format),
        Command::Record(args) => record::run(args, port),
        Command::Play(args) => play::run(args, port),
        Command::Send(args) => send::run(args, port),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct EchoArgs {
    /// Conference ID to join (0-255).
    pub cid: u8,
    /// Filter to specific message types (comma-separated).
    #[arg(long, value_delimiter = ',')]
    pub ids: Option<Vec<i32>>,
    /// Exit after printing N containers.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct RatesArgs {
    /// Conference ID to join (0-255).
    pub cid: u8,
    /// Sampling interval in seconds.
    #[arg(long, default_value_t = 1.0)]
    pub interval: f64,
}

#[derive(Args, Debug)]
pub struct RecordArgs {
    /// Conference ID to join (0-255).
    pub cid: u8,
    /// Recording file to write. Appends when the file exists.
    pub output: PathBuf,
    /// Filter to specific message types (comma-separated).
    #[arg(long, value_delimiter = ',')]
    pub ids: Option<Vec<i32>>,
}

#[derive(Args, Debug)]
pub struct PlayArgs {
    /// Conference ID to publish into (0-255).
    pub cid: u8,
    /// Recording file to replay.
    pub input: PathBuf,
    /// Playback speed multiplier; 0 replays without pacing.
    #[arg(long, default_value_t = 1.0)]
    pub speed: f64,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Conference ID to publish into (0-255).
    pub cid: u8,
    /// Message-type ID of the container.
    #[arg(long, short = 'i')]
    pub id: i32,
    /// Raw string payload.
    #[arg(long, conflicts_with = "file")]
    pub data: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with = "data")]
    pub file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
