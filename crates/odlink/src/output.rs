use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use odlink_frame::{type_name, Container, TimeStamp};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct ContainerOutput<'a> {
    data_type: i32,
    type_name: &'a str,
    payload_size: usize,
    sent: String,
    received: String,
}

pub fn print_container(container: &Container, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = ContainerOutput {
                data_type: container.data_type,
                type_name: type_name(container.data_type),
                payload_size: container.serialized_data.len(),
                sent: stamp(container.sent),
                received: stamp(container.received),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["TYPE", "NAME", "SIZE", "SENT", "RECEIVED"])
                .add_row(vec![
                    container.data_type.to_string(),
                    type_name(container.data_type).to_string(),
                    container.serialized_data.len().to_string(),
                    stamp(container.sent),
                    stamp(container.received),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "type={} ({}) size={} sent={} received={}",
                container.data_type,
                type_name(container.data_type),
                container.serialized_data.len(),
                stamp(container.sent),
                stamp(container.received)
            );
        }
        OutputFormat::Raw => {
            print_raw(container.serialized_data.as_ref());
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn stamp(ts: Option<TimeStamp>) -> String {
    match ts {
        Some(ts) => format!("{}.{:06}", ts.seconds, ts.microseconds),
        None => "-".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stamp_pads_microseconds() {
        let ts = TimeStamp {
            seconds: 7,
            microseconds: 42,
        };
        assert_eq!(stamp(Some(ts)), "7.000042");
        assert_eq!(stamp(None), "-");
    }
}
