use std::io::{IsTerminal, Write};

use arraybridge_codec::{to_bytes, ArrayValue};
use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

use crate::exit::{codec_error, CliResult};
use crate::json::from_array;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    /// Wire-encoded reply bytes.
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
struct ReplyOutput {
    class: &'static str,
    dims: Vec<u64>,
    value: serde_json::Value,
    elapsed_ms: u128,
}

/// `double 1x3`, `struct 1x1`, `string 0x0`.
pub fn describe(value: &ArrayValue) -> String {
    format!("{} {}", value.type_tag(), dims_label(value.dims()))
}

fn dims_label(dims: &[u64]) -> String {
    if dims.is_empty() {
        return "scalar".to_string();
    }
    dims.iter()
        .map(u64::to_string)
        .collect::<Vec<_>>()
        .join("x")
}

fn preview(value: &ArrayValue) -> String {
    serde_json::to_string(&from_array(value)).unwrap_or_else(|_| "<unprintable>".to_string())
}

pub fn print_reply(value: &ArrayValue, elapsed_ms: u128, format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => {
            let out = ReplyOutput {
                class: value.type_tag().name(),
                dims: value.dims().to_vec(),
                value: from_array(value),
                elapsed_ms,
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            println!("{}", reply_table(value));
        }
        OutputFormat::Pretty => {
            println!("{} ({elapsed_ms} ms)", describe(value));
            println!(
                "{}",
                serde_json::to_string_pretty(&from_array(value))
                    .unwrap_or_else(|_| "<unprintable>".to_string())
            );
        }
        OutputFormat::Raw => {
            let bytes = to_bytes(value).map_err(|err| codec_error("encode failed", err))?;
            print_raw(&bytes);
        }
    }
    Ok(())
}

/// One row per field for a 1×1 struct, otherwise a single row.
fn reply_table(value: &ArrayValue) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    match value {
        ArrayValue::Struct {
            fields, elements, ..
        } if elements.len() == 1 => {
            table.set_header(vec!["FIELD", "CLASS", "DIMS", "VALUE"]);
            if let Some(element) = elements.first() {
                for (name, field) in fields.iter().zip(element) {
                    table.add_row(vec![
                        name.clone(),
                        field.type_tag().to_string(),
                        dims_label(field.dims()),
                        preview(field),
                    ]);
                }
            }
        }
        _ => {
            table
                .set_header(vec!["CLASS", "DIMS", "VALUE"])
                .add_row(vec![
                    value.type_tag().to_string(),
                    dims_label(value.dims()),
                    preview(value),
                ]);
        }
    }
    table
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}
