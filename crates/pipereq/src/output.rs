use std::collections::BTreeMap;
use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use pipereq_frame::Response;
use pipereq_rpc::reason_phrase;
use serde::Serialize;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
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
struct ResponseOutput<'a> {
    id: &'a str,
    status: u16,
    status_text: &'a str,
    headers: &'a BTreeMap<String, String>,
    body_size: usize,
    body: String,
    elapsed_ms: u128,
}

pub fn print_response(response: &Response, elapsed_ms: u128, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = ResponseOutput {
                id: &response.id,
                status: response.status,
                status_text: reason_phrase(response.status),
                headers: &response.headers,
                body_size: response.body.len(),
                body: body_preview(&response.body),
                elapsed_ms,
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
                .set_header(vec!["STATUS", "CONTENT-TYPE", "SIZE", "TIME", "BODY"])
                .add_row(vec![
                    format!("{} {}", response.status, reason_phrase(response.status)),
                    response.header("Content-Type").unwrap_or("-").to_string(),
                    response.body.len().to_string(),
                    format!("{elapsed_ms}ms"),
                    body_preview(&response.body),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "status={} ({}) size={} time={}ms",
                response.status,
                reason_phrase(response.status),
                response.body.len(),
                elapsed_ms
            );
            for (name, value) in &response.headers {
                println!("{name}: {value}");
            }
            println!();
            println!("{}", body_preview(&response.body));
        }
        OutputFormat::Raw => {
            print_raw(&response.body);
        }
    }
}

#[derive(Serialize)]
struct RouteOutput<'a> {
    method: &'a str,
    pattern: &'a str,
}

pub fn print_routes(routes: &[(String, String)], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out: Vec<RouteOutput<'_>> = routes
                .iter()
                .map(|(method, pattern)| RouteOutput { method, pattern })
                .collect();
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "[]".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["METHOD", "PATTERN"]);
            for (method, pattern) in routes {
                table.add_row(vec![method.as_str(), pattern.as_str()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            for (method, pattern) in routes {
                println!("{method} {pattern}");
            }
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn body_preview(body: &[u8]) -> String {
    match std::str::from_utf8(body) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", body.len()),
    }
}
