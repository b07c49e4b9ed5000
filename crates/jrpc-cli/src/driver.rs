//! Repeated-call loop

use anyhow::{Context, Result};
use jrpc_client::LocalClient;
use serde::Serialize;
use serde_json::{Map, Value};
use std::io::Write;
use std::time::Duration;

/// A validated command-line invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub host: String,
    pub port: u16,
    pub method: String,
    pub params: Option<Value>,
    pub times: u32,
    /// Applied between calls only.
    pub interval: Duration,
    pub log_level: String,
}

/// Calls `invocation.method` `times` times, printing each result to `out`.
pub async fn run<W: Write>(client: &LocalClient, invocation: &Invocation, out: &mut W) -> Result<()> {
    for i in 0..invocation.times {
        let result = client
            .call(&invocation.method, invocation.params.as_ref())
            .await
            .with_context(|| format!("Call to '{}' failed", invocation.method))?;

        writeln!(out, "{}", format_result(&result)?)?;
        out.flush()?;

        if i + 1 < invocation.times {
            tokio::time::sleep(invocation.interval).await;
        }
    }

    Ok(())
}

/// Renders `value` with sorted keys and four-space indentation.
pub fn format_result(value: &Value) -> Result<String> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    sorted(value).serialize(&mut ser)?;
    Ok(String::from_utf8(buf)?)
}

fn sorted(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.clone(), sorted(v)))
                    .collect::<Map<String, Value>>(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        other => other.clone(),
    }
}
