//! jrpc
//!
//! Calls a JSON-RPC method on the local server one or more times and prints
//! each result.

use anyhow::{Context, Result};
use clap::Parser;
use jrpc_cli::{driver, Args};
use jrpc_client::LocalClient;
use tokio::runtime::Handle;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Configuration problems abort before any connection is opened.
    let invocation = args.load_invocation()?;

    // Results go to stdout, logs to stderr.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(invocation.log_level.as_str())
        .init();

    tracing::debug!(
        "Calling {} on {}:{} ({} time(s))",
        invocation.method,
        invocation.host,
        invocation.port,
        invocation.times
    );

    let client = LocalClient::connect(Handle::current(), &invocation.host, invocation.port)
        .await
        .with_context(|| {
            format!(
                "Could not reach local server at {}:{}",
                invocation.host, invocation.port
            )
        })?;
    client.start()?;

    let outcome = driver::run(&client, &invocation, &mut std::io::stdout()).await;

    client.close();
    client.wait_until_closed().await;

    outcome
}
