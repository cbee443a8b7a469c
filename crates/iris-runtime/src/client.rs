//! UDS JSON-RPC client for CLI subcommands.

use chrono::{DateTime, Utc};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

use crate::server::FRAME_EVENT;

pub(crate) async fn rpc_call(
    socket_path: &str,
    method: &str,
    params: serde_json::Value,
) -> anyhow::Result<serde_json::Value> {
    let stream = connect(socket_path).await?;
    let (reader, mut writer) = stream.into_split();

    let mut req = serde_json::to_string(&request(method, params))?;
    req.push('\n');
    writer.write_all(req.as_bytes()).await?;
    writer.shutdown().await?;

    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    reader.read_line(&mut line).await?;

    let response: serde_json::Value = serde_json::from_str(line.trim())?;
    result_of(response)
}

async fn connect(socket_path: &str) -> anyhow::Result<UnixStream> {
    UnixStream::connect(socket_path)
        .await
        .map_err(|e| anyhow::anyhow!("cannot connect to broker at {socket_path}: {e}"))
}

fn request(method: &str, params: serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params,
        "id": 1,
    })
}

fn result_of(response: serde_json::Value) -> anyhow::Result<serde_json::Value> {
    if let Some(error) = response.get("error") {
        anyhow::bail!("RPC error: {error}");
    }
    Ok(response["result"].clone())
}

/// `iris extrinsics`: print the calibration record, or `null`.
pub async fn cmd_extrinsics(socket_path: &str) -> anyhow::Result<()> {
    let calibration = rpc_call(socket_path, "get_extrinsics", serde_json::json!({})).await?;
    println!("{}", serde_json::to_string_pretty(&calibration)?);
    Ok(())
}

/// `iris status`
pub async fn cmd_status(socket_path: &str) -> anyhow::Result<()> {
    let status = rpc_call(socket_path, "stream_status", serde_json::json!({})).await?;
    println!("{}", format_status(&status));
    Ok(())
}

/// Pure formatting logic for status output, separated for testability.
pub(crate) fn format_status(status: &serde_json::Value) -> String {
    let source = status["source_mode"].as_str().unwrap_or("?");
    let startup = status["startup_mode"].as_str().unwrap_or("?");
    let stream = &status["stream"];

    let stream_line = match stream["state"].as_str() {
        Some("running") => {
            let since = stream["started_at"]
                .as_str()
                .and_then(|s| s.parse::<DateTime<Utc>>().ok())
                .map(|t| format!(" since {}", t.format("%H:%M:%S")))
                .unwrap_or_default();
            format!(
                "running ({} frames @ {} fps){since}",
                stream["frames"], stream["fps"]
            )
        }
        Some("disabled") => format!("disabled ({})", stream["reason"].as_str().unwrap_or("?")),
        Some(other) => other.to_string(),
        None => "unknown".to_string(),
    };

    let calibration = if status["calibration_available"].as_bool() == Some(true) {
        "available"
    } else {
        "unavailable"
    };

    let mut lines = Vec::new();
    if source == startup {
        lines.push(format!("source:      {source}"));
    } else {
        lines.push(format!("source:      {source} (started as {startup})"));
    }
    lines.push(format!("stream:      {stream_line}"));
    lines.push(format!("consumers:   {}", status["consumers"].as_u64().unwrap_or(0)));
    lines.push(format!("calibration: {calibration}"));
    lines.push(format!(
        "update:      {}",
        status["update_state"].as_str().unwrap_or("?")
    ));
    lines.join("\n")
}

/// `iris open <url>`
pub async fn cmd_open(socket_path: &str, url: &str) -> anyhow::Result<()> {
    let reply = rpc_call(
        socket_path,
        "open_external",
        serde_json::json!({ "url": url }),
    )
    .await?;
    if reply["ok"].as_bool() != Some(true) {
        anyhow::bail!(
            "could not open {url}: {}",
            reply["error"].as_str().unwrap_or("unknown error")
        );
    }
    Ok(())
}

/// `iris watch`: subscribe and print one pose frame per line.
///
/// The write half stays open; closing it is what detaches the consumer.
pub async fn cmd_watch(socket_path: &str, count: Option<usize>) -> anyhow::Result<()> {
    let stream = connect(socket_path).await?;
    let (reader, mut writer) = stream.into_split();

    let mut req = serde_json::to_string(&request("subscribe", serde_json::json!({})))?;
    req.push('\n');
    writer.write_all(req.as_bytes()).await?;

    let mut lines = BufReader::new(reader).lines();
    let Some(ack) = lines.next_line().await? else {
        anyhow::bail!("broker closed the connection");
    };
    let ack = result_of(serde_json::from_str(&ack)?)?;
    eprintln!(
        "subscribed as consumer-{} (stream {})",
        ack["consumer_id"],
        ack["stream"]["state"].as_str().unwrap_or("?")
    );

    let mut printed = 0usize;
    while count.is_none_or(|n| printed < n) {
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let msg: serde_json::Value = serde_json::from_str(&line)?;
        if msg["method"].as_str() != Some(FRAME_EVENT) {
            continue;
        }
        println!("{}", msg["params"]);
        printed += 1;
    }

    writer.shutdown().await?;
    Ok(())
}
