//! UDS JSON-RPC server: minimal hand-rolled implementation.
//! Connection-per-request, newline-delimited JSON. `subscribe` keeps its
//! connection open and pushes `iris-data` notifications until either side
//! closes.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio_util::sync::CancellationToken;

use iris_core::{ChannelConsumer, ConsumerId, UpdateEvent, open_external};

use crate::broker::BrokerState;

/// Push notification method carrying one pose frame.
pub const FRAME_EVENT: &str = "iris-data";

/// Frames buffered per subscriber before new ones are dropped.
const FRAME_BUFFER: usize = 8;

const PARSE_ERROR: i64 = -32700;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;
const INTERNAL_ERROR: i64 = -32603;
/// The bundled mock calibration failed to load at startup.
const CALIBRATION_UNAVAILABLE: i64 = -32001;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcError {
    fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    fn internal(err: impl std::fmt::Display) -> Self {
        Self::new(INTERNAL_ERROR, err.to_string())
    }
}

/// Run the UDS JSON-RPC server until `cancel` fires.
pub async fn run_server(
    socket_path: &str,
    state: Arc<BrokerState>,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    // Create socket directory with mode 0700
    let socket_dir = std::path::Path::new(socket_path)
        .parent()
        .ok_or_else(|| anyhow::anyhow!("invalid socket path"))?;

    std::fs::create_dir_all(socket_dir)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(socket_dir, std::fs::Permissions::from_mode(0o700))?;
    }

    // Check for stale socket
    if std::path::Path::new(socket_path).exists() {
        if tokio::net::UnixStream::connect(socket_path).await.is_err() {
            std::fs::remove_file(socket_path)?;
            tracing::info!("removed stale socket at {socket_path}");
        } else {
            anyhow::bail!("another broker is already running at {socket_path}");
        }
    }

    let listener = UnixListener::bind(socket_path)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
    }

    tracing::info!("UDS server listening on {socket_path}");
    serve(listener, state, cancel).await
}

pub(crate) async fn serve(
    listener: UnixListener,
    state: Arc<BrokerState>,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    loop {
        let (stream, _) = tokio::select! {
            () = cancel.cancelled() => return Ok(()),
            accepted = listener.accept() => accepted?,
        };
        let state = Arc::clone(&state);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, state, cancel).await {
                tracing::debug!("connection error: {e}");
            }
        });
    }
}

async fn handle_connection(
    stream: tokio::net::UnixStream,
    state: Arc<BrokerState>,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    reader.read_line(&mut line).await?;

    let request: serde_json::Value = match serde_json::from_str(line.trim()) {
        Ok(v) => v,
        Err(e) => {
            let response = error_response(
                &serde_json::Value::Null,
                &RpcError::new(PARSE_ERROR, format!("parse error: {e}")),
            );
            return write_line(&mut writer, &response).await;
        }
    };
    let method = request["method"].as_str().unwrap_or("");
    let id = request["id"].clone();

    if method == "subscribe" {
        return subscribe(reader, writer, id, &state, cancel).await;
    }

    let response = match dispatch(&state, method, &request["params"]).await {
        Ok(result) => serde_json::json!({
            "jsonrpc": "2.0",
            "result": result,
            "id": id,
        }),
        Err(err) => error_response(&id, &err),
    };
    write_line(&mut writer, &response).await
}

/// Handle a single request/response method.
pub(crate) async fn dispatch(
    state: &BrokerState,
    method: &str,
    params: &serde_json::Value,
) -> Result<serde_json::Value, RpcError> {
    match method {
        "get_extrinsics" => {
            let Some(provider) = state.calibration.clone() else {
                return Err(RpcError::new(
                    CALIBRATION_UNAVAILABLE,
                    "calibration unavailable",
                ));
            };
            let data = tokio::task::spawn_blocking(move || provider.get_calibration())
                .await
                .map_err(RpcError::internal)?;
            serde_json::to_value(data).map_err(RpcError::internal)
        }
        "stream_status" => {
            let stream = state.streamer.lock().await.status().clone();
            let update_state = state.updates.lock().await.state();
            Ok(serde_json::json!({
                "stream": stream,
                "source_mode": state.detector.detect(),
                "startup_mode": state.startup_mode,
                "consumers": state.registry.len(),
                "calibration_available": state.calibration.is_some(),
                "update_state": update_state,
            }))
        }
        "focus_consumer" => {
            let id = params["consumer_id"]
                .as_u64()
                .ok_or_else(|| RpcError::new(INVALID_PARAMS, "missing consumer_id"))?;
            Ok(serde_json::json!({ "ok": state.registry.focus(ConsumerId(id)) }))
        }
        "update_event" => {
            let event: UpdateEvent = serde_json::from_value(params.clone())
                .map_err(|e| RpcError::new(INVALID_PARAMS, format!("invalid update event: {e}")))?;
            let new_state = state.updates.lock().await.handle(&event);
            Ok(serde_json::json!({ "state": new_state }))
        }
        "open_external" => {
            let url = params["url"].as_str().unwrap_or_default().to_string();
            let opener = Arc::clone(&state.opener);
            let reply = tokio::task::spawn_blocking(move || open_external(opener.as_ref(), &url))
                .await
                .map_err(RpcError::internal)?;
            serde_json::to_value(reply).map_err(RpcError::internal)
        }
        _ => Err(RpcError::new(METHOD_NOT_FOUND, "method not found")),
    }
}

/// Register the connection as a pose consumer and push frames until the
/// client disconnects or the broker shuts down.
async fn subscribe(
    reader: BufReader<OwnedReadHalf>,
    mut writer: OwnedWriteHalf,
    id: serde_json::Value,
    state: &BrokerState,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let (consumer, frames) = ChannelConsumer::channel(FRAME_BUFFER);
    let consumer_id = state.registry.register(Arc::new(consumer));
    tracing::info!(%consumer_id, "UI consumer attached");

    let stream = state.streamer.lock().await.status().clone();
    let ack = serde_json::json!({
        "jsonrpc": "2.0",
        "result": { "consumer_id": consumer_id, "stream": stream },
        "id": id,
    });

    let result = match write_line(&mut writer, &ack).await {
        Ok(()) => pump_frames(reader, &mut writer, frames, consumer_id, state, cancel).await,
        Err(e) => Err(e),
    };

    state.registry.unregister(consumer_id);
    tracing::info!(%consumer_id, "UI consumer detached");
    result
}

async fn pump_frames(
    reader: BufReader<OwnedReadHalf>,
    writer: &mut OwnedWriteHalf,
    mut frames: tokio::sync::mpsc::Receiver<iris_core::PoseFrame>,
    consumer_id: ConsumerId,
    state: &BrokerState,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let mut lines = reader.lines();
    loop {
        tokio::select! {
            () = cancel.cancelled() => return Ok(()),
            frame = frames.recv() => {
                let Some(frame) = frame else { return Ok(()) };
                let notification = serde_json::json!({
                    "jsonrpc": "2.0",
                    "method": FRAME_EVENT,
                    "params": frame,
                });
                write_line(writer, &notification).await?;
            }
            line = lines.next_line() => {
                let Some(line) = line? else { return Ok(()) };
                // The only in-band request is "focus": make this surface active.
                let msg: serde_json::Value = serde_json::from_str(line.trim()).unwrap_or_default();
                if msg["method"].as_str() == Some("focus") {
                    state.registry.focus(consumer_id);
                }
            }
        }
    }
}

fn error_response(id: &serde_json::Value, err: &RpcError) -> serde_json::Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "error": { "code": err.code, "message": err.message },
        "id": id,
    })
}

async fn write_line(writer: &mut OwnedWriteHalf, value: &serde_json::Value) -> anyhow::Result<()> {
    let mut resp = serde_json::to_string(value)?;
    resp.push('\n');
    writer.write_all(resp.as_bytes()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::tests::{config_with_assets, state_with};
    use crate::client::rpc_call;
    use iris_core::{SourceMode, UpdateState};
    use std::time::Duration;
    use tokio::net::UnixStream;

    struct TestServer {
        socket_path: String,
        cancel: CancellationToken,
        state: Arc<BrokerState>,
        _dir: tempfile::TempDir,
    }

    async fn start_test_server(mode: SourceMode) -> TestServer {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = config_with_assets(dir.path());
        let state = state_with(&config, mode);
        let socket_path = dir.path().join("irisd.sock").to_string_lossy().into_owned();
        let listener = UnixListener::bind(&socket_path).expect("bind");
        let cancel = CancellationToken::new();
        tokio::spawn(serve(listener, Arc::clone(&state), cancel.clone()));
        TestServer {
            socket_path,
            cancel,
            state,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn get_extrinsics_mock_mode() {
        let server = start_test_server(SourceMode::Mock).await;
        let result = rpc_call(&server.socket_path, "get_extrinsics", serde_json::json!({}))
            .await
            .expect("rpc");
        assert_eq!(result["cameras"][0]["id"], "mock-cam");
        server.cancel.cancel();
    }

    #[tokio::test]
    async fn get_extrinsics_live_without_file_is_null() {
        let server = start_test_server(SourceMode::Live).await;
        let result = rpc_call(&server.socket_path, "get_extrinsics", serde_json::json!({}))
            .await
            .expect("rpc");
        assert!(result.is_null());
        server.cancel.cancel();
    }

    #[tokio::test]
    async fn dispatch_calibration_unavailable_is_distinct_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = config_with_assets(dir.path());
        std::fs::remove_file(config.mock_calibration_path()).expect("remove");
        let state = state_with(&config, SourceMode::Mock);

        let err = dispatch(&state, "get_extrinsics", &serde_json::Value::Null)
            .await
            .expect_err("disabled");
        assert_eq!(err.code, CALIBRATION_UNAVAILABLE);
    }

    #[tokio::test]
    async fn unknown_method_is_not_found() {
        let server = start_test_server(SourceMode::Mock).await;
        let err = rpc_call(&server.socket_path, "launch_rockets", serde_json::json!({}))
            .await
            .expect_err("not found");
        assert!(err.to_string().contains("method not found"));
        server.cancel.cancel();
    }

    #[tokio::test]
    async fn stream_status_reports_modes() {
        let server = start_test_server(SourceMode::Mock).await;
        let result = rpc_call(&server.socket_path, "stream_status", serde_json::json!({}))
            .await
            .expect("rpc");
        assert_eq!(result["stream"]["state"], "running");
        assert_eq!(result["stream"]["frames"], 3);
        assert_eq!(result["source_mode"], "mock");
        assert_eq!(result["consumers"], 0);
        assert_eq!(result["calibration_available"], true);
        assert_eq!(result["update_state"], "idle");
        server.cancel.cancel();
    }

    #[tokio::test]
    async fn update_event_advances_state() {
        let server = start_test_server(SourceMode::Mock).await;
        let result = rpc_call(
            &server.socket_path,
            "update_event",
            serde_json::json!({ "event": "update-available", "version": "2.0.0" }),
        )
        .await
        .expect("rpc");
        assert_eq!(result["state"], "available");
        assert_eq!(server.state.updates.lock().await.state(), UpdateState::Available);

        let err = rpc_call(
            &server.socket_path,
            "update_event",
            serde_json::json!({ "event": "bogus" }),
        )
        .await
        .expect_err("invalid params");
        assert!(err.to_string().contains("invalid update event"));
        server.cancel.cancel();
    }

    #[tokio::test]
    async fn open_external_never_fails_the_call() {
        let server = start_test_server(SourceMode::Mock).await;
        let ok = rpc_call(
            &server.socket_path,
            "open_external",
            serde_json::json!({ "url": "https://example.com" }),
        )
        .await
        .expect("rpc");
        assert_eq!(ok, serde_json::json!({ "ok": true }));

        let bad = rpc_call(&server.socket_path, "open_external", serde_json::json!({}))
            .await
            .expect("rpc");
        assert_eq!(bad["ok"], false);
        assert!(bad["error"].as_str().is_some());
        server.cancel.cancel();
    }

    #[tokio::test]
    async fn malformed_request_gets_parse_error() {
        let server = start_test_server(SourceMode::Mock).await;
        let mut stream = UnixStream::connect(&server.socket_path).await.expect("connect");
        stream.write_all(b"{ nope\n").await.expect("write");
        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        reader.read_line(&mut line).await.expect("read");
        let resp: serde_json::Value = serde_json::from_str(line.trim()).expect("json");
        assert_eq!(resp["error"]["code"], PARSE_ERROR);
        server.cancel.cancel();
    }

    #[tokio::test]
    async fn subscribe_pushes_frames_and_detaches_on_close() {
        let server = start_test_server(SourceMode::Mock).await;
        let mut stream = UnixStream::connect(&server.socket_path).await.expect("connect");
        stream
            .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"subscribe\",\"params\":{}}\n")
            .await
            .expect("write");
        let mut lines = BufReader::new(stream).lines();

        let ack = lines.next_line().await.expect("read").expect("ack line");
        let ack: serde_json::Value = serde_json::from_str(&ack).expect("json");
        assert_eq!(ack["result"]["consumer_id"], 0);
        assert_eq!(ack["result"]["stream"]["state"], "running");

        for _ in 0..3 {
            let line = tokio::time::timeout(Duration::from_secs(2), lines.next_line())
                .await
                .expect("frame in time")
                .expect("read")
                .expect("frame line");
            let msg: serde_json::Value = serde_json::from_str(&line).expect("json");
            assert_eq!(msg["method"], FRAME_EVENT);
            assert!(["A", "B", "C"].contains(&msg["params"]["id"].as_str().expect("id")));
        }
        assert_eq!(server.state.registry.len(), 1);

        drop(lines);
        let detached = async {
            while !server.state.registry.is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };
        tokio::time::timeout(Duration::from_secs(2), detached)
            .await
            .expect("consumer unregistered");
        server.cancel.cancel();
    }
}
