//! WebSocket streaming synthesis.
//!
//! The client sends one JSON [`TtsRequest`]. The server answers with a
//! `metadata` message, one `chunk` message per trimmed chunk (base64 16-bit
//! little-endian PCM at the model's rate), then `complete` with the total
//! duration. Failures are reported as an `error` message and the socket is
//! closed. Closing the socket early cancels the remaining synthesis.

use std::sync::Mutex;
use std::time::Instant;

use futures_util::SinkExt;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tracing::{debug, error, info, warn};
use tts_engine::{wav::encode_pcm_base64, SynthesisRequest, TtsEngine};

use crate::error::ApiError;
use crate::validation::TtsRequest;
use crate::AppState;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    Metadata {
        sample_rate: u32,
        format: &'static str,
    },
    Chunk {
        /// Position in the whole stream.
        index: usize,
        sentence: usize,
        chunk: usize,
        chunk_count: usize,
        samples: usize,
        audio: String,
    },
    Complete {
        chunks: usize,
        duration: f64,
        first_chunk_ms: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        saved_to: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        save_error: Option<String>,
    },
    Error {
        error: String,
        code: u16,
    },
}

impl From<&ApiError> for StreamEvent {
    fn from(e: &ApiError) -> Self {
        StreamEvent::Error {
            error: e.to_string(),
            code: e.status().as_u16(),
        }
    }
}

pub async fn stream_ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let start = Instant::now();
    let request = match read_request(&mut socket).await {
        Some(Ok(request)) => request,
        Some(Err(e)) => {
            state.metrics.stream.record_error();
            let _ = send_event(&mut socket, &StreamEvent::from(&e)).await;
            let _ = socket.close().await;
            return;
        }
        None => return,
    };

    let (tx, mut rx) = mpsc::channel::<StreamEvent>(16);
    let engine = state.engine.clone();
    let task = tokio::task::spawn_blocking(move || run_stream(&engine, request, &tx));

    let mut failed = false;
    let mut first_chunk_seen = false;
    while let Some(event) = rx.recv().await {
        match &event {
            StreamEvent::Chunk { samples, .. } => {
                state.metrics.record_chunk(*samples);
                if !first_chunk_seen {
                    first_chunk_seen = true;
                    state.metrics.first_chunk.record(start.elapsed());
                }
            }
            StreamEvent::Error { .. } => failed = true,
            _ => {}
        }
        if let Err(e) = send_event(&mut socket, &event).await {
            warn!("Failed to send WS message: {e}");
            failed = true;
            break;
        }
    }
    // lets the synthesis task see the closed channel and stop
    drop(rx);
    if let Some(event) = join_failure(task.await) {
        failed = true;
        let _ = send_event(&mut socket, &event).await;
    }

    if failed {
        state.metrics.stream.record_error();
    } else {
        state.metrics.stream.record_success(start.elapsed());
    }
    let _ = socket.close().await;
}

/// Error event for a synthesis task that panicked or was cancelled.
fn join_failure(result: Result<(), JoinError>) -> Option<StreamEvent> {
    let e = result.err()?;
    error!("Streaming synthesis task failed: {e}");
    Some(StreamEvent::from(&ApiError::InternalError(format!(
        "synthesis task failed: {e}"
    ))))
}

async fn read_request(socket: &mut WebSocket) -> Option<Result<SynthesisRequest, ApiError>> {
    loop {
        let message = match socket.recv().await? {
            Ok(message) => message,
            Err(e) => {
                debug!("WebSocket closed before a request arrived: {e}");
                return None;
            }
        };
        let parsed = match message {
            Message::Text(text) => serde_json::from_str::<TtsRequest>(text.as_str())
                .map_err(|e| ApiError::InvalidInput(format!("Invalid request: {e}"))),
            Message::Binary(bytes) => serde_json::from_slice::<TtsRequest>(&bytes)
                .map_err(|e| ApiError::InvalidInput(format!("Invalid request: {e}"))),
            Message::Ping(_) | Message::Pong(_) => continue,
            Message::Close(_) => return None,
        };
        return Some(parsed.and_then(TtsRequest::into_synthesis_request));
    }
}

async fn send_event(socket: &mut WebSocket, event: &StreamEvent) -> Result<(), axum::Error> {
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(e) => {
            warn!("Failed to serialize stream event: {e}");
            return Ok(());
        }
    };
    socket.send(Message::Text(text.into())).await
}

/// Drive one synthesis and forward its events. Runs on a blocking thread;
/// returns early once the receiver is gone, which drops the stream and
/// cancels the remaining chunks.
pub fn run_stream(engine: &Mutex<TtsEngine>, request: SynthesisRequest, tx: &mpsc::Sender<StreamEvent>) {
    let fail = |e: ApiError| {
        let _ = tx.blocking_send(StreamEvent::from(&e));
    };

    let mut engine = match engine.lock() {
        Ok(engine) => engine,
        Err(_) => return fail(ApiError::InternalError("engine lock poisoned".to_string())),
    };
    let save_requested = request.save_path.is_some();
    let mut stream = match engine.run(request) {
        Ok(stream) => stream,
        Err(e) => return fail(e.into()),
    };

    let metadata = StreamEvent::Metadata {
        sample_rate: stream.sample_rate(),
        format: "pcm_s16le",
    };
    if tx.blocking_send(metadata).is_err() {
        return;
    }

    let mut index = 0;
    while let Some(chunk) = stream.next_chunk() {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => return fail(e.into()),
        };
        let event = StreamEvent::Chunk {
            index,
            sentence: chunk.sentence,
            chunk: chunk.chunk,
            chunk_count: chunk.chunk_count,
            samples: chunk.samples.len(),
            audio: encode_pcm_base64(&chunk.samples),
        };
        if tx.blocking_send(event).is_err() {
            info!("Client went away after {index} chunk(s), cancelling synthesis");
            return;
        }
        index += 1;
    }

    let duration = stream.duration_secs();
    let first_chunk_ms = stream.timings().first_chunk.map(|d| d.as_millis() as u64);
    let (saved_to, save_error) = if save_requested {
        match stream.finish() {
            Ok(output) => (
                output.saved_to.map(|p| p.display().to_string()),
                output.persistence_error.map(|e| e.to_string()),
            ),
            Err(e) => return fail(e.into()),
        }
    } else {
        (None, None)
    };

    let _ = tx.blocking_send(StreamEvent::Complete {
        chunks: index,
        duration,
        first_chunk_ms,
        saved_to,
        save_error,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_panicked_task_becomes_error_event() {
        let result = tokio::task::spawn_blocking(|| panic!("vocoder blew up")).await;
        match join_failure(result) {
            Some(StreamEvent::Error { error, code }) => {
                assert_eq!(code, 500);
                assert!(error.contains("synthesis task failed"));
            }
            other => panic!("expected error event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_finished_task_sends_nothing() {
        let result = tokio::task::spawn_blocking(|| ()).await;
        assert!(join_failure(result).is_none());
    }
}
