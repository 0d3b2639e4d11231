use std::time::Instant;

use axum::{extract::State, Json};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::ApiError;
use crate::metrics::MetricsResponse;
use crate::validation::TtsRequest;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct TtsResponse {
    /// 16-bit PCM WAV, base64.
    pub audio_base64: String,
    pub sample_rate: u32,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved_to: Option<String>,
    /// Set when `save_path` could not be written; the audio is still returned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub save_error: Option<String>,
}

pub async fn health_check() -> &'static str {
    "ok"
}

pub async fn tts_endpoint(
    State(state): State<AppState>,
    Json(req): Json<TtsRequest>,
) -> Result<Json<TtsResponse>, ApiError> {
    let start = Instant::now();
    let result = synthesize(&state, req).await;
    match &result {
        Ok(_) => state.metrics.tts.record_success(start.elapsed()),
        Err(_) => state.metrics.tts.record_error(),
    }
    result.map(Json)
}

async fn synthesize(state: &AppState, req: TtsRequest) -> Result<TtsResponse, ApiError> {
    let request = req.into_synthesis_request()?;
    info!(
        "TTS request: {} chars, spk_id={}, speed={}, volume={}, sample_rate={}",
        request.text.chars().count(),
        request.speaker_id,
        request.speed,
        request.volume,
        request.sample_rate
    );

    let engine = state.engine.clone();
    let output = tokio::task::spawn_blocking(move || {
        let mut engine = engine
            .lock()
            .map_err(|_| ApiError::InternalError("engine lock poisoned".to_string()))?;
        engine.synthesize(request).map_err(ApiError::from)
    })
    .await
    .map_err(|e| ApiError::InternalError(format!("synthesis task failed: {e}")))??;

    state.metrics.record_tts_samples(output.samples.len());
    let save_error = output.persistence_error.as_ref().map(|e| {
        warn!("Audio returned without saving: {e}");
        e.to_string()
    });

    Ok(TtsResponse {
        duration_ms: (output.duration_secs() * 1000.0).round() as u64,
        sample_rate: output.audio.sample_rate,
        audio_base64: output.audio.wav_base64,
        saved_to: output.saved_to.map(|p| p.display().to_string()),
        save_error,
    })
}

pub async fn metrics_endpoint(State(state): State<AppState>) -> Json<MetricsResponse> {
    Json(state.metrics.snapshot())
}
