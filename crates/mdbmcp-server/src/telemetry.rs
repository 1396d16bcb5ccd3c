//! Buffered telemetry emission.
//!
//! Events queue in memory and flush in the background. The device id is
//! resolved once, asynchronously, with a bounded timeout; until it
//! resolves, events wait in the buffer. Flushes authenticate with the
//! Atlas service account when one is configured and fall back to the
//! unauthenticated endpoint on 401. Failed flushes re-queue.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use reqwest::StatusCode;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use mdbmcp_core::config::UserConfig;
use mdbmcp_core::{device_id, CommonProperties, LogId, Logger, TelemetryEvent, SERVER_NAME, SERVER_VERSION};

/// Ingestion path relative to the API base URL.
const TELEMETRY_PATH: &str = "api/private/unauth/telemetry/events";

/// Events buffered before the oldest are dropped.
const CACHE_CAPACITY: usize = 1000;

/// Background flush cadence.
const FLUSH_INTERVAL: Duration = Duration::from_secs(5);

pub struct TelemetryService {
    enabled: bool,
    config: Arc<UserConfig>,
    logger: Logger,
    common: RwLock<CommonProperties>,
    cache: Mutex<VecDeque<TelemetryEvent>>,
    device_id_ready: tokio::sync::Notify,
    http: reqwest::Client,
    shutdown: CancellationToken,
}

impl TelemetryService {
    pub fn new(config: Arc<UserConfig>, logger: Logger) -> Arc<Self> {
        let enabled = config.telemetry_enabled();
        let service = Arc::new(Self {
            enabled,
            config,
            logger,
            common: RwLock::new(CommonProperties {
                mcp_server_name: SERVER_NAME.to_string(),
                mcp_server_version: SERVER_VERSION.to_string(),
                ..CommonProperties::default()
            }),
            cache: Mutex::new(VecDeque::new()),
            device_id_ready: tokio::sync::Notify::new(),
            http: reqwest::Client::new(),
            shutdown: CancellationToken::new(),
        });
        if enabled {
            service.clone().spawn_background();
        }
        service
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Record session-level common properties (transport, session id,
    /// client identity, policy hints).
    pub fn update_common(&self, update: impl FnOnce(&mut CommonProperties)) {
        let mut common = self.common.write().unwrap_or_else(|e| e.into_inner());
        update(&mut common);
    }

    pub fn device_id(&self) -> Option<String> {
        self.common
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .device_id
            .clone()
    }

    /// Append an event to the buffer. Never blocks, never fails; when the
    /// buffer is full the oldest event is dropped.
    pub fn emit(&self, event: TelemetryEvent) {
        if !self.enabled {
            return;
        }
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        if cache.len() >= CACHE_CAPACITY {
            cache.pop_front();
        }
        cache.push_back(event);
    }

    pub fn buffered(&self) -> usize {
        self.cache.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn spawn_background(self: Arc<Self>) {
        let cancel = self.shutdown.clone();
        tokio::spawn(async move {
            // Device-id resolution gates the first flush.
            tokio::select! {
                resolved = device_id::resolve_device_id() => {
                    match resolved {
                        Some(id) => self.update_common(|c| c.device_id = Some(id)),
                        None => self.logger.debug(
                            LogId::DEVICE_ID_TIMEOUT,
                            "telemetry",
                            "Device id resolution timed out; events are sent without one",
                        ),
                    }
                }
                () = cancel.cancelled() => return,
            }
            self.device_id_ready.notify_waiters();

            let mut ticker = tokio::time::interval(FLUSH_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    () = cancel.cancelled() => {
                        // Final best-effort flush on shutdown.
                        self.flush().await;
                        return;
                    }
                }
                self.flush().await;
            }
        });
    }

    /// Attempt to POST everything buffered; re-queue on failure.
    pub async fn flush(&self) {
        let batch: Vec<TelemetryEvent> = {
            let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
            cache.drain(..).collect()
        };
        if batch.is_empty() {
            return;
        }

        let common = self
            .common
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        let payload: Vec<TelemetryEvent> = batch
            .iter()
            .cloned()
            .map(|event| event.with_common(&common))
            .collect();

        match self.post(&payload).await {
            Ok(()) => debug!(events = payload.len(), "[Telemetry] Flushed"),
            Err(reason) => {
                self.logger.debug(
                    LogId::TELEMETRY_EMIT_FAILURE,
                    "telemetry",
                    format!("Telemetry flush failed, re-queueing: {reason}"),
                );
                let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
                for event in batch.into_iter().rev() {
                    if cache.len() >= CACHE_CAPACITY {
                        break;
                    }
                    cache.push_front(event);
                }
            }
        }
    }

    async fn post(&self, events: &[TelemetryEvent]) -> Result<(), String> {
        let url = format!("{}{}", base_url(&self.config.api_base_url), TELEMETRY_PATH);

        // Authenticated first when credentials exist; 401 falls back to
        // the unauthenticated endpoint.
        if let (Some(id), Some(secret)) =
            (&self.config.api_client_id, &self.config.api_client_secret)
        {
            let response = self
                .http
                .post(&url)
                .basic_auth(id, Some(secret))
                .json(events)
                .send()
                .await
                .map_err(|e| e.to_string())?;
            match response.status() {
                status if status.is_success() => return Ok(()),
                StatusCode::UNAUTHORIZED => {
                    warn!("[Telemetry] Authenticated ingest rejected, retrying unauthenticated");
                }
                status => return Err(format!("ingest returned {status}")),
            }
        }

        let response = self
            .http
            .post(&url)
            .json(events)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(format!("ingest returned {}", response.status()))
        }
    }

    pub fn close(&self) {
        self.shutdown.cancel();
    }
}

fn base_url(configured: &str) -> String {
    if configured.ends_with('/') {
        configured.to_string()
    } else {
        format!("{configured}/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdbmcp_core::TelemetryResult;

    fn disabled_config() -> Arc<UserConfig> {
        Arc::new(UserConfig {
            telemetry: mdbmcp_core::TelemetryMode::Disabled,
            ..UserConfig::default()
        })
    }

    #[tokio::test]
    async fn disabled_service_drops_events() {
        let service = TelemetryService::new(disabled_config(), Logger::disabled());
        service.emit(TelemetryEvent::tool_event(
            "find",
            "mongodb",
            1,
            TelemetryResult::Success,
        ));
        assert_eq!(service.buffered(), 0);
    }

    #[tokio::test]
    async fn buffer_is_bounded() {
        // Enabled service but no background task interference: events
        // accumulate faster than any flush to an unroutable URL succeeds.
        let config = Arc::new(UserConfig {
            api_base_url: "http://127.0.0.1:1/".to_string(),
            ..UserConfig::default()
        });
        let service = TelemetryService::new(config, Logger::disabled());
        if !service.is_enabled() {
            // DO_NOT_TRACK in the environment; nothing to assert.
            return;
        }
        for i in 0..(CACHE_CAPACITY + 10) {
            service.emit(
                TelemetryEvent::tool_event("find", "mongodb", i as u64, TelemetryResult::Success),
            );
        }
        assert!(service.buffered() <= CACHE_CAPACITY);
        service.close();
    }

    #[test]
    fn base_url_gets_a_trailing_slash() {
        assert_eq!(base_url("https://cloud.mongodb.com"), "https://cloud.mongodb.com/");
        assert_eq!(base_url("https://cloud.mongodb.com/"), "https://cloud.mongodb.com/");
    }
}
