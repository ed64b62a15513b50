//! Coarse progress events for whoever watches a running check.

use crate::model::{CheckWarning, WarningKind};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{info, warn};
use util::ws::WebSocketManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Running,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressPayload {
    pub state: Phase,
    pub messages: Vec<String>,
}

#[derive(Debug, Error)]
#[error("{0}")]
pub struct NotifyError(pub String);

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, topic: &str, payload: &ProgressPayload) -> Result<(), NotifyError>;
}

/// Topic carrying the progress of checks for one exercise.
pub fn topic(exercise_id: i64) -> String {
    format!("ws/exercises/{exercise_id}/plagiarism-check")
}

#[async_trait]
impl Notifier for WebSocketManager {
    async fn notify(&self, topic: &str, payload: &ProgressPayload) -> Result<(), NotifyError> {
        util::ws::emit(self, topic, "plagiarism.progress", payload)
            .await
            .map(|_| ())
            .map_err(|e| NotifyError(e.to_string()))
    }
}

/// Writes progress to the log; used by the CLI.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, topic: &str, payload: &ProgressPayload) -> Result<(), NotifyError> {
        info!(topic, state = ?payload.state, messages = ?payload.messages, "Plagiarism check progress");
        Ok(())
    }
}

/// Sends progress for one check. Failures become warnings, never errors.
pub struct ProgressReporter {
    notifier: Arc<dyn Notifier>,
    topic: String,
    warnings: Mutex<Vec<CheckWarning>>,
}

impl ProgressReporter {
    pub fn new(notifier: Arc<dyn Notifier>, exercise_id: i64) -> Self {
        Self {
            notifier,
            topic: topic(exercise_id),
            warnings: Mutex::new(Vec::new()),
        }
    }

    pub async fn running(&self, message: impl Into<String>) {
        self.send(Phase::Running, vec![message.into()]).await;
    }

    pub async fn completed(&self, messages: Vec<String>) {
        self.send(Phase::Completed, messages).await;
    }

    async fn send(&self, state: Phase, messages: Vec<String>) {
        let payload = ProgressPayload { state, messages };
        if let Err(e) = self.notifier.notify(&self.topic, &payload).await {
            warn!(topic = %self.topic, error = %e, "Failed to publish plagiarism progress");
            if let Ok(mut w) = self.warnings.lock() {
                w.push(CheckWarning::new(WarningKind::NotifyFailed, &self.topic, e.to_string()));
            }
        }
    }

    pub fn take_warnings(&self) -> Vec<CheckWarning> {
        self.warnings
            .lock()
            .map(|mut w| std::mem::take(&mut *w))
            .unwrap_or_default()
    }
}
