//! Per-unit progress events for batch operations.
//!
//! Batch runs record one [`ProgressEvent`] per unit of work. The caller gets
//! them back in the [`BatchReport`], and can also watch them live through a
//! channel passed to [`ProgressLog::with_channel`].

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Fund,
    Buy,
    Sell,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    pub stage: Stage,
    /// Position of this unit in the batch, starting at 1.
    pub step: usize,
    pub total: usize,
    pub wallet: String,
    pub success: bool,
    pub signature: Option<String>,
    pub attempts: u32,
    pub error: Option<String>,
}

pub type ProgressSender = mpsc::UnboundedSender<ProgressEvent>;
pub type ProgressReceiver = mpsc::UnboundedReceiver<ProgressEvent>;

#[derive(Debug, Default)]
pub struct ProgressLog {
    events: Vec<ProgressEvent>,
    live: Option<ProgressSender>,
}

impl ProgressLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_channel(live: ProgressSender) -> Self {
        Self {
            events: Vec::new(),
            live: Some(live),
        }
    }

    pub fn record(&mut self, event: ProgressEvent) {
        if event.success {
            info!(
                stage = ?event.stage,
                step = event.step,
                total = event.total,
                wallet = %event.wallet,
                signature = ?event.signature,
                "unit done"
            );
        } else {
            warn!(
                stage = ?event.stage,
                step = event.step,
                total = event.total,
                wallet = %event.wallet,
                error = ?event.error,
                "unit failed"
            );
        }
        if let Some(tx) = &self.live {
            // a dropped receiver only stops live updates
            let _ = tx.send(event.clone());
        }
        self.events.push(event);
    }

    pub fn finish(self) -> BatchReport {
        BatchReport { events: self.events }
    }
}

/// What a batch run did, one event per unit.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub events: Vec<ProgressEvent>,
}

impl BatchReport {
    pub fn events(&self) -> impl Iterator<Item = &ProgressEvent> {
        self.events.iter()
    }

    pub fn succeeded(&self) -> usize {
        self.events.iter().filter(|e| e.success).count()
    }

    pub fn failed(&self) -> usize {
        self.events.len() - self.succeeded()
    }

    pub fn total(&self) -> usize {
        self.events.len()
    }
}
