//! Controller: one utterance in, at most one plan dispatched.
//!
//! retrieve context → ask the planner → validate → enqueue → remember.
//! Memory is only written after the queue has accepted the plan.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{MemoryError, PlanError, QueueError};
use crate::memory::PlanMemory;
use crate::plan::Plan;
use crate::planner::Planner;
use crate::queue::{QueueClient, TaskQueue};

/// Where validated plans are sent for execution.
#[async_trait]
pub trait PlanSink: Send + Sync {
    async fn dispatch(&self, plan: &str) -> Result<(), QueueError>;
}

#[async_trait]
impl PlanSink for QueueClient {
    async fn dispatch(&self, plan: &str) -> Result<(), QueueError> {
        self.add_task(plan).await
    }
}

#[async_trait]
impl PlanSink for TaskQueue {
    async fn dispatch(&self, plan: &str) -> Result<(), QueueError> {
        self.enqueue(plan.to_string()).await.map(|_| ())
    }
}

/// How a single turn ended.
#[derive(Debug)]
pub enum TurnOutcome {
    /// The planner returned an empty plan.
    NoAction,
    /// The planner output was not a valid plan; nothing was sent.
    Discarded(PlanError),
    /// The plan was valid but the queue did not accept it.
    DispatchFailed(QueueError),
    /// Sent and remembered.
    Dispatched { steps: usize, record_id: Uuid },
    /// Sent, but the memory write failed.
    DispatchedUnsaved { steps: usize, error: MemoryError },
}

impl TurnOutcome {
    /// Whether a plan reached the queue.
    pub fn was_dispatched(&self) -> bool {
        matches!(
            self,
            TurnOutcome::Dispatched { .. } | TurnOutcome::DispatchedUnsaved { .. }
        )
    }
}

impl fmt::Display for TurnOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnOutcome::NoAction => write!(f, "✅ AI decided no action was needed."),
            TurnOutcome::Discarded(e) => write!(f, "❌ AI returned an invalid plan ({e}). Discarding."),
            TurnOutcome::DispatchFailed(e) => write!(f, "❌ Dispatcher: could not send plan: {e}"),
            TurnOutcome::Dispatched { steps, .. } => {
                write!(f, "📡 Plan with {steps} step(s) sent. 🧠 Saved to memory.")
            }
            TurnOutcome::DispatchedUnsaved { steps, error } => write!(
                f,
                "📡 Plan with {steps} step(s) sent. ⚠️  Memory save failed: {error}"
            ),
        }
    }
}

/// Orchestrates a turn.
pub struct Controller {
    memory: PlanMemory,
    planner: Planner,
    sink: Arc<dyn PlanSink>,
    memory_results: usize,
}

impl Controller {
    pub fn new(memory: PlanMemory, planner: Planner, sink: Arc<dyn PlanSink>) -> Self {
        Self {
            memory,
            planner,
            sink,
            memory_results: 2,
        }
    }

    pub fn with_memory_results(mut self, k: usize) -> Self {
        self.memory_results = k;
        self
    }

    /// Process one utterance.
    pub async fn handle(&self, utterance: &str) -> TurnOutcome {
        let context = self.memory.retrieve(utterance, self.memory_results).await;
        let plan_text = self.planner.get_plan(utterance, &context).await;

        let plan = match Plan::parse(&plan_text) {
            Ok(plan) => plan,
            Err(e) => {
                warn!(error = %e, plan = %plan_text, "Discarding invalid plan");
                return TurnOutcome::Discarded(e);
            }
        };

        if plan.is_empty() {
            info!("No action needed");
            return TurnOutcome::NoAction;
        }

        if let Err(e) = self.sink.dispatch(&plan_text).await {
            error!(error = %e, "Failed to dispatch plan");
            return TurnOutcome::DispatchFailed(e);
        }
        info!(steps = plan.len(), "Plan dispatched");

        match self.memory.save(utterance, &plan_text).await {
            Ok(record) => TurnOutcome::Dispatched {
                steps: plan.len(),
                record_id: record.id,
            },
            Err(e) => {
                warn!(error = %e, "Plan dispatched but memory save failed");
                TurnOutcome::DispatchedUnsaved {
                    steps: plan.len(),
                    error: e,
                }
            }
        }
    }
}
