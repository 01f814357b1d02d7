//! Executor: polls the task queue and carries out each plan on the desktop.
//!
//! One iteration: check the shutdown flag, poll once, run any plan that came
//! back, then sleep. An unreachable queue gets a longer sleep and is retried
//! forever.

pub mod desktop;

pub use desktop::{Desktop, DryRunDesktop, SystemDesktop};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tracing::{error, info, warn};

use crate::config::ExecutorConfig;
use crate::error::{PlanError, QueueError};
use crate::plan::parse_raw_steps;
use crate::queue::{QueueClient, TaskPoll, TaskQueue};

/// Where the executor gets its work from.
#[async_trait]
pub trait TaskSource: Send + Sync {
    async fn next_task(&self) -> Result<TaskPoll, QueueError>;
}

#[async_trait]
impl TaskSource for QueueClient {
    async fn next_task(&self) -> Result<TaskPoll, QueueError> {
        self.get_task().await
    }
}

#[async_trait]
impl TaskSource for TaskQueue {
    async fn next_task(&self) -> Result<TaskPoll, QueueError> {
        Ok(match self.dequeue().await {
            Some(plan) => TaskPoll::NewTask(plan),
            None => TaskPoll::NoTask,
        })
    }
}

/// The step that stopped a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepFailure {
    pub index: usize,
    pub tool: String,
    pub reason: String,
}

/// What happened to each step of a plan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionReport {
    /// Steps whose action was issued successfully.
    pub executed: usize,
    /// Tool names of steps skipped because the tool is not in the registry.
    pub skipped: Vec<String>,
    /// The first failing step. Later steps were not attempted.
    pub failed: Option<StepFailure>,
}

impl ExecutionReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_none()
    }
}

/// Outcome of a single poll.
#[derive(Debug)]
pub enum PollOutcome {
    /// The queue was empty.
    Idle,
    /// A plan was dequeued and run.
    Executed(ExecutionReport),
    /// A plan was dequeued but was not a list of steps; it is gone.
    Dropped(PlanError),
    /// The queue could not be polled.
    QueueFailed(QueueError),
}

/// Handle used to stop a running executor.
#[derive(Clone)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

impl ShutdownHandle {
    /// Ask the loop to stop at its next iteration. Interrupts a pending sleep.
    pub fn shutdown(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.wake.notify_one();
    }

    pub fn is_shutdown(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Polling executor.
pub struct Executor {
    source: Arc<dyn TaskSource>,
    desktop: Arc<dyn Desktop>,
    poll_interval: Duration,
    offline_backoff: Duration,
    shutdown: ShutdownHandle,
}

impl Executor {
    pub fn new(
        source: Arc<dyn TaskSource>,
        desktop: Arc<dyn Desktop>,
        config: &ExecutorConfig,
    ) -> Self {
        Self {
            source,
            desktop,
            poll_interval: config.poll_interval,
            offline_backoff: config.offline_backoff,
            shutdown: ShutdownHandle {
                flag: Arc::new(AtomicBool::new(false)),
                wake: Arc::new(Notify::new()),
            },
        }
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Run until shut down. Never returns on queue errors.
    pub async fn run(&self) {
        info!(
            poll_interval_secs = self.poll_interval.as_secs_f32(),
            "Desktop agent activated, polling for tasks"
        );

        while !self.shutdown.is_shutdown() {
            let wait = match self.poll_once().await {
                PollOutcome::QueueFailed(e) if e.is_transport() => {
                    warn!(error = %e, "Queue server offline, retrying");
                    self.offline_backoff
                }
                PollOutcome::QueueFailed(e) => {
                    error!(error = %e, "Queue poll failed");
                    self.poll_interval
                }
                _ => self.poll_interval,
            };
            self.pause(wait).await;
        }

        info!("Desktop agent stopped");
    }

    async fn pause(&self, wait: Duration) {
        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = self.shutdown.wake.notified() => {}
        }
    }

    /// Poll the source once and run whatever comes back.
    pub async fn poll_once(&self) -> PollOutcome {
        match self.source.next_task().await {
            Ok(TaskPoll::NoTask) => PollOutcome::Idle,
            Ok(TaskPoll::NewTask(plan)) => {
                info!(commands = %plan, "New task received");
                match self.execute_plan(&plan).await {
                    Ok(report) => PollOutcome::Executed(report),
                    Err(e) => {
                        error!(error = %e, "Dropping task that is not a valid plan");
                        PollOutcome::Dropped(e)
                    }
                }
            }
            Err(e) => PollOutcome::QueueFailed(e),
        }
    }

    /// Run every step in order. Unknown tools are skipped; the first failing
    /// or malformed step stops the plan.
    pub async fn execute_plan(&self, plan_text: &str) -> Result<ExecutionReport, PlanError> {
        let steps = parse_raw_steps(plan_text)?;
        let mut report = ExecutionReport::default();

        for (index, raw) in steps.iter().enumerate() {
            let action = match raw.decode(index) {
                Ok(action) => action,
                Err(PlanError::UnknownTool { tool, .. }) => {
                    warn!(index, tool = %tool, "Skipping step with unknown tool");
                    report.skipped.push(tool);
                    continue;
                }
                Err(e) => {
                    report.failed = Some(StepFailure {
                        index,
                        tool: raw.tool.clone(),
                        reason: e.to_string(),
                    });
                    break;
                }
            };

            if let Err(e) = desktop::perform(self.desktop.as_ref(), &action).await {
                error!(index, tool = action.tool_name(), error = %e, "Step failed, aborting plan");
                report.failed = Some(StepFailure {
                    index,
                    tool: action.tool_name().to_string(),
                    reason: e.to_string(),
                });
                break;
            }
            report.executed += 1;
        }

        if let Some(ref failure) = report.failed {
            warn!(
                executed = report.executed,
                failed_step = failure.index,
                remaining = steps.len() - failure.index - 1,
                "Plan aborted"
            );
        } else {
            info!(executed = report.executed, skipped = report.skipped.len(), "Plan complete");
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ToolError;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    /// Records every action; optionally fails on one app name.
    #[derive(Default)]
    struct Recorder {
        log: Mutex<Vec<String>>,
        fail_on: Option<String>,
    }

    #[async_trait]
    impl Desktop for Recorder {
        async fn open_application(&self, app_name: &str) -> Result<(), ToolError> {
            if self.fail_on.as_deref() == Some(app_name) {
                return Err(ToolError::ExecutionFailed {
                    name: "open_application".into(),
                    reason: "not found".into(),
                });
            }
            self.log.lock().unwrap().push(format!("open:{app_name}"));
            Ok(())
        }
        async fn write_text(&self, text: &str) -> Result<(), ToolError> {
            self.log.lock().unwrap().push(format!("type:{text}"));
            Ok(())
        }
    }

    /// Always unreachable; counts polls.
    struct Offline {
        polls: AtomicUsize,
    }

    #[async_trait]
    impl TaskSource for Offline {
        async fn next_task(&self) -> Result<TaskPoll, QueueError> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            Err(QueueError::Unreachable {
                url: "http://127.0.0.1:5000".into(),
                reason: "connection refused".into(),
            })
        }
    }

    fn fast_config() -> ExecutorConfig {
        ExecutorConfig {
            poll_interval: Duration::from_millis(5),
            offline_backoff: Duration::from_millis(5),
            ..ExecutorConfig::default()
        }
    }

    fn executor(source: Arc<dyn TaskSource>, desktop: Arc<Recorder>) -> Executor {
        Executor::new(source, desktop, &fast_config())
    }

    #[tokio::test]
    async fn runs_steps_in_order() {
        let queue = TaskQueue::new();
        queue
            .enqueue(
                r#"[{"tool":"open_application","parameters":{"app_name":"firefox.exe"}},
                    {"tool":"write_text","parameters":{"text_to_write":"youtube.com\n"}}]"#
                    .into(),
            )
            .await
            .unwrap();
        let desktop = Arc::new(Recorder::default());
        let exec = executor(queue.clone(), desktop.clone());

        match exec.poll_once().await {
            PollOutcome::Executed(report) => {
                assert!(report.is_success());
                assert_eq!(report.executed, 2);
            }
            other => panic!("expected Executed, got {other:?}"),
        }
        assert_eq!(
            *desktop.log.lock().unwrap(),
            vec!["open:firefox.exe", "type:youtube.com\n"]
        );
        assert!(matches!(exec.poll_once().await, PollOutcome::Idle));
    }

    #[tokio::test]
    async fn failing_step_aborts_the_rest() {
        let desktop = Arc::new(Recorder {
            fail_on: Some("missing.exe".into()),
            ..Recorder::default()
        });
        let exec = executor(TaskQueue::new(), desktop.clone());

        let report = exec
            .execute_plan(
                r#"[{"tool":"open_application","parameters":{"app_name":"notepad.exe"}},
                    {"tool":"open_application","parameters":{"app_name":"missing.exe"}},
                    {"tool":"write_text","parameters":{"text_to_write":"never"}}]"#,
            )
            .await
            .unwrap();

        assert_eq!(report.executed, 1);
        let failure = report.failed.unwrap();
        assert_eq!(failure.index, 1);
        assert_eq!(failure.tool, "open_application");
        assert_eq!(*desktop.log.lock().unwrap(), vec!["open:notepad.exe"]);
    }

    #[tokio::test]
    async fn unknown_tools_are_skipped() {
        let desktop = Arc::new(Recorder::default());
        let exec = executor(TaskQueue::new(), desktop.clone());

        let report = exec
            .execute_plan(
                r#"[{"tool":"reboot","parameters":{}},
                    {"tool":"write_text","parameters":{"text_to_write":"hi"}}]"#,
            )
            .await
            .unwrap();

        assert!(report.is_success());
        assert_eq!(report.skipped, vec!["reboot"]);
        assert_eq!(*desktop.log.lock().unwrap(), vec!["type:hi"]);
    }

    #[tokio::test]
    async fn malformed_known_step_aborts() {
        let desktop = Arc::new(Recorder::default());
        let exec = executor(TaskQueue::new(), desktop.clone());

        let report = exec
            .execute_plan(
                r#"[{"tool":"write_text","parameters":{"wrong":"x"}},
                    {"tool":"write_text","parameters":{"text_to_write":"later"}}]"#,
            )
            .await
            .unwrap();

        assert_eq!(report.failed.unwrap().index, 0);
        assert!(desktop.log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn non_list_task_is_dropped() {
        let queue = TaskQueue::new();
        queue.enqueue("not json".into()).await.unwrap();
        let exec = executor(queue.clone(), Arc::new(Recorder::default()));

        assert!(matches!(
            exec.poll_once().await,
            PollOutcome::Dropped(PlanError::InvalidJson(_))
        ));
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn keeps_retrying_while_offline_until_shutdown() {
        let source = Arc::new(Offline {
            polls: AtomicUsize::new(0),
        });
        let exec = Arc::new(executor(source.clone(), Arc::new(Recorder::default())));
        let handle = exec.shutdown_handle();

        let runner = {
            let exec = Arc::clone(&exec);
            tokio::spawn(async move { exec.run().await })
        };

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!runner.is_finished());
        handle.shutdown();

        tokio::time::timeout(Duration::from_secs(2), runner)
            .await
            .expect("executor did not stop")
            .unwrap();
        assert!(source.polls.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn shutdown_interrupts_long_sleep() {
        let config = ExecutorConfig {
            poll_interval: Duration::from_secs(3600),
            ..ExecutorConfig::default()
        };
        let exec = Arc::new(Executor::new(
            TaskQueue::new(),
            Arc::new(Recorder::default()),
            &config,
        ));
        let handle = exec.shutdown_handle();
        let runner = {
            let exec = Arc::clone(&exec);
            tokio::spawn(async move { exec.run().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.shutdown();
        tokio::time::timeout(Duration::from_secs(2), runner)
            .await
            .expect("shutdown did not interrupt the sleep")
            .unwrap();
    }
}
