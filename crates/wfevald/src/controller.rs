//! Simulated workflow controller used by the daemon.
//!
//! Each invocation runs a fixed number of sequential tasks. Every evaluation
//! invokes the next pending task; the invocation completes once all tasks ran.

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::bail;
use async_trait::async_trait;

use wfeval_core::{Action, Controller, EvalState, Evaluation};

/// Action emitted when the controller starts the next task of an invocation.
#[derive(Debug)]
pub struct InvokeTask {
    pub index: usize,
}

impl Action for InvokeTask {
    fn name(&self) -> &str {
        "invoke_task"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct TaskController {
    tasks: usize,
    /// Every n-th evaluation fails with a transient error (0 disables).
    fail_every: usize,
    latency: Duration,
    progress: Mutex<HashMap<String, usize>>,
    evaluations: AtomicUsize,
}

impl TaskController {
    pub fn new(tasks: usize, fail_every: usize, latency: Duration) -> Self {
        Self {
            tasks,
            fail_every,
            latency,
            progress: Mutex::new(HashMap::new()),
            evaluations: AtomicUsize::new(0),
        }
    }

    fn next_evaluation(&self) -> usize {
        self.evaluations.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn advance(&self, id: &str) -> usize {
        let mut progress = self.progress.lock().unwrap_or_else(|e| e.into_inner());
        let done = progress.entry(id.to_string()).or_insert(0);
        *done += 1;
        *done
    }
}

#[async_trait]
impl Controller for TaskController {
    async fn evaluate(&self, state: &EvalState, cause: &str) -> anyhow::Result<Evaluation> {
        tokio::time::sleep(self.latency).await;

        let n = self.next_evaluation();
        if self.fail_every > 0 && n % self.fail_every == 0 {
            bail!("transient failure invoking task for {} ({cause})", state.id());
        }

        let done = self.advance(state.id());
        let evaluation = Evaluation::idle()
            .with_action(Arc::new(InvokeTask { index: done - 1 }))
            .with_rule_path(["workflow", "has-pending-tasks", "invoke-next"]);

        if done >= self.tasks {
            state.annotate(format!("all {} tasks invoked", self.tasks));
            return Ok(evaluation
                .with_rule_path(["workflow", "all-tasks-done"])
                .succeeded("completed"));
        }
        Ok(evaluation)
    }
}
