//! The DAG task scheduler: dispatches ready tasks to a [`Subagent`],
//! bounds per-task retries, and recovers from error-dependency deadlocks
//! by resetting errored blockers back to pending. See spec §4.6.

use std::collections::HashMap;
use std::sync::Arc;

use flowloom_core::{AgentResult, AgentTask, Subagent};
use tracing::{info, warn};

use crate::deadlock::{self, Deadlock};
use crate::task::{Task, TaskStatus};

#[derive(Debug, Clone)]
pub struct DagSchedulerConfig {
    pub max_retries: u32,
    pub agent_name: String,
}

impl Default for DagSchedulerConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            agent_name: "worker".to_string(),
        }
    }
}

/// One outer `dispatch()` call's worth of bookkeeping, returned so a
/// caller (typically [`crate::task_loop::TaskLoop`]) can decide whether
/// to call `dispatch` again.
#[derive(Debug, Clone)]
pub struct DispatchReport {
    pub dispatched: Vec<String>,
    pub completed: Vec<String>,
    pub errored: Vec<String>,
    pub reset_for_retry: Vec<String>,
    pub deadlock: Deadlock,
    pub unresolved: Vec<String>,
    pub all_done: bool,
}

pub struct DagScheduler<S: Subagent> {
    subagent: Arc<S>,
    config: DagSchedulerConfig,
    retry_counts: HashMap<String, u32>,
}

impl<S: Subagent> DagScheduler<S> {
    pub fn new(subagent: Arc<S>, config: DagSchedulerConfig) -> Self {
        Self { subagent, config, retry_counts: HashMap::new() }
    }

    /// One dispatch round (spec §4.6 steps 1-7):
    /// 1. validate + normalize tasks, tallying unresolved ones
    /// 2. detect deadlock (cycle takes precedence over error-dependency)
    /// 3. on an error-dependency deadlock, reset every errored blocker
    ///    that hasn't exhausted its retry budget to `Pending` and
    ///    recurse once within this same call (spec's "return to step 1")
    /// 4. otherwise select the ready set (`Pending`, no unresolved/non-
    ///    completed blocker) in task-list order
    /// 5. dispatch each ready task to the subagent, in parallel
    /// 6. fold results back into task status
    /// 7. return a report; the caller decides whether to call again
    pub async fn dispatch(&mut self, tasks: &mut Vec<Task>) -> DispatchReport {
        let validated = deadlock::validate(tasks);
        let unresolved = validated.unresolved_ids.clone();

        let deadlock = deadlock::detect(&validated.scheduled);
        if let Deadlock::ErrorDependency { blocking_error_ids, .. } = &deadlock {
            let mut reset_ids = Vec::new();
            for blocker_id in blocking_error_ids {
                let attempts = *self.retry_counts.get(blocker_id).unwrap_or(&0);
                if attempts >= self.config.max_retries {
                    continue;
                }
                if let Some(blocker) = tasks.iter_mut().find(|t| &t.id == blocker_id) {
                    blocker.status = TaskStatus::Pending;
                }
                *self.retry_counts.entry(blocker_id.clone()).or_insert(0) += 1;
                warn!(task = %blocker_id, attempt = attempts + 1, "resetting error-blocked task for retry");
                reset_ids.push(blocker_id.clone());
            }
            if !reset_ids.is_empty() {
                let mut report = Box::pin(self.dispatch(tasks)).await;
                report.reset_for_retry.extend(reset_ids);
                return report;
            }
        }

        let ready: Vec<Task> = validated
            .scheduled
            .into_iter()
            .filter(|t| t.status == TaskStatus::Pending)
            .filter(|t| {
                t.blocked_by.iter().all(|b| {
                    tasks
                        .iter()
                        .find(|candidate| &candidate.id == b)
                        .map(|candidate| candidate.status == TaskStatus::Completed)
                        .unwrap_or(false)
                })
            })
            .collect();

        let ready_ids: Vec<String> = ready.iter().map(|t| t.id.clone()).collect();

        let mut completed = Vec::new();
        let mut errored = Vec::new();

        if !ready_ids.is_empty() {
            info!(count = ready_ids.len(), "dispatching ready tasks");
            for id in &ready_ids {
                if let Some(t) = tasks.iter_mut().find(|t| &t.id == id) {
                    t.status = TaskStatus::InProgress;
                }
            }

            let agent_tasks: Vec<AgentTask> = ready_ids
                .iter()
                .map(|id| {
                    let content = tasks.iter().find(|t| &t.id == id).map(|t| t.content.clone()).unwrap_or_default();
                    AgentTask {
                        agent_id: id.clone(),
                        agent_name: self.config.agent_name.clone(),
                        task: content,
                    }
                })
                .collect();

            let results: Vec<AgentResult> = self.subagent.spawn_parallel(agent_tasks).await;
            for (id, result) in ready_ids.iter().zip(results) {
                if let Some(t) = tasks.iter_mut().find(|t| &t.id == id) {
                    if result.success {
                        t.status = TaskStatus::Completed;
                        completed.push(id.clone());
                    } else {
                        t.status = TaskStatus::Error;
                        errored.push(id.clone());
                    }
                }
            }
        }

        let all_done = tasks.iter().all(|t| matches!(t.status, TaskStatus::Completed) || unresolved.contains(&t.id));

        DispatchReport {
            dispatched: ready_ids,
            completed,
            errored,
            reset_for_retry: Vec::new(),
            deadlock,
            unresolved,
            all_done,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct AlwaysSucceeds;
    #[async_trait]
    impl Subagent for AlwaysSucceeds {
        async fn spawn(&self, task: AgentTask) -> AgentResult {
            AgentResult { success: true, output: format!("done: {}", task.task), error: None }
        }
    }

    struct FailsThenSucceeds {
        calls: Mutex<HashMap<String, u32>>,
    }
    #[async_trait]
    impl Subagent for FailsThenSucceeds {
        async fn spawn(&self, task: AgentTask) -> AgentResult {
            let mut calls = self.calls.lock().unwrap();
            let count = calls.entry(task.agent_id.clone()).or_insert(0);
            *count += 1;
            if *count == 1 {
                AgentResult { success: false, output: String::new(), error: Some("boom".to_string()) }
            } else {
                AgentResult { success: true, output: "ok".to_string(), error: None }
            }
        }
    }

    #[tokio::test]
    async fn s4_two_round_dependency_chain() {
        let mut tasks = vec![Task::new("1", "first", "doing first"), Task::new("2", "second", "doing second").blocked_by(["1"]), Task::new("3", "third", "doing third").blocked_by(["1"])];
        let mut scheduler = DagScheduler::new(Arc::new(AlwaysSucceeds), DagSchedulerConfig::default());

        let first = scheduler.dispatch(&mut tasks).await;
        assert_eq!(first.dispatched, vec!["#1"]);

        let second = scheduler.dispatch(&mut tasks).await;
        let mut dispatched = second.dispatched.clone();
        dispatched.sort();
        assert_eq!(dispatched, vec!["#2", "#3"]);
        assert!(second.all_done);
    }

    #[tokio::test]
    async fn s5_error_dependency_reset_and_redispatch() {
        let mut tasks = vec![Task::new("1", "flaky", "doing flaky"), Task::new("2", "second", "doing second").blocked_by(["1"])];
        let subagent = Arc::new(FailsThenSucceeds { calls: Mutex::new(HashMap::new()) });
        let mut scheduler = DagScheduler::new(subagent, DagSchedulerConfig::default());

        let first = scheduler.dispatch(&mut tasks).await;
        assert_eq!(first.errored, vec!["#1"]);

        // Second call: #1 is error-blocking #2; not yet exhausted, so it
        // resets to pending and is redispatched within the same call.
        let second = scheduler.dispatch(&mut tasks).await;
        assert!(second.reset_for_retry.contains(&"#1".to_string()));
        assert!(second.completed.contains(&"#1".to_string()));

        let third = scheduler.dispatch(&mut tasks).await;
        assert_eq!(third.dispatched, vec!["#2"]);
    }

    #[tokio::test]
    async fn s6_cycle_reported_without_dispatch() {
        let mut tasks = vec![Task::new("1", "a", "a").blocked_by(["2"]), Task::new("2", "b", "b").blocked_by(["1"])];
        let mut scheduler = DagScheduler::new(Arc::new(AlwaysSucceeds), DagSchedulerConfig::default());
        let report = scheduler.dispatch(&mut tasks).await;
        assert!(matches!(report.deadlock, Deadlock::Cycle { .. }));
        assert!(report.dispatched.is_empty());
    }
}
