//! The task-loop combinator (C7): repeatedly calls
//! [`DagScheduler::dispatch`] until every task is completed or excluded,
//! a cycle is found, or an unrecoverable error-dependency deadlock
//! persists past the retry budget. See spec §4.7.

use flowloom_core::Subagent;

use crate::deadlock::Deadlock;
use crate::scheduler::{DagScheduler, DagSchedulerConfig, DispatchReport};
use crate::task::Task;

#[derive(Debug, Clone)]
pub struct TaskLoopConfig {
    pub max_iterations: u32,
    pub scheduler: DagSchedulerConfig,
}

impl Default for TaskLoopConfig {
    fn default() -> Self {
        Self { max_iterations: 1000, scheduler: DagSchedulerConfig::default() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    AllDone,
    Cycle,
    UnrecoverableErrorDependency,
    EmptyReadySetNoProgress,
    MaxIterationsReached,
}

#[derive(Debug, Clone)]
pub struct TaskLoopOutcome {
    pub stop_reason: StopReason,
    pub iterations: u32,
    pub tasks: Vec<Task>,
    pub unresolved: Vec<String>,
    pub reports: Vec<DispatchReport>,
}

pub struct TaskLoop<S: Subagent> {
    scheduler: DagScheduler<S>,
    config: TaskLoopConfig,
}

impl<S: Subagent> TaskLoop<S> {
    pub fn new(subagent: std::sync::Arc<S>, config: TaskLoopConfig) -> Self {
        let scheduler = DagScheduler::new(subagent, config.scheduler.clone());
        Self { scheduler, config }
    }

    /// Runs `dispatch` to completion. Stops as soon as a call reports
    /// `all_done`, a `Cycle`, an `ErrorDependency` deadlock whose blocker
    /// has exhausted `max_retries` (the scheduler itself stops resetting
    /// it, so the same deadlock recurs with no `reset_for_retry` —
    /// treated here as unrecoverable), a round that dispatches nothing
    /// and completes nothing (no progress possible), or `max_iterations`.
    pub async fn run(&mut self, mut tasks: Vec<Task>) -> TaskLoopOutcome {
        let mut reports = Vec::new();
        let mut iterations = 0u32;
        let mut last_errored: Option<Vec<String>> = None;

        loop {
            if iterations >= self.config.max_iterations {
                return TaskLoopOutcome {
                    stop_reason: StopReason::MaxIterationsReached,
                    iterations,
                    tasks,
                    unresolved: Vec::new(),
                    reports,
                };
            }

            let report = self.scheduler.dispatch(&mut tasks).await;
            iterations += 1;

            if matches!(report.deadlock, Deadlock::Cycle { .. }) {
                let unresolved = report.unresolved.clone();
                reports.push(report);
                return TaskLoopOutcome { stop_reason: StopReason::Cycle, iterations, tasks, unresolved, reports };
            }

            if let Deadlock::ErrorDependency { .. } = &report.deadlock {
                if report.reset_for_retry.is_empty() {
                    let repeated = last_errored.as_ref().map(|prev| prev == &report.errored).unwrap_or(false);
                    if repeated || report.errored.is_empty() {
                        let unresolved = report.unresolved.clone();
                        reports.push(report);
                        return TaskLoopOutcome {
                            stop_reason: StopReason::UnrecoverableErrorDependency,
                            iterations,
                            tasks,
                            unresolved,
                            reports,
                        };
                    }
                }
            }
            last_errored = Some(report.errored.clone());

            if report.all_done {
                let unresolved = report.unresolved.clone();
                reports.push(report);
                return TaskLoopOutcome { stop_reason: StopReason::AllDone, iterations, tasks, unresolved, reports };
            }

            if report.dispatched.is_empty() && report.reset_for_retry.is_empty() {
                let unresolved = report.unresolved.clone();
                reports.push(report);
                return TaskLoopOutcome {
                    stop_reason: StopReason::EmptyReadySetNoProgress,
                    iterations,
                    tasks,
                    unresolved,
                    reports,
                };
            }

            reports.push(report);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use flowloom_core::{AgentResult, AgentTask};
    use std::sync::Arc;

    struct AlwaysSucceeds;
    #[async_trait]
    impl Subagent for AlwaysSucceeds {
        async fn spawn(&self, task: AgentTask) -> AgentResult {
            AgentResult { success: true, output: task.task, error: None }
        }
    }

    #[tokio::test]
    async fn runs_to_completion_on_linear_chain() {
        let tasks = vec![
            Task::new("1", "a", "doing a"),
            Task::new("2", "b", "doing b").blocked_by(["1"]),
            Task::new("3", "c", "doing c").blocked_by(["2"]),
        ];
        let mut task_loop = TaskLoop::new(Arc::new(AlwaysSucceeds), TaskLoopConfig::default());
        let outcome = task_loop.run(tasks).await;

        assert_eq!(outcome.stop_reason, StopReason::AllDone);
        assert_eq!(outcome.iterations, 3);
        assert!(outcome.tasks.iter().all(|t| t.status == crate::task::TaskStatus::Completed));
    }

    #[tokio::test]
    async fn stops_on_cycle() {
        let tasks = vec![Task::new("1", "a", "a").blocked_by(["2"]), Task::new("2", "b", "b").blocked_by(["1"])];
        let mut task_loop = TaskLoop::new(Arc::new(AlwaysSucceeds), TaskLoopConfig::default());
        let outcome = task_loop.run(tasks).await;
        assert_eq!(outcome.stop_reason, StopReason::Cycle);
    }

    #[tokio::test]
    async fn empty_task_list_is_immediately_done() {
        let mut task_loop = TaskLoop::new(Arc::new(AlwaysSucceeds), TaskLoopConfig::default());
        let outcome = task_loop.run(Vec::new()).await;
        assert_eq!(outcome.stop_reason, StopReason::AllDone);
        assert_eq!(outcome.iterations, 1);
    }
}
