//! Task graph validation, topological sort, and deadlock diagnosis.

use crate::task::{Task, TaskStatus};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Deadlock {
    None,
    Cycle { path: Vec<String> },
    ErrorDependency { task_id: String, blocking_error_ids: Vec<String> },
}

/// Result of excluding malformed tasks: missing id, duplicate id, or a
/// blocker referencing an unknown task. Excluded tasks are "unresolved",
/// not an error — the caller keeps the original list and simply never
/// schedules them.
pub struct Validated {
    pub scheduled: Vec<Task>,
    pub unresolved_ids: Vec<String>,
}

/// Normalizes ids, then drops tasks with a missing/duplicate id or an
/// unknown blocker. `tasks` is expected to already have normalized ids
/// (callers typically construct via [`crate::task::Task::new`]).
pub fn validate(tasks: &[Task]) -> Validated {
    let mut seen = HashSet::new();
    let mut first_pass = Vec::new();
    let mut unresolved_ids = Vec::new();

    for task in tasks {
        if task.id.is_empty() || task.id == "#" {
            unresolved_ids.push(task.id.clone());
            continue;
        }
        if !seen.insert(task.id.clone()) {
            unresolved_ids.push(task.id.clone());
            continue;
        }
        first_pass.push(task.clone());
    }

    let known_ids: HashSet<&str> = first_pass.iter().map(|t| t.id.as_str()).collect();
    let mut scheduled = Vec::new();
    for task in first_pass {
        if task.blocked_by.iter().any(|b| !known_ids.contains(b.as_str())) {
            unresolved_ids.push(task.id.clone());
            continue;
        }
        scheduled.push(task);
    }

    Validated { scheduled, unresolved_ids }
}

/// Topological sort over the validated task graph (dependency edge:
/// `blocked_by`). Tasks on a cycle, or excluded by [`validate`], appear
/// last in their original relative order (spec §8,
/// "Topological correctness").
pub fn sort_topologically(tasks: &[Task]) -> Vec<Task> {
    let validated = validate(tasks);
    let by_id: HashMap<&str, &Task> = validated.scheduled.iter().map(|t| (t.id.as_str(), t)).collect();

    let mut in_degree: HashMap<&str, usize> = validated.scheduled.iter().map(|t| (t.id.as_str(), t.blocked_by.len())).collect();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    for t in &validated.scheduled {
        for b in &t.blocked_by {
            dependents.entry(b.as_str()).or_default().push(t.id.as_str());
        }
    }

    let mut queue: std::collections::VecDeque<&str> = validated
        .scheduled
        .iter()
        .filter(|t| in_degree[t.id.as_str()] == 0)
        .map(|t| t.id.as_str())
        .collect();

    let mut sorted_ids = Vec::new();
    while let Some(id) = queue.pop_front() {
        sorted_ids.push(id);
        if let Some(deps) = dependents.get(id) {
            for &dep in deps {
                let entry = in_degree.get_mut(dep).unwrap();
                *entry -= 1;
                if *entry == 0 {
                    queue.push_back(dep);
                }
            }
        }
    }

    let sorted_set: HashSet<&str> = sorted_ids.iter().copied().collect();
    let mut result: Vec<Task> = sorted_ids.iter().map(|id| by_id[id].clone()).collect();

    // Everything not in the acyclic sorted prefix — cyclic tasks and
    // tasks validate() excluded — appended in original relative order.
    for t in tasks {
        let id_in_sorted = sorted_set.contains(t.id.as_str());
        if !id_in_sorted {
            result.push(t.clone());
        }
    }
    result
}

fn find_cycle(tasks: &[Task]) -> Option<Vec<String>> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Unvisited,
        InProgress,
        Done,
    }

    let by_id: HashMap<&str, &Task> = tasks.iter().map(|t| (t.id.as_str(), t)).collect();
    let mut marks: HashMap<&str, Mark> = tasks.iter().map(|t| (t.id.as_str(), Mark::Unvisited)).collect();

    fn visit<'a>(
        id: &'a str,
        by_id: &HashMap<&'a str, &'a Task>,
        marks: &mut HashMap<&'a str, Mark>,
        stack: &mut Vec<&'a str>,
    ) -> Option<Vec<String>> {
        match marks.get(id) {
            Some(Mark::Done) => return None,
            Some(Mark::InProgress) => {
                let start = stack.iter().position(|&x| x == id).unwrap_or(0);
                let mut path: Vec<String> = stack[start..].iter().map(|s| s.to_string()).collect();
                path.push(id.to_string());
                return Some(path);
            }
            _ => {}
        }
        marks.insert(id, Mark::InProgress);
        stack.push(id);
        if let Some(task) = by_id.get(id) {
            for blocker in &task.blocked_by {
                if let Some(path) = visit(blocker.as_str(), by_id, marks, stack) {
                    return Some(path);
                }
            }
        }
        stack.pop();
        marks.insert(id, Mark::Done);
        None
    }

    for id in tasks.iter().map(|t| t.id.as_str()) {
        if marks[id] == Mark::Unvisited {
            let mut stack = Vec::new();
            if let Some(path) = visit(id, &by_id, &mut marks, &mut stack) {
                return Some(path);
            }
        }
    }
    None
}

fn find_error_dependency(tasks: &[Task]) -> Option<(String, Vec<String>)> {
    let by_id: HashMap<&str, &Task> = tasks.iter().map(|t| (t.id.as_str(), t)).collect();
    for task in tasks {
        if task.status != TaskStatus::Pending {
            continue;
        }
        let error_blockers: Vec<String> = task
            .blocked_by
            .iter()
            .filter(|b| by_id.get(b.as_str()).map(|t| t.status == TaskStatus::Error).unwrap_or(false))
            .cloned()
            .collect();
        if !error_blockers.is_empty() {
            return Some((task.id.clone(), error_blockers));
        }
    }
    None
}

/// Cycle takes precedence over error-dependency when both are present
/// (spec §8, "Deadlock detection precedence").
pub fn detect(validated_tasks: &[Task]) -> Deadlock {
    if let Some(path) = find_cycle(validated_tasks) {
        return Deadlock::Cycle { path };
    }
    if let Some((task_id, blocking_error_ids)) = find_error_dependency(validated_tasks) {
        return Deadlock::ErrorDependency { task_id, blocking_error_ids };
    }
    Deadlock::None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskStatus;

    #[test]
    fn cycle_detected_over_blockers() {
        let tasks = vec![
            Task::new("1", "a", "a").blocked_by(["2"]),
            Task::new("2", "b", "b").blocked_by(["1"]),
        ];
        assert!(matches!(detect(&tasks), Deadlock::Cycle { .. }));
    }

    #[test]
    fn cycle_precedes_error_dependency() {
        let mut t1 = Task::new("1", "a", "a");
        t1.status = TaskStatus::Error;
        let t2 = Task::new("2", "b", "b").blocked_by(["1", "3"]);
        let t3 = Task::new("3", "c", "c").blocked_by(["2"]);
        let tasks = vec![t1, t2, t3];
        assert!(matches!(detect(&tasks), Deadlock::Cycle { .. }));
    }

    #[test]
    fn error_dependency_detected() {
        let mut t1 = Task::new("1", "a", "a");
        t1.status = TaskStatus::Error;
        let t2 = Task::new("2", "b", "b").blocked_by(["1"]);
        let tasks = vec![t1, t2];
        match detect(&tasks) {
            Deadlock::ErrorDependency { task_id, blocking_error_ids } => {
                assert_eq!(task_id, "#2");
                assert_eq!(blocking_error_ids, vec!["#1".to_string()]);
            }
            other => panic!("expected error_dependency, got {other:?}"),
        }
    }

    #[test]
    fn unresolved_tasks_excluded_and_tallied() {
        let tasks = vec![
            Task::new("1", "a", "a"),
            Task::new("1", "dup", "dup"),
            Task::new("2", "b", "b").blocked_by(["99"]),
        ];
        let validated = validate(&tasks);
        assert_eq!(validated.scheduled.len(), 1);
        assert_eq!(validated.unresolved_ids.len(), 2);
    }

    #[test]
    fn topological_sort_orders_dependents_after_blockers() {
        let tasks = vec![
            Task::new("2", "b", "b").blocked_by(["1"]),
            Task::new("1", "a", "a"),
            Task::new("3", "c", "c").blocked_by(["1"]),
        ];
        let sorted = sort_topologically(&tasks);
        let pos = |id: &str| sorted.iter().position(|t| t.id == id).unwrap();
        assert!(pos("#1") < pos("#2"));
        assert!(pos("#1") < pos("#3"));
    }

    #[test]
    fn cyclic_tasks_sort_last_in_original_order() {
        let tasks = vec![
            Task::new("1", "a", "a").blocked_by(["2"]),
            Task::new("2", "b", "b").blocked_by(["1"]),
            Task::new("3", "c", "c"),
        ];
        let sorted = sort_topologically(&tasks);
        assert_eq!(sorted[0].id, "#3");
        assert_eq!(sorted[1].id, "#1");
        assert_eq!(sorted[2].id, "#2");
    }
}
