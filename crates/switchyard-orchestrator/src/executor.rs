use crate::events::{EventBus, ExecutionEvent};
use crate::history::PerformanceHistory;
use crate::types::{ExecutionRecord, RunResult, RunSummary, TaskStatus};
use chrono::Utc;
use futures_util::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use switchyard_agent::{Handoff, InvokeRequest, Invocation, ProviderPool, ProviderResult};
use switchyard_core::{Catalog, Order, Plan, SwitchyardError, Worker};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Extra attempts after the first failure of a task.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Provider names to try, in order. Empty means registration order.
    #[serde(default)]
    pub provider_order: Vec<String>,
}

fn default_max_retries() -> u32 {
    1
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            provider_order: Vec::new(),
        }
    }
}

/// Runs a validated plan against the provider pool.
///
/// All provider calls of a run are polled from one `FuturesUnordered` on the
/// caller's task. A task is dispatched once every dependency is done and its
/// worker has a free slot; ready tasks are considered in task-id order. A
/// task that exhausts its retries fails and every transitive dependent is
/// blocked, while unrelated branches keep running.
pub struct Executor {
    pool: Arc<ProviderPool>,
    config: ExecutorConfig,
    events: EventBus,
    history: Option<Arc<PerformanceHistory>>,
}

impl Executor {
    pub fn new(pool: Arc<ProviderPool>, config: ExecutorConfig) -> Self {
        Self {
            pool,
            config,
            events: EventBus::default(),
            history: None,
        }
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn with_history(mut self, history: Arc<PerformanceHistory>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Run `plan` resolving workers through the catalog.
    pub async fn run_with_catalog(&self, plan: &Plan, orders: &[Order], catalog: &Catalog) -> RunResult {
        self.run(plan, orders, |id| catalog.get(id).cloned()).await
    }

    /// Run `plan` to completion. Always returns a status for every task.
    pub async fn run<F>(&self, plan: &Plan, orders: &[Order], resolve: F) -> RunResult
    where
        F: Fn(&str) -> Option<Arc<Worker>>,
    {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(run_id = %run_id, tasks = plan.len(), "Run started");
        self.events.publish(ExecutionEvent::RunStarted {
            run_id,
            tasks: plan.len(),
        });

        let mut state = RunState::new(plan, &resolve);
        for pos in 0..plan.len() {
            if state.remaining[pos] == 0 {
                self.make_ready(&mut state, plan, pos);
            }
        }

        let mut in_flight = FuturesUnordered::new();
        loop {
            self.dispatch(&mut state, plan, orders, &mut in_flight);
            let Some((pos, outcome)) = in_flight.next().await else {
                break;
            };
            self.settle(&mut state, plan, pos, outcome);
        }

        // Only reachable for plans that skipped validation.
        for pos in 0..plan.len() {
            if !state.records[pos].status.is_terminal() {
                let record = &mut state.records[pos];
                record.status = TaskStatus::Blocked;
                record.error = Some("dependencies can never be satisfied".into());
                record.finished_at = Some(Utc::now());
                warn!(task_id = %record.task_id, "Task has unsatisfiable dependencies");
            }
        }

        let records = state.records;
        let summary = RunSummary::from_records(&records);
        info!(run_id = %run_id, %summary, "Run finished");
        self.events
            .publish(ExecutionEvent::RunFinished { run_id, summary });

        RunResult {
            run_id,
            status: summary.status(),
            summary,
            records,
            started_at,
            finished_at: Utc::now(),
        }
    }

    fn make_ready(&self, state: &mut RunState, plan: &Plan, pos: usize) {
        let task = &plan.tasks()[pos];
        state.records[pos].status = TaskStatus::Ready;
        state.ready.insert(task.id.clone(), pos);
        self.events.publish(ExecutionEvent::TaskReady {
            task_id: task.id.clone(),
        });
    }

    /// Start every ready task whose worker has a free slot.
    fn dispatch(
        &self,
        state: &mut RunState,
        plan: &Plan,
        orders: &[Order],
        in_flight: &mut FuturesUnordered<AttemptFuture>,
    ) {
        let candidates: Vec<usize> = state.ready.values().copied().collect();
        for pos in candidates {
            let task = &plan.tasks()[pos];
            let Some(worker) = state.workers[pos].clone() else {
                state.ready.remove(&task.id);
                let error = SwitchyardError::UnknownWorker(task.worker_id.clone()).to_string();
                self.fail(state, plan, pos, error);
                continue;
            };

            let busy = state.busy.entry(worker.id.clone()).or_insert(0);
            if *busy >= worker.concurrency_limit() {
                continue;
            }
            *busy += 1;
            state.ready.remove(&task.id);

            let record = &mut state.records[pos];
            record.status = TaskStatus::Running;
            record.attempts += 1;
            record.started_at.get_or_insert_with(Utc::now);
            let attempt = record.attempts;

            debug!(task_id = %task.id, worker = %worker.id, attempt, "Dispatching task");
            self.events.publish(ExecutionEvent::TaskStarted {
                task_id: task.id.clone(),
                worker_id: worker.id.clone(),
                attempt,
            });

            let context = task
                .depends_on
                .iter()
                .filter_map(|dep| {
                    let &dep_pos = state.index.get(dep.as_str())?;
                    let summary = state.records[dep_pos].summary()?;
                    Some(Handoff {
                        task_id: dep.clone(),
                        worker_id: state.records[dep_pos].worker_id.clone(),
                        summary: summary.to_string(),
                    })
                })
                .collect();
            let order = orders.iter().find(|o| o.worker_id == worker.id).cloned();
            let request = InvokeRequest::new(worker.id.clone(), task.payload.clone())
                .with_context(context)
                .with_order(order);

            in_flight.push(Box::pin(attempt_task(
                Arc::clone(&self.pool),
                pos,
                request,
                self.config.provider_order.clone(),
                worker.timeout(),
            )));
        }
    }

    /// Apply the outcome of one attempt.
    fn settle(&self, state: &mut RunState, plan: &Plan, pos: usize, outcome: ProviderResult<Invocation>) {
        let task = &plan.tasks()[pos];
        if let Some(busy) = state.busy.get_mut(&task.worker_id) {
            *busy = busy.saturating_sub(1);
        }

        match outcome {
            Ok(invocation) => {
                let record = &mut state.records[pos];
                record.status = TaskStatus::Done;
                record.finished_at = Some(Utc::now());
                record.provider = Some(invocation.provider.clone());
                record.result = Some(invocation.reply);
                record.error = None;
                info!(
                    task_id = %task.id,
                    worker = %task.worker_id,
                    provider = %invocation.provider,
                    elapsed_ms = invocation.elapsed_ms,
                    "Task completed"
                );
                self.events.publish(ExecutionEvent::TaskCompleted {
                    task_id: task.id.clone(),
                    provider: invocation.provider,
                    elapsed_ms: invocation.elapsed_ms,
                });
                if let Some(history) = &self.history {
                    history.record(&task.worker_id, true);
                }

                for next in state.dependents[pos].clone() {
                    state.remaining[next] = state.remaining[next].saturating_sub(1);
                    if state.remaining[next] == 0 && state.records[next].status == TaskStatus::Pending {
                        self.make_ready(state, plan, next);
                    }
                }
            }
            Err(e) => {
                let attempts = state.records[pos].attempts;
                if attempts <= self.config.max_retries {
                    warn!(task_id = %task.id, attempt = attempts, error = %e, "Task failed, retrying");
                    state.records[pos].status = TaskStatus::Ready;
                    state.records[pos].error = Some(e.to_string());
                    state.ready.insert(task.id.clone(), pos);
                    self.events.publish(ExecutionEvent::TaskRetrying {
                        task_id: task.id.clone(),
                        attempt: attempts,
                        error: e.to_string(),
                    });
                } else {
                    self.fail(state, plan, pos, e.to_string());
                }
            }
        }
    }

    /// Mark a task failed and block everything downstream of it.
    fn fail(&self, state: &mut RunState, plan: &Plan, pos: usize, error: String) {
        let task = &plan.tasks()[pos];
        error!(task_id = %task.id, worker = %task.worker_id, error = %error, "Task failed");

        let record = &mut state.records[pos];
        record.status = TaskStatus::Failed;
        record.finished_at = Some(Utc::now());
        record.error = Some(error.clone());
        self.events.publish(ExecutionEvent::TaskFailed {
            task_id: task.id.clone(),
            error,
        });
        if let Some(history) = &self.history {
            history.record(&task.worker_id, false);
        }

        let mut stack = state.dependents[pos].clone();
        while let Some(next) = stack.pop() {
            let record = &mut state.records[next];
            if !matches!(record.status, TaskStatus::Pending | TaskStatus::Ready) {
                continue;
            }
            record.status = TaskStatus::Blocked;
            record.blocked_by = Some(task.id.clone());
            record.finished_at = Some(Utc::now());
            state.ready.remove(&record.task_id);
            debug!(task_id = %record.task_id, blocked_by = %task.id, "Task blocked");
            self.events.publish(ExecutionEvent::TaskBlocked {
                task_id: record.task_id.clone(),
                blocked_by: task.id.clone(),
            });
            stack.extend(state.dependents[next].iter().copied());
        }
    }
}

type AttemptFuture =
    std::pin::Pin<Box<dyn std::future::Future<Output = (usize, ProviderResult<Invocation>)> + Send>>;

async fn attempt_task(
    pool: Arc<ProviderPool>,
    pos: usize,
    request: InvokeRequest,
    order: Vec<String>,
    timeout: Duration,
) -> (usize, ProviderResult<Invocation>) {
    let outcome = pool.invoke(&request, &order, timeout).await;
    (pos, outcome)
}

/// Scheduling state of one run. Owned by the run loop; nothing else touches it.
struct RunState<'p> {
    records: Vec<ExecutionRecord>,
    workers: Vec<Option<Arc<Worker>>>,
    index: HashMap<&'p str, usize>,
    /// Outstanding dependency count per task.
    remaining: Vec<usize>,
    dependents: Vec<Vec<usize>>,
    /// Ready tasks keyed by task id, so iteration is in id order.
    ready: BTreeMap<String, usize>,
    /// In-flight attempts per worker id.
    busy: HashMap<String, usize>,
}

impl<'p> RunState<'p> {
    fn new<F>(plan: &'p Plan, resolve: &F) -> Self
    where
        F: Fn(&str) -> Option<Arc<Worker>>,
    {
        let tasks = plan.tasks();
        let index: HashMap<&str, usize> = tasks
            .iter()
            .enumerate()
            .map(|(i, t)| (t.id.as_str(), i))
            .collect();

        let mut remaining = vec![0usize; tasks.len()];
        let mut dependents = vec![Vec::new(); tasks.len()];
        for (i, task) in tasks.iter().enumerate() {
            let deps: HashSet<&str> = task.depends_on.iter().map(String::as_str).collect();
            remaining[i] = deps.len();
            for dep in deps {
                if let Some(&d) = index.get(dep) {
                    dependents[d].push(i);
                }
            }
        }

        Self {
            records: tasks
                .iter()
                .map(|t| ExecutionRecord::new(t.id.clone(), t.worker_id.clone()))
                .collect(),
            workers: tasks.iter().map(|t| resolve(&t.worker_id)).collect(),
            index,
            remaining,
            dependents,
            ready: BTreeMap::new(),
            busy: HashMap::new(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use switchyard_agent::{FailoverPolicy, ProviderBackend, ProviderError, ProviderReply};
    use switchyard_core::Task;

    /// Succeeds for every worker except those listed in `failing`.
    struct ScriptedProvider {
        failing: Vec<String>,
        calls: AtomicU32,
        seen: parking_lot::Mutex<Vec<InvokeRequest>>,
    }

    impl ScriptedProvider {
        fn new(failing: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                failing: failing.iter().map(|s| s.to_string()).collect(),
                calls: AtomicU32::new(0),
                seen: parking_lot::Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ProviderBackend for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn run(&self, request: &InvokeRequest) -> ProviderResult<ProviderReply> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().push(request.clone());
            if self.failing.contains(&request.worker_id) {
                return Err(ProviderError::Http {
                    provider: "scripted".into(),
                    status: 500,
                    body: "boom".into(),
                });
            }
            Ok(ProviderReply::new(
                format!("{} done", request.task.render()),
                serde_json::Value::Null,
            ))
        }
    }

    fn executor(provider: Arc<ScriptedProvider>) -> Executor {
        let pool = ProviderPool::new(FailoverPolicy::immediate())
            .with_backend(provider)
            .unwrap();
        Executor::new(Arc::new(pool), ExecutorConfig::default())
    }

    fn catalog() -> Catalog {
        Catalog::new(vec![
            Worker::new("good"),
            Worker::new("bad"),
            Worker::new("solo").with_concurrency(1),
        ])
        .unwrap()
    }

    /// Tracks how many attempts per worker overlap.
    #[derive(Default)]
    struct SlowProvider {
        running: parking_lot::Mutex<HashMap<String, usize>>,
        peak: parking_lot::Mutex<HashMap<String, usize>>,
    }

    #[async_trait]
    impl ProviderBackend for SlowProvider {
        fn name(&self) -> &str {
            "slow"
        }

        async fn run(&self, request: &InvokeRequest) -> ProviderResult<ProviderReply> {
            {
                let mut running = self.running.lock();
                let now = running.entry(request.worker_id.clone()).or_insert(0);
                *now += 1;
                let mut peak = self.peak.lock();
                let top = peak.entry(request.worker_id.clone()).or_insert(0);
                *top = (*top).max(*now);
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
            if let Some(now) = self.running.lock().get_mut(&request.worker_id) {
                *now -= 1;
            }
            Ok(ProviderReply::new("ok", serde_json::Value::Null))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_concurrency_limit_respected() {
        let provider = Arc::new(SlowProvider::default());
        let pool = ProviderPool::new(FailoverPolicy::immediate())
            .with_backend(provider.clone())
            .unwrap();
        let executor = Executor::new(Arc::new(pool), ExecutorConfig::default());
        let catalog = Catalog::new(vec![
            Worker::new("pair").with_concurrency(2),
            Worker::new("solo").with_concurrency(1),
        ])
        .unwrap();

        let mut tasks: Vec<Task> = (0..6)
            .map(|i| Task::new(format!("P{i}"), "p", "pair"))
            .collect();
        tasks.extend((0..3).map(|i| Task::new(format!("S{i}"), "s", "solo")));
        let result = executor
            .run_with_catalog(&Plan::new(tasks), &[], &catalog)
            .await;

        assert!(result.is_success());
        let peak = provider.peak.lock();
        assert_eq!(peak.get("pair"), Some(&2));
        assert_eq!(peak.get("solo"), Some(&1));
    }

    #[tokio::test]
    async fn test_failed_task_blocks_dependents() {
        let provider = ScriptedProvider::new(&["bad"]);
        let plan = Plan::new(vec![
            Task::new("A", "explode", "bad"),
            Task::new("B", "after A", "good").depends_on(["A"]),
            Task::new("C", "after B", "good").depends_on(["B"]),
            Task::new("D", "independent", "good"),
        ]);

        let result = executor(provider.clone())
            .run_with_catalog(&plan, &[], &catalog())
            .await;

        assert_eq!(result.status_of("A"), Some(TaskStatus::Failed));
        assert_eq!(result.record("A").unwrap().attempts, 2);
        assert_eq!(result.status_of("B"), Some(TaskStatus::Blocked));
        assert_eq!(result.record("C").unwrap().blocked_by.as_deref(), Some("A"));
        assert_eq!(result.status_of("D"), Some(TaskStatus::Done));
        assert_eq!(result.summary.blocked, 2);
        assert_eq!(result.status, crate::types::RunStatus::Partial);
        // A twice, D once; B and C never reach a provider.
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_handoff_context_passed_downstream() {
        let provider = ScriptedProvider::new(&[]);
        let plan = Plan::new(vec![
            Task::new("T1", "design", "good"),
            Task::new("T2", "build", "good").depends_on(["T1"]),
        ]);
        let mut order = Order::new("O1", "good");
        order.objectives.push("ship it".into());

        let result = executor(provider.clone())
            .run_with_catalog(&plan, &[order], &catalog())
            .await;
        assert!(result.is_success());

        let seen = provider.seen.lock();
        assert_eq!(seen.len(), 2);
        assert!(seen[0].context.is_empty());
        assert_eq!(seen[1].context[0].task_id, "T1");
        assert_eq!(seen[1].context[0].summary, "design done");
        assert_eq!(seen[1].order.as_ref().unwrap().objectives, vec!["ship it"]);
    }

    #[tokio::test]
    async fn test_unknown_worker_fails_without_call() {
        let provider = ScriptedProvider::new(&[]);
        let plan = Plan::new(vec![
            Task::new("A", "x", "ghost"),
            Task::new("B", "y", "good").depends_on(["A"]),
        ]);
        let result = executor(provider.clone())
            .run_with_catalog(&plan, &[], &catalog())
            .await;
        assert_eq!(result.status_of("A"), Some(TaskStatus::Failed));
        assert_eq!(
            result.record("A").unwrap().error.as_deref(),
            Some("Unknown worker: ghost")
        );
        assert_eq!(result.status_of("B"), Some(TaskStatus::Blocked));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_ready_tasks_dispatch_in_id_order() {
        let provider = ScriptedProvider::new(&[]);
        let plan = Plan::new(vec![
            Task::new("c", "3", "solo"),
            Task::new("a", "1", "solo"),
            Task::new("b", "2", "solo"),
        ]);
        executor(provider.clone())
            .run_with_catalog(&plan, &[], &catalog())
            .await;
        let order: Vec<String> = provider
            .seen
            .lock()
            .iter()
            .map(|r| r.task.render())
            .collect();
        assert_eq!(order, vec!["1", "2", "3"]);
    }

    #[tokio::test]
    async fn test_retry_budget_and_history() {
        let provider = ScriptedProvider::new(&["bad"]);
        let history = Arc::new(PerformanceHistory::default());
        let pool = ProviderPool::new(FailoverPolicy::immediate())
            .with_backend(provider.clone())
            .unwrap();
        let executor = Executor::new(
            Arc::new(pool),
            ExecutorConfig {
                max_retries: 3,
                provider_order: Vec::new(),
            },
        )
        .with_history(history.clone());

        let plan = Plan::new(vec![Task::new("A", "x", "bad"), Task::new("B", "y", "good")]);
        let result = executor.run_with_catalog(&plan, &[], &catalog()).await;
        assert_eq!(result.record("A").unwrap().attempts, 4);
        assert_eq!(history.success_rate("bad"), Some(0.0));
        assert_eq!(history.success_rate("good"), Some(1.0));
    }

    #[tokio::test]
    async fn test_events_follow_task_lifecycle() {
        let provider = ScriptedProvider::new(&["bad"]);
        let executor = executor(provider);
        let mut rx = executor.events().subscribe();

        let plan = Plan::new(vec![
            Task::new("A", "x", "bad"),
            Task::new("B", "y", "good").depends_on(["A"]),
        ]);
        executor.run_with_catalog(&plan, &[], &catalog()).await;

        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            kinds.push(match event {
                ExecutionEvent::RunStarted { .. } => "run_started",
                ExecutionEvent::TaskReady { .. } => "ready",
                ExecutionEvent::TaskStarted { .. } => "started",
                ExecutionEvent::TaskRetrying { .. } => "retrying",
                ExecutionEvent::TaskCompleted { .. } => "completed",
                ExecutionEvent::TaskFailed { .. } => "failed",
                ExecutionEvent::TaskBlocked { .. } => "blocked",
                ExecutionEvent::RunFinished { .. } => "run_finished",
            });
        }
        assert_eq!(
            kinds,
            vec![
                "run_started",
                "ready",
                "started",
                "retrying",
                "started",
                "failed",
                "blocked",
                "run_finished"
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_plan_completes() {
        let result = executor(ScriptedProvider::new(&[]))
            .run_with_catalog(&Plan::default(), &[], &catalog())
            .await;
        assert!(result.records.is_empty());
        assert!(result.is_success());
    }
}
