// Sequential periodic task runner.
//
// One tokio task ticks at a fixed base interval and runs every registered task
// whose period has elapsed, in registration order. Tasks never overlap each
// other or themselves. Shutdown is a broadcast signal checked between ticks;
// a task that is mid-run finishes first.

use super::Task;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Base tick used by [`TaskRunner::new`]
pub const DEFAULT_TICK: Duration = Duration::from_secs(1);

/// Longest period a task is rescheduled with
pub const MAX_PERIOD: Duration = Duration::from_secs(86_400);

struct ScheduledTask {
    task: Arc<dyn Task>,
    period: Duration,
    next_run: Instant,
}

pub struct TaskRunner {
    tick: Duration,
    tasks: Vec<ScheduledTask>,
}

impl TaskRunner {
    pub fn new() -> Self {
        Self::with_tick(DEFAULT_TICK)
    }

    pub fn with_tick(tick: Duration) -> Self {
        Self {
            tick,
            tasks: Vec::new(),
        }
    }

    /// Add a task; it first runs on the next tick, then every `period`.
    /// Periods above [`MAX_PERIOD`] are clamped to it.
    pub fn register(&mut self, task: Arc<dyn Task>, period: Duration) {
        if period > MAX_PERIOD {
            warn!(
                "Task {} period {:?} too long; using {:?}",
                task.name(),
                period,
                MAX_PERIOD
            );
        }
        let period = period.min(MAX_PERIOD);
        debug!("Registering task {} every {:?}", task.name(), period);
        self.tasks.push(ScheduledTask {
            task,
            period,
            next_run: Instant::now(),
        });
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Run every task due at `now`. Tasks that return `false` are dropped.
    /// Returns how many tasks ran.
    pub async fn run_due(&mut self, now: Instant) -> usize {
        let mut ran = 0;
        let mut finished = Vec::new();

        for (index, scheduled) in self.tasks.iter_mut().enumerate() {
            if scheduled.next_run > now {
                continue;
            }
            ran += 1;
            if scheduled.task.execute().await {
                scheduled.next_run = now + scheduled.period;
            } else {
                finished.push(index);
            }
        }

        for index in finished.into_iter().rev() {
            let removed = self.tasks.remove(index);
            info!("Task {} finished; no longer scheduled.", removed.task.name());
        }
        ran
    }

    /// Move the runner onto its own tokio task
    pub fn start(self) -> TaskRunnerHandle {
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
        let mut runner = self;

        let join = tokio::spawn(async move {
            let mut interval = tokio::time::interval(runner.tick);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!("Task runner started with {} task(s)", runner.len());

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        debug!("Task runner received shutdown signal");
                        break;
                    }
                    _ = interval.tick() => {}
                }

                runner.run_due(Instant::now()).await;
                if runner.is_empty() {
                    info!("No tasks left; task runner exiting.");
                    break;
                }
            }
        });

        TaskRunnerHandle { shutdown_tx, join }
    }
}

impl Default for TaskRunner {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to a started [`TaskRunner`]
pub struct TaskRunnerHandle {
    shutdown_tx: broadcast::Sender<()>,
    join: JoinHandle<()>,
}

impl TaskRunnerHandle {
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Signal shutdown and wait for the runner to exit
    pub async fn stop(self) {
        // No receiver means the loop already exited.
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.join.await {
            warn!("Task runner ended abnormally: {}", e);
        }
        info!("Task runner stopped.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        runs: AtomicUsize,
        limit: Option<usize>,
    }

    impl Counting {
        fn new(limit: Option<usize>) -> Arc<Self> {
            Arc::new(Self {
                runs: AtomicUsize::new(0),
                limit,
            })
        }

        fn runs(&self) -> usize {
            self.runs.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Task for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        async fn execute(&self) -> bool {
            let runs = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
            self.limit.map_or(true, |limit| runs < limit)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_due_respects_period() {
        let task = Counting::new(None);
        let mut runner = TaskRunner::new();
        runner.register(task.clone(), Duration::from_secs(5));

        let start = Instant::now();
        assert_eq!(runner.run_due(start).await, 1);
        assert_eq!(runner.run_due(start + Duration::from_secs(2)).await, 0);
        assert_eq!(runner.run_due(start + Duration::from_secs(5)).await, 1);
        assert_eq!(task.runs(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_false_removes_task() {
        let task = Counting::new(Some(1));
        let mut runner = TaskRunner::new();
        runner.register(task.clone(), Duration::from_secs(1));

        runner.run_due(Instant::now()).await;
        assert!(runner.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_started_runner_ticks_until_stopped() {
        let fast = Counting::new(None);
        let slow = Counting::new(None);
        let mut runner = TaskRunner::with_tick(Duration::from_secs(1));
        runner.register(fast.clone(), Duration::from_secs(1));
        runner.register(slow.clone(), Duration::from_secs(10));

        let handle = runner.start();
        tokio::time::sleep(Duration::from_millis(10_500)).await;
        handle.stop().await;

        let fast_runs = fast.runs();
        assert!(fast_runs >= 10, "fast ran {} times", fast_runs);
        assert_eq!(slow.runs(), 2);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(fast.runs(), fast_runs);
    }

    #[tokio::test(start_paused = true)]
    async fn test_runner_exits_when_all_tasks_finish() {
        let task = Counting::new(Some(3));
        let mut runner = TaskRunner::with_tick(Duration::from_secs(1));
        runner.register(task.clone(), Duration::from_secs(1));

        let handle = runner.start();
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert!(handle.is_finished());
        assert_eq!(task.runs(), 3);
        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_period_keeps_other_tasks_running() {
        let rare = Counting::new(None);
        let frequent = Counting::new(None);
        let mut runner = TaskRunner::with_tick(Duration::from_secs(1));
        runner.register(rare.clone(), Duration::MAX);
        runner.register(frequent.clone(), Duration::from_secs(1));

        let handle = runner.start();
        tokio::time::sleep(Duration::from_millis(4_500)).await;

        assert!(!handle.is_finished());
        assert_eq!(rare.runs(), 1);
        assert!(frequent.runs() >= 4, "frequent ran {} times", frequent.runs());
        handle.stop().await;
    }
}
