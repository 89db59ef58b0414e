use super::{
    errors::{PoolError, TaskError},
    handle::JoinHandle,
    model::{PoolMetrics, SlotState},
    program::WorkerProgram,
    task::{Notifier, Task, TaskId},
    worker::{Completion, CompletionSender, Dispatch, Worker},
};
use std::{
    collections::VecDeque,
    mem,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};
use tokio::{
    sync::{mpsc, oneshot},
    time::Duration,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};


/// Конфигурация пула воркеров
#[derive(Debug, Clone)]
pub struct Config {
    pub num_threads: usize,
    pub thread_name_prefix: String,
    pub stack_size: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            num_threads: num_cpus::get(),
            thread_name_prefix: "slot-pool-worker".to_string(),
            stack_size: None,
        }
    }
}

impl Config {
    pub fn cpu_bound() -> Self {
        Self {
            num_threads: num_cpus::get(),
            ..Default::default()
        }
    }

    /// Воркеры, которые большую часть времени ждут I/O
    pub fn io_bound() -> Self {
        Self {
            num_threads: num_cpus::get() * 2,
            ..Default::default()
        }
    }

    pub fn with_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = num_threads;
        self
    }

    pub fn validate(&self) -> Result<(), PoolError> {
        if self.num_threads == 0 {
            return Err(PoolError::InvalidConfig(
                "num_threads must be greater than zero".into(),
            ));
        }
        if self.stack_size == Some(0) {
            return Err(PoolError::InvalidConfig(
                "stack_size must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}


type PoolTask<P> = Task<
    <P as WorkerProgram>::Input,
    <P as WorkerProgram>::Output,
    <P as WorkerProgram>::Error,
>;
type PoolNotifier<P> = Notifier<<P as WorkerProgram>::Output, <P as WorkerProgram>::Error>;
type PoolCompletion<P> = Completion<<P as WorkerProgram>::Output, <P as WorkerProgram>::Error>;

/// Handle, который возвращает [`WorkerPool::submit`]
pub type PoolHandle<P> = JoinHandle<<P as WorkerProgram>::Output, <P as WorkerProgram>::Error>;

enum Command<P: WorkerProgram> {
    Submit(PoolTask<P>),
    CheckTaskQueue(oneshot::Sender<usize>),
    Metrics(oneshot::Sender<PoolMetrics>),
    Drained(oneshot::Sender<()>),
    Shutdown,
}


/// Пул постоянных воркеров фиксированного размера.
///
/// Всё состояние (таблица слотов и очередь) принадлежит одной задаче-координатору.
/// Handle только шлёт ей команды, а воркеры шлют результаты, поэтому
/// блокировки не нужны. Клоны handle разделяют один и тот же пул.
pub struct WorkerPool<P: WorkerProgram> {
    commands: mpsc::UnboundedSender<Command<P>>,
    next_task_id: Arc<AtomicU64>,
    stopped: CancellationToken,
    num_threads: usize,
}

impl<P: WorkerProgram> Clone for WorkerPool<P> {
    fn clone(&self) -> Self {
        Self {
            commands: self.commands.clone(),
            next_task_id: self.next_task_id.clone(),
            stopped: self.stopped.clone(),
            num_threads: self.num_threads,
        }
    }
}

impl<P: WorkerProgram> WorkerPool<P> {
    pub fn new(program: P, num_threads: usize) -> Result<Self, PoolError> {
        let config = Config {
            num_threads,
            ..Default::default()
        };
        Self::with_config(program, config)
    }

    /// Создаёт `num_threads` воркеров и запускает координатор.
    /// Должен вызываться внутри tokio runtime.
    pub fn with_config(program: P, config: Config) -> Result<Self, PoolError> {
        config.validate()?;

        let num_threads = config.num_threads;
        let (coordinator, events) = Coordinator::new(program, config)?;
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let stopped = CancellationToken::new();

        let stopped_clone = stopped.clone();
        tokio::spawn(async move {
            coordinator.run(commands_rx, events).await;
            stopped_clone.cancel();
        });

        info!(num_threads, "worker pool started");

        Ok(Self {
            commands: commands_tx,
            next_task_id: Arc::new(AtomicU64::new(0)),
            stopped,
            num_threads,
        })
    }

    #[inline]
    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    /// Координатор завершил работу, новые задачи не принимаются
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.stopped.is_cancelled()
    }

    /// Отправляет задачу. Никогда не блокирует: задача уходит в первый
    /// свободный слот или в очередь.
    pub fn submit(&self, data: P::Input) -> PoolHandle<P> {
        let id = TaskId(self.next_task_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = oneshot::channel();
        let task = Task::new(id, data, Notifier::new(tx));

        // Если координатора уже нет, задача дропается вместе с уведомителем
        // и handle резолвится в PoolClosed
        let _ = self.commands.send(Command::Submit(task));

        JoinHandle::new(id, rx)
    }

    /// Если очередь пуста, останавливает всех простаивающих воркеров.
    /// Возвращает число остановленных этим вызовом.
    pub async fn check_task_queue(&self) -> Result<usize, PoolError> {
        self.request(Command::CheckTaskQueue).await
    }

    #[inline]
    pub async fn metrics(&self) -> Result<PoolMetrics, PoolError> {
        self.request(Command::Metrics).await
    }

    /// Ждёт, пока не останется ни занятых слотов, ни задач в очереди
    pub async fn join_all(&self) {
        let _ = self.request(Command::Drained).await;
    }

    pub async fn join_all_timeout(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.join_all()).await.is_ok()
    }

    /// Перестаёт принимать задачи, дорабатывает очередь и останавливает воркеров
    pub async fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown);
        self.stopped.cancelled().await;
    }

    pub async fn shutdown_timeout(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.shutdown()).await.is_ok()
    }

    /// Мониторинг метрик с callback.
    /// Останавливается по token.cancel() или вместе с пулом: задача держит
    /// только слабую ссылку на канал команд и не мешает drop пула.
    pub fn start_monitoring<F>(&self, interval: Duration, callback: F) -> CancellationToken
    where
        F: Fn(PoolMetrics) + Send + 'static,
    {
        let commands = self.commands.downgrade();
        let stopped = self.stopped.clone();
        let token = CancellationToken::new();
        let token_clone = token.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        let Some(sender) = commands.upgrade() else { break };
                        match request(&sender, Command::Metrics).await {
                            Ok(metrics) => callback(metrics),
                            Err(_) => break,
                        }
                    }
                    _ = token_clone.cancelled() => break,
                    _ = stopped.cancelled() => break,
                }
            }
        });

        token
    }

    /// Периодически вызывает [`check_task_queue`](Self::check_task_queue),
    /// освобождая простаивающих воркеров. Остановленные слоты поднимаются
    /// заново при следующем submit. Как и мониторинг, не продлевает жизнь пула.
    pub fn start_idle_reaper(&self, interval: Duration) -> CancellationToken {
        let commands = self.commands.downgrade();
        let stopped = self.stopped.clone();
        let token = CancellationToken::new();
        let token_clone = token.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        let Some(sender) = commands.upgrade() else { break };
                        match request(&sender, Command::CheckTaskQueue).await {
                            Ok(0) => {}
                            Ok(terminated) => debug!(terminated, "idle reaper released workers"),
                            Err(_) => break,
                        }
                    }
                    _ = token_clone.cancelled() => break,
                    _ = stopped.cancelled() => break,
                }
            }
        });

        token
    }

    #[inline]
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command<P>,
    ) -> Result<T, PoolError> {
        request(&self.commands, make).await
    }
}

async fn request<P: WorkerProgram, T>(
    commands: &mpsc::UnboundedSender<Command<P>>,
    make: impl FnOnce(oneshot::Sender<T>) -> Command<P>,
) -> Result<T, PoolError> {
    let (tx, rx) = oneshot::channel();
    commands
        .send(make(tx))
        .map_err(|_| PoolError::Closed)?;
    rx.await.map_err(|_| PoolError::Closed)
}


enum SlotStatus<P: WorkerProgram> {
    Idle,
    Busy {
        task_id: TaskId,
        seq: u64,
        notifier: PoolNotifier<P>,
    },
    Terminated,
}

struct Slot<P: WorkerProgram> {
    worker: Worker<P>,
    status: SlotStatus<P>,
    next_seq: u64,
}

impl<P: WorkerProgram> Slot<P> {
    fn state(&self) -> SlotState {
        match &self.status {
            SlotStatus::Idle => SlotState::Idle,
            SlotStatus::Busy { task_id, .. } => SlotState::Busy(*task_id),
            SlotStatus::Terminated => SlotState::Terminated,
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    submitted: usize,
    completed: usize,
    failed: usize,
}

/// Единственный владелец слотов и очереди
struct Coordinator<P: WorkerProgram> {
    program: P,
    config: Config,
    slots: Vec<Slot<P>>,
    queue: VecDeque<PoolTask<P>>,
    events: CompletionSender<P>,
    counters: Counters,
    drain_waiters: Vec<oneshot::Sender<()>>,
    accepting: bool,
}

impl<P: WorkerProgram> Coordinator<P> {
    fn new(
        program: P,
        config: Config,
    ) -> Result<(Self, mpsc::UnboundedReceiver<PoolCompletion<P>>), PoolError> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let mut slots = Vec::with_capacity(config.num_threads);
        for slot in 0..config.num_threads {
            // при ошибке уже созданные воркеры закроются через Drop
            let worker = Worker::spawn(slot, program.clone(), &config, events_tx.clone())?;
            slots.push(Slot {
                worker,
                status: SlotStatus::Idle,
                next_seq: 0,
            });
        }

        let coordinator = Self {
            program,
            config,
            slots,
            queue: VecDeque::new(),
            events: events_tx,
            counters: Counters::default(),
            drain_waiters: Vec::new(),
            accepting: true,
        };
        Ok((coordinator, events_rx))
    }

    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command<P>>,
        mut events: mpsc::UnboundedReceiver<PoolCompletion<P>>,
    ) {
        let mut commands_open = true;

        while self.accepting || !self.is_drained() {
            tokio::select! {
                biased;
                Some(done) = events.recv() => self.on_completion(done),
                cmd = commands.recv(), if commands_open => match cmd {
                    Some(cmd) => self.on_command(cmd),
                    None => {
                        // все handle дропнуты: дорабатываем то, что уже принято
                        commands_open = false;
                        self.accepting = false;
                    }
                },
            }
        }

        self.notify_drained();
        let terminated = self.terminate_all();
        info!(
            terminated,
            completed = self.counters.completed,
            failed = self.counters.failed,
            "worker pool stopped"
        );
    }

    fn on_command(&mut self, cmd: Command<P>) {
        match cmd {
            Command::Submit(task) => {
                if !self.accepting {
                    trace!(task_id = %task.id, "rejecting task, pool is shutting down");
                    task.on_complete.fail(TaskError::PoolClosed);
                    return;
                }
                self.counters.submitted += 1;
                self.assign(task);
            }
            Command::CheckTaskQueue(reply) => {
                let _ = reply.send(self.check_task_queue());
            }
            Command::Metrics(reply) => {
                let _ = reply.send(self.snapshot());
            }
            Command::Drained(reply) => {
                if self.is_drained() {
                    let _ = reply.send(());
                } else {
                    self.drain_waiters.push(reply);
                }
            }
            Command::Shutdown => {
                if self.accepting {
                    info!(queued = self.queue.len(), "worker pool shutting down");
                }
                self.accepting = false;
            }
        }
    }

    /// Первый свободный слот по возрастанию индекса, иначе в очередь
    fn assign(&mut self, task: PoolTask<P>) {
        if let Err(task) = self.place(task, None) {
            debug!(task_id = %task.id, queued = self.queue.len() + 1, "all workers busy, task queued");
            self.queue.push_back(task);
        }
    }

    /// Ищет живой слот для задачи, начиная с `first`. Каждая неудачная
    /// попытка переводит слот в Terminated, поэтому попыток не больше,
    /// чем слотов плюс один перезапуск. Не нашёл: задача возвращается.
    fn place(&mut self, mut task: PoolTask<P>, first: Option<usize>) -> Result<(), PoolTask<P>> {
        let mut candidate = first.or_else(|| self.free_slot());
        for _ in 0..=self.slots.len() {
            let Some(slot) = candidate else { break };
            match self.dispatch(slot, task) {
                Ok(()) => return Ok(()),
                Err(back) => task = back,
            }
            candidate = self.free_slot();
        }
        Err(task)
    }

    fn free_slot(&mut self) -> Option<usize> {
        if let Some(slot) = self.slots.iter().position(|s| matches!(s.status, SlotStatus::Idle)) {
            return Some(slot);
        }

        // Остановленный слот поднимаем заново, диспатч в мёртвый воркер запрещён
        let slot = self
            .slots
            .iter()
            .position(|s| matches!(s.status, SlotStatus::Terminated))?;
        match Worker::spawn(slot, self.program.clone(), &self.config, self.events.clone()) {
            Ok(worker) => {
                debug!(slot, "respawned terminated worker");
                self.slots[slot].worker = worker;
                self.slots[slot].status = SlotStatus::Idle;
                Some(slot)
            }
            Err(e) => {
                warn!(slot, error = %e, "failed to respawn worker");
                None
            }
        }
    }

    /// Передаёт задачу в простаивающий слот. Если воркер оказался мёртв,
    /// слот становится Terminated, а задача возвращается для другого слота.
    fn dispatch(&mut self, slot: usize, task: PoolTask<P>) -> Result<(), PoolTask<P>> {
        let (task_id, data, notifier) = task.into_parts();
        let entry = &mut self.slots[slot];
        debug_assert!(matches!(entry.status, SlotStatus::Idle));

        entry.next_seq += 1;
        let seq = entry.next_seq;

        match entry.worker.send(Dispatch { seq, data }) {
            Ok(()) => {
                entry.status = SlotStatus::Busy { task_id, seq, notifier };
                debug!(slot, %task_id, dispatch = seq, "task dispatched");
                Ok(())
            }
            Err(Dispatch { data, .. }) => {
                warn!(slot, %task_id, "worker is gone, slot marked terminated");
                entry.worker.detach();
                entry.status = SlotStatus::Terminated;
                Err(Task::new(task_id, data, notifier))
            }
        }
    }

    fn on_completion(&mut self, done: PoolCompletion<P>) {
        let Completion { slot, seq, outcome } = done;
        let Some(entry) = self.slots.get_mut(slot) else {
            warn!(slot, "completion from unknown slot ignored");
            return;
        };

        match mem::replace(&mut entry.status, SlotStatus::Idle) {
            SlotStatus::Busy { task_id, seq: current, notifier } if current == seq => {
                if outcome.is_ok() {
                    self.counters.completed += 1;
                } else {
                    self.counters.failed += 1;
                }
                debug!(slot, %task_id, dispatch = seq, ok = outcome.is_ok(), "task completed");
                if !notifier.complete(outcome) {
                    trace!(%task_id, "result dropped, handle no longer awaited");
                }
            }
            status => {
                // повторный или устаревший сигнал: у слота уже другой диспатч
                entry.status = status;
                warn!(slot, dispatch = seq, "duplicate completion ignored");
                return;
            }
        }

        self.pump(slot);
        self.notify_drained();
    }

    /// Освободившийся слот сразу забирает голову очереди.
    /// Без рекурсии: повторные попытки идут циклом внутри `place`.
    fn pump(&mut self, freed: usize) {
        let Some(task) = self.queue.pop_front() else { return };
        if let Err(task) = self.place(task, Some(freed)) {
            self.queue.push_front(task);
        }
    }

    fn check_task_queue(&mut self) -> usize {
        if !self.queue.is_empty() {
            return 0;
        }

        let mut terminated = 0;
        for (slot, entry) in self.slots.iter_mut().enumerate() {
            if matches!(entry.status, SlotStatus::Idle) {
                // join блокирует поток runtime, но простаивающий воркер
                // ждёт на recv и выходит сразу после закрытия inbox
                entry.worker.terminate();
                entry.status = SlotStatus::Terminated;
                terminated += 1;
                info!(slot, "idle worker terminated");
            }
        }
        terminated
    }

    fn terminate_all(&mut self) -> usize {
        let mut terminated = 0;
        // вызывается только после дренажа: живые воркеры простаивают,
        // поэтому join внутри terminate не ждёт
        for entry in self.slots.iter_mut() {
            if entry.worker.is_alive() {
                entry.worker.terminate();
                terminated += 1;
            }
            entry.status = SlotStatus::Terminated;
        }
        terminated
    }

    fn is_drained(&self) -> bool {
        self.queue.is_empty()
            && !self
                .slots
                .iter()
                .any(|s| matches!(s.status, SlotStatus::Busy { .. }))
    }

    fn notify_drained(&mut self) {
        if self.drain_waiters.is_empty() || !self.is_drained() {
            return;
        }
        for waiter in self.drain_waiters.drain(..) {
            let _ = waiter.send(());
        }
    }

    fn snapshot(&self) -> PoolMetrics {
        let mut metrics = PoolMetrics::from_slots(self.slots.iter().map(Slot::state).collect());
        metrics.queued_tasks = self.queue.len();
        metrics.total_submitted = self.counters.submitted;
        metrics.completed_tasks = self.counters.completed;
        metrics.failed_tasks = self.counters.failed;
        metrics
    }
}
