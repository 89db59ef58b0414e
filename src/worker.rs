use super::{
    errors::{PoolError, TaskError},
    pool::Config,
    program::WorkerProgram,
    result::TaskResult,
};
use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    thread,
};
use crossbeam::channel::{self, Receiver, Sender};
use tokio::sync::mpsc;
use tracing::{debug, warn};


/// Порция работы для воркера. `seq` уникален в пределах слота.
pub(crate) struct Dispatch<S> {
    pub seq: u64,
    pub data: S,
}

/// Сообщение воркера координатору о завершении одного диспатча
pub(crate) struct Completion<R, E> {
    pub slot: usize,
    pub seq: u64,
    pub outcome: TaskResult<R, E>,
}

pub(crate) type CompletionSender<P> = mpsc::UnboundedSender<
    Completion<<P as WorkerProgram>::Output, <P as WorkerProgram>::Error>,
>;

/// Постоянный воркер: отдельный OS-поток со своим inbox.
/// Живёт, пока не вызван `terminate` или пока handle не дропнут.
pub(crate) struct Worker<P: WorkerProgram> {
    slot: usize,
    inbox: Option<Sender<Dispatch<P::Input>>>,
    thread: Option<thread::JoinHandle<()>>,
}

impl<P: WorkerProgram> Worker<P> {
    pub fn spawn(
        slot: usize,
        program: P,
        config: &Config,
        events: CompletionSender<P>,
    ) -> Result<Self, PoolError> {
        let (tx, rx) = channel::unbounded();

        let mut builder = thread::Builder::new()
            .name(format!("{}-{}", config.thread_name_prefix, slot));
        if let Some(size) = config.stack_size {
            builder = builder.stack_size(size);
        }

        let thread = builder
            .spawn(move || Self::run_loop(slot, program, rx, events))
            .map_err(|source| PoolError::Spawn { slot, source })?;

        debug!(slot, "worker spawned");

        Ok(Self {
            slot,
            inbox: Some(tx),
            thread: Some(thread),
        })
    }

    fn run_loop(
        slot: usize,
        mut program: P,
        inbox: Receiver<Dispatch<P::Input>>,
        events: CompletionSender<P>,
    ) {
        // recv вернёт ошибку, когда координатор закроет inbox
        for Dispatch { seq, data } in inbox.iter() {
            let outcome = match panic::catch_unwind(AssertUnwindSafe(|| program.run(data))) {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(e)) => Err(TaskError::Failed(e)),
                Err(panic_info) => {
                    let message = panic_message(&*panic_info);
                    warn!(slot, seq, %message, "worker program panicked");
                    Err(TaskError::Panic(message))
                }
            };

            if events.send(Completion { slot, seq, outcome }).is_err() {
                break;
            }
        }
    }

    /// Отдаёт данные воркеру. Если поток уже завершился, данные возвращаются.
    pub fn send(&self, dispatch: Dispatch<P::Input>) -> Result<(), Dispatch<P::Input>> {
        match &self.inbox {
            Some(inbox) => inbox.send(dispatch).map_err(|e| e.into_inner()),
            None => Err(dispatch),
        }
    }

    #[inline]
    pub fn is_alive(&self) -> bool {
        self.inbox.is_some()
    }

    /// Закрывает inbox и дожидается выхода потока.
    /// Вызывать только для простаивающего воркера: он заблокирован на recv
    /// и выходит сразу после закрытия канала.
    pub fn terminate(&mut self) -> bool {
        let was_alive = self.inbox.take().is_some();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!(slot = self.slot, "worker thread exited with a panic");
            }
        }
        was_alive
    }

    /// Отпускает поток без join: закрывает inbox и отвязывает handle.
    /// Для воркера, который уже не принимает задачи.
    pub fn detach(&mut self) {
        self.inbox.take();
        self.thread.take();
    }
}

impl<P: WorkerProgram> Drop for Worker<P> {
    fn drop(&mut self) {
        // Без join: поток может быть ещё занят задачей. Он выйдет сам,
        // как только закончит её и увидит закрытый inbox.
        self.inbox.take();
    }
}

fn panic_message(panic_info: &(dyn Any + Send)) -> String {
    if let Some(s) = panic_info.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic_info.downcast_ref::<String>() {
        s.clone()
    } else {
        format!("{:?}", panic_info)
    }
}
