use super::{
    errors::TaskError,
    result::TaskResult,
};
use std::fmt;
use tokio::sync::oneshot;


/// Порядковый номер задачи, выдаётся при submit
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Канал результата задачи. Срабатывает не более одного раза:
/// `complete` потребляет его по значению.
pub struct Notifier<R, E> {
    sender: oneshot::Sender<TaskResult<R, E>>,
}

impl<R, E> Notifier<R, E> {
    pub fn new(sender: oneshot::Sender<TaskResult<R, E>>) -> Self {
        Self { sender }
    }

    /// Отправляет результат. `false`, если handle уже дропнут вызывающим.
    pub fn complete(self, outcome: TaskResult<R, E>) -> bool {
        self.sender.send(outcome).is_ok()
    }

    pub fn fail(self, err: TaskError<E>) -> bool {
        self.complete(Err(err))
    }
}

/// Единица работы: входные данные и уведомитель о завершении
pub struct Task<S, R, E> {
    pub id: TaskId,
    pub data: S,
    pub on_complete: Notifier<R, E>,
}

impl<S, R, E> Task<S, R, E> {
    pub fn new(id: TaskId, data: S, on_complete: Notifier<R, E>) -> Self {
        Self { id, data, on_complete }
    }

    /// При диспатче данные уходят воркеру, а уведомитель остаётся в слоте
    pub fn into_parts(self) -> (TaskId, S, Notifier<R, E>) {
        (self.id, self.data, self.on_complete)
    }

    pub fn complete(self, outcome: TaskResult<R, E>) -> bool {
        self.on_complete.complete(outcome)
    }
}

impl<S, R, E> fmt::Debug for Task<S, R, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task").field("id", &self.id).finish_non_exhaustive()
    }
}
