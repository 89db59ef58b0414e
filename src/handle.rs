use super::{
    errors::TaskError,
    result::TaskResult,
    task::TaskId,
};
use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll}
};
use tokio::{
    sync::oneshot,
    time::Duration,
};


/// Handle на отправленную задачу. Резолвится ровно один раз: результатом
/// программы воркера или ошибкой задачи.
///
/// Drop handle не отменяет задачу: она всё равно будет выполнена.
pub struct JoinHandle<R, E> {
    id: TaskId,
    receiver: oneshot::Receiver<TaskResult<R, E>>,
}

impl<R, E> JoinHandle<R, E> {

    pub fn new
    (
        id: TaskId,
        receiver: oneshot::Receiver<TaskResult<R, E>>,
    ) -> Self {
        Self {
            id,
            receiver
        }
    }

    #[inline]
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Ждёт результат не дольше `timeout`. По истечении задача продолжает
    /// выполняться, теряется только её результат.
    pub async fn await_timeout(self, timeout: Duration) -> TaskResult<R, E> {
        match tokio::time::timeout(timeout, self.receiver).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(TaskError::PoolClosed),
            Err(_) => Err(TaskError::Timeout),
        }
    }
}

impl<R, E> Future for JoinHandle<R, E> {
    type Output = TaskResult<R, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.receiver).poll(cx) {
            Poll::Ready(res) => Poll::Ready(res.unwrap_or(Err(TaskError::PoolClosed))),
            Poll::Pending => Poll::Pending,
        }
    }
}
