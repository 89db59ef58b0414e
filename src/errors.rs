use std::io;
use thiserror::Error;


/// Ошибки уровня пула: конфигурация, запуск воркеров, закрытый координатор
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("invalid pool configuration: {0}")]
    InvalidConfig(String),
    #[error("failed to spawn worker for slot {slot}: {source}")]
    Spawn {
        slot: usize,
        #[source]
        source: io::Error,
    },
    #[error("pool coordinator has shut down")]
    Closed,
}

/// Ошибка конкретной задачи. Не влияет на другие задачи и на сам пул.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum TaskError<E> {
    #[error("worker reported failure: {0:?}")]
    Failed(E),
    #[error("worker panicked: {0}")]
    Panic(String),
    #[error("pool closed before the task completed")]
    PoolClosed,
    #[error("timed out waiting for the task result")]
    Timeout,
}

impl<E> TaskError<E> {
    /// Ошибка, которую вернула сама программа воркера
    pub fn failure(&self) -> Option<&E> {
        match self {
            TaskError::Failed(e) => Some(e),
            _ => None,
        }
    }
}
