use super::errors::TaskError;


/// Результат одной задачи: значение программы воркера или ошибка задачи
pub type TaskResult<R, E> = Result<R, TaskError<E>>;
