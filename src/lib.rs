//! Пул постоянных воркеров фиксированного размера
//!
//! # Features
//! - Не более N задач исполняются одновременно, остальные ждут в FIFO-очереди
//! - Каждый воркер - отдельный OS-поток со своей копией программы
//! - Ровно один результат на задачу, повторные сигналы воркера игнорируются
//! - Паника в программе воркера завершает только текущую задачу
//! - Освобождение простаивающих воркеров и их ленивый перезапуск
//! - Метрики, мониторинг и graceful shutdown

pub mod errors;
pub mod handle;
pub mod model;
pub mod pool;
pub mod program;
pub mod result;
pub mod task;
mod worker;

pub use errors::{PoolError, TaskError};
pub use pool::{Config, PoolHandle, WorkerPool};
pub use program::{program_fn, WorkerProgram};
