use super::task::TaskId;


/// Состояние слота: Idle -> Busy -> Idle -> (Terminated -> Idle при повторном запуске)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Idle,
    Busy(TaskId),
    Terminated,
}

impl SlotState {
    #[inline]
    pub fn is_idle(&self) -> bool {
        matches!(self, SlotState::Idle)
    }

    #[inline]
    pub fn is_busy(&self) -> bool {
        matches!(self, SlotState::Busy(_))
    }

    #[inline]
    pub fn is_terminated(&self) -> bool {
        matches!(self, SlotState::Terminated)
    }
}

/// Снимок состояния пула, снятый координатором между двумя событиями
#[derive(Debug, Clone)]
pub struct PoolMetrics {
    pub slots: Vec<SlotState>,
    pub idle_workers: usize,
    pub busy_workers: usize,
    pub terminated_workers: usize,
    pub queued_tasks: usize,
    pub total_submitted: usize,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
}

impl PoolMetrics {
    pub(crate) fn from_slots(slots: Vec<SlotState>) -> Self {
        let idle_workers = slots.iter().filter(|s| s.is_idle()).count();
        let busy_workers = slots.iter().filter(|s| s.is_busy()).count();
        let terminated_workers = slots.len() - idle_workers - busy_workers;
        Self {
            slots,
            idle_workers,
            busy_workers,
            terminated_workers,
            queued_tasks: 0,
            total_submitted: 0,
            completed_tasks: 0,
            failed_tasks: 0,
        }
    }

    /// Доля занятых среди живых воркеров
    pub fn utilization(&self) -> f64 {
        if self.busy_workers + self.idle_workers == 0 {
            return 0.0;
        }
        self.busy_workers as f64 / (self.busy_workers + self.idle_workers) as f64
    }

    pub fn queue_pressure(&self) -> f64 {
        self.queued_tasks as f64
    }

    pub fn success_rate(&self) -> f64 {
        let total = self.completed_tasks + self.failed_tasks;
        if total == 0 {
            return 1.0;
        }
        self.completed_tasks as f64 / total as f64
    }

    /// Задачи, которые ещё не получили результат
    pub fn in_flight(&self) -> usize {
        self.busy_workers + self.queued_tasks
    }
}
