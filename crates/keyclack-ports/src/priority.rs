/// Platform-gated escalation of the scheduling thread's priority.
pub trait PriorityPort: Send + Sync {
    /// Returns `true` when the calling thread was elevated.
    fn elevate_priority(&self) -> bool;
}
