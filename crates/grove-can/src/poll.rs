//! Poll-until-done status shared by every non-blocking operation

/// Outcome of a single `poll` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStatus<T> {
    /// Still waiting; call `poll` again
    Pending,
    /// Finished successfully
    Ready(T),
    /// The idle window elapsed without the expected bytes
    TimedOut,
}

impl<T> PollStatus<T> {
    /// True while the operation needs more polling
    pub fn is_pending(&self) -> bool {
        matches!(self, PollStatus::Pending)
    }

    /// True once the operation has finished, successfully or not
    pub fn is_done(&self) -> bool {
        !self.is_pending()
    }

    /// Map the ready value
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> PollStatus<U> {
        match self {
            PollStatus::Pending => PollStatus::Pending,
            PollStatus::Ready(value) => PollStatus::Ready(f(value)),
            PollStatus::TimedOut => PollStatus::TimedOut,
        }
    }

    /// Convert into `Some(value)` on success, `None` otherwise
    pub fn ready(self) -> Option<T> {
        match self {
            PollStatus::Ready(value) => Some(value),
            _ => None,
        }
    }
}
