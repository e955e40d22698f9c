/// Notified by [`StoreMessageReadSet::prefetch`](crate::StoreMessageReadSet::prefetch)
/// after every prefetch attempt.
pub trait IoOutcomeHandler: Send + Sync {
    /// Called after bytes were read successfully.
    fn on_success(&self);

    /// Called after a read failed because of the storage medium.
    fn on_error(&self);
}

/// Handler that ignores every outcome. Used when none is supplied.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopIoHandler;

impl IoOutcomeHandler for NoopIoHandler {
    fn on_success(&self) {}

    fn on_error(&self) {}
}
