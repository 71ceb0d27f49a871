use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Single-slot coalescing timer: arming cancels whatever was armed before.
///
/// Cancellation only covers the quiet period. Once the delay elapses the work is
/// detached and runs to completion even if the slot is re-armed.
#[derive(Default)]
pub struct DebounceSlot {
    timer: Option<JoinHandle<()>>,
}

impl DebounceSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arm<F>(&mut self, delay: Duration, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            tokio::spawn(work);
        }));
    }

    pub fn cancel(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    /// True while a quiet period is still running
    pub fn is_armed(&self) -> bool {
        self.timer.as_ref().is_some_and(|timer| !timer.is_finished())
    }
}

impl Drop for DebounceSlot {
    fn drop(&mut self) {
        self.cancel();
    }
}
