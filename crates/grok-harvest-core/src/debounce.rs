use std::time::Duration;
use tokio::sync::mpsc;

/// Sending half: fire one trigger per observed event.
#[derive(Clone)]
pub struct DebounceTrigger {
    tx: mpsc::UnboundedSender<()>,
}

impl DebounceTrigger {
    /// Returns false once the receiving side is gone.
    pub fn trigger(&self) -> bool {
        self.tx.send(()).is_ok()
    }
}

/// Coalesces bursts of triggers: a burst ends once `window` passes with no new trigger.
pub struct Debouncer {
    rx: mpsc::UnboundedReceiver<()>,
    window: Duration,
}

pub fn debouncer(window: Duration) -> (DebounceTrigger, Debouncer) {
    let (tx, rx) = mpsc::unbounded_channel();
    (DebounceTrigger { tx }, Debouncer { rx, window })
}

impl Debouncer {
    /// Wait for the next burst and return how many triggers it merged.
    /// `None` once every trigger has been dropped and nothing is pending.
    pub async fn next_burst(&mut self) -> Option<usize> {
        self.rx.recv().await?;
        let mut merged = 1;
        loop {
            match tokio::time::timeout(self.window, self.rx.recv()).await {
                Ok(Some(())) => merged += 1,
                Ok(None) | Err(_) => break,
            }
        }
        Some(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_burst_within_window_is_merged() {
        let (trigger, mut debouncer) = debouncer(Duration::from_millis(150));
        for _ in 0..5 {
            trigger.trigger();
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert_eq!(debouncer.next_burst().await, Some(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_separate_bursts_stay_separate() {
        let (trigger, mut debouncer) = debouncer(Duration::from_millis(100));
        let producer = tokio::spawn(async move {
            trigger.trigger();
            trigger.trigger();
            tokio::time::sleep(Duration::from_millis(500)).await;
            trigger.trigger();
        });

        assert_eq!(debouncer.next_burst().await, Some(2));
        assert_eq!(debouncer.next_burst().await, Some(1));
        producer.await.unwrap();
        assert_eq!(debouncer.next_burst().await, None);
    }
}
