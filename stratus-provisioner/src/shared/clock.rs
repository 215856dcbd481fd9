use async_trait::async_trait;
use std::time::Duration;

/// Suspends the current task between polls and retries.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}

/// Records requested delays without waiting.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    sleeps: std::sync::Mutex<Vec<Duration>>,
}

#[cfg(test)]
impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps
            .lock()
            .map(|sleeps| sleeps.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        if let Ok(mut sleeps) = self.sleeps.lock() {
            sleeps.push(duration);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_recording_sleeper_returns_immediately() {
        let sleeper = RecordingSleeper::new();
        sleeper.sleep(Duration::from_secs(3600)).await;
        sleeper.sleep(Duration::from_secs(30)).await;

        assert_eq!(
            sleeper.sleeps(),
            vec![Duration::from_secs(3600), Duration::from_secs(30)]
        );
    }

    #[tokio::test]
    async fn test_tokio_sleeper_skips_zero_delay() {
        let started = std::time::Instant::now();
        TokioSleeper.sleep(Duration::ZERO).await;
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
