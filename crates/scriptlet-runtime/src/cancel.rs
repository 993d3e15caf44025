//! Cooperative cancellation.
//!
//! A [`CancelToken`] combines an optional caller signal (a watch channel
//! flipped to `true` on client disconnect or shutdown) with an optional
//! deadline. The interpreter polls [`CancelToken::is_cancelled`] at its
//! progress safepoint; host I/O races [`CancelToken::cancelled`].

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    signal: Option<watch::Receiver<bool>>,
    deadline: Option<Instant>,
}

impl CancelToken {
    /// A token that never fires.
    pub fn never() -> Self {
        Self::default()
    }

    pub fn from_signal(signal: watch::Receiver<bool>) -> Self {
        Self {
            signal: Some(signal),
            deadline: None,
        }
    }

    /// Add a deadline. The earlier of two deadlines wins.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    /// Add a deadline `timeout` from now. A timeout past the clock's range
    /// adds none.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self,
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        if let Some(signal) = &self.signal {
            if *signal.borrow() {
                return true;
            }
        }
        matches!(self.deadline, Some(deadline) if Instant::now() >= deadline)
    }

    /// Resolves once the signal fires or the deadline passes. A dropped
    /// sender never fires.
    pub async fn cancelled(&self) {
        let signal = async {
            match &self.signal {
                Some(signal) => {
                    let mut signal = signal.clone();
                    let closed = signal.wait_for(|cancelled| *cancelled).await.is_err();
                    if closed {
                        std::future::pending::<()>().await;
                    }
                }
                None => std::future::pending::<()>().await,
            }
        };

        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = signal => {}
            _ = deadline => {}
        }
    }
}
