//! Periodic eviction sweep.
//!
//! Expiry is always enforced lazily at use; this task only bounds memory by
//! dropping idle rate-limit buckets, expired CSRF tokens and sessions, and
//! purging expired action tokens.

use std::time::Duration;

use crate::http::gateway::GatewayState;
use crate::lifecycle::shutdown::Shutdown;

/// Counts from one sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub buckets: usize,
    pub csrf_tokens: usize,
    pub sessions: usize,
    pub action_tokens: usize,
}

/// Run one sweep now.
pub async fn sweep(state: &GatewayState) -> SweepReport {
    let inner = &state.inner;
    let idle = chrono::Duration::seconds(
        i64::try_from(inner.config.rate_limit.idle_eviction_secs).unwrap_or(i64::MAX),
    );

    let action_tokens = match inner.action_tokens.purge_expired().await {
        Ok(count) => count,
        Err(e) => {
            tracing::warn!(error = %e, "Action token purge failed");
            0
        }
    };

    SweepReport {
        buckets: inner.limiter.evict_idle(idle),
        csrf_tokens: inner.csrf.sweep(),
        sessions: inner.sessions.sweep(),
        action_tokens,
    }
}

/// Sweep every `interval` until shutdown is triggered.
pub async fn run(state: GatewayState, interval: Duration, shutdown: Shutdown) {
    let mut stop = shutdown.subscribe();
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let report = sweep(&state).await;
                tracing::debug!(
                    buckets = report.buckets,
                    csrf_tokens = report.csrf_tokens,
                    sessions = report.sessions,
                    action_tokens = report.action_tokens,
                    "Maintenance sweep complete"
                );
            }
            _ = stop.recv() => {
                tracing::info!("Maintenance task stopping");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::schema::GatewayConfig;
    use crate::security::classifier::EndpointKind;
    use crate::store::{Action, MemoryActionTokenStore};
    use std::sync::Arc;

    #[tokio::test]
    async fn sweep_evicts_everything_expired() {
        let clock = Arc::new(ManualClock::starting_now());
        let state = GatewayState::new(
            GatewayConfig::default(),
            Arc::new(MemoryActionTokenStore::new(true, None)),
            clock.clone(),
        );
        let inner = &state.inner;
        inner.limiter.check("1.2.3.4", "/", EndpointKind::Public);
        inner.csrf.issue("/approve/x").unwrap();
        inner.sessions.issue().unwrap();
        inner.action_tokens.issue("req-1", Action::Approve).await.unwrap();

        assert_eq!(sweep(&state).await, SweepReport::default());

        clock.advance(chrono::Duration::days(2));
        assert_eq!(
            sweep(&state).await,
            SweepReport {
                buckets: 1,
                csrf_tokens: 1,
                sessions: 1,
                action_tokens: 1,
            }
        );
    }

    #[tokio::test]
    async fn task_stops_on_shutdown() {
        let state = GatewayState::new(
            GatewayConfig::default(),
            Arc::new(MemoryActionTokenStore::new(true, None)),
            Arc::new(ManualClock::starting_now()),
        );
        let shutdown = Shutdown::new();
        let task = tokio::spawn(run(state, Duration::from_millis(10), shutdown.clone()));
        tokio::time::sleep(Duration::from_millis(30)).await;
        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }
}
