//! Guarded provider session.
//!
//! Everything between the commander and the wire lives here: the circuit
//! breaker gate, min-interval pacing, the sliding RPM window, the hard
//! request timeout, the single-retry backoff for transient failures, and
//! best-effort cancellation for the admin emergency stop.

use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::AiConfig;

use super::breaker::{CircuitBreaker, CircuitState};
use super::context::DecisionContext;
use super::provider::{ConnectionProbe, GeneratedReply, LlmProvider, ProviderError};
use super::rate_limit::{Pacer, RequestWindow};

/// Backoff ceiling for the transient-failure retry.
const BACKOFF_CAP: Duration = Duration::from_secs(8);

pub struct ProviderSession {
    provider: Box<dyn LlmProvider>,
    breaker: CircuitBreaker,
    pacer: Pacer,
    window: RequestWindow,
    timeout: Duration,
    cancel: CancellationToken,
}

impl ProviderSession {
    pub fn new(provider: Box<dyn LlmProvider>, ai: &AiConfig) -> Self {
        Self {
            provider,
            breaker: CircuitBreaker::default(),
            pacer: Pacer::new(Duration::from_secs_f64(ai.min_interval.max(0.0))),
            window: RequestWindow::per_minute(ai.rate_limit_rpm),
            timeout: Duration::from_secs(ai.timeout),
            cancel: CancellationToken::new(),
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn breaker_state(&self) -> CircuitState {
        self.breaker.state()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.breaker.consecutive_failures()
    }

    pub fn provider(&self) -> &dyn LlmProvider {
        self.provider.as_ref()
    }

    /// Swap the backend (admin `setLLMConfig`). Pacing history survives;
    /// the breaker state does too, since a misbehaving upstream is usually
    /// the account, not the model.
    pub fn replace_provider(&mut self, provider: Box<dyn LlmProvider>, ai: &AiConfig) {
        self.provider = provider;
        self.pacer
            .set_min_interval(Duration::from_secs_f64(ai.min_interval.max(0.0)));
        self.window.set_limit(ai.rate_limit_rpm);
        self.timeout = Duration::from_secs(ai.timeout);
    }

    pub fn set_min_interval(&mut self, seconds: f64) {
        self.pacer
            .set_min_interval(Duration::from_secs_f64(seconds.max(0.0)));
    }

    /// One guarded decision call.
    pub async fn generate_orders(
        &mut self,
        context: &DecisionContext,
    ) -> Result<GeneratedReply, ProviderError> {
        if !self.breaker.allows_call() {
            return Err(ProviderError::BreakerOpen);
        }
        self.pacer.pace().await;
        self.window.admit().await;

        let cancel = self.cancel.clone();
        let mut result = Self::call_once(
            self.provider.as_mut(),
            context,
            self.timeout,
            &cancel,
        )
        .await;

        if let Err(e) = &result {
            if e.is_transient() {
                let backoff = jittered_backoff(1);
                warn!(error = %e, backoff_ms = backoff.as_millis() as u64, "transient provider failure, retrying once");
                tokio::time::sleep(backoff).await;
                self.window.admit().await;
                result =
                    Self::call_once(self.provider.as_mut(), context, self.timeout, &cancel).await;
            }
        }

        match &result {
            Ok(_) => self.breaker.record_success(),
            Err(ProviderError::Cancelled) => {}
            Err(_) => self.breaker.record_failure(),
        }
        result
    }

    /// Guarded connection probe. Shares the breaker and the RPM window but
    /// not the decision pacer.
    pub async fn test_connection(&mut self) -> Result<ConnectionProbe, ProviderError> {
        if !self.breaker.allows_call() {
            return Err(ProviderError::BreakerOpen);
        }
        self.window.admit().await;
        let cancel = self.cancel.clone();
        let result = tokio::select! {
            _ = cancel.cancelled() => Err(ProviderError::Cancelled),
            r = tokio::time::timeout(self.timeout, self.provider.test_connection()) => {
                match r {
                    Ok(inner) => inner,
                    Err(_) => Err(ProviderError::Timeout),
                }
            }
        };
        match &result {
            Ok(_) => self.breaker.record_success(),
            Err(ProviderError::Cancelled) => {}
            Err(_) => self.breaker.record_failure(),
        }
        result
    }

    async fn call_once(
        provider: &mut dyn LlmProvider,
        context: &DecisionContext,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<GeneratedReply, ProviderError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(ProviderError::Cancelled),
            r = tokio::time::timeout(timeout, provider.generate_orders(context)) => {
                match r {
                    Ok(inner) => inner,
                    Err(_) => Err(ProviderError::Timeout),
                }
            }
        }
    }

    /// Admin emergency stop: cancel any in-flight call, open the breaker,
    /// and drop cache handles. Order history clearing is the state
    /// manager's side of the same command.
    pub fn emergency_stop(&mut self) {
        info!("emergency stop: opening breaker and cancelling in-flight provider call");
        self.cancel.cancel();
        self.cancel = CancellationToken::new();
        self.breaker.trip();
        self.provider.clear_cache();
        self.pacer.reset();
    }

    /// Admin redeploy: Open → HalfOpen; the next call probes the upstream.
    pub fn redeploy(&mut self) {
        self.breaker.redeploy();
    }
}

/// Exponential backoff with multiplicative jitter, capped at 8 s.
fn jittered_backoff(attempt: u32) -> Duration {
    let base = Duration::from_secs(2u64.saturating_pow(attempt)).min(BACKOFF_CAP);
    let jitter = rand::thread_rng().gen_range(0.5..1.5);
    base.mul_f64(jitter).min(BACKOFF_CAP)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::context::ThinkingKnobs;
    use crate::llm::provider::ProviderKind;
    use crate::types::TokenUsage;
    use async_trait::async_trait;
    use std::collections::VecDeque;

    /// Scripted backend: pops one canned outcome per call.
    struct Scripted {
        script: VecDeque<Result<String, ProviderError>>,
        calls: u32,
    }

    impl Scripted {
        fn new(script: Vec<Result<String, ProviderError>>) -> Self {
            Self {
                script: script.into(),
                calls: 0,
            }
        }
    }

    #[async_trait]
    impl LlmProvider for Scripted {
        fn kind(&self) -> ProviderKind {
            ProviderKind::Local
        }
        fn model(&self) -> &str {
            "scripted"
        }
        async fn generate_orders(
            &mut self,
            _context: &DecisionContext,
        ) -> Result<GeneratedReply, ProviderError> {
            self.calls += 1;
            match self.script.pop_front() {
                Some(Ok(text)) => Ok(GeneratedReply {
                    text,
                    thoughts: None,
                    usage: TokenUsage {
                        input_tokens: 10,
                        output_tokens: 5,
                        cached_input_tokens: 0,
                        total_tokens: 15,
                        latency_ms: 1,
                        provider: ProviderKind::Local,
                        model: "scripted".into(),
                    },
                }),
                Some(Err(e)) => Err(e),
                None => Err(ProviderError::Unavailable("script exhausted".into())),
            }
        }
        async fn test_connection(&mut self) -> Result<ConnectionProbe, ProviderError> {
            Ok(ConnectionProbe {
                provider: ProviderKind::Local,
                model: "scripted".into(),
                greeting: "hi".into(),
            })
        }
    }

    fn context() -> DecisionContext {
        DecisionContext {
            system_prompt: "s".into(),
            standing_block: "b".into(),
            dynamic_block: "d".into(),
            thinking: ThinkingKnobs::disabled(),
        }
    }

    fn session(script: Vec<Result<String, ProviderError>>) -> ProviderSession {
        let ai = AiConfig {
            min_interval: 0.0,
            rate_limit_rpm: 1000,
            ..Default::default()
        };
        ProviderSession::new(Box::new(Scripted::new(script)), &ai)
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failure_retries_once() {
        let mut s = session(vec![
            Err(ProviderError::RateLimited),
            Ok("{\"orders\":[]}".into()),
        ]);
        let reply = s.generate_orders(&context()).await.unwrap();
        assert_eq!(reply.text, "{\"orders\":[]}");
        assert_eq!(s.breaker_state(), CircuitState::Closed);
        assert_eq!(s.consecutive_failures(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_failure_skips_retry() {
        let mut s = session(vec![
            Err(ProviderError::AuthFailure),
            Ok("unreachable".into()),
        ]);
        assert!(matches!(
            s.generate_orders(&context()).await,
            Err(ProviderError::AuthFailure)
        ));
        assert_eq!(s.consecutive_failures(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn breaker_opens_after_three_failures_and_blocks() {
        // Each call fails twice (initial + retry) but counts once
        let mut s = session(vec![
            Err(ProviderError::Timeout),
            Err(ProviderError::Timeout),
            Err(ProviderError::Timeout),
            Err(ProviderError::Timeout),
            Err(ProviderError::Timeout),
            Err(ProviderError::Timeout),
        ]);
        for _ in 0..3 {
            assert!(s.generate_orders(&context()).await.is_err());
        }
        assert_eq!(s.breaker_state(), CircuitState::Open);
        assert_eq!(s.consecutive_failures(), 3);

        // Fourth attempt never reaches the provider
        assert!(matches!(
            s.generate_orders(&context()).await,
            Err(ProviderError::BreakerOpen)
        ));
        assert_eq!(s.consecutive_failures(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn redeploy_probe_closes_on_success() {
        let mut s = session(vec![
            Err(ProviderError::Timeout),
            Err(ProviderError::Timeout),
            Err(ProviderError::Timeout),
            Err(ProviderError::Timeout),
            Err(ProviderError::Timeout),
            Err(ProviderError::Timeout),
            Ok("{\"orders\":[]}".into()),
        ]);
        for _ in 0..3 {
            let _ = s.generate_orders(&context()).await;
        }
        assert_eq!(s.breaker_state(), CircuitState::Open);

        s.emergency_stop();
        assert_eq!(s.breaker_state(), CircuitState::Open);
        s.redeploy();
        assert_eq!(s.breaker_state(), CircuitState::HalfOpen);

        s.generate_orders(&context()).await.unwrap();
        assert_eq!(s.breaker_state(), CircuitState::Closed);
        assert_eq!(s.consecutive_failures(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn emergency_stop_trips_from_closed() {
        let mut s = session(vec![Ok("x".into())]);
        s.emergency_stop();
        assert!(matches!(
            s.generate_orders(&context()).await,
            Err(ProviderError::BreakerOpen)
        ));
    }

    #[test]
    fn backoff_is_capped() {
        for attempt in 1..6 {
            assert!(jittered_backoff(attempt) <= BACKOFF_CAP);
        }
    }
}
