//! Token issuance and redemption.
//!
//! [`CapabilityService::redeem`] runs a fixed pipeline:
//!
//! 1. resolve the target key
//! 2. verify the HMAC signature
//! 3. check freshness against [`TOKEN_VALIDITY_MS`]
//! 4. consume the signature in the [`ReplayGuard`]
//! 5. actuate the target's relay
//!
//! Signature comes before freshness and freshness before consumption, so a
//! stale or forged token is never recorded in the replay guard.

use std::sync::Arc;

use crate::actuation::{ActuationClient, ActuationErrorKind, ActuationResult, Actuator};
use crate::clock::Clock;
use crate::replay::{Admission, RejectReason, ReplayGuard};
use crate::targets::{Target, TargetRegistry};
use crate::token::{Token, TokenCodec};

/// How long a token stays redeemable after issuance.
pub const TOKEN_VALIDITY_MS: u64 = 5 * 60 * 1000;

/// Every way a capability request can fail.
#[derive(Debug, thiserror::Error)]
pub enum CapabilityError {
    #[error("unknown target {0:?}")]
    UnknownTarget(String),
    #[error("invalid signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
    #[error("token already used")]
    AlreadyUsed,
    #[error("upstream credential not configured")]
    MissingCredential,
    #[error("upstream actuation failed")]
    UpstreamFailure(Box<ActuationResult>),
}

impl CapabilityError {
    /// Stable machine-readable code used in response bodies and logs.
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownTarget(_) => "unknown_target",
            Self::InvalidSignature => "invalid_signature",
            Self::Expired => "expired",
            Self::AlreadyUsed => "already_used",
            Self::MissingCredential => "missing_credential",
            Self::UpstreamFailure(_) => "upstream_failure",
        }
    }

    /// The upstream result behind an [`UpstreamFailure`](Self::UpstreamFailure).
    pub fn actuation(&self) -> Option<&ActuationResult> {
        match self {
            Self::UpstreamFailure(result) => Some(&**result),
            _ => None,
        }
    }
}

/// Orchestrates [`TokenCodec`], [`ReplayGuard`], and an [`Actuator`].
pub struct CapabilityService<A = ActuationClient> {
    registry: Arc<TargetRegistry>,
    codec: TokenCodec,
    guard: ReplayGuard,
    actuator: A,
    clock: Arc<dyn Clock>,
}

impl<A: Actuator> CapabilityService<A> {
    pub fn new(
        registry: Arc<TargetRegistry>,
        codec: TokenCodec,
        actuator: A,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry,
            codec,
            guard: ReplayGuard::new(),
            actuator,
            clock,
        }
    }

    pub fn registry(&self) -> &TargetRegistry {
        &self.registry
    }

    pub fn actuator(&self) -> &A {
        &self.actuator
    }

    pub fn replay_guard(&self) -> &ReplayGuard {
        &self.guard
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Mint a token for `target_key` bound to the current time.
    pub fn request_token(&self, target_key: &str) -> Result<Token, CapabilityError> {
        let target = self.resolve(target_key)?;
        Ok(self.codec.issue(&target.key, self.clock.now_ms()))
    }

    /// Validate and consume a token, then actuate its target.
    pub async fn redeem(
        &self,
        target_key: &str,
        issued_at: u64,
        signature: &str,
    ) -> Result<ActuationResult, CapabilityError> {
        let target = self.resolve(target_key)?;

        if !self.codec.verify_signature(&target.key, issued_at, signature) {
            return Err(CapabilityError::InvalidSignature);
        }

        let now = self.clock.now_ms();
        match now.checked_sub(issued_at) {
            Some(age) if age <= TOKEN_VALIDITY_MS => {}
            _ => return Err(CapabilityError::Expired),
        }

        match self.guard.try_consume(signature, now, TOKEN_VALIDITY_MS).await {
            Admission::Accepted => {}
            Admission::Rejected(RejectReason::AlreadyUsed) => {
                return Err(CapabilityError::AlreadyUsed)
            }
            Admission::Rejected(RejectReason::Expired) => return Err(CapabilityError::Expired),
        }

        into_outcome(self.actuator.actuate(&target.device_id).await)
    }

    /// Actuate without any token. Reserved for operator diagnostics.
    pub async fn actuate_unchecked(
        &self,
        target_key: &str,
    ) -> Result<(&Target, ActuationResult), CapabilityError> {
        let target = self.resolve(target_key)?;
        let result = self.actuator.actuate(&target.device_id).await;
        Ok((target, result))
    }

    /// Reclaim expired replay records. Returns the number removed.
    pub async fn sweep(&self) -> usize {
        self.guard.sweep(self.clock.now_ms()).await
    }

    fn resolve(&self, key: &str) -> Result<&Target, CapabilityError> {
        self.registry
            .get(key)
            .ok_or_else(|| CapabilityError::UnknownTarget(key.to_string()))
    }
}

/// Split an actuation result into success or the matching [`CapabilityError`].
pub fn into_outcome(result: ActuationResult) -> Result<ActuationResult, CapabilityError> {
    if result.succeeded {
        return Ok(result);
    }
    match result.error_kind {
        Some(ActuationErrorKind::MissingCredential) => Err(CapabilityError::MissingCredential),
        _ => Err(CapabilityError::UpstreamFailure(Box::new(result))),
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{service, FakeActuator, T0};
    use super::*;
    use crate::actuation::Protocol;

    #[test]
    fn token_verifies_at_issuance() {
        let (svc, _clock) = service(FakeActuator::succeeding(Protocol::Primary));
        let token = svc.request_token("scala-door").unwrap();
        assert_eq!(token.issued_at, T0);
        assert!(svc
            .codec
            .verify_signature("scala-door", token.issued_at, &token.signature));
    }

    #[test]
    fn unknown_target_cannot_get_token() {
        let (svc, _clock) = service(FakeActuator::succeeding(Protocol::Primary));
        let err = svc.request_token("nope").unwrap_err();
        assert!(matches!(err, CapabilityError::UnknownTarget(ref k) if k == "nope"));
        assert_eq!(err.code(), "unknown_target");
    }

    #[tokio::test]
    async fn fresh_token_actuates_primary() {
        let (svc, clock) = service(FakeActuator::succeeding(Protocol::Primary));
        let token = svc.request_token("scala-door").unwrap();
        clock.advance(10_000);
        let result = svc
            .redeem("scala-door", token.issued_at, &token.signature)
            .await
            .unwrap();
        assert!(result.succeeded);
        assert_eq!(result.protocol, Some(Protocol::Primary));
        assert_eq!(svc.actuator().calls(), 1);
        assert_eq!(
            *svc.actuator().devices.lock().unwrap(),
            vec!["3494547a1075".to_string()]
        );
    }

    #[tokio::test]
    async fn second_redeem_is_already_used() {
        let (svc, clock) = service(FakeActuator::succeeding(Protocol::Primary));
        let token = svc.request_token("scala-door").unwrap();
        svc.redeem("scala-door", token.issued_at, &token.signature)
            .await
            .unwrap();
        clock.advance(1);
        let err = svc
            .redeem("scala-door", token.issued_at, &token.signature)
            .await
            .unwrap_err();
        assert!(matches!(err, CapabilityError::AlreadyUsed));
        assert_eq!(svc.actuator().calls(), 1);
    }

    #[tokio::test]
    async fn already_used_even_if_first_actuation_failed() {
        let (svc, _clock) = service(FakeActuator::answering(ActuationResult {
            succeeded: false,
            protocol: Some(Protocol::Primary),
            upstream_status: Some(500),
            upstream_payload: None,
            error_kind: Some(ActuationErrorKind::UpstreamFailure),
            detail: None,
        }));
        let token = svc.request_token("scala-door").unwrap();
        let first = svc
            .redeem("scala-door", token.issued_at, &token.signature)
            .await
            .unwrap_err();
        assert_eq!(first.code(), "upstream_failure");
        assert_eq!(first.actuation().unwrap().upstream_status, Some(500));
        let second = svc
            .redeem("scala-door", token.issued_at, &token.signature)
            .await
            .unwrap_err();
        assert!(matches!(second, CapabilityError::AlreadyUsed));
    }

    #[tokio::test]
    async fn stale_token_is_expired_and_not_recorded() {
        let (svc, clock) = service(FakeActuator::succeeding(Protocol::Primary));
        let token = svc.request_token("ottavia-door").unwrap();
        clock.advance(6 * 60 * 1000);
        let err = svc
            .redeem("ottavia-door", token.issued_at, &token.signature)
            .await
            .unwrap_err();
        assert!(matches!(err, CapabilityError::Expired));
        assert_eq!(svc.actuator().calls(), 0);
        assert!(!svc.replay_guard().contains(&token.signature).await);
    }

    #[tokio::test]
    async fn window_boundary() {
        let (svc, clock) = service(FakeActuator::succeeding(Protocol::Primary));
        let token = svc.request_token("scala-door").unwrap();
        clock.advance(TOKEN_VALIDITY_MS);
        assert!(svc
            .redeem("scala-door", token.issued_at, &token.signature)
            .await
            .is_ok());

        let token = svc.request_token("scala-door").unwrap();
        clock.advance(TOKEN_VALIDITY_MS + 1);
        let err = svc
            .redeem("scala-door", token.issued_at, &token.signature)
            .await
            .unwrap_err();
        assert!(matches!(err, CapabilityError::Expired));
    }

    #[tokio::test]
    async fn future_dated_token_is_expired() {
        let (svc, _clock) = service(FakeActuator::succeeding(Protocol::Primary));
        let future = svc.codec.issue("scala-door", T0 + 60_000);
        let err = svc
            .redeem("scala-door", future.issued_at, &future.signature)
            .await
            .unwrap_err();
        assert!(matches!(err, CapabilityError::Expired));
        assert!(svc.replay_guard().is_empty().await);
    }

    #[tokio::test]
    async fn forged_signature_is_checked_before_freshness() {
        let (svc, clock) = service(FakeActuator::succeeding(Protocol::Primary));
        let token = svc.request_token("scala-door").unwrap();
        clock.advance(60 * 60 * 1000);
        let mut forged = token.signature.clone();
        forged.replace_range(0..1, if forged.starts_with('A') { "B" } else { "A" });
        let err = svc
            .redeem("scala-door", token.issued_at, &forged)
            .await
            .unwrap_err();
        assert!(matches!(err, CapabilityError::InvalidSignature));
        assert!(svc.replay_guard().is_empty().await);
    }

    #[tokio::test]
    async fn token_for_other_target_is_invalid() {
        let (svc, _clock) = service(FakeActuator::succeeding(Protocol::Primary));
        let token = svc.request_token("scala-door").unwrap();
        let err = svc
            .redeem("ottavia-door", token.issued_at, &token.signature)
            .await
            .unwrap_err();
        assert!(matches!(err, CapabilityError::InvalidSignature));
        assert_eq!(svc.actuator().calls(), 0);
    }

    #[tokio::test]
    async fn unknown_target_redeem() {
        let (svc, _clock) = service(FakeActuator::succeeding(Protocol::Primary));
        let err = svc.redeem("nope", T0, "sig").await.unwrap_err();
        assert!(matches!(err, CapabilityError::UnknownTarget(_)));
    }

    #[tokio::test]
    async fn missing_credential_surfaces_without_actuating() {
        let (svc, _clock) = service(FakeActuator::answering(
            ActuationResult::missing_credential(),
        ));
        let token = svc.request_token("scala-door").unwrap();
        let err = svc
            .redeem("scala-door", token.issued_at, &token.signature)
            .await
            .unwrap_err();
        assert!(matches!(err, CapabilityError::MissingCredential));
        assert_eq!(svc.actuator().calls(), 0);
    }

    #[tokio::test]
    async fn missing_credential_with_real_client_makes_no_call() {
        use crate::actuation::mock::{self, Reply};
        use crate::config::UpstreamConfig;
        use serde_json::json;

        let (url, hits) = mock::spawn(
            Reply::json(200, &json!({"isok": true})),
            Reply::json(200, &json!({})),
        )
        .await;
        let client = ActuationClient::new(&UpstreamConfig {
            base_url: url,
            api_key: None,
            ..UpstreamConfig::default()
        })
        .unwrap();
        let (svc, _clock) = service(client);
        let token = svc.request_token("scala-door").unwrap();
        let err = svc
            .redeem("scala-door", token.issued_at, &token.signature)
            .await
            .unwrap_err();
        assert!(matches!(err, CapabilityError::MissingCredential));
        assert_eq!(hits.total(), 0);
    }

    #[tokio::test]
    async fn wrong_type_end_to_end_uses_fallback() {
        use crate::actuation::mock::{self, Reply};
        use crate::config::UpstreamConfig;
        use serde_json::json;

        let (url, hits) = mock::spawn(
            Reply::json(200, &json!({"isok": false, "errors": {"wrong_type": "gen2"}})),
            Reply::json(200, &json!({"was_on": false})),
        )
        .await;
        let client = ActuationClient::new(&UpstreamConfig {
            base_url: url,
            api_key: Some("key".into()),
            ..UpstreamConfig::default()
        })
        .unwrap();
        let (svc, clock) = service(client);
        let token = svc.request_token("scala-door").unwrap();
        clock.advance(10_000);
        let result = svc
            .redeem("scala-door", token.issued_at, &token.signature)
            .await
            .unwrap();
        assert!(result.succeeded);
        assert_eq!(result.protocol, Some(Protocol::Fallback));
        assert_eq!(hits.primary(), 1);
        assert_eq!(hits.fallback(), 1);
    }

    #[tokio::test]
    async fn sweep_uses_service_clock() {
        let (svc, clock) = service(FakeActuator::succeeding(Protocol::Primary));
        for key in ["scala-door", "ottavia-door", "leonina-door"] {
            let token = svc.request_token(key).unwrap();
            svc.redeem(key, token.issued_at, &token.signature)
                .await
                .unwrap();
            clock.advance(1000);
        }
        assert_eq!(svc.sweep().await, 0);
        clock.advance(TOKEN_VALIDITY_MS);
        assert_eq!(svc.sweep().await, 3);
        assert!(svc.replay_guard().is_empty().await);
    }

    #[tokio::test]
    async fn unchecked_actuation_bypasses_tokens() {
        let (svc, _clock) = service(FakeActuator::succeeding(Protocol::Primary));
        let (target, result) = svc.actuate_unchecked("arenula-building-door").await.unwrap();
        assert_eq!(target.device_id, "3494547ab05e");
        assert!(result.succeeded);
        assert!(svc.actuate_unchecked("nope").await.is_err());
    }
}
