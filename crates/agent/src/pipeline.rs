//! Validate, retry-once-strict, then fall back: the negotiation pipeline.
//!
//! Per item the flow is a three-state machine. The first attempt uses the
//! standard prompt; a validation or transport failure moves to a single
//! retry with the strict prompt variant at a slightly lower temperature;
//! a second failure lands in the deterministic fallback, which cannot
//! fail. Both entry points therefore always return structured results -
//! no error escapes them. Proposal generation runs the machine once per
//! strategy, independently; reply simulation runs it once.

use std::collections::BTreeMap;
use std::sync::Mutex;

use haggler_core::domain::negotiation::{NegotiationContext, Proposal, Strategy, VendorReply};
use haggler_core::fallback::{fallback_proposal, fallback_vendor_reply};
use haggler_core::prompts::{
    build_proposal_prompt, build_vendor_prompt, strict_variant, PromptKind, SYSTEM_PROMPT,
    VENDOR_SYSTEM_PROMPT,
};
use haggler_core::schema::{validate_proposal, validate_vendor_reply, ValidationError};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tracing::warn;

use crate::engine::{EngineError, EngineInfo, GenerateClient};

/// Sampling temperatures for (first attempt, strict retry). The retry runs
/// slightly cooler to favor determinism, since most first-attempt failures
/// are formatting drift rather than semantic failure.
pub const PROPOSAL_TEMPERATURES: (f32, f32) = (0.65, 0.60);
pub const VENDOR_TEMPERATURES: (f32, f32) = (0.50, 0.45);

/// How much offending raw text makes it into the log.
const RAW_LOG_LIMIT: usize = 160;

/// Which tier of the state machine produced a value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputSource {
    FirstAttempt,
    StrictRetry,
    Fallback,
}

impl OutputSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FirstAttempt => "first_attempt",
            Self::StrictRetry => "strict_retry",
            Self::Fallback => "fallback",
        }
    }
}

/// A pipeline result with its provenance attached.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Generated<T> {
    pub value: T,
    pub source: OutputSource,
}

pub struct NegotiationPipeline<C> {
    client: C,
    rng: Mutex<StdRng>,
}

impl<C: GenerateClient> NegotiationPipeline<C> {
    pub fn new(client: C) -> Self {
        Self::with_rng(client, StdRng::from_entropy())
    }

    /// Inject the random source used by the vendor-reply fallback; tests
    /// seed this for determinism.
    pub fn with_rng(client: C, rng: StdRng) -> Self {
        Self { client, rng: Mutex::new(rng) }
    }

    pub fn engine_info(&self) -> EngineInfo {
        self.client.engine_info()
    }

    /// Generate one proposal per strategy. Always returns exactly the three
    /// fixed strategies; one strategy's failures never affect the others.
    pub async fn generate_proposals(
        &self,
        context: &NegotiationContext,
    ) -> BTreeMap<Strategy, Generated<Proposal>> {
        let mut proposals = BTreeMap::new();

        for strategy in Strategy::ALL {
            let prompt = build_proposal_prompt(context, strategy);
            let generated = self
                .attempt_with_fallback(
                    strategy.as_str(),
                    SYSTEM_PROMPT,
                    prompt,
                    PromptKind::Proposal,
                    PROPOSAL_TEMPERATURES,
                    |raw| validate_proposal(strategy, raw),
                    || fallback_proposal(strategy, context),
                )
                .await;
            proposals.insert(strategy, generated);
        }

        proposals
    }

    /// Simulate the vendor's reply to a selected proposal.
    pub async fn simulate_vendor_reply(
        &self,
        context: &NegotiationContext,
        proposal: &Proposal,
    ) -> Generated<VendorReply> {
        let prompt = build_vendor_prompt(context, proposal);
        let generated = self
            .attempt_with_fallback(
                "vendor_reply",
                VENDOR_SYSTEM_PROMPT,
                prompt,
                PromptKind::VendorReply,
                VENDOR_TEMPERATURES,
                validate_vendor_reply,
                || {
                    let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                    fallback_vendor_reply(context, &mut *rng)
                },
            )
            .await;

        // Plausibility is advisory for generative output: a success reply
        // should not quote a price above the current rate, but the schema
        // does not enforce the cross-field check.
        if generated.source != OutputSource::Fallback && generated.value.success {
            if let Some(price) = generated.value.accepted_price {
                if price > context.past_price {
                    warn!(
                        accepted_price = price,
                        past_price = context.past_price,
                        "vendor reply marked success with a price above the current rate"
                    );
                }
            }
        }

        generated
    }

    /// The shared three-state machine. Engine transport failures and
    /// validation failures advance it the same way; nothing else is caught.
    async fn attempt_with_fallback<T, V, F>(
        &self,
        item: &str,
        system_prompt: &str,
        base_prompt: String,
        kind: PromptKind,
        temperatures: (f32, f32),
        validate: V,
        fallback: F,
    ) -> Generated<T>
    where
        V: Fn(&str) -> Result<T, ValidationError>,
        F: FnOnce() -> T,
    {
        match self.client.generate(system_prompt, &base_prompt, temperatures.0).await {
            Ok(raw) => match validate(&raw) {
                Ok(value) => {
                    return Generated { value, source: OutputSource::FirstAttempt };
                }
                Err(error) => log_invalid(item, 1, &error, &raw),
            },
            Err(error) => log_engine_failure(item, 1, &error),
        }

        let strict_prompt = strict_variant(&base_prompt, kind);
        match self.client.generate(system_prompt, &strict_prompt, temperatures.1).await {
            Ok(raw) => match validate(&raw) {
                Ok(value) => {
                    return Generated { value, source: OutputSource::StrictRetry };
                }
                Err(error) => log_invalid(item, 2, &error, &raw),
            },
            Err(error) => log_engine_failure(item, 2, &error),
        }

        warn!(item, "both generation attempts failed, using deterministic fallback");
        Generated { value: fallback(), source: OutputSource::Fallback }
    }
}

fn log_invalid(item: &str, attempt: u32, error: &ValidationError, raw: &str) {
    warn!(
        item,
        attempt,
        error = %error,
        raw = %truncate_for_log(raw),
        "engine output failed validation"
    );
}

fn log_engine_failure(item: &str, attempt: u32, error: &EngineError) {
    warn!(item, attempt, error = %error, "engine call failed");
}

fn truncate_for_log(raw: &str) -> String {
    if raw.chars().count() <= RAW_LOG_LIMIT {
        raw.to_string()
    } else {
        let truncated: String = raw.chars().take(RAW_LOG_LIMIT).collect();
        format!("{truncated}...")
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use haggler_core::domain::negotiation::{NegotiationContext, Proposal, Strategy};
    use haggler_core::fallback::{fallback_proposal, fallback_vendor_reply};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::{
        NegotiationPipeline, OutputSource, PROPOSAL_TEMPERATURES, VENDOR_TEMPERATURES,
    };
    use crate::engine::{EngineError, EngineInfo, GenerateClient};

    #[derive(Clone, Debug)]
    struct RecordedCall {
        user_prompt: String,
        temperature: f32,
    }

    /// Replays a scripted sequence of engine outcomes and records every call.
    #[derive(Clone, Default)]
    struct ScriptedClient {
        inner: Arc<ScriptedInner>,
    }

    #[derive(Default)]
    struct ScriptedInner {
        responses: Mutex<VecDeque<Result<String, EngineError>>>,
        calls: Mutex<Vec<RecordedCall>>,
    }

    impl ScriptedClient {
        fn with_script(script: Vec<Result<String, EngineError>>) -> Self {
            Self {
                inner: Arc::new(ScriptedInner {
                    responses: Mutex::new(script.into()),
                    calls: Mutex::new(Vec::new()),
                }),
            }
        }

        fn calls(&self) -> Vec<RecordedCall> {
            self.inner.calls.lock().expect("calls lock").clone()
        }
    }

    #[async_trait]
    impl GenerateClient for ScriptedClient {
        async fn generate(
            &self,
            _system_prompt: &str,
            user_prompt: &str,
            temperature: f32,
        ) -> Result<String, EngineError> {
            self.inner
                .calls
                .lock()
                .expect("calls lock")
                .push(RecordedCall { user_prompt: user_prompt.to_string(), temperature });
            self.inner
                .responses
                .lock()
                .expect("responses lock")
                .pop_front()
                .unwrap_or_else(|| {
                    Err(EngineError::Generation {
                        attempts: 0,
                        message: "script exhausted".to_string(),
                    })
                })
        }

        fn engine_info(&self) -> EngineInfo {
            EngineInfo { engine: "scripted", model: "test".to_string(), endpoint: None }
        }
    }

    fn context_fixture() -> NegotiationContext {
        NegotiationContext {
            vendor_message: "Your renewal is coming up at $1000/month for the Pro plan."
                .to_string(),
            past_price: 1000.0,
            target_price: 800.0,
            service_type: "SaaS Subscription".to_string(),
            relationship: "1-3 Years".to_string(),
        }
    }

    fn valid_proposal_json(marker: &str) -> String {
        format!(
            "{{\"proposal\": \"We'd like to renew at $800/month. {marker}\", \
             \"reasoning\": \"Anchor on the target and stay cordial.\", \
             \"expected_outcome\": \"A counter around $880.\"}}"
        )
    }

    fn valid_reply_json(price: f64) -> String {
        format!(
            "{{\"response\": \"We can offer a revised rate of ${price}/month.\", \
             \"accepted_price\": {price}, \
             \"reasoning\": \"Retention matters more than list price.\", \
             \"success\": true}}"
        )
    }

    fn pipeline_with(
        script: Vec<Result<String, EngineError>>,
    ) -> (NegotiationPipeline<ScriptedClient>, ScriptedClient) {
        let client = ScriptedClient::with_script(script);
        let pipeline =
            NegotiationPipeline::with_rng(client.clone(), StdRng::seed_from_u64(42));
        (pipeline, client)
    }

    #[tokio::test]
    async fn clean_engine_yields_three_first_attempt_proposals() {
        let (pipeline, client) = pipeline_with(vec![
            Ok(valid_proposal_json("polite")),
            Ok(valid_proposal_json("firm")),
            Ok(valid_proposal_json("swap")),
        ]);

        let proposals = pipeline.generate_proposals(&context_fixture()).await;

        assert_eq!(proposals.len(), 3);
        for strategy in Strategy::ALL {
            let generated = proposals.get(&strategy).expect("strategy present");
            assert_eq!(generated.source, OutputSource::FirstAttempt);
            assert_eq!(generated.value.strategy, strategy);
        }

        let calls = client.calls();
        assert_eq!(calls.len(), 3);
        for call in &calls {
            assert_eq!(call.temperature, PROPOSAL_TEMPERATURES.0);
            assert!(!call.user_prompt.contains("IMPORTANT: Return ONLY valid JSON"));
        }
    }

    #[tokio::test]
    async fn malformed_first_output_recovers_via_strict_retry() {
        let (pipeline, client) = pipeline_with(vec![
            Ok("Sure! Here's my proposal...".to_string()),
            Ok(valid_proposal_json("recovered")),
            Ok(valid_proposal_json("firm")),
            Ok(valid_proposal_json("swap")),
        ]);

        let proposals = pipeline.generate_proposals(&context_fixture()).await;

        let polite = proposals.get(&Strategy::Polite).expect("polite present");
        assert_eq!(polite.source, OutputSource::StrictRetry);
        assert!(polite.value.content.contains("recovered"));

        let calls = client.calls();
        assert_eq!(calls.len(), 4);
        assert!(calls[1]
            .user_prompt
            .ends_with("IMPORTANT: Return ONLY valid JSON with keys: proposal, reasoning, expected_outcome. No other text."));
        assert_eq!(calls[1].temperature, PROPOSAL_TEMPERATURES.1);
    }

    #[tokio::test]
    async fn two_malformed_outputs_produce_the_deterministic_fallback() {
        let context = context_fixture();
        let (pipeline, _client) = pipeline_with(vec![
            Ok("not json".to_string()),
            Ok("{\"proposal\": \"too short\"}".to_string()),
            Ok(valid_proposal_json("firm")),
            Ok(valid_proposal_json("swap")),
        ]);

        let proposals = pipeline.generate_proposals(&context).await;

        let polite = proposals.get(&Strategy::Polite).expect("polite present");
        assert_eq!(polite.source, OutputSource::Fallback);
        assert_eq!(polite.value, fallback_proposal(Strategy::Polite, &context));
        // The other strategies are unaffected.
        assert_eq!(
            proposals.get(&Strategy::Firm).expect("firm present").source,
            OutputSource::FirstAttempt
        );
    }

    #[tokio::test]
    async fn transport_failure_advances_the_machine_like_invalid_output() {
        let (pipeline, client) = pipeline_with(vec![
            Err(EngineError::Generation { attempts: 3, message: "status 503".to_string() }),
            Ok(valid_proposal_json("recovered")),
            Ok(valid_proposal_json("firm")),
            Ok(valid_proposal_json("swap")),
        ]);

        let proposals = pipeline.generate_proposals(&context_fixture()).await;

        assert_eq!(
            proposals.get(&Strategy::Polite).expect("polite present").source,
            OutputSource::StrictRetry
        );
        assert_eq!(client.calls().len(), 4);
    }

    #[tokio::test]
    async fn total_engine_outage_still_covers_every_strategy() {
        let context = context_fixture();
        // Every call fails: the script is empty, so the mock reports
        // exhaustion for all six attempts.
        let (pipeline, client) = pipeline_with(Vec::new());

        let proposals = pipeline.generate_proposals(&context).await;

        assert_eq!(proposals.len(), 3);
        for strategy in Strategy::ALL {
            let generated = proposals.get(&strategy).expect("strategy present");
            assert_eq!(generated.source, OutputSource::Fallback);
            assert_eq!(generated.value, fallback_proposal(strategy, &context));
        }
        assert_eq!(client.calls().len(), 6);
    }

    #[tokio::test]
    async fn vendor_reply_uses_its_own_temperature_schedule() {
        let (pipeline, client) = pipeline_with(vec![
            Ok("no json here".to_string()),
            Ok(valid_reply_json(900.0)),
        ]);

        let context = context_fixture();
        let proposal = fallback_proposal(Strategy::Polite, &context);
        let reply = pipeline.simulate_vendor_reply(&context, &proposal).await;

        assert_eq!(reply.source, OutputSource::StrictRetry);
        assert_eq!(reply.value.accepted_price, Some(900.0));

        let calls = client.calls();
        assert_eq!(calls[0].temperature, VENDOR_TEMPERATURES.0);
        assert_eq!(calls[1].temperature, VENDOR_TEMPERATURES.1);
        assert!(calls[1]
            .user_prompt
            .contains("keys: response, accepted_price, reasoning, success"));
    }

    #[tokio::test]
    async fn vendor_fallback_matches_the_seeded_synthesizer() {
        let context = context_fixture();
        let (pipeline, _client) = pipeline_with(Vec::new());

        let proposal = fallback_proposal(Strategy::Polite, &context);
        let reply = pipeline.simulate_vendor_reply(&context, &proposal).await;

        assert_eq!(reply.source, OutputSource::Fallback);
        let expected = fallback_vendor_reply(&context, &mut StdRng::seed_from_u64(42));
        assert_eq!(reply.value, expected);

        let accepted = reply.value.accepted_price.expect("fallback states a price");
        assert!((850.0..=950.0).contains(&accepted));
        assert!(reply.value.success);
    }

    #[tokio::test]
    async fn first_try_vendor_reply_passes_through_untouched() {
        let (pipeline, _client) = pipeline_with(vec![Ok(valid_reply_json(925.5))]);

        let context = context_fixture();
        let proposal = fallback_proposal(Strategy::Firm, &context);
        let reply = pipeline.simulate_vendor_reply(&context, &proposal).await;

        assert_eq!(reply.source, OutputSource::FirstAttempt);
        assert_eq!(reply.value.accepted_price, Some(925.5));
        assert!(reply.value.content.contains("$925.5/month"));
    }

    #[test]
    fn proposal_equality_is_stable_for_repeat_fallbacks() {
        let context = context_fixture();
        let first = fallback_proposal(Strategy::TermSwap, &context);
        let second = fallback_proposal(Strategy::TermSwap, &context);
        assert_eq!(first, second);
    }
}
