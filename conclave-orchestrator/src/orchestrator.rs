//! Group-chat orchestration: runs one conversation end-to-end.
//!
//! Each turn assembles context, selects a speaker, checks cost admission,
//! calls the model, and records the outcome, looping until a termination
//! condition fires. Agent dispatch is a plain lookup by id into the
//! registry picked fresh every turn, since the live speaker changes turn
//! to turn.

use crate::config::OrchestratorConfig;
use crate::types::{
    CostSummary, OrchestrateRequest, OrchestrationResult, OrchestrationTermination, TurnMessage,
};
use chrono::Utc;
use conclave_breaker::{AdmitDecision, BreakerStateKind, CostCircuitBreaker};
use conclave_core::hook::{HookAction, HookContext, HookPoint};
use conclave_core::id::{AgentId, SessionId};
use conclave_hooks::HookRegistry;
use conclave_ledger::{ConversationStatus, CostLedger, CostRecord};
use conclave_memory::RagRetriever;
use conclave_pricing::PricingTable;
use conclave_registry::{AgentDefinition, Registry};
use conclave_selector::{check_termination, SelectionContext, SelectorTracker, SpeakerSelector, TerminationReason};
use conclave_stream::StreamProducer;
use conclave_turn::{ContentPart, ContextStrategy, NoCompaction, Provider, ProviderMessage, ProviderRequest, Role};
use rust_decimal::Decimal;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

/// A message longer than this is treated as a "complex" task for the
/// speaker selector's master-coordinator-first rule.
const COMPLEX_TASK_CHAR_THRESHOLD: usize = 280;

const RETRY_BASE_DELAY: Duration = Duration::from_millis(250);
const RETRY_MAX_DELAY: Duration = Duration::from_secs(4);

/// Errors raised by [`GroupChatOrchestrator::orchestrate`] itself, as
/// opposed to the typed `termination_reason` a normal stop produces.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The conversation's pinned agent is not in the registry.
    #[error("pinned agent not found: {0}")]
    PinnedAgentNotFound(String),
}

/// Runs one conversation end-to-end across a multi-agent pool: per-turn
/// RAG retrieval, speaker selection, cost admission, provider invocation,
/// ledger recording, and termination evaluation.
pub struct GroupChatOrchestrator<P: Provider> {
    registry: Arc<Registry>,
    tracker: Arc<SelectorTracker>,
    breaker: Arc<CostCircuitBreaker>,
    ledger: Arc<CostLedger>,
    pricing: Arc<PricingTable>,
    rag: Option<Arc<RagRetriever>>,
    hooks: Arc<HookRegistry>,
    provider: P,
    config: OrchestratorConfig,
}

impl<P: Provider> GroupChatOrchestrator<P> {
    /// Build an orchestrator over its dependencies. `rag` is optional —
    /// omitting it (or a later RAG failure) degrades every turn to
    /// no-context, per the retrieval contract. `hooks` is dispatched at
    /// `PreInference` before every provider call; an empty registry is a
    /// no-op pipeline.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<Registry>,
        tracker: Arc<SelectorTracker>,
        breaker: Arc<CostCircuitBreaker>,
        ledger: Arc<CostLedger>,
        pricing: Arc<PricingTable>,
        rag: Option<Arc<RagRetriever>>,
        hooks: Arc<HookRegistry>,
        provider: P,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            registry,
            tracker,
            breaker,
            ledger,
            pricing,
            rag,
            hooks,
            provider,
            config,
        }
    }

    /// Run `request` to completion, optionally streaming partial output
    /// through `stream`. Never returns `Err` for a normal termination —
    /// `OrchestrationResult::termination_reason` carries that; `Err` is
    /// reserved for request-shape problems (e.g. an unknown pinned agent).
    pub async fn orchestrate(
        &self,
        request: OrchestrateRequest,
        stream: Option<Arc<StreamProducer>>,
    ) -> Result<OrchestrationResult, OrchestratorError> {
        let start = Instant::now();
        let candidates = self.candidates(&request)?;

        let session_id = SessionId::new(request.conversation_id.as_str());
        self.ledger
            .open_session(session_id.clone(), request.conversation_id.clone(), request.user_id.clone(), Utc::now())
            .await;

        let mut transcript: Vec<TurnMessage> = Vec::new();
        let mut agents_used: Vec<AgentId> = Vec::new();
        let mut totals = CostSummary::default();
        let mut turn_index: u32 = 0;

        let opening = match &request.context {
            Some(ctx) => format!("{ctx}\n\n{}", request.message),
            None => request.message.clone(),
        };
        transcript.push(TurnMessage {
            turn_index,
            agent_id: None,
            role: Role::User,
            content: opening,
            tokens_in: 0,
            tokens_out: 0,
            cost: Decimal::ZERO,
            created_at: Utc::now(),
        });
        turn_index += 1;

        let termination = loop {
            if turn_index >= self.config.max_turns {
                break OrchestrationTermination::MaxTurns;
            }

            let query = transcript.last().map(|t| t.content.clone()).unwrap_or_default();
            let rag_text = self.retrieve_rag_context(&request, &query).await;

            let ctx = self.selection_context(&query);
            let selector = SpeakerSelector::new(&self.tracker);
            let candidate_refs: Vec<&AgentDefinition> = candidates.iter().collect();
            let Some(speaker_id) = selector.select(&candidate_refs, &ctx).await else {
                break OrchestrationTermination::NoSpeaker;
            };
            let Some(agent) = self.registry.get(&speaker_id) else {
                break OrchestrationTermination::NoSpeaker;
            };

            let model = agent.model_hint.clone().unwrap_or_else(|| self.config.default_model.clone());
            let messages = build_provider_messages(&transcript, &agent.system_prompt, rag_text.as_deref());
            let input_tokens = NoCompaction.token_estimate(&messages) as u64;
            let output_tokens = self.config.default_max_tokens as u64;

            let decision = self
                .breaker
                .estimate_and_admit(
                    &self.pricing,
                    &self.config.provider_name,
                    &model,
                    request.conversation_id.as_str(),
                    turn_index == 1,
                    input_tokens,
                    output_tokens,
                )
                .await;
            if let AdmitDecision::Reject(reason) = decision {
                debug!(?reason, turn_index, "call rejected by circuit breaker");
                break OrchestrationTermination::CostBlocked;
            }

            let hook_ctx = HookContext {
                turns_completed: turn_index,
                cost: totals.total_cost,
                tokens_used: totals.input_tokens + totals.output_tokens,
                elapsed: start.elapsed().into(),
                ..HookContext::new(HookPoint::PreInference)
            };
            if let HookAction::Halt { reason } = self.hooks.dispatch(&hook_ctx).await {
                debug!(reason, turn_index, "turn halted by hook pipeline");
                break OrchestrationTermination::HookHalted;
            }

            self.tracker.set_load(&speaker_id, 1.0).await;
            if let Some(producer) = &stream {
                let _ = producer.send_thinking().await;
            }

            let call_result = self
                .call_provider_with_retry(ProviderRequest {
                    model: Some(model.clone()),
                    messages,
                    tools: vec![],
                    max_tokens: Some(self.config.default_max_tokens),
                    temperature: None,
                    system: Some(agent.system_prompt.clone()),
                    extra: serde_json::Value::Null,
                })
                .await;
            self.tracker.set_load(&speaker_id, 0.0).await;

            let response = match call_result {
                Ok(response) => {
                    self.breaker.record_success().await;
                    response
                }
                Err(_) => {
                    self.breaker.record_failure().await;
                    if let Some(producer) = &stream {
                        let _ = producer.send_error("provider call failed", false).await;
                    }
                    break OrchestrationTermination::ProviderError;
                }
            };

            let text = response_text(&response.content);
            if let Some(producer) = &stream {
                let _ = producer.send_text(&text).await;
            }

            let pricing_row = self.pricing.get_active(&self.config.provider_name, &response.model).await;
            let cost_record = pricing_row.map(|row| {
                CostRecord::priced(
                    format!("{}-{}", request.conversation_id.as_str(), turn_index),
                    SessionId::new(request.conversation_id.as_str()),
                    request.conversation_id.clone(),
                    turn_index as u64,
                    Some(speaker_id.clone()),
                    &row,
                    response.usage.input_tokens,
                    response.usage.output_tokens,
                    Utc::now(),
                )
            });
            let turn_cost = cost_record.as_ref().map(|r| r.total_cost).unwrap_or(Decimal::ZERO);
            if let Some(record) = cost_record {
                self.ledger.record(record).await;
            }

            if let Some(producer) = &stream {
                let _ = producer
                    .send_final(
                        response.usage.input_tokens,
                        response.usage.output_tokens,
                        turn_cost,
                        start.elapsed().as_millis() as u64,
                    )
                    .await;
            }

            self.tracker.record_outcome(&speaker_id, true).await;

            totals.input_tokens += response.usage.input_tokens;
            totals.output_tokens += response.usage.output_tokens;
            totals.total_cost += turn_cost;

            transcript.push(TurnMessage {
                turn_index,
                agent_id: Some(speaker_id.clone()),
                role: Role::Assistant,
                content: text,
                tokens_in: response.usage.input_tokens,
                tokens_out: response.usage.output_tokens,
                cost: turn_cost,
                created_at: Utc::now(),
            });
            agents_used.push(speaker_id.clone());

            let breaker_open = self.breaker.snapshot().await.state == BreakerStateKind::Open;
            let last_text = transcript.last().map(|t| t.content.as_str()).unwrap_or_default();
            if let Some(reason) =
                check_termination(turn_index, self.config.max_turns, last_text, breaker_open, Some(&speaker_id))
            {
                break match reason {
                    TerminationReason::MaxTurns => OrchestrationTermination::MaxTurns,
                    TerminationReason::CompletionMarker => OrchestrationTermination::Complete,
                    TerminationReason::CircuitOpen => OrchestrationTermination::CircuitOpen,
                    TerminationReason::NoCandidate => OrchestrationTermination::NoSpeaker,
                };
            }
            turn_index += 1;
        };

        self.ledger
            .close_session(session_id.as_str(), session_status(&termination), Utc::now())
            .await;

        let response = transcript
            .iter()
            .rev()
            .find(|t| t.role == Role::Assistant)
            .map(|t| t.content.clone())
            .unwrap_or_default();

        Ok(OrchestrationResult {
            response,
            agents_used,
            turn_count: turn_index,
            cost_breakdown: totals,
            duration_ms: start.elapsed().as_millis() as u64,
            termination_reason: termination,
            transcript,
        })
    }

    fn candidates(&self, request: &OrchestrateRequest) -> Result<Vec<AgentDefinition>, OrchestratorError> {
        if let Some(pinned) = &request.pinned_agent {
            let agent = self
                .registry
                .get(pinned)
                .ok_or_else(|| OrchestratorError::PinnedAgentNotFound(pinned.as_str().to_string()))?;
            Ok(vec![agent.clone()])
        } else {
            Ok(self.registry.all().into_iter().cloned().collect())
        }
    }

    fn selection_context(&self, query: &str) -> SelectionContext {
        let task_terms: BTreeSet<String> = query
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.len() > 3)
            .map(|w| w.to_lowercase())
            .collect();
        SelectionContext {
            task_terms,
            required_tools: BTreeSet::new(),
            is_complex: query.len() > COMPLEX_TASK_CHAR_THRESHOLD,
        }
    }

    async fn retrieve_rag_context(&self, request: &OrchestrateRequest, query: &str) -> Option<String> {
        let rag = self.rag.as_ref()?;
        match rag
            .build_context(
                &request.user_id,
                request.conversation_id.as_str(),
                query,
                &[],
                self.config.rag_top_k,
                self.config.rag_threshold,
            )
            .await
        {
            Some(block) => Some(block.text),
            None => {
                debug!(conversation = %request.conversation_id, "no RAG context this turn");
                None
            }
        }
    }

    /// One retry with exponential backoff (base 250ms, factor 2, cap 4s) on
    /// a retryable provider error; any other failure, or a second
    /// consecutive failure, propagates.
    async fn call_provider_with_retry(
        &self,
        request: ProviderRequest,
    ) -> Result<conclave_turn::ProviderResponse, conclave_turn::ProviderError> {
        match self.provider.complete(request.clone()).await {
            Ok(response) => Ok(response),
            Err(e) if e.is_retryable() => {
                warn!(error = %e, "provider call failed, retrying once");
                tokio::time::sleep(RETRY_BASE_DELAY.min(RETRY_MAX_DELAY)).await;
                self.provider.complete(request).await
            }
            Err(e) => Err(e),
        }
    }
}

fn build_provider_messages(
    transcript: &[TurnMessage],
    _system_prompt: &str,
    rag_text: Option<&str>,
) -> Vec<ProviderMessage> {
    let mut messages: Vec<ProviderMessage> = transcript
        .iter()
        .map(|t| ProviderMessage {
            role: t.role.clone(),
            content: vec![ContentPart::Text { text: t.content.clone() }],
        })
        .collect();

    if let Some(text) = rag_text {
        if let Some(last) = messages.last_mut() {
            if let Some(ContentPart::Text { text: last_text }) = last.content.first_mut() {
                *last_text = format!("{text}\n---\n{last_text}");
            }
        }
    }

    messages
}

/// Maps a termination reason onto the conversation's closing status.
fn session_status(termination: &OrchestrationTermination) -> ConversationStatus {
    match termination {
        OrchestrationTermination::Complete | OrchestrationTermination::MaxTurns => ConversationStatus::Completed,
        OrchestrationTermination::NoSpeaker | OrchestrationTermination::ProviderError => ConversationStatus::Aborted,
        OrchestrationTermination::CostBlocked
        | OrchestrationTermination::CircuitOpen
        | OrchestrationTermination::HookHalted => ConversationStatus::CircuitBlocked,
    }
}

fn response_text(content: &[ContentPart]) -> String {
    content
        .iter()
        .filter_map(|part| match part {
            ContentPart::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use conclave_breaker::{BreakerConfig, InMemoryBreakerStore};
    use conclave_core::id::ConversationId;
    use conclave_hooks::HookRegistry;
    use conclave_pricing::ProviderPricing;
    use conclave_registry::AgentTier;
    use conclave_turn::{ProviderError, ProviderResponse, StopReason, TokenUsage};
    use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};

    struct ScriptedProvider {
        replies: Vec<&'static str>,
        call_count: AtomicU32,
    }

    impl Provider for ScriptedProvider {
        async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            let n = self.call_count.fetch_add(1, AtomicOrdering::SeqCst) as usize;
            let text = self.replies.get(n).copied().unwrap_or("still working");
            Ok(ProviderResponse {
                content: vec![ContentPart::Text { text: text.to_string() }],
                stop_reason: StopReason::EndTurn,
                usage: TokenUsage {
                    input_tokens: 10,
                    output_tokens: 5,
                    cache_read_tokens: None,
                    cache_creation_tokens: None,
                },
                model: "claude-haiku".to_string(),
                truncated: None,
            })
        }
    }

    struct FailingProvider;

    impl Provider for FailingProvider {
        async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            Err(ProviderError::AuthFailed("bad key".into()))
        }
    }

    fn master_agent() -> AgentDefinition {
        let mut agent = AgentDefinition::new(
            AgentId::new("lead"),
            "Lead",
            "coordinator",
            AgentTier::Coordinator,
            "general",
            "You lead the team.",
        );
        agent.model_hint = Some("claude-haiku".to_string());
        agent.is_master = true;
        agent
    }

    async fn test_harness(
        provider: impl Provider,
        budget_daily: Decimal,
    ) -> GroupChatOrchestrator<impl Provider> {
        let registry = Arc::new(Registry::load(vec![master_agent()]).unwrap());
        let tracker = Arc::new(SelectorTracker::new());
        let ledger = Arc::new(CostLedger::new());
        let pricing = Arc::new(PricingTable::new());
        pricing
            .set_active(ProviderPricing::new(
                "anthropic",
                "claude-haiku",
                Decimal::new(25, 5),
                Decimal::new(125, 5),
                200_000,
                Utc::now() - chrono::Duration::days(1),
            ))
            .await;

        let mut config = BreakerConfig::default();
        config.budget_limit_daily = budget_daily;
        let breaker = Arc::new(CostCircuitBreaker::init(config, ledger.clone(), Arc::new(InMemoryBreakerStore::new())).await);

        GroupChatOrchestrator::new(
            registry,
            tracker,
            breaker,
            ledger,
            pricing,
            None,
            Arc::new(HookRegistry::new()),
            provider,
            OrchestratorConfig::default(),
        )
    }

    #[tokio::test]
    async fn conversation_completes_on_completion_marker() {
        let orch = test_harness(
            ScriptedProvider {
                replies: vec!["task complete"],
                call_count: AtomicU32::new(0),
            },
            Decimal::from(100),
        )
        .await;
        let request = OrchestrateRequest::new("please help", "user-1", ConversationId::new("conv-1"));
        let result = orch.orchestrate(request, None).await.unwrap();
        assert_eq!(result.termination_reason, OrchestrationTermination::Complete);
        assert_eq!(result.agents_used, vec![AgentId::new("lead")]);
        assert!(result.cost_breakdown.total_cost > Decimal::ZERO);
    }

    #[tokio::test]
    async fn completed_conversation_closes_its_session_with_matching_total_cost() {
        let registry = Arc::new(Registry::load(vec![master_agent()]).unwrap());
        let tracker = Arc::new(SelectorTracker::new());
        let ledger = Arc::new(CostLedger::new());
        let pricing = Arc::new(PricingTable::new());
        pricing
            .set_active(ProviderPricing::new(
                "anthropic",
                "claude-haiku",
                Decimal::new(25, 5),
                Decimal::new(125, 5),
                200_000,
                Utc::now() - chrono::Duration::days(1),
            ))
            .await;
        let breaker = Arc::new(
            CostCircuitBreaker::init(BreakerConfig::default(), ledger.clone(), Arc::new(InMemoryBreakerStore::new()))
                .await,
        );
        let orch = GroupChatOrchestrator::new(
            registry,
            tracker,
            breaker,
            ledger.clone(),
            pricing,
            None,
            Arc::new(HookRegistry::new()),
            ScriptedProvider { replies: vec!["task complete"], call_count: AtomicU32::new(0) },
            OrchestratorConfig::default(),
        );
        let request = OrchestrateRequest::new("please help", "user-1", ConversationId::new("conv-session"));
        let result = orch.orchestrate(request, None).await.unwrap();

        let session = ledger.session("conv-session").await.unwrap();
        assert_eq!(session.status, conclave_ledger::ConversationStatus::Completed);
        assert!(session.ended_at.is_some());
        assert_eq!(session.total_cost, result.cost_breakdown.total_cost);
        assert_eq!(session.total_interactions, 1);
    }

    #[tokio::test]
    async fn zero_daily_budget_blocks_the_first_call() {
        let orch = test_harness(
            ScriptedProvider {
                replies: vec!["task complete"],
                call_count: AtomicU32::new(0),
            },
            Decimal::ZERO,
        )
        .await;
        let request = OrchestrateRequest::new("please help", "user-1", ConversationId::new("conv-2"));
        let result = orch.orchestrate(request, None).await.unwrap();
        assert_eq!(result.termination_reason, OrchestrationTermination::CostBlocked);
        assert_eq!(result.turn_count, 1);
    }

    #[tokio::test]
    async fn registered_hook_halts_the_turn_before_the_provider_call() {
        use async_trait::async_trait;
        use conclave_core::error::HookError;
        use conclave_core::hook::{Hook, HookAction, HookContext, HookPoint};

        struct AlwaysHalt;

        #[async_trait]
        impl Hook for AlwaysHalt {
            fn points(&self) -> &[HookPoint] {
                &[HookPoint::PreInference]
            }
            async fn on_event(&self, _ctx: &HookContext) -> Result<HookAction, HookError> {
                Ok(HookAction::Halt { reason: "policy block".to_string() })
            }
        }

        let registry = Arc::new(Registry::load(vec![master_agent()]).unwrap());
        let tracker = Arc::new(SelectorTracker::new());
        let ledger = Arc::new(CostLedger::new());
        let pricing = Arc::new(PricingTable::new());
        pricing
            .set_active(ProviderPricing::new(
                "anthropic",
                "claude-haiku",
                Decimal::new(25, 5),
                Decimal::new(125, 5),
                200_000,
                Utc::now() - chrono::Duration::days(1),
            ))
            .await;
        let breaker = Arc::new(
            CostCircuitBreaker::init(BreakerConfig::default(), ledger.clone(), Arc::new(InMemoryBreakerStore::new()))
                .await,
        );
        let mut hooks = HookRegistry::new();
        hooks.add(Arc::new(AlwaysHalt));

        let orch = GroupChatOrchestrator::new(
            registry,
            tracker,
            breaker,
            ledger,
            pricing,
            None,
            Arc::new(hooks),
            ScriptedProvider { replies: vec!["task complete"], call_count: AtomicU32::new(0) },
            OrchestratorConfig::default(),
        );
        let request = OrchestrateRequest::new("please help", "user-1", ConversationId::new("conv-hook"));
        let result = orch.orchestrate(request, None).await.unwrap();
        assert_eq!(result.termination_reason, OrchestrationTermination::HookHalted);
        assert_eq!(result.turn_count, 1);
    }

    #[tokio::test]
    async fn provider_failure_terminates_with_provider_error() {
        let orch = test_harness(FailingProvider, Decimal::from(100)).await;
        let request = OrchestrateRequest::new("please help", "user-1", ConversationId::new("conv-3"));
        let result = orch.orchestrate(request, None).await.unwrap();
        assert_eq!(result.termination_reason, OrchestrationTermination::ProviderError);
    }

    #[tokio::test]
    async fn pinned_agent_not_in_registry_errors() {
        let orch = test_harness(
            ScriptedProvider {
                replies: vec!["task complete"],
                call_count: AtomicU32::new(0),
            },
            Decimal::from(100),
        )
        .await;
        let mut request = OrchestrateRequest::new("please help", "user-1", ConversationId::new("conv-4"));
        request.pinned_agent = Some(AgentId::new("ghost"));
        let err = orch.orchestrate(request, None).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::PinnedAgentNotFound(_)));
    }
}
