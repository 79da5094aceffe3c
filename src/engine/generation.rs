//! Generation loop: tokenize, evaluate, sample, detokenize, stop.

use std::time::Instant;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::config::GenerationRequest;
use super::context::{InferenceContext, OverflowPolicy};
use super::error::{ContextError, GenerationError};
use super::output::{FinishReason, GenerationResult};
use super::sampler::Sampler;
use super::stop::{StopMatcher, StopOutcome};
use super::tokenizer::{StreamDecoder, TokenId};
use crate::telemetry::{self, GenerationSpan, SpanExt};

/// Out-of-band controls for one call.
#[derive(Debug, Clone)]
pub struct GenerationControl {
    pub request_id: Uuid,
    pub cancel: CancellationToken,
    pub deadline: Option<Instant>,
}

impl GenerationControl {
    pub fn new(cancel: CancellationToken, deadline: Option<Instant>) -> Self {
        Self { request_id: Uuid::new_v4(), cancel, deadline }
    }

    fn interrupted(&self) -> Option<FinishReason> {
        if self.cancel.is_cancelled() {
            return Some(FinishReason::Cancelled);
        }
        match self.deadline {
            Some(d) if Instant::now() >= d => Some(FinishReason::TimedOut),
            _ => None,
        }
    }
}

impl Default for GenerationControl {
    fn default() -> Self {
        Self::new(CancellationToken::new(), None)
    }
}

/// Run one generation call on `ctx`, handing each fragment to `on_fragment`
/// as soon as it is final.
///
/// On error the context is rolled back to where it was before the call, or
/// reset if a window shift made that impossible. Cancelled and timed-out runs
/// are not errors; their tokens stay in the context.
pub fn generate<F>(
    ctx: &mut InferenceContext,
    request: &GenerationRequest,
    control: &GenerationControl,
    mut on_fragment: F,
) -> Result<GenerationResult, GenerationError>
where
    F: FnMut(&str),
{
    let start = Instant::now();
    request.validate()?;
    let model_name = ctx.model().map(|m| m.info().name.clone()).unwrap_or_default();
    let span = GenerationSpan::new(&control.request_id.to_string(), &model_name);
    let _enter = span.enter();

    if ctx.is_destroyed() {
        return Err(ContextError::Destroyed.into());
    }
    if request.max_new_tokens == 0 {
        span.record("finish_reason", FinishReason::TokenBudgetExhausted.as_str());
        return Ok(GenerationResult::empty(0, FinishReason::TokenBudgetExhausted));
    }

    let checkpoint = ctx.checkpoint();
    let mut run = Run {
        ctx,
        request,
        control,
        shifted: false,
        fragments: Vec::new(),
        tokens: Vec::new(),
    };
    let outcome = run.execute(&mut on_fragment);

    let Run { ctx, shifted, fragments, tokens, .. } = run;
    let result = outcome.map(|(prompt_tokens, finish_reason)| GenerationResult {
        fragments,
        tokens,
        prompt_tokens,
        finish_reason,
        elapsed: start.elapsed(),
    });

    span.record_result(&result);
    match &result {
        Ok(r) => {
            span.record("prompt_tokens", r.prompt_tokens);
            span.record("tokens_generated", r.tokens.len());
            span.record("finish_reason", r.finish_reason.as_str());
            span.record("latency_ms", r.elapsed.as_millis() as u64);
            telemetry::record_generation(r.finish_reason, r.tokens.len(), r.elapsed);
            tracing::info!(
                finish_reason = %r.finish_reason,
                tokens = r.tokens.len(),
                "Generation finished"
            );
        }
        Err(e) => {
            if shifted {
                ctx.reset();
            } else {
                ctx.restore(checkpoint);
            }
            telemetry::record_generation_failure(e.kind());
            tracing::warn!(error = %e, rolled_back = !shifted, "Generation failed");
        }
    }
    result
}

struct Run<'a> {
    ctx: &'a mut InferenceContext,
    request: &'a GenerationRequest,
    control: &'a GenerationControl,
    /// A window shift happened, so the pre-call state is gone.
    shifted: bool,
    fragments: Vec<String>,
    tokens: Vec<TokenId>,
}

impl Run<'_> {
    /// Returns the prompt token count and why the loop ended.
    fn execute<F: FnMut(&str)>(
        &mut self,
        on_fragment: &mut F,
    ) -> Result<(usize, FinishReason), GenerationError> {
        let model = self.ctx.model().cloned().ok_or(ContextError::Destroyed)?;
        let tokenizer = model.tokenizer();

        let request = self.request;
        let mut prompt = tokenizer.encode(&request.prompt)?;
        if self.ctx.position() == 0 {
            if let Some(bos) = tokenizer.bos() {
                prompt.insert(0, bos);
            }
        }
        let prompt_tokens = prompt.len();
        self.evaluate_prompt(&prompt)?;
        tracing::debug!(prompt_tokens, position = self.ctx.position(), "Prompt evaluated");

        let sampling = &request.sampling;
        let banned = if sampling.ignore_eos { tokenizer.eos() } else { None };
        let mut sampler = Sampler::new(sampling.clone());
        let mut decoder = StreamDecoder::new();
        let mut stop = StopMatcher::new(&request.stop_sequences)?;

        let mut emit = |text: String, fragments: &mut Vec<String>| {
            if !text.is_empty() {
                on_fragment(&text);
                fragments.push(text);
            }
        };

        let finish = loop {
            if let Some(reason) = self.control.interrupted() {
                stop.discard();
                break reason;
            }
            if self.tokens.len() >= request.max_new_tokens {
                emit(stop.flush(), &mut self.fragments);
                break FinishReason::TokenBudgetExhausted;
            }

            let Some(logits) = self.ctx.logits() else {
                emit(stop.flush(), &mut self.fragments);
                break FinishReason::EndOfSequence;
            };
            let Some(next) = sampler.sample(logits, self.ctx.history(), banned) else {
                emit(stop.flush(), &mut self.fragments);
                break FinishReason::EndOfSequence;
            };
            if !sampling.ignore_eos && tokenizer.is_eos(next) {
                emit(stop.flush(), &mut self.fragments);
                break FinishReason::EndOfSequence;
            }

            self.make_room()?;
            self.ctx.evaluate(&[next])?;
            self.tokens.push(next);

            let piece = decoder.push(tokenizer, next)?;
            match stop.push(&piece.text) {
                StopOutcome::Emit(text) => emit(text, &mut self.fragments),
                StopOutcome::Stop(text) => {
                    emit(text, &mut self.fragments);
                    break FinishReason::StopSequence;
                }
            }
        };

        Ok((prompt_tokens, finish))
    }

    fn evaluate_prompt(&mut self, prompt: &[TokenId]) -> Result<(), GenerationError> {
        let capacity = self.ctx.capacity();
        let needed = self.ctx.position() + prompt.len();
        if needed <= capacity {
            self.ctx.evaluate(prompt)?;
            return Ok(());
        }

        match self.ctx.overflow_policy() {
            OverflowPolicy::Fail => Err(ContextError::ContextOverflow { needed, capacity }.into()),
            OverflowPolicy::SlidingWindow => {
                // At least the last prompt token survives so there are logits to sample from.
                let keep = capacity.saturating_sub((capacity / 4).max(1)).max(1);
                let mut all = self.ctx.history().to_vec();
                all.extend_from_slice(prompt);
                let tail = all.split_off(all.len() - keep);
                tracing::debug!(needed, kept = tail.len(), "Prompt exceeds window, shifting");
                self.shift_to(&tail)
            }
        }
    }

    /// Free one position for the next token if the window is full.
    fn make_room(&mut self) -> Result<(), GenerationError> {
        if self.ctx.remaining() > 0 {
            return Ok(());
        }
        let capacity = self.ctx.capacity();
        match self.ctx.overflow_policy() {
            OverflowPolicy::Fail => Err(ContextError::ContextOverflow {
                needed: capacity + 1,
                capacity,
            }
            .into()),
            OverflowPolicy::SlidingWindow => {
                // Keep the newest half, and never so much that the next token has no slot.
                let history = self.ctx.history();
                let keep = (history.len() - history.len() / 2).min(capacity - 1);
                let tail = history[history.len() - keep..].to_vec();
                tracing::debug!(kept = tail.len(), "Window full, discarding oldest half");
                self.shift_to(&tail)
            }
        }
    }

    fn shift_to(&mut self, tokens: &[TokenId]) -> Result<(), GenerationError> {
        self.shifted = true;
        self.ctx.reset();
        self.ctx.evaluate(tokens)?;
        Ok(())
    }
}
