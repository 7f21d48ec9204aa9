//! Turn reconstruction facade.

use std::sync::{Arc, Mutex};

use futures::{Stream, StreamExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::collaborators::Collaborators;
use super::events::{EngineEvent, EngineEventSink};
use super::processors::{self, ProcessorContext, ResultContext};
use super::state::{AccumulatorState, Outbox, PendingAssistantMessage, StreamingContent};
use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::types::RuntimeEvent;
use crate::util::lock;

/// How one consumption attempt ended.
#[derive(Debug)]
pub struct QueryOutcome {
    pub generation: u64,
    /// A terminal `result` event was processed.
    pub saw_result: bool,
    /// A newer consumption started before this one finished.
    pub superseded: bool,
    pub cancelled: bool,
    /// Stream fault that was reported to the sink.
    pub error: Option<BridgeError>,
}

struct EngineInner {
    state: Mutex<AccumulatorState>,
    collaborators: Collaborators,
    config: BridgeConfig,
    sink: Option<EngineEventSink>,
}

/// Rebuilds well-formed assistant messages from the runtime's event stream.
///
/// Cloning is cheap; clones share the same accumulator.
#[derive(Clone)]
pub struct TurnEngine {
    inner: Arc<EngineInner>,
}

impl TurnEngine {
    pub fn new(
        config: BridgeConfig,
        collaborators: Collaborators,
        event_sink: Option<EngineEventSink>,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                state: Mutex::new(AccumulatorState::new()),
                collaborators,
                config,
                sink: event_sink,
            }),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.inner.config
    }

    /// Run `f` against the accumulator, then deliver what it produced once the
    /// lock is released.
    fn with_state<R>(&self, f: impl FnOnce(&mut ProcessorContext<'_>) -> R) -> R {
        let (value, outbox) = {
            let mut state = lock(&self.inner.state);
            let mut ctx =
                ProcessorContext::new(&mut state, &self.inner.collaborators, &self.inner.config);
            let value = f(&mut ctx);
            (value, state.take_outbox())
        };
        self.deliver(outbox);
        value
    }

    fn deliver(&self, outbox: Outbox) {
        if outbox.is_empty() {
            return;
        }
        if let Some(sink) = &self.inner.sink {
            for event in outbox.events {
                sink(event);
            }
        }
        for callback in outbox.callbacks {
            callback();
        }
    }

    /// Process one event captured under `generation`. Stale events are
    /// dropped without side effects.
    pub fn process_event(&self, event: RuntimeEvent, generation: u64, budget_limit: Option<f64>) {
        self.with_state(|ctx| {
            if !ctx.state.is_current(generation) {
                tracing::debug!(
                    generation,
                    current = ctx.state.generation(),
                    "dropping stale event"
                );
                return;
            }
            let result_ctx = ResultContext {
                budget_limit,
                query_generation: generation,
            };
            processors::process(event, ctx, result_ctx);
        });
    }

    /// Start a new consumption attempt, invalidating any older one.
    pub fn begin_query(&self) -> u64 {
        self.with_state(|ctx| {
            let generation = ctx.state.bump_generation();
            ctx.state.set_processing(true);
            generation
        })
    }

    /// Consume one query's event stream to completion.
    pub async fn consume_query<S>(
        &self,
        stream: S,
        budget_limit: Option<f64>,
        cancel: CancellationToken,
        on_complete: impl FnOnce() + Send,
    ) -> QueryOutcome
    where
        S: Stream<Item = Result<RuntimeEvent>> + Send,
    {
        let generation = self.begin_query();
        self.drive(stream, generation, budget_limit, cancel, on_complete)
            .await
    }

    /// Spawn [`consume_query`](Self::consume_query) on the tokio runtime.
    ///
    /// The generation is advanced before this returns.
    pub fn consume_query_in_background<S>(
        &self,
        stream: S,
        budget_limit: Option<f64>,
        cancel: CancellationToken,
        on_complete: impl FnOnce() + Send + 'static,
    ) -> JoinHandle<QueryOutcome>
    where
        S: Stream<Item = Result<RuntimeEvent>> + Send + 'static,
    {
        let generation = self.begin_query();
        let engine = self.clone();
        tokio::spawn(async move {
            engine
                .drive(stream, generation, budget_limit, cancel, on_complete)
                .await
        })
    }

    async fn drive<S>(
        &self,
        stream: S,
        generation: u64,
        budget_limit: Option<f64>,
        cancel: CancellationToken,
        on_complete: impl FnOnce() + Send,
    ) -> QueryOutcome
    where
        S: Stream<Item = Result<RuntimeEvent>> + Send,
    {
        let budget_limit = budget_limit.or(self.inner.config.budget_limit_usd);
        let mut stream = std::pin::pin!(stream);
        let mut saw_result = false;
        let mut error = None;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = stream.next() => next,
            };
            let Some(next) = next else {
                break;
            };
            if cancel.is_cancelled() {
                break;
            }
            match next {
                Ok(event) => {
                    if !self.is_current(generation) {
                        break;
                    }
                    saw_result |= event.is_result();
                    self.process_event(event, generation, budget_limit);
                }
                Err(err) => {
                    let silent = err.is_user_abort()
                        || cancel.is_cancelled()
                        || self.with_state(|ctx| ctx.state.silent_abort())
                        || !self.is_current(generation);
                    if silent {
                        tracing::debug!(generation, error = %err, "stream ended by abort");
                    } else {
                        tracing::warn!(generation, error = %err, "stream fault");
                        self.emit(EngineEvent::Error {
                            message: err.to_string(),
                        });
                        error = Some(err);
                    }
                    break;
                }
            }
        }

        self.complete(generation, saw_result, cancel.is_cancelled(), error, on_complete)
    }

    fn complete(
        &self,
        generation: u64,
        saw_result: bool,
        cancelled: bool,
        error: Option<BridgeError>,
        on_complete: impl FnOnce(),
    ) -> QueryOutcome {
        let superseded = !self.is_current(generation);
        let outcome = QueryOutcome {
            generation,
            saw_result,
            superseded,
            cancelled,
            error,
        };
        if superseded {
            tracing::debug!(generation, "consumption superseded");
            on_complete();
            return outcome;
        }

        self.with_state(|ctx| ctx.state.set_silent_abort(false));
        on_complete();
        if !saw_result {
            self.with_state(|ctx| {
                ctx.flush_pending_assistant();
                ctx.collaborators.tool_tracker.send_all_abandoned_tools();
                ctx.state.set_processing(false);
                ctx.state.fire_turn_complete();
            });
        }
        outcome
    }

    fn emit(&self, event: EngineEvent) {
        self.deliver(Outbox {
            events: vec![event],
            callbacks: Vec::new(),
        });
    }

    pub fn flush_pending_assistant(&self) -> bool {
        self.with_state(|ctx| ctx.flush_pending_assistant())
    }

    /// Suppress error reporting for the stream that is about to be aborted.
    pub fn request_silent_abort(&self) {
        self.with_state(|ctx| ctx.state.set_silent_abort(true));
    }

    /// Discard the session's live turn; returns the new generation.
    pub fn reset_streaming(&self) -> u64 {
        self.with_state(|ctx| ctx.state.reset_streaming())
    }

    pub fn reset_turn(&self) {
        self.with_state(|ctx| ctx.state.reset_turn());
    }

    pub fn set_on_turn_complete(&self, callback: impl FnOnce() + Send + 'static) {
        self.with_state(|ctx| ctx.state.set_on_turn_complete(Box::new(callback)));
    }

    pub fn set_on_turn_end_flush(&self, callback: impl FnOnce() + Send + 'static) {
        self.with_state(|ctx| ctx.state.set_on_turn_end_flush(Box::new(callback)));
    }

    /// Record the id of a user message the host sent itself.
    pub fn set_last_user_message_id(&self, id: impl Into<String>) {
        let id = id.into();
        self.with_state(|ctx| ctx.state.set_last_user_message_id(Some(id)));
    }

    pub fn set_session_id(&self, session_id: Option<String>) {
        self.with_state(|ctx| ctx.state.set_session_id(session_id));
    }

    pub fn generation(&self) -> u64 {
        lock(&self.inner.state).generation()
    }

    pub fn is_current(&self, generation: u64) -> bool {
        lock(&self.inner.state).is_current(generation)
    }

    pub fn session_id(&self) -> Option<String> {
        lock(&self.inner.state).session_id().map(str::to_string)
    }

    pub fn is_processing(&self) -> bool {
        lock(&self.inner.state).is_processing()
    }

    pub fn total_cost_usd(&self) -> f64 {
        lock(&self.inner.state).total_cost_usd()
    }

    pub fn streaming(&self) -> StreamingContent {
        lock(&self.inner.state).streaming.clone()
    }

    pub fn pending(&self) -> Option<PendingAssistantMessage> {
        lock(&self.inner.state).pending.clone()
    }
}

impl std::fmt::Debug for TurnEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnEngine")
            .field("state", &*lock(&self.inner.state))
            .finish_non_exhaustive()
    }
}
