use super::ProcessorContext;
use crate::engine::events::{EngineEvent, TurnSummary};
use crate::types::{ResultEvent, ResultSubtype};

/// Per-query context for the terminal event.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ResultContext {
    /// A limit of zero or below counts as no limit.
    pub budget_limit: Option<f64>,
    pub query_generation: u64,
}

/// Close out the turn.
pub fn process_result(
    event: ResultEvent,
    ctx: &mut ProcessorContext<'_>,
    result_ctx: ResultContext,
) {
    if !ctx.state.is_current(result_ctx.query_generation) {
        tracing::debug!(
            generation = result_ctx.query_generation,
            current = ctx.state.generation(),
            "dropping stale result"
        );
        return;
    }

    let cost = event.total_cost_usd;
    ctx.collaborators.checkpoints.update_cost(cost);
    ctx.state.set_total_cost_usd(cost);

    if let Some(limit) = result_ctx.budget_limit.filter(|limit| *limit > 0.0) {
        if event.subtype == ResultSubtype::ErrorMaxBudgetUsd {
            ctx.state.emit(EngineEvent::BudgetExceeded {
                cost_usd: cost,
                limit_usd: limit,
            });
        } else {
            let ratio = cost / limit;
            if ratio >= ctx.config.budget_warning_ratio && ratio < 1.0 {
                ctx.state.emit(EngineEvent::BudgetWarning {
                    cost_usd: cost,
                    limit_usd: limit,
                    percent_used: (ratio * 100.0).round() as u32,
                });
            }
        }
    }

    ctx.flush_pending_assistant();

    let reported_window = event
        .model_usage
        .values()
        .filter_map(|usage| usage.context_window)
        .max();
    if let Some(window) = reported_window {
        ctx.state.set_context_window(window);
    }
    if event.session_id.is_some() {
        ctx.state.set_session_id(event.session_id.clone());
    }

    ctx.state.emit(EngineEvent::Done {
        summary: TurnSummary {
            subtype: event.subtype,
            is_error: event.is_error,
            total_cost_usd: cost,
            num_turns: event.num_turns,
            duration_ms: event.duration_ms,
            context_window: reported_window.unwrap_or(ctx.config.default_context_window),
            usage: event.usage,
            model_usage: event.model_usage,
            result: event.result,
        },
    });

    ctx.collaborators.tool_tracker.reset_turn();
    ctx.state.reset_turn();
    ctx.state.set_processing(false);
    ctx.state.fire_turn_complete();
    ctx.state.fire_turn_end_flush();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BridgeConfig;
    use crate::engine::collaborators::Collaborators;
    use crate::engine::state::{AccumulatorState, PendingAssistantMessage};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn result(raw: serde_json::Value) -> ResultEvent {
        serde_json::from_value(raw).unwrap()
    }

    fn run(
        state: &mut AccumulatorState,
        event: ResultEvent,
        budget_limit: Option<f64>,
    ) -> Vec<EngineEvent> {
        let collaborators = Collaborators::default();
        let config = BridgeConfig::default();
        let result_ctx = ResultContext {
            budget_limit,
            query_generation: state.generation(),
        };
        process_result(
            event,
            &mut ProcessorContext::new(state, &collaborators, &config),
            result_ctx,
        );
        state.take_outbox().events
    }

    #[test]
    fn warns_once_between_eighty_and_hundred_percent() {
        let mut state = AccumulatorState::new();
        let events = run(
            &mut state,
            result(json!({ "subtype": "success", "total_cost_usd": 0.85 })),
            Some(1.0),
        );
        let warnings: Vec<_> = events
            .iter()
            .filter_map(|event| match event {
                EngineEvent::BudgetWarning { percent_used, .. } => Some(*percent_used),
                _ => None,
            })
            .collect();
        assert_eq!(warnings, vec![85]);
    }

    #[test]
    fn exceeded_replaces_warning() {
        let mut state = AccumulatorState::new();
        let events = run(
            &mut state,
            result(json!({ "subtype": "error_max_budget_usd", "total_cost_usd": 1.2 })),
            Some(1.0),
        );
        assert!(events
            .iter()
            .any(|event| matches!(event, EngineEvent::BudgetExceeded { .. })));
        assert!(!events
            .iter()
            .any(|event| matches!(event, EngineEvent::BudgetWarning { .. })));
    }

    #[test]
    fn zero_limit_disables_budget_events() {
        let mut state = AccumulatorState::new();
        let events = run(
            &mut state,
            result(json!({ "subtype": "error_max_budget_usd", "total_cost_usd": 1.2 })),
            Some(0.0),
        );
        assert!(!events.iter().any(|event| matches!(
            event,
            EngineEvent::BudgetExceeded { .. } | EngineEvent::BudgetWarning { .. }
        )));
    }

    #[test]
    fn flushes_before_done_and_uses_model_window() {
        let mut state = AccumulatorState::new();
        state.pending = Some(PendingAssistantMessage::new("msg_1"));
        let events = run(
            &mut state,
            result(json!({
                "subtype": "success",
                "modelUsage": {
                    "claude-sonnet": { "contextWindow": 1_000_000 },
                    "claude-haiku": { "contextWindow": 200_000 }
                }
            })),
            None,
        );
        let flushed = events
            .iter()
            .position(|event| matches!(event, EngineEvent::AssistantMessage { .. }))
            .unwrap();
        let done = events
            .iter()
            .position(|event| matches!(event, EngineEvent::Done { .. }))
            .unwrap();
        assert!(flushed < done);
        let EngineEvent::Done { summary } = &events[done] else {
            unreachable!()
        };
        assert_eq!(summary.context_window, 1_000_000);
        assert_eq!(state.context_window(), Some(1_000_000));
    }

    #[test]
    fn defaults_context_window_when_absent() {
        let mut state = AccumulatorState::new();
        let events = run(&mut state, result(json!({ "subtype": "success" })), None);
        let summary = events
            .into_iter()
            .find_map(|event| match event {
                EngineEvent::Done { summary } => Some(summary),
                _ => None,
            })
            .unwrap();
        assert_eq!(summary.context_window, 200_000);
    }

    #[test]
    fn stale_result_is_silent() {
        let mut state = AccumulatorState::new();
        state.set_processing(true);
        state.take_outbox();
        let collaborators = Collaborators::default();
        let config = BridgeConfig::default();
        let stale = ResultContext {
            budget_limit: None,
            query_generation: state.generation(),
        };
        state.bump_generation();
        process_result(
            result(json!({ "subtype": "success" })),
            &mut ProcessorContext::new(&mut state, &collaborators, &config),
            stale,
        );
        assert!(state.take_outbox().is_empty());
        assert!(state.is_processing());
    }
}
