//! Turngate: turn reconstruction and tool gating for agent runtimes.
//!
//! Two halves sit between an agent runtime and a UI:
//!
//! - [`engine::TurnEngine`] consumes a query's stream of [`types::RuntimeEvent`]s
//!   and rebuilds finalized assistant messages, usage, and turn lifecycle
//!   events out of partial deltas.
//! - [`gate::ToolGate`] answers every `can_use_tool` request, either from
//!   session policy or by parking it until the UI decides.
//!
//! # Quick Start
//!
//! ```no_run
//! use turngate::prelude::*;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> turngate::error::Result<()> {
//! let config = BridgeConfig::load(None)?;
//! let sink: EngineEventSink = Arc::new(|event| println!("{event:?}"));
//! let engine = TurnEngine::new(config.clone(), Collaborators::default(), Some(sink));
//!
//! let (feed, events) = event_channel();
//! let task = engine.consume_query_in_background(events, None, CancellationToken::new(), || {});
//! feed.push_json(r#"{"type":"system","subtype":"init","session_id":"s1"}"#)?;
//! drop(feed);
//! task.await.ok();
//!
//! let gate = ToolGate::with_local_diffs(config);
//! let ctx = ToolUseContext::new(CancellationToken::new()).with_tool_use_id("toolu_1");
//! let verdict = gate.can_use_tool("Grep", &serde_json::json!({ "pattern": "fn" }), &ctx).await;
//! assert!(verdict.is_allow());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod gate;
pub mod prelude;
pub mod types;
pub(crate) mod util;
