//! Per-message orchestration: audit → operator mirror → mode check → PII
//! clean → model stream (restore + escalation scan) → handoff side effects.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::OwnedMutexGuard;
use tokio::time::{timeout, Duration};
use tracing::{info, warn};

use veil_assistant::StreamEvent;
use veil_core::error::GatewayError;
use veil_core::types::SessionMode;
use veil_scanner::{EscalationDetector, ScanError, SentinelFilter, StreamRestorer};

use crate::app::AppState;

/// Fixed reply while a human owns the conversation.
pub const HUMAN_HOLDING_MESSAGE: &str =
    "Ein menschlicher Mitarbeiter hat die Konversation übernommen. Bitte warten Sie auf eine Antwort.";

/// Closing notice after a successful escalation.
pub const HANDOFF_NOTICE: &str = "Ein Mitarbeiter übernimmt.";

/// Notice when the model stream dies mid-reply.
pub const STREAM_FAILURE_NOTICE: &str =
    "Die Antwort wurde unterbrochen. Bitte versuchen Sie es erneut.";

/// What the transport renders out of a running turn.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnEvent {
    /// Restored, sentinel-free text ready for the user.
    Chunk(String),
    /// Out-of-band notice (escalation, stream failure).
    System {
        text: String,
        status: Option<String>,
    },
    /// Turn finished; no further events follow.
    Done,
}

/// Outcome of the synchronous head of a turn.
#[derive(Debug)]
pub enum Turn {
    /// Session is in HUMAN mode. Reply with the holding message; the
    /// mirror has already forwarded the text to the operator.
    Human,
    /// AI mode: the cleaned prompt is ready for the model.
    Ai {
        anonymized: String,
        guard: OwnedMutexGuard<()>,
    },
}

/// Run the pre-stream steps of a turn. Holds the per-session turn lock so
/// fragments of turn N fully precede turn N+1; for an AI turn the lock
/// travels into `spawn_stream` and is released when the stream finishes.
pub async fn begin_turn(
    state: &Arc<AppState>,
    session_id: &str,
    user_text: &str,
) -> Result<Turn, GatewayError> {
    let lock = state
        .turn_locks
        .entry(session_id.to_string())
        .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
        .clone();
    let guard = lock.lock_owned().await;

    // Awaited so the user row is committed before any assistant write.
    state.audit.record_user(session_id, user_text).await;
    state.operator.mirror(session_id, "[USER]", user_text).await;

    let mode = state
        .vault
        .mode(session_id)
        .await
        .map_err(|e| GatewayError::StoreUnavailable(e.to_string()))?;

    if mode == SessionMode::Human {
        if !state.operator.is_bound(session_id) {
            // Escalated but no operator has connected yet, so nudge the
            // webhook channel again.
            let mut history = state.assistant.history(session_id).await;
            history.push(connect_instruction(session_id));
            if let Err(e) = state.notifier.notify_escalation(session_id, &history).await {
                warn!(session = session_id, error = %e, "escalation notification retry failed");
            }
        }
        return Ok(Turn::Human);
    }

    let anonymized = state.scanner.clean(user_text).await.map_err(|e| match e {
        ScanError::Store(inner) => GatewayError::StoreUnavailable(inner.to_string()),
        ScanError::Detector(inner) => GatewayError::FilterFailed(inner),
    })?;

    Ok(Turn::Ai { anonymized, guard })
}

/// Drive the model stream for an AI turn in a background task. The returned
/// receiver yields `TurnEvent`s until `Done`; dropping it stops emission
/// while the raw path finishes best-effort (escalation still fires), all
/// bounded by the per-turn deadline.
pub fn spawn_stream(
    state: Arc<AppState>,
    session_id: String,
    anonymized: String,
    guard: OwnedMutexGuard<()>,
) -> mpsc::Receiver<TurnEvent> {
    let (tx, rx) = mpsc::channel(64);
    tokio::spawn(async move {
        drive_stream(&state, &session_id, &anonymized, &tx).await;
        drop(guard);
    });
    rx
}

async fn drive_stream(
    state: &Arc<AppState>,
    session_id: &str,
    anonymized: &str,
    events: &mpsc::Sender<TurnEvent>,
) {
    let (raw_tx, mut raw_rx) = mpsc::channel::<StreamEvent>(64);

    let run_state = Arc::clone(state);
    let run_session = session_id.to_string();
    let run_prompt = anonymized.to_string();
    let run = tokio::spawn(async move {
        if let Err(e) = run_state
            .assistant
            .stream(&run_session, &run_prompt, raw_tx)
            .await
        {
            // The sender is dropped with this task; the consumer sees the
            // closed channel and treats the turn as failed.
            warn!(session = %run_session, error = %e, "assistant stream failed");
        }
    });

    let mut restorer = StreamRestorer::new(state.vault.clone());
    let mut filter = SentinelFilter::new();
    let mut escalation = EscalationDetector::new();
    let mut restored_full = String::new();

    let deadline = Duration::from_secs(state.config.gateway.turn_timeout_secs);
    let failed = match timeout(
        deadline,
        pump(
            &mut raw_rx,
            events,
            &mut restorer,
            &mut filter,
            &mut escalation,
            &mut restored_full,
        ),
    )
    .await
    {
        Ok(failed) => failed,
        Err(_) => {
            warn!(session = session_id, "turn deadline exceeded, aborting model stream");
            run.abort();
            true
        }
    };

    // Flush whatever the restorer and the sentinel filter still hold.
    // Best-effort visibility over data loss.
    let residue = restorer.finish();
    let mut tail = filter.push(&residue);
    tail.push_str(&filter.finish());
    if !tail.is_empty() {
        restored_full.push_str(&tail);
        let _ = events.send(TurnEvent::Chunk(tail)).await;
    }

    // The assistant row records what the user actually saw.
    state.audit.record_assistant(session_id, &restored_full).await;
    state
        .operator
        .mirror(session_id, "[BOT]", &restored_full)
        .await;

    // Escalation side effects run strictly after the stream so the user
    // sees the full reply before the handoff notice. A failed stream never
    // escalates.
    if escalation.fired() && !failed {
        escalate(state, session_id, anonymized).await;
        let _ = events
            .send(TurnEvent::System {
                text: HANDOFF_NOTICE.to_string(),
                status: Some("ESKALATION".to_string()),
            })
            .await;
    }

    if failed {
        let _ = events
            .send(TurnEvent::System {
                text: STREAM_FAILURE_NOTICE.to_string(),
                status: None,
            })
            .await;
    }

    let _ = events.send(TurnEvent::Done).await;
}

/// Consume the raw model stream: every fragment is scanned for the
/// escalation sentinel and, independently, restored + sentinel-stripped for
/// the user. Returns true when the stream ended abnormally.
async fn pump(
    raw_rx: &mut mpsc::Receiver<StreamEvent>,
    events: &mpsc::Sender<TurnEvent>,
    restorer: &mut StreamRestorer,
    filter: &mut SentinelFilter,
    escalation: &mut EscalationDetector,
    restored_full: &mut String,
) -> bool {
    loop {
        match raw_rx.recv().await {
            Some(StreamEvent::TextDelta { text }) => {
                escalation.scan(&text);

                let restored = restorer.push(&text).await;
                let visible = filter.push(&restored);
                if !visible.is_empty() {
                    restored_full.push_str(&visible);
                    // A gone receiver only stops emission; the raw path
                    // keeps scanning so escalation still fires.
                    let _ = events.send(TurnEvent::Chunk(visible)).await;
                }
            }
            Some(StreamEvent::Done) => return false,
            Some(StreamEvent::Error { message }) => {
                warn!(%message, "model stream reported an error");
                return true;
            }
            None => {
                warn!("model stream closed without completion");
                return true;
            }
        }
    }
}

async fn escalate(state: &Arc<AppState>, session_id: &str, anonymized: &str) {
    info!(session = session_id, "escalation triggered by model reply");

    let mut history = state.assistant.history(session_id).await;
    if history.is_empty() {
        history.push(format!("Kundenfrage (anonymisiert): {anonymized}"));
    }

    if !state.operator.is_bound(session_id) {
        history.push(connect_instruction(session_id));
        if let Err(e) = state.notifier.notify_escalation(session_id, &history).await {
            warn!(session = session_id, error = %e, "escalation notification failed");
        }
    }

    if let Err(e) = state.vault.set_mode(session_id, SessionMode::Human).await {
        warn!(session = session_id, error = %e, "failed to persist HUMAN mode");
    }
}

fn connect_instruction(session_id: &str) -> String {
    format!("[SYSTEM] Um diesen Chat zu übernehmen, antworten Sie dem Bot mit: connect {session_id}")
}
