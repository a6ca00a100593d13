//! Behavior processor: turns confirmed triggers into routed, delivered
//! responses.
//!
//! A trigger (caption mention or chat mention) is matched against the
//! active behavior pattern, handed to the injected response generator, and
//! the result is tracked as a [`PendingResponse`] while it moves through
//! delivery. Routing follows the pattern's mode: deliver immediately, hold
//! for human approval, or queue behind a raised hand.
//!
//! Collaborator failures never escape: generation failures drop the
//! trigger with a log, delivery failures park the record in `Failed`, and
//! a failed hand raise falls back to the approval flow.

use crate::aggregator::{AggregatedCaption, PendingMention};
use crate::events::EngineEvent;
use crate::matcher::{MentionResult, NameMatcher};
use crate::pattern::{BehaviorMode, ResponseChannel};
use crate::store::{
    ChannelOutcome, PendingResponse, PendingResponseStore, QueueStats, ResponseStatus,
    TriggerSource,
};
use crate::traits::{ChatSender, HandRaiser, PatternSource, ResponseGenerator, SpeechSender};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Capacity of the event broadcast channel.
const EVENT_CHANNEL_SIZE: usize = 256;

/// A chat message from the meeting collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub sender: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// What the response generator is asked to respond to.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerContext {
    pub source: TriggerSource,
    /// The text the agent was addressed with.
    pub content: String,
    /// Display name of whoever addressed the agent.
    pub author: String,
    pub author_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// Recent transcript, when the caller tracks one.
    pub meeting_context: Option<String>,
}

impl TriggerContext {
    /// Build a caption-mention trigger from an aggregated utterance.
    #[must_use]
    pub fn from_caption(caption: &AggregatedCaption, mention: &MentionResult) -> Self {
        debug!(
            "caption trigger from {} (variation {:?}, confidence {:.2})",
            caption.speaker, mention.matched_variation, mention.confidence
        );
        Self {
            source: TriggerSource::CaptionMention,
            content: caption.text.clone(),
            author: caption.speaker.clone(),
            author_id: None,
            timestamp: caption.end_time,
            meeting_context: None,
        }
    }

    /// Build a caption-mention trigger from a timed-out pending mention.
    ///
    /// The follow-up never came; the captured text is processed as-is.
    #[must_use]
    pub fn from_pending_mention(pending: &PendingMention) -> Self {
        Self {
            source: TriggerSource::CaptionMention,
            content: pending.caption_text.clone(),
            author: pending.speaker.clone(),
            author_id: None,
            timestamp: pending.timestamp,
            meeting_context: None,
        }
    }

    /// Build a chat-mention trigger.
    #[must_use]
    pub fn from_chat(message: &ChatMessage) -> Self {
        Self {
            source: TriggerSource::ChatMention,
            content: message.content.clone(),
            author: message.sender.clone(),
            author_id: None,
            timestamp: message.timestamp,
            meeting_context: None,
        }
    }
}

/// Routes confirmed triggers through generation, queueing, and delivery.
pub struct BehaviorProcessor {
    matcher: Arc<NameMatcher>,
    store: Mutex<PendingResponseStore>,
    generator: Arc<dyn ResponseGenerator>,
    chat: Arc<dyn ChatSender>,
    speech: Arc<dyn SpeechSender>,
    hand: Arc<dyn HandRaiser>,
    patterns: Arc<dyn PatternSource>,
    events: broadcast::Sender<EngineEvent>,
}

impl BehaviorProcessor {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        matcher: Arc<NameMatcher>,
        store_capacity: usize,
        generator: Arc<dyn ResponseGenerator>,
        chat: Arc<dyn ChatSender>,
        speech: Arc<dyn SpeechSender>,
        hand: Arc<dyn HandRaiser>,
        patterns: Arc<dyn PatternSource>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        Self {
            matcher,
            store: Mutex::new(PendingResponseStore::new(store_capacity)),
            generator,
            chat,
            speech,
            hand,
            patterns,
            events,
        }
    }

    /// Subscribe to engine events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Process a confirmed trigger end to end.
    ///
    /// Returns the created response id, or `None` when the trigger was
    /// disabled by the active pattern or generation failed.
    pub async fn process_trigger(&self, context: TriggerContext) -> Option<Uuid> {
        let pattern = self.patterns.active_pattern();
        let trigger_config = match context.source {
            TriggerSource::CaptionMention => pattern.caption_mention,
            TriggerSource::ChatMention => pattern.chat_mention,
        };

        if !trigger_config.enabled {
            debug!(
                "{:?} trigger from {} dropped: disabled in pattern '{}'",
                context.source, context.author, pattern.id
            );
            return None;
        }

        self.emit(EngineEvent::TriggerDetected {
            source: context.source,
            author: context.author.clone(),
            content: context.content.clone(),
        });

        let generated = match self.generator.generate(&context).await {
            Ok(generated) => generated,
            Err(e) => {
                warn!("response generation failed for {}: {e}", context.author);
                return None;
            }
        };

        let mode_kind = trigger_config.mode.kind();
        // Queued triggers with auto-raise enter the lifecycle at HandRaised,
        // bypassing Pending.
        let initial_status = match trigger_config.mode {
            BehaviorMode::Queued { options } if options.auto_raise_hand => {
                ResponseStatus::HandRaised
            }
            _ => ResponseStatus::Pending,
        };

        let response = PendingResponse::new(
            context.source,
            context.content,
            context.author.clone(),
            generated.text,
            trigger_config.response_channel,
            mode_kind,
            initial_status,
        );
        let id = self.store_guard().insert(response);
        self.emit(EngineEvent::ResponseGenerated {
            id,
            author: context.author,
        });

        match trigger_config.mode {
            BehaviorMode::Immediate => {
                if let Err(e) = self.deliver_response(id).await {
                    warn!("immediate delivery failed for {id}: {e}");
                }
            }
            BehaviorMode::Controlled { .. } => {
                info!("response {id} held for approval");
                self.emit(EngineEvent::ResponseQueued {
                    id,
                    mode: mode_kind,
                });
            }
            BehaviorMode::Queued { options } => {
                if options.auto_raise_hand {
                    match self.hand.raise_hand().await {
                        Ok(()) => {
                            info!("hand raised for queued response {id}");
                            self.emit(EngineEvent::HandRaised { id });
                            self.emit(EngineEvent::ResponseQueued {
                                id,
                                mode: mode_kind,
                            });
                        }
                        Err(e) => {
                            // Fall back to the approval flow instead of
                            // stranding the response in HandRaised.
                            warn!("hand raise failed for {id}, reverting to pending: {e}");
                            if let Err(te) =
                                self.store_guard().transition(id, ResponseStatus::Pending)
                            {
                                warn!("fallback transition failed for {id}: {te}");
                            }
                            self.emit(EngineEvent::ResponseQueued {
                                id,
                                mode: mode_kind,
                            });
                        }
                    }
                } else {
                    self.emit(EngineEvent::ResponseQueued {
                        id,
                        mode: mode_kind,
                    });
                }
            }
        }

        Some(id)
    }

    /// Handle an incoming chat message: literal variation containment only
    /// (typed text needs no phonetic tolerance), then the trigger pipeline.
    pub async fn handle_chat_message(&self, message: ChatMessage) -> Option<Uuid> {
        let Some(variation) = self.matcher.matches_literal(&message.content) else {
            debug!("chat from {} does not mention the agent", message.sender);
            return None;
        };
        debug!(
            "chat mention of '{variation}' from {}",
            message.sender
        );
        let context = TriggerContext::from_chat(&message);
        self.process_trigger(context).await
    }

    /// Approve a held response and deliver it.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown id or a response that is not
    /// waiting for approval.
    pub async fn approve_response(&self, id: Uuid) -> crate::error::Result<()> {
        self.store_guard().transition(id, ResponseStatus::Approved)?;
        info!("response {id} approved");
        self.emit(EngineEvent::ResponseApproved { id });
        self.deliver_response(id).await
    }

    /// Reject a held response.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown id or a response that is not
    /// waiting for approval.
    pub fn reject_response(&self, id: Uuid) -> crate::error::Result<()> {
        self.store_guard().transition(id, ResponseStatus::Rejected)?;
        info!("response {id} rejected");
        self.emit(EngineEvent::ResponseRejected { id });
        Ok(())
    }

    /// Dismiss a held response without the reject semantics (no event for
    /// supervising UIs beyond the queue stats).
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown id or a response that is not
    /// dismissable.
    pub fn dismiss_response(&self, id: Uuid) -> crate::error::Result<()> {
        self.store_guard().transition(id, ResponseStatus::Dismissed)?;
        debug!("response {id} dismissed");
        Ok(())
    }

    /// The meeting reported the agent's hand was lowered (by any actor).
    ///
    /// Releases the single oldest queued hand-raised response; at most one
    /// per event.
    pub async fn on_hand_lowered(&self) -> Option<Uuid> {
        self.emit(EngineEvent::HandLowered);

        let id = self.store_guard().next_hand_raised().map(|r| r.id);
        let Some(id) = id else {
            debug!("hand lowered with no queued response waiting");
            return None;
        };

        info!("hand lowered: releasing queued response {id}");
        if let Err(e) = self.deliver_response(id).await {
            warn!("queued delivery failed for {id}: {e}");
        }
        Some(id)
    }

    /// Deliver a response over its configured channel(s).
    ///
    /// `Both` dispatches chat and speech concurrently and waits for both;
    /// any single failure marks the whole response `Failed` even when the
    /// other channel's side effect happened — per-channel outcomes are
    /// recorded on the record for that case.
    ///
    /// # Errors
    ///
    /// Returns an error when the record is unknown or not in a deliverable
    /// state. Channel failures are captured in the record, not returned.
    pub async fn deliver_response(&self, id: Uuid) -> crate::error::Result<()> {
        let (text, channel, was_hand_raised) = {
            let mut store = self.store_guard();
            let was_hand_raised = store
                .get(id)
                .map(|r| r.status == ResponseStatus::HandRaised)
                .unwrap_or(false);
            store.transition(id, ResponseStatus::Sending)?;
            let record = store
                .get(id)
                .ok_or_else(|| crate::error::EngineError::Store(format!("unknown response {id}")))?;
            (record.response_text.clone(), record.response_channel, was_hand_raised)
        };

        self.emit(EngineEvent::ResponseSending { id, channel });

        let outcome: std::result::Result<(), String> = match channel {
            ResponseChannel::Chat => {
                let result = self.chat.send_chat(&text).await;
                self.record_outcome(id, ResponseChannel::Chat, &result);
                result.map_err(|e| e.to_string())
            }
            ResponseChannel::Speech => {
                let result = self.speech.speak(&text).await;
                self.record_outcome(id, ResponseChannel::Speech, &result);
                result.map_err(|e| e.to_string())
            }
            ResponseChannel::Both => {
                let (chat_result, speech_result) =
                    tokio::join!(self.chat.send_chat(&text), self.speech.speak(&text));
                self.record_outcome(id, ResponseChannel::Chat, &chat_result);
                self.record_outcome(id, ResponseChannel::Speech, &speech_result);
                let errors: Vec<String> = [
                    chat_result.err().map(|e| format!("chat: {e}")),
                    speech_result.err().map(|e| format!("speech: {e}")),
                ]
                .into_iter()
                .flatten()
                .collect();
                if errors.is_empty() {
                    Ok(())
                } else {
                    Err(errors.join("; "))
                }
            }
        };

        match outcome {
            Ok(()) => {
                self.store_guard().transition(id, ResponseStatus::Sent)?;
                info!("response {id} sent via {channel:?}");
                self.emit(EngineEvent::ResponseSent { id });
                if was_hand_raised {
                    // Retract the hand if the meeting didn't already.
                    if let Err(e) = self.hand.lower_hand().await {
                        warn!("hand lower after delivery failed: {e}");
                    }
                }
            }
            Err(error) => {
                {
                    let mut store = self.store_guard();
                    store.transition(id, ResponseStatus::Failed)?;
                    store.set_error(id, error.clone());
                }
                warn!("response {id} delivery failed: {error}");
                self.emit(EngineEvent::ResponseFailed { id, error });
            }
        }

        Ok(())
    }

    /// A snapshot of a tracked response.
    #[must_use]
    pub fn response(&self, id: Uuid) -> Option<PendingResponse> {
        self.store_guard().get(id).cloned()
    }

    /// Queue counts by status.
    #[must_use]
    pub fn queue_stats(&self) -> QueueStats {
        self.store_guard().stats()
    }

    /// Drop all terminal-state records, returning how many were removed.
    pub fn clear_completed(&self) -> usize {
        self.store_guard().clear_completed()
    }

    // ── Internals ───────────────────────────────────────────────────────

    fn store_guard(&self) -> MutexGuard<'_, PendingResponseStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record_outcome(
        &self,
        id: Uuid,
        channel: ResponseChannel,
        result: &crate::error::Result<()>,
    ) {
        let outcome = match result {
            Ok(()) => ChannelOutcome::Delivered,
            Err(e) => ChannelOutcome::Failed {
                error: e.to_string(),
            },
        };
        self.store_guard().record_channel_outcome(id, channel, outcome);
    }

    fn emit(&self, event: EngineEvent) {
        // No subscribers is fine; events are observability, not control flow.
        let _ = self.events.send(event);
    }
}

// ── Tests ───────────────────────────────────────────────────────────────
