//! Caption aggregation and the pending-mention state machine.
//!
//! Live captions arrive as short final fragments ("Hey", "Steve", "what's
//! on the agenda"). The aggregator merges consecutive same-speaker
//! fragments inside a sliding window, runs mention detection over the
//! merged text, and holds a bare name mention in a single pending slot
//! while waiting for a follow-up question.
//!
//! The pending-mention timeout is an explicit tokio task: its
//! [`JoinHandle`] is stored and aborted whenever the slot is superseded,
//! and a generation sequence number makes stale firings observable at the
//! receiving end. The engine run loop is the single owner of the
//! aggregator; no internal locking.

use crate::config::AggregatorConfig;
use crate::matcher::{MentionResult, NameMatcher};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// A single finalized caption fragment from the meeting collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionEntry {
    /// Caption identifier assigned by the meeting source.
    pub id: String,
    /// Display name of the speaker.
    pub speaker: String,
    /// Caption text.
    pub text: String,
    /// When the fragment finalized.
    pub timestamp: DateTime<Utc>,
    /// Only final fragments participate in aggregation.
    pub is_final: bool,
}

/// Same-speaker caption fragments merged inside the window.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedCaption {
    pub speaker: String,
    /// Space-joined fragment text in chronological order.
    pub text: String,
    /// Ids of the fragments that produced this text.
    pub caption_ids: Vec<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

/// A name mention seen without an accompanying question, held while
/// waiting for a follow-up. At most one exists per aggregator.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingMention {
    pub speaker: String,
    pub caption_text: String,
    pub timestamp: DateTime<Utc>,
    pub matched_variation: String,
}

/// An aggregated caption paired with its mention classification.
///
/// Every processed caption produces one of these — mentions and
/// non-mentions alike — so callers can observe all speech, not only
/// triggers.
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub caption: AggregatedCaption,
    pub mention: MentionResult,
}

/// Merges caption fragments and tracks the pending-mention slot.
pub struct CaptionAggregator {
    matcher: Arc<NameMatcher>,
    window: Duration,
    pending_timeout: StdDuration,
    buffer: Vec<CaptionEntry>,
    pending: Option<PendingMention>,
    /// Generation counter for the pending slot. A timeout firing carries
    /// the generation it was armed for; mismatches are stale and ignored.
    pending_seq: u64,
    timer: Option<JoinHandle<()>>,
    timeout_tx: mpsc::UnboundedSender<u64>,
}

impl CaptionAggregator {
    /// Create an aggregator. Timeout firings are sent on `timeout_tx` as
    /// generation sequence numbers; feed them back through
    /// [`Self::on_timeout`].
    #[must_use]
    pub fn new(
        matcher: Arc<NameMatcher>,
        config: &AggregatorConfig,
        timeout_tx: mpsc::UnboundedSender<u64>,
    ) -> Self {
        Self {
            matcher,
            window: Duration::milliseconds(config.aggregation_window_ms as i64),
            pending_timeout: StdDuration::from_millis(config.pending_mention_timeout_ms),
            buffer: Vec::new(),
            pending: None,
            pending_seq: 0,
            timer: None,
            timeout_tx,
        }
    }

    /// The current pending mention, if any.
    #[must_use]
    pub fn pending_mention(&self) -> Option<&PendingMention> {
        self.pending.as_ref()
    }

    /// Add a caption fragment and reprocess its speaker's buffer.
    ///
    /// Returns an utterance when this fragment resolves to an emission:
    /// a mention with a question, a pending mention completed by a
    /// follow-up, or a plain non-mention caption ("always notify"). A
    /// mention still waiting for its question returns `None`.
    pub fn add_caption(&mut self, entry: CaptionEntry) -> Option<Utterance> {
        if !entry.is_final {
            trace!("skipping interim caption from {}", entry.speaker);
            return None;
        }

        let cutoff = entry.timestamp - self.window;
        self.buffer.retain(|e| e.timestamp >= cutoff);

        let speaker = entry.speaker.clone();
        let fragment_text = entry.text.clone();
        self.buffer.push(entry);
        self.reprocess_speaker(&speaker, &fragment_text)
    }

    /// Handle a timeout firing for generation `seq`.
    ///
    /// Returns the stale pending mention exactly once when the firing is
    /// current; stale generations (superseded or already resolved) return
    /// `None`.
    pub fn on_timeout(&mut self, seq: u64) -> Option<PendingMention> {
        if seq != self.pending_seq {
            trace!("ignoring stale pending-mention timeout (gen {seq})");
            return None;
        }
        self.timer = None;
        let pending = self.pending.take()?;
        // The captured text is about to be processed as a trigger; consume
        // the speaker's fragments so they cannot re-fire.
        self.buffer.retain(|e| e.speaker != pending.speaker);
        debug!(
            "pending mention from {} timed out without follow-up",
            pending.speaker
        );
        Some(pending)
    }

    /// Force-process every buffered speaker's tail and clear the buffer.
    ///
    /// Used on speaker change or shutdown. The pending slot is left to its
    /// timer.
    pub fn flush(&mut self) -> Vec<Utterance> {
        let mut speakers: Vec<String> = Vec::new();
        for entry in &self.buffer {
            if !speakers.contains(&entry.speaker) {
                speakers.push(entry.speaker.clone());
            }
        }

        let mut utterances = Vec::new();
        for speaker in speakers {
            if let Some(caption) = self.aggregate_speaker(&speaker) {
                let mention = self.matcher.detect_mention(&caption.text);
                utterances.push(Utterance { caption, mention });
            }
        }
        self.buffer.clear();
        utterances
    }

    /// Cancel the pending slot and its timer (shutdown path).
    pub fn cancel_pending(&mut self) {
        self.cancel_timer();
        self.pending = None;
    }

    /// Drop a speaker's buffered fragments.
    ///
    /// Called when an utterance became a trigger outside the aggregator
    /// (escalation-detected indirect references), so the same speech
    /// cannot re-fire on the next fragment or at flush.
    pub fn consume_speaker(&mut self, speaker: &str) {
        self.buffer.retain(|e| e.speaker != speaker);
    }

    // ── Internals ───────────────────────────────────────────────────────

    fn reprocess_speaker(&mut self, speaker: &str, fragment_text: &str) -> Option<Utterance> {
        let caption = self.aggregate_speaker(speaker)?;
        let mention = self.matcher.detect_mention(&caption.text);
        // The aggregated text usually opens with a vocative ("Hey Steve
        // what's..."), which hides a leading question word — gate on the
        // incoming fragment as well.
        let has_question = self.matcher.contains_question_or_request(&caption.text)
            || self.matcher.contains_question_or_request(fragment_text);

        if mention.is_mentioned && has_question {
            // Name and question in one window: trigger immediately. The
            // fragments are consumed so a follow-on caption cannot re-fire
            // the same mention.
            self.cancel_timer();
            self.pending = None;
            self.buffer.retain(|e| e.speaker != caption.speaker);
            debug!(
                "mention with question from {} ({:?})",
                caption.speaker, mention.matched_variation
            );
            return Some(Utterance { caption, mention });
        }

        if mention.is_mentioned {
            // Bare mention: hold it and wait for a follow-up.
            let variation = mention.matched_variation.clone().unwrap_or_default();
            debug!(
                "bare mention from {} ({variation}), arming follow-up timer",
                caption.speaker
            );
            self.arm_pending(PendingMention {
                speaker: caption.speaker.clone(),
                caption_text: caption.text.clone(),
                timestamp: caption.end_time,
                matched_variation: variation,
            });
            return None;
        }

        if has_question {
            if let Some(pending) = self.pending.take_if(|p| p.speaker == caption.speaker) {
                // Follow-up question for a held mention: combine and re-run
                // detection over the joined text.
                self.cancel_timer();
                self.buffer.retain(|e| e.speaker != caption.speaker);
                let combined_text = format!("{} {}", pending.caption_text, caption.text);
                let combined_mention = self.matcher.detect_mention(&combined_text);
                debug!(
                    "pending mention from {} completed by follow-up",
                    caption.speaker
                );
                let combined = AggregatedCaption {
                    speaker: caption.speaker,
                    text: combined_text,
                    caption_ids: caption.caption_ids,
                    start_time: pending.timestamp,
                    end_time: caption.end_time,
                };
                return Some(Utterance {
                    caption: combined,
                    mention: combined_mention,
                });
            }
        }

        // Always notify: callers track non-mention speech too.
        Some(Utterance { caption, mention })
    }

    /// Merge a speaker's buffered fragments chronologically.
    fn aggregate_speaker(&self, speaker: &str) -> Option<AggregatedCaption> {
        let mut entries: Vec<&CaptionEntry> = self
            .buffer
            .iter()
            .filter(|e| e.speaker == speaker)
            .collect();
        if entries.is_empty() {
            return None;
        }
        entries.sort_by_key(|e| e.timestamp);

        let text = entries
            .iter()
            .map(|e| e.text.trim())
            .collect::<Vec<_>>()
            .join(" ");
        let caption_ids = entries.iter().map(|e| e.id.clone()).collect();

        Some(AggregatedCaption {
            speaker: speaker.to_owned(),
            text,
            caption_ids,
            start_time: entries[0].timestamp,
            end_time: entries[entries.len() - 1].timestamp,
        })
    }

    fn arm_pending(&mut self, pending: PendingMention) {
        self.cancel_timer();
        self.pending = Some(pending);
        self.pending_seq += 1;

        let seq = self.pending_seq;
        let tx = self.timeout_tx.clone();
        let timeout = self.pending_timeout;
        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = tx.send(seq);
        }));
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

impl Drop for CaptionAggregator {
    fn drop(&mut self) {
        self.cancel_timer();
    }
}

// ── Tests ───────────────────────────────────────────────────────────────
