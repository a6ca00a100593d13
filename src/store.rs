//! Pending response records and their lifecycle store.
//!
//! Every generated response is tracked from creation to a terminal state.
//! Transitions are one-directional and validated here; the behavior
//! processor only asks for transitions, it never mutates a record's status
//! directly.

use crate::pattern::{BehaviorModeKind, ResponseChannel};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

/// Lifecycle state of a pending response.
///
/// `Pending → {Approved → Sending → Sent|Failed}`, `Pending → Rejected`,
/// `Pending → Dismissed`; queued responses enter at `HandRaised` and go
/// `HandRaised → Sending → Sent|Failed`. The only path back into `Pending`
/// is the hand-raise failure fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResponseStatus {
    Pending,
    Approved,
    Rejected,
    Dismissed,
    HandRaised,
    Sending,
    Sent,
    Failed,
}

impl ResponseStatus {
    /// Whether this state admits no further transitions.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Sent | Self::Failed | Self::Rejected | Self::Dismissed
        )
    }

    fn can_transition_to(self, to: Self) -> bool {
        use ResponseStatus::*;
        matches!(
            (self, to),
            (Pending, Approved)
                | (Pending, Rejected)
                | (Pending, Dismissed)
                | (Pending, Sending)
                | (Approved, Sending)
                | (HandRaised, Sending)
                | (HandRaised, Pending)
                | (Sending, Sent)
                | (Sending, Failed)
        )
    }
}

/// Where a trigger came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TriggerSource {
    CaptionMention,
    ChatMention,
}

/// Outcome of a single delivery channel, recorded even when the aggregate
/// status collapses to a binary sent/failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChannelOutcome {
    Delivered,
    Failed { error: String },
}

/// A tracked in-flight response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingResponse {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub trigger_source: TriggerSource,
    pub trigger_content: String,
    pub trigger_author: String,
    pub response_text: String,
    pub response_channel: ResponseChannel,
    pub status: ResponseStatus,
    pub behavior_mode: BehaviorModeKind,
    pub status_changed_at: DateTime<Utc>,
    pub error_message: Option<String>,
    /// Per-channel delivery outcomes (populated during `Sending`).
    pub chat_outcome: Option<ChannelOutcome>,
    pub speech_outcome: Option<ChannelOutcome>,
}

impl PendingResponse {
    /// Create a record in its initial state.
    #[must_use]
    pub fn new(
        trigger_source: TriggerSource,
        trigger_content: String,
        trigger_author: String,
        response_text: String,
        response_channel: ResponseChannel,
        behavior_mode: BehaviorModeKind,
        initial_status: ResponseStatus,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            created_at: now,
            trigger_source,
            trigger_content,
            trigger_author,
            response_text,
            response_channel,
            status: initial_status,
            behavior_mode,
            status_changed_at: now,
            error_message: None,
            chat_outcome: None,
            speech_outcome: None,
        }
    }
}

/// Counts by status, for observability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub total: usize,
    pub pending: usize,
    pub approved: usize,
    pub hand_raised: usize,
    pub sending: usize,
    pub sent: usize,
    pub failed: usize,
    pub rejected: usize,
    pub dismissed: usize,
}

/// Bounded, insertion-ordered store of pending responses.
pub struct PendingResponseStore {
    responses: Vec<PendingResponse>,
    capacity: usize,
}

impl PendingResponseStore {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            responses: Vec::new(),
            capacity,
        }
    }

    /// Insert a record, evicting the oldest terminal-state entry when the
    /// capacity bound is exceeded. In-flight entries are never evicted; if
    /// every entry is in flight the store grows past the bound.
    pub fn insert(&mut self, response: PendingResponse) -> Uuid {
        if self.responses.len() >= self.capacity {
            match self
                .responses
                .iter()
                .position(|r| r.status.is_terminal())
            {
                Some(index) => {
                    let evicted = self.responses.remove(index);
                    debug!("evicted completed response {}", evicted.id);
                }
                None => warn!(
                    "pending response queue over capacity ({}) with no completed entry to evict",
                    self.capacity
                ),
            }
        }

        let id = response.id;
        self.responses.push(response);
        id
    }

    #[must_use]
    pub fn get(&self, id: Uuid) -> Option<&PendingResponse> {
        self.responses.iter().find(|r| r.id == id)
    }

    /// Move a record to `to`, enforcing the lifecycle.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown id or an invalid transition.
    pub fn transition(&mut self, id: Uuid, to: ResponseStatus) -> crate::error::Result<()> {
        let response = self
            .responses
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| crate::error::EngineError::Store(format!("unknown response {id}")))?;

        if !response.status.can_transition_to(to) {
            return Err(crate::error::EngineError::Store(format!(
                "invalid transition {:?} → {to:?} for {id}",
                response.status
            )));
        }

        debug!("response {id}: {:?} → {to:?}", response.status);
        response.status = to;
        response.status_changed_at = Utc::now();
        Ok(())
    }

    /// Record the aggregate failure message on a record.
    pub fn set_error(&mut self, id: Uuid, message: String) {
        if let Some(response) = self.responses.iter_mut().find(|r| r.id == id) {
            response.error_message = Some(message);
        }
    }

    /// Record one channel's delivery outcome.
    pub fn record_channel_outcome(
        &mut self,
        id: Uuid,
        channel: ResponseChannel,
        outcome: ChannelOutcome,
    ) {
        if let Some(response) = self.responses.iter_mut().find(|r| r.id == id) {
            match channel {
                ResponseChannel::Chat => response.chat_outcome = Some(outcome),
                ResponseChannel::Speech => response.speech_outcome = Some(outcome),
                ResponseChannel::Both => {}
            }
        }
    }

    /// The oldest queued response waiting behind a raised hand.
    #[must_use]
    pub fn next_hand_raised(&self) -> Option<&PendingResponse> {
        self.responses.iter().find(|r| {
            r.status == ResponseStatus::HandRaised && r.behavior_mode == BehaviorModeKind::Queued
        })
    }

    /// Remove all terminal-state entries, returning how many were dropped.
    pub fn clear_completed(&mut self) -> usize {
        let before = self.responses.len();
        self.responses.retain(|r| !r.status.is_terminal());
        before - self.responses.len()
    }

    #[must_use]
    pub fn stats(&self) -> QueueStats {
        let mut stats = QueueStats {
            total: self.responses.len(),
            ..QueueStats::default()
        };
        for response in &self.responses {
            match response.status {
                ResponseStatus::Pending => stats.pending += 1,
                ResponseStatus::Approved => stats.approved += 1,
                ResponseStatus::HandRaised => stats.hand_raised += 1,
                ResponseStatus::Sending => stats.sending += 1,
                ResponseStatus::Sent => stats.sent += 1,
                ResponseStatus::Failed => stats.failed += 1,
                ResponseStatus::Rejected => stats.rejected += 1,
                ResponseStatus::Dismissed => stats.dismissed += 1,
            }
        }
        stats
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.responses.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }

    /// All records, oldest first.
    #[must_use]
    pub fn iter(&self) -> impl Iterator<Item = &PendingResponse> {
        self.responses.iter()
    }
}

// ── Tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    fn record(status: ResponseStatus, mode: BehaviorModeKind) -> PendingResponse {
        PendingResponse::new(
            TriggerSource::CaptionMention,
            "Hey Steve what's up".to_owned(),
            "Alice".to_owned(),
            "Not much!".to_owned(),
            ResponseChannel::Chat,
            mode,
            status,
        )
    }

    #[test]
    fn valid_lifecycle_paths() {
        let mut store = PendingResponseStore::new(20);
        let id = store.insert(record(ResponseStatus::Pending, BehaviorModeKind::Controlled));

        store.transition(id, ResponseStatus::Approved).unwrap();
        store.transition(id, ResponseStatus::Sending).unwrap();
        store.transition(id, ResponseStatus::Sent).unwrap();
        assert_eq!(store.get(id).unwrap().status, ResponseStatus::Sent);
    }

    #[test]
    fn hand_raised_lifecycle() {
        let mut store = PendingResponseStore::new(20);
        let id = store.insert(record(ResponseStatus::HandRaised, BehaviorModeKind::Queued));

        store.transition(id, ResponseStatus::Sending).unwrap();
        store.transition(id, ResponseStatus::Failed).unwrap();
        assert!(store.get(id).unwrap().status.is_terminal());
    }

    #[test]
    fn hand_raise_failure_falls_back_to_pending() {
        let mut store = PendingResponseStore::new(20);
        let id = store.insert(record(ResponseStatus::HandRaised, BehaviorModeKind::Queued));
        store.transition(id, ResponseStatus::Pending).unwrap();
        assert_eq!(store.get(id).unwrap().status, ResponseStatus::Pending);
    }

    #[test]
    fn terminal_states_reject_transitions() {
        let mut store = PendingResponseStore::new(20);
        let id = store.insert(record(ResponseStatus::Pending, BehaviorModeKind::Immediate));
        store.transition(id, ResponseStatus::Sending).unwrap();
        store.transition(id, ResponseStatus::Sent).unwrap();

        assert!(store.transition(id, ResponseStatus::Pending).is_err());
        assert!(store.transition(id, ResponseStatus::Sending).is_err());
    }

    #[test]
    fn rejected_is_terminal() {
        let mut store = PendingResponseStore::new(20);
        let id = store.insert(record(ResponseStatus::Pending, BehaviorModeKind::Controlled));
        store.transition(id, ResponseStatus::Rejected).unwrap();
        assert!(store.transition(id, ResponseStatus::Approved).is_err());
    }

    #[test]
    fn unknown_id_errors() {
        let mut store = PendingResponseStore::new(20);
        assert!(store.transition(Uuid::new_v4(), ResponseStatus::Sent).is_err());
    }

    #[test]
    fn eviction_drops_oldest_terminal_entry() {
        let mut store = PendingResponseStore::new(3);
        let sent = store.insert(record(ResponseStatus::Pending, BehaviorModeKind::Immediate));
        store.transition(sent, ResponseStatus::Sending).unwrap();
        store.transition(sent, ResponseStatus::Sent).unwrap();
        let live_a = store.insert(record(ResponseStatus::Pending, BehaviorModeKind::Controlled));
        let live_b = store.insert(record(ResponseStatus::Pending, BehaviorModeKind::Controlled));

        let live_c = store.insert(record(ResponseStatus::Pending, BehaviorModeKind::Controlled));

        assert_eq!(store.len(), 3);
        assert!(store.get(sent).is_none(), "completed entry evicted");
        for id in [live_a, live_b, live_c] {
            assert!(store.get(id).is_some());
        }
    }

    #[test]
    fn eviction_never_drops_in_flight_entries() {
        let mut store = PendingResponseStore::new(2);
        let a = store.insert(record(ResponseStatus::Pending, BehaviorModeKind::Controlled));
        let b = store.insert(record(ResponseStatus::Pending, BehaviorModeKind::Controlled));
        let c = store.insert(record(ResponseStatus::Pending, BehaviorModeKind::Controlled));

        // Nothing was terminal: the store grows past its bound.
        assert_eq!(store.len(), 3);
        for id in [a, b, c] {
            assert!(store.get(id).is_some());
        }
    }

    #[test]
    fn next_hand_raised_is_fifo() {
        let mut store = PendingResponseStore::new(20);
        let first = store.insert(record(ResponseStatus::HandRaised, BehaviorModeKind::Queued));
        let _second = store.insert(record(ResponseStatus::HandRaised, BehaviorModeKind::Queued));

        assert_eq!(store.next_hand_raised().unwrap().id, first);
    }

    #[test]
    fn next_hand_raised_skips_other_modes() {
        let mut store = PendingResponseStore::new(20);
        // A controlled record cannot be hand-raised in practice; simulate a
        // queued one already sending plus a pending controlled one.
        let sending = store.insert(record(ResponseStatus::HandRaised, BehaviorModeKind::Queued));
        store.transition(sending, ResponseStatus::Sending).unwrap();
        store.insert(record(ResponseStatus::Pending, BehaviorModeKind::Controlled));

        assert!(store.next_hand_raised().is_none());
    }

    #[test]
    fn stats_count_by_status() {
        let mut store = PendingResponseStore::new(20);
        store.insert(record(ResponseStatus::Pending, BehaviorModeKind::Controlled));
        store.insert(record(ResponseStatus::HandRaised, BehaviorModeKind::Queued));
        let sent = store.insert(record(ResponseStatus::Pending, BehaviorModeKind::Immediate));
        store.transition(sent, ResponseStatus::Sending).unwrap();
        store.transition(sent, ResponseStatus::Sent).unwrap();

        let stats = store.stats();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.hand_raised, 1);
        assert_eq!(stats.sent, 1);
    }

    #[test]
    fn clear_completed_removes_only_terminal() {
        let mut store = PendingResponseStore::new(20);
        let live = store.insert(record(ResponseStatus::Pending, BehaviorModeKind::Controlled));
        let done = store.insert(record(ResponseStatus::Pending, BehaviorModeKind::Immediate));
        store.transition(done, ResponseStatus::Sending).unwrap();
        store.transition(done, ResponseStatus::Failed).unwrap();

        assert_eq!(store.clear_completed(), 1);
        assert!(store.get(live).is_some());
        assert!(store.get(done).is_none());
    }

    #[test]
    fn channel_outcomes_are_recorded() {
        let mut store = PendingResponseStore::new(20);
        let id = store.insert(record(ResponseStatus::Pending, BehaviorModeKind::Immediate));

        store.record_channel_outcome(id, ResponseChannel::Chat, ChannelOutcome::Delivered);
        store.record_channel_outcome(
            id,
            ResponseChannel::Speech,
            ChannelOutcome::Failed {
                error: "tts offline".to_owned(),
            },
        );

        let record = store.get(id).unwrap();
        assert_eq!(record.chat_outcome, Some(ChannelOutcome::Delivered));
        assert!(matches!(
            record.speech_outcome,
            Some(ChannelOutcome::Failed { .. })
        ));
    }
}
