#![allow(clippy::unwrap_used, clippy::expect_used)]

//! End-to-end scenarios through a running engine: captions and chat in,
//! delivered responses out, with mock collaborators standing in for the
//! meeting, the agent, and the LLM.

use async_trait::async_trait;
use chrono::Utc;
use herald::behavior::TriggerContext;
use herald::config::EngineConfig;
use herald::engine::{Collaborators, EngineHandle, MentionEngine};
use herald::error::Result;
use herald::events::EngineEvent;
use herald::pattern::AgentBehaviorPattern;
use herald::traits::{
    ChatSender, FixedPattern, GeneratedResponse, HandRaiser, LlmClient, PatternSource,
    ResponseGenerator, SpeechSender,
};
use herald::{CaptionEntry, ChatMessage, ResponseStatus};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use uuid::Uuid;

// ── Mock collaborators ──────────────────────────────────────────────────

struct EchoGenerator;

#[async_trait]
impl ResponseGenerator for EchoGenerator {
    async fn generate(&self, context: &TriggerContext) -> Result<GeneratedResponse> {
        Ok(GeneratedResponse {
            text: format!("On it, {}.", context.author),
            confidence: Some(0.95),
        })
    }
}

#[derive(Default)]
struct MockChat(Mutex<Vec<String>>);

#[async_trait]
impl ChatSender for MockChat {
    async fn send_chat(&self, text: &str) -> Result<()> {
        self.0.lock().unwrap().push(text.to_owned());
        Ok(())
    }
}

#[derive(Default)]
struct MockSpeech(Mutex<Vec<String>>);

#[async_trait]
impl SpeechSender for MockSpeech {
    async fn speak(&self, text: &str) -> Result<()> {
        self.0.lock().unwrap().push(text.to_owned());
        Ok(())
    }
}

#[derive(Default)]
struct MockHand {
    raises: AtomicUsize,
    lowers: AtomicUsize,
}

#[async_trait]
impl HandRaiser for MockHand {
    async fn raise_hand(&self) -> Result<()> {
        self.raises.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn lower_hand(&self) -> Result<()> {
        self.lowers.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// LLM mock that counts calls and replies with a fixed verdict.
struct CountingLlm {
    calls: AtomicUsize,
    response: String,
}

impl CountingLlm {
    fn new(response: &str) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            response: response.to_owned(),
        })
    }
}

#[async_trait]
impl LlmClient for CountingLlm {
    async fn complete(&self, _prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.response.clone())
    }
}

// ── Fixture ─────────────────────────────────────────────────────────────

struct Meeting {
    engine: EngineHandle,
    events: broadcast::Receiver<EngineEvent>,
    chat: Arc<MockChat>,
    speech: Arc<MockSpeech>,
    hand: Arc<MockHand>,
}

fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

fn start_engine(pattern: AgentBehaviorPattern, llm: Option<Arc<dyn LlmClient>>) -> Meeting {
    init_tracing();
    let chat = Arc::new(MockChat::default());
    let speech = Arc::new(MockSpeech::default());
    let hand = Arc::new(MockHand::default());

    let pattern_source: Arc<dyn PatternSource> = Arc::new(FixedPattern(pattern));
    let collaborators = Collaborators {
        response_generator: Arc::new(EchoGenerator),
        chat_sender: chat.clone(),
        speech_sender: speech.clone(),
        hand_raiser: hand.clone(),
        llm,
        pattern_source,
    };

    let config = EngineConfig {
        agent_name: "Steve Jones".to_owned(),
        ..EngineConfig::default()
    };

    let engine = MentionEngine::spawn(config, collaborators).expect("engine spawn");
    let events = engine.subscribe();
    Meeting {
        engine,
        events,
        chat,
        speech,
        hand,
    }
}

fn caption(id: &str, speaker: &str, text: &str) -> CaptionEntry {
    CaptionEntry {
        id: id.to_owned(),
        speaker: speaker.to_owned(),
        text: text.to_owned(),
        timestamp: Utc::now(),
        is_final: true,
    }
}

async fn next_event(events: &mut broadcast::Receiver<EngineEvent>) -> EngineEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("event timeout")
        .expect("event channel closed")
}

/// Drain events until a `ResponseGenerated` id shows up.
async fn wait_for_generated(events: &mut broadcast::Receiver<EngineEvent>) -> Uuid {
    loop {
        if let EngineEvent::ResponseGenerated { id, .. } = next_event(events).await {
            return id;
        }
    }
}

async fn wait_for(events: &mut broadcast::Receiver<EngineEvent>, mut pred: impl FnMut(&EngineEvent) -> bool) {
    loop {
        let event = next_event(events).await;
        if pred(&event) {
            return;
        }
    }
}

// ── Scenarios ───────────────────────────────────────────────────────────

#[tokio::test]
async fn supervised_chat_mention_waits_for_approval_then_sends() {
    let mut meeting = start_engine(AgentBehaviorPattern::supervised(), None);

    meeting
        .engine
        .push_chat(ChatMessage {
            sender: "Dana".to_owned(),
            content: "Steve, can you summarize?".to_owned(),
            timestamp: Utc::now(),
        })
        .unwrap();

    let id = wait_for_generated(&mut meeting.events).await;
    wait_for(&mut meeting.events, |e| {
        matches!(e, EngineEvent::ResponseQueued { .. })
    })
    .await;

    let record = meeting.engine.processor().response(id).unwrap();
    assert_eq!(record.status, ResponseStatus::Pending);
    assert!(meeting.chat.0.lock().unwrap().is_empty());

    meeting.engine.processor().approve_response(id).await.unwrap();

    let record = meeting.engine.processor().response(id).unwrap();
    assert_eq!(record.status, ResponseStatus::Sent);
    assert_eq!(
        meeting.chat.0.lock().unwrap().as_slice(),
        &["On it, Dana.".to_owned()]
    );

    meeting.engine.shutdown().await;
}

#[tokio::test]
async fn queued_caption_mention_raises_hand_and_delivers_on_lower() {
    let mut meeting = start_engine(AgentBehaviorPattern::queued_hand_raise(), None);

    meeting
        .engine
        .push_caption(caption("c1", "Alice", "Steve, can you give us a status update?"))
        .unwrap();

    let id = wait_for_generated(&mut meeting.events).await;
    wait_for(&mut meeting.events, |e| {
        matches!(e, EngineEvent::HandRaised { .. })
    })
    .await;

    // Created directly in HandRaised, never Pending.
    let record = meeting.engine.processor().response(id).unwrap();
    assert_eq!(record.status, ResponseStatus::HandRaised);
    assert_eq!(meeting.hand.raises.load(Ordering::SeqCst), 1);
    assert_eq!(meeting.engine.processor().queue_stats().pending, 0);
    assert!(meeting.speech.0.lock().unwrap().is_empty());

    meeting.engine.notify_hand_lowered().unwrap();
    wait_for(&mut meeting.events, |e| {
        matches!(e, EngineEvent::ResponseSent { .. })
    })
    .await;

    let record = meeting.engine.processor().response(id).unwrap();
    assert_eq!(record.status, ResponseStatus::Sent);
    assert_eq!(
        meeting.speech.0.lock().unwrap().as_slice(),
        &["On it, Alice.".to_owned()]
    );

    meeting.engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn bare_mention_times_out_into_a_trigger() {
    let mut meeting = start_engine(AgentBehaviorPattern::immediate(), None);

    // Name, no question: the pending slot arms its 3.5s timer. With the
    // clock paused, time auto-advances once everything is idle.
    meeting
        .engine
        .push_caption(caption("c1", "Alice", "Hey Steve"))
        .unwrap();

    wait_for(&mut meeting.events, |e| {
        matches!(
            e,
            EngineEvent::TriggerDetected { content, .. } if content == "Hey Steve"
        )
    })
    .await;
    wait_for(&mut meeting.events, |e| {
        matches!(e, EngineEvent::ResponseSent { .. })
    })
    .await;

    assert_eq!(
        meeting.speech.0.lock().unwrap().as_slice(),
        &["On it, Alice.".to_owned()]
    );

    meeting.engine.shutdown().await;
}

#[tokio::test]
async fn fragmented_caption_aggregates_before_triggering() {
    let mut meeting = start_engine(AgentBehaviorPattern::immediate(), None);

    meeting
        .engine
        .push_caption(caption("c1", "Alice", "Hey Steve"))
        .unwrap();
    meeting
        .engine
        .push_caption(caption("c2", "Alice", "what's on the agenda?"))
        .unwrap();

    wait_for(&mut meeting.events, |e| {
        matches!(
            e,
            EngineEvent::TriggerDetected { content, .. }
                if content == "Hey Steve what's on the agenda?"
        )
    })
    .await;
    wait_for(&mut meeting.events, |e| {
        matches!(e, EngineEvent::ResponseSent { .. })
    })
    .await;

    meeting.engine.shutdown().await;
}

#[tokio::test]
async fn confident_local_mention_never_consults_the_llm() {
    let llm = CountingLlm::new(r#"{"nameDetected": false}"#);
    let mut meeting = start_engine(AgentBehaviorPattern::immediate(), Some(llm.clone()));

    meeting
        .engine
        .push_caption(caption("c1", "Alice", "Steve, what do you think?"))
        .unwrap();

    wait_for(&mut meeting.events, |e| {
        matches!(e, EngineEvent::ResponseSent { .. })
    })
    .await;

    assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
    meeting.engine.shutdown().await;
}

#[tokio::test]
async fn indirect_reference_triggers_through_escalation() {
    let llm = CountingLlm::new(
        r#"{"nameDetected": true, "detectedAs": "the assistant",
            "isIndirectReference": true, "confidence": 0.85}"#,
    );
    let mut meeting = start_engine(AgentBehaviorPattern::immediate(), Some(llm.clone()));

    meeting
        .engine
        .push_caption(caption(
            "c1",
            "Bob",
            "maybe the assistant could recap the decisions?",
        ))
        .unwrap();

    wait_for(&mut meeting.events, |e| {
        matches!(e, EngineEvent::ResponseSent { .. })
    })
    .await;

    assert!(llm.calls.load(Ordering::SeqCst) >= 1);
    assert_eq!(
        meeting.speech.0.lock().unwrap().as_slice(),
        &["On it, Bob.".to_owned()]
    );
    meeting.engine.shutdown().await;
}

#[tokio::test]
async fn non_mention_speech_is_observed_but_not_answered() {
    let mut meeting = start_engine(AgentBehaviorPattern::immediate(), None);

    meeting
        .engine
        .push_caption(caption("c1", "Alice", "let's review the quarterly numbers"))
        .unwrap();
    let processor = meeting.engine.processor().clone();
    meeting.engine.shutdown().await;

    assert!(meeting.chat.0.lock().unwrap().is_empty());
    assert!(meeting.speech.0.lock().unwrap().is_empty());
    assert_eq!(processor.queue_stats().total, 0);
}
