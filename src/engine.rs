//! Engine coordinator: wires the aggregator, escalation, and behavior
//! processor into one run loop.
//!
//! All state mutation happens inside a single spawned task that selects
//! over the input channels, so the caption buffer, the pending-mention
//! slot, and the response store have single-writer semantics. The only
//! suspension points are the injected collaborator calls (generation,
//! delivery, LLM escalation), exactly where interleaving is safe.

use crate::aggregator::{CaptionAggregator, CaptionEntry, Utterance};
use crate::behavior::{BehaviorProcessor, ChatMessage, TriggerContext};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::escalation::HybridDetector;
use crate::events::EngineEvent;
use crate::matcher::NameMatcher;
use crate::traits::{
    ChatSender, HandRaiser, LlmClient, PatternSource, ResponseGenerator, SpeechSender,
};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Everything the engine needs from the outside world.
pub struct Collaborators {
    pub response_generator: Arc<dyn ResponseGenerator>,
    pub chat_sender: Arc<dyn ChatSender>,
    pub speech_sender: Arc<dyn SpeechSender>,
    pub hand_raiser: Arc<dyn HandRaiser>,
    /// Optional LLM for hybrid escalation and caption correction. Without
    /// it the engine runs on local matching alone.
    pub llm: Option<Arc<dyn LlmClient>>,
    pub pattern_source: Arc<dyn PatternSource>,
}

/// Inputs pushed into the run loop.
enum EngineInput {
    Caption(CaptionEntry),
    Chat(ChatMessage),
    HandLowered,
    Shutdown,
}

/// Handle to a running mention engine.
///
/// Push captions and chat through the handle; subscribe for events; use
/// [`Self::processor`] for approvals, rejections, and queue stats.
pub struct EngineHandle {
    input_tx: mpsc::UnboundedSender<EngineInput>,
    processor: Arc<BehaviorProcessor>,
    hybrid: Arc<HybridDetector>,
    run_loop: Option<JoinHandle<()>>,
}

impl EngineHandle {
    /// Push a finalized caption fragment.
    ///
    /// # Errors
    ///
    /// Returns an error when the engine has shut down.
    pub fn push_caption(&self, entry: CaptionEntry) -> Result<()> {
        self.input_tx
            .send(EngineInput::Caption(entry))
            .map_err(|_| EngineError::Channel("engine stopped".to_owned()))
    }

    /// Push a chat message.
    ///
    /// # Errors
    ///
    /// Returns an error when the engine has shut down.
    pub fn push_chat(&self, message: ChatMessage) -> Result<()> {
        self.input_tx
            .send(EngineInput::Chat(message))
            .map_err(|_| EngineError::Channel("engine stopped".to_owned()))
    }

    /// Report that the agent's hand was lowered (by any actor).
    ///
    /// # Errors
    ///
    /// Returns an error when the engine has shut down.
    pub fn notify_hand_lowered(&self) -> Result<()> {
        self.input_tx
            .send(EngineInput::HandLowered)
            .map_err(|_| EngineError::Channel("engine stopped".to_owned()))
    }

    /// Subscribe to engine events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.processor.subscribe()
    }

    /// The behavior processor, for approvals and queue inspection.
    #[must_use]
    pub fn processor(&self) -> &Arc<BehaviorProcessor> {
        &self.processor
    }

    /// The hybrid detector, for standalone caption correction.
    #[must_use]
    pub fn hybrid(&self) -> &Arc<HybridDetector> {
        &self.hybrid
    }

    /// Stop the engine: flush the aggregator, process the tails, and join
    /// the run loop.
    pub async fn shutdown(mut self) {
        let _ = self.input_tx.send(EngineInput::Shutdown);
        if let Some(run_loop) = self.run_loop.take() {
            if let Err(e) = run_loop.await {
                warn!("engine run loop ended abnormally: {e}");
            }
        }
    }
}

/// The mention detection and response orchestration engine.
pub struct MentionEngine;

impl MentionEngine {
    /// Validate the config, construct the subsystems, and spawn the run
    /// loop.
    ///
    /// # Errors
    ///
    /// Returns an error when the configuration is invalid.
    pub fn spawn(config: EngineConfig, collaborators: Collaborators) -> Result<EngineHandle> {
        config.validate()?;

        let matcher = Arc::new(NameMatcher::new(
            &config.agent_name,
            &config.variations,
            &config.matcher,
        ));
        let hybrid = Arc::new(HybridDetector::new(
            matcher.clone(),
            collaborators.llm.clone(),
            &config.escalation,
        ));
        let processor = Arc::new(BehaviorProcessor::new(
            matcher.clone(),
            config.queue.max_pending_responses,
            collaborators.response_generator,
            collaborators.chat_sender,
            collaborators.speech_sender,
            collaborators.hand_raiser,
            collaborators.pattern_source,
        ));

        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let (timeout_tx, timeout_rx) = mpsc::unbounded_channel();
        let aggregator = CaptionAggregator::new(matcher, &config.aggregator, timeout_tx);

        info!("mention engine started for '{}'", config.agent_name);
        let run_loop = tokio::spawn(run(
            aggregator,
            hybrid.clone(),
            processor.clone(),
            input_rx,
            timeout_rx,
        ));

        Ok(EngineHandle {
            input_tx,
            processor,
            hybrid,
            run_loop: Some(run_loop),
        })
    }
}

/// The single-writer run loop.
async fn run(
    mut aggregator: CaptionAggregator,
    hybrid: Arc<HybridDetector>,
    processor: Arc<BehaviorProcessor>,
    mut input_rx: mpsc::UnboundedReceiver<EngineInput>,
    mut timeout_rx: mpsc::UnboundedReceiver<u64>,
) {
    loop {
        tokio::select! {
            input = input_rx.recv() => match input {
                Some(EngineInput::Caption(entry)) => {
                    if let Some(utterance) = aggregator.add_caption(entry) {
                        let speaker = utterance.caption.speaker.clone();
                        if handle_utterance(&hybrid, &processor, utterance).await {
                            aggregator.consume_speaker(&speaker);
                        }
                    }
                }
                Some(EngineInput::Chat(message)) => {
                    processor.handle_chat_message(message).await;
                }
                Some(EngineInput::HandLowered) => {
                    processor.on_hand_lowered().await;
                }
                Some(EngineInput::Shutdown) | None => break,
            },
            Some(seq) = timeout_rx.recv() => {
                if let Some(pending) = aggregator.on_timeout(seq) {
                    // The follow-up never came; process what was captured.
                    let context = TriggerContext::from_pending_mention(&pending);
                    processor.process_trigger(context).await;
                }
            }
        }
    }

    // Drain the tails so shutdown does not swallow buffered speech.
    aggregator.cancel_pending();
    for utterance in aggregator.flush() {
        handle_utterance(&hybrid, &processor, utterance).await;
    }
    info!("mention engine stopped");
}

/// Refine an utterance's local mention result and trigger when addressed.
///
/// Returns whether the utterance became a trigger.
async fn handle_utterance(
    hybrid: &HybridDetector,
    processor: &BehaviorProcessor,
    utterance: Utterance,
) -> bool {
    let refined = hybrid
        .refine(&utterance.caption.text, utterance.mention.clone(), None)
        .await;

    if !refined.is_mentioned {
        debug!(
            "utterance from {} not addressed to the agent",
            utterance.caption.speaker
        );
        return false;
    }

    let context = TriggerContext::from_caption(&utterance.caption, &refined);
    processor.process_trigger(context).await;
    true
}

// ── Tests ───────────────────────────────────────────────────────────────
