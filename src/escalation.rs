//! Hybrid mention detection: local matching with tiered LLM escalation.
//!
//! Local fuzzy matching is cheap and handles direct name hits; the LLM is
//! consulted only when the local decision is ambiguous, for two jobs it is
//! structurally better at: validating shaky fuzzy hits against context,
//! and spotting indirect references ("the assistant", "our AI note taker")
//! that no variation table can enumerate.
//!
//! The escalation boundary never throws: a missing client, a failed call,
//! or an unparseable body all degrade to the local result.

use crate::config::EscalationConfig;
use crate::matcher::{MentionResult, NameMatcher};
use crate::traits::LlmClient;
use serde::Deserialize;
use std::sync::Arc;
use std::sync::Once;
use tracing::{debug, warn};

/// Structured verdict expected back from the LLM.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LlmVerdict {
    /// Caption text with likely speech-to-text errors corrected.
    pub corrected_text: Option<String>,
    /// Whether the agent was addressed.
    pub name_detected: bool,
    /// The name or phrase the agent was addressed as.
    pub detected_as: Option<String>,
    /// Whether the hit was an indirect reference rather than a name.
    pub is_indirect_reference: bool,
    /// Model-reported confidence.
    pub confidence: Option<f32>,
    /// Free-form model reasoning, logged for diagnosis only.
    pub reasoning: Option<String>,
}

/// Confidence assigned when a verdict omits its own.
const DEFAULT_VERDICT_CONFIDENCE: f32 = 0.7;
/// Confidence assigned to a best-effort sniffed (non-JSON) positive.
const SNIFFED_CONFIDENCE: f32 = 0.55;

/// Wraps a [`NameMatcher`] with optional LLM escalation.
pub struct HybridDetector {
    matcher: Arc<NameMatcher>,
    llm: Option<Arc<dyn LlmClient>>,
    config: EscalationConfig,
    degraded_notice: Once,
}

impl HybridDetector {
    #[must_use]
    pub fn new(
        matcher: Arc<NameMatcher>,
        llm: Option<Arc<dyn LlmClient>>,
        config: &EscalationConfig,
    ) -> Self {
        Self {
            matcher,
            llm,
            config: config.clone(),
            degraded_notice: Once::new(),
        }
    }

    /// Detect a mention in `text`, escalating to the LLM when the local
    /// decision is ambiguous. `context` is recent transcript for the
    /// prompt, if the caller has any.
    pub async fn detect(&self, text: &str, context: Option<&str>) -> MentionResult {
        let local = self.matcher.detect_mention(text);
        self.refine(text, local, context).await
    }

    /// Escalate an already-computed local result.
    ///
    /// Decision tree:
    /// - confident local hit (`>= ambiguous_threshold`) → returned as-is,
    ///   no LLM call;
    /// - shaky local hit (`>= min_confidence_threshold`) → LLM validates
    ///   or vetoes it;
    /// - no usable local hit → LLM checks for indirect references;
    /// - no LLM, or the LLM fails → local result as-is.
    pub async fn refine(
        &self,
        text: &str,
        local: MentionResult,
        context: Option<&str>,
    ) -> MentionResult {
        if local.is_mentioned && local.confidence >= self.config.ambiguous_threshold {
            return local;
        }

        let Some(llm) = self.active_llm() else {
            return local;
        };

        let validating =
            local.is_mentioned && local.confidence >= self.config.min_confidence_threshold;
        let prompt = if validating {
            self.validation_prompt(text, &local, context)
        } else {
            self.indirect_prompt(text, context)
        };

        match llm.complete(&prompt).await {
            Ok(raw) => match parse_verdict(&raw) {
                Some(verdict) => self.apply_verdict(verdict, &local, validating),
                None => {
                    warn!("unusable escalation response, keeping local result");
                    local
                }
            },
            Err(e) => {
                warn!("escalation call failed, keeping local result: {e}");
                local
            }
        }
    }

    /// Rewrite a caption for likely phonetic speech-to-text errors.
    ///
    /// Returns the input unchanged when no LLM is configured or the call
    /// fails. Independent of mention detection; must not alter meaning
    /// beyond name/homophone correction.
    pub async fn correct_caption_text(&self, text: &str) -> String {
        let Some(llm) = self.active_llm() else {
            return text.to_owned();
        };

        let prompt = self.correction_prompt(text);
        match llm.complete(&prompt).await {
            Ok(raw) => match parse_verdict(&raw).and_then(|v| v.corrected_text) {
                Some(corrected) if !corrected.trim().is_empty() => corrected,
                _ => text.to_owned(),
            },
            Err(e) => {
                warn!("caption correction failed, keeping original: {e}");
                text.to_owned()
            }
        }
    }

    // ── Internals ───────────────────────────────────────────────────────

    fn active_llm(&self) -> Option<&Arc<dyn LlmClient>> {
        if !self.config.enabled {
            return None;
        }
        match &self.llm {
            Some(llm) => Some(llm),
            None => {
                self.degraded_notice.call_once(|| {
                    warn!("no LLM client configured; mention detection is local-only");
                });
                None
            }
        }
    }

    fn apply_verdict(
        &self,
        verdict: LlmVerdict,
        local: &MentionResult,
        validating: bool,
    ) -> MentionResult {
        if let Some(reasoning) = &verdict.reasoning {
            debug!("escalation reasoning: {reasoning}");
        }

        if verdict.name_detected {
            let matched = verdict
                .detected_as
                .clone()
                .or_else(|| local.matched_variation.clone())
                .unwrap_or_else(|| self.matcher.agent_name().to_owned());
            return MentionResult {
                is_mentioned: true,
                matched_variation: Some(matched),
                confidence: verdict
                    .confidence
                    .unwrap_or(DEFAULT_VERDICT_CONFIDENCE)
                    .clamp(0.0, 1.0),
                fuzzy_match: true,
                gpt_enhanced: true,
                indirect_reference: verdict.is_indirect_reference,
            };
        }

        if validating {
            // The LLM vetoed a shaky fuzzy hit: treat as not mentioned.
            debug!("escalation vetoed local fuzzy match");
            let mut vetoed = MentionResult::none();
            vetoed.gpt_enhanced = true;
            return vetoed;
        }

        local.clone()
    }

    fn validation_prompt(
        &self,
        text: &str,
        local: &MentionResult,
        context: Option<&str>,
    ) -> String {
        let variation = local.matched_variation.as_deref().unwrap_or_default();
        format!(
            "You validate name mentions in live meeting captions, which often \
             contain speech-to-text errors.\n\
             The agent in the meeting is named \"{name}\" (also answers to: {variations}).\n\
             A fuzzy matcher thinks this caption addresses the agent as \"{variation}\":\n\
             \n\
             Caption: \"{text}\"\n\
             {context}\
             \n\
             Decide whether the caption really addresses the agent. Respond with JSON only:\n\
             {{\"correctedText\": \"...\", \"nameDetected\": true|false, \
             \"detectedAs\": \"...\", \"isIndirectReference\": false, \
             \"confidence\": 0.0, \"reasoning\": \"...\"}}",
            name = self.matcher.agent_name(),
            variations = self.matcher.variations().join(", "),
            context = context
                .map(|c| format!("Recent transcript: \"{c}\"\n"))
                .unwrap_or_default(),
        )
    }

    fn indirect_prompt(&self, text: &str, context: Option<&str>) -> String {
        format!(
            "You detect when meeting participants address an AI agent without \
             using its name — e.g. \"the assistant\", \"the bot\", \"our AI\", \
             \"hey assistant\".\n\
             The agent is named \"{name}\".\n\
             \n\
             Caption: \"{text}\"\n\
             {context}\
             \n\
             Does the caption address or summon the agent, directly or \
             indirectly? Respond with JSON only:\n\
             {{\"correctedText\": \"...\", \"nameDetected\": true|false, \
             \"detectedAs\": \"...\", \"isIndirectReference\": true|false, \
             \"confidence\": 0.0, \"reasoning\": \"...\"}}",
            name = self.matcher.agent_name(),
            context = context
                .map(|c| format!("Recent transcript: \"{c}\"\n"))
                .unwrap_or_default(),
        )
    }

    fn correction_prompt(&self, text: &str) -> String {
        format!(
            "Fix likely phonetic speech-to-text mistakes in this meeting \
             caption. Keep the wording otherwise unchanged; only correct \
             misrecognized names and homophones. The agent in the meeting is \
             named \"{name}\".\n\
             \n\
             Caption: \"{text}\"\n\
             \n\
             Respond with JSON only: {{\"correctedText\": \"...\"}}",
            name = self.matcher.agent_name(),
        )
    }
}

// ── Verdict parsing ─────────────────────────────────────────────────────

/// Parse an LLM response body into a verdict.
///
/// Strips Markdown code fences first. A body that is not valid JSON falls
/// back to best-effort boolean sniffing; `None` means "treat as not
/// detected".
fn parse_verdict(raw: &str) -> Option<LlmVerdict> {
    let cleaned = strip_code_fences(raw);

    if let Ok(verdict) = serde_json::from_str::<LlmVerdict>(cleaned) {
        return Some(verdict);
    }

    // Best-effort: sniff for a positive boolean in malformed output.
    let squashed: String = cleaned
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    if squashed.contains("\"namedetected\":true") || squashed.starts_with("yes") {
        return Some(LlmVerdict {
            name_detected: true,
            confidence: Some(SNIFFED_CONFIDENCE),
            ..LlmVerdict::default()
        });
    }
    if squashed.contains("\"namedetected\":false") || squashed.starts_with("no") {
        return Some(LlmVerdict::default());
    }

    None
}

/// Strip a surrounding ```json … ``` fence, if present.
fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}

// ── Tests ───────────────────────────────────────────────────────────────
