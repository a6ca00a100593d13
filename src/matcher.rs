//! Name mention detection over live caption text.
//!
//! Classifies whether a text span addresses the agent using three tiers:
//!
//! 1. **Exact variation** — substring match against the variation set
//!    (full name, individual words, first-name + last-initial).
//! 2. **Phonetic variant** — substring match against rule-generated
//!    spellings ("steve" → "steev") and a curated mishearing table.
//! 3. **Fuzzy word** — per-word Levenshtein similarity against every
//!    variation, for speech-to-text mangling the first two tiers miss.
//!
//! First hit wins; tiers never blend scores. The matcher is pure and cheap
//! (~µs per caption), so it runs on every aggregated utterance.

use crate::config::MatcherConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

/// Confidence reported for an exact variation hit.
const EXACT_CONFIDENCE: f32 = 1.0;
/// Confidence reported for a phonetic variant hit.
const PHONETIC_CONFIDENCE: f32 = 0.9;

/// Result of running mention detection over a text span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MentionResult {
    /// Whether the agent was addressed.
    pub is_mentioned: bool,
    /// The variation that matched. Always present when `is_mentioned`.
    pub matched_variation: Option<String>,
    /// Match confidence in the range `0.0..=1.0`.
    pub confidence: f32,
    /// Whether the hit came from a phonetic or edit-distance tier rather
    /// than an exact substring.
    pub fuzzy_match: bool,
    /// Whether an LLM escalation produced or confirmed this result.
    pub gpt_enhanced: bool,
    /// Whether the hit was an indirect reference ("the assistant") rather
    /// than a name.
    pub indirect_reference: bool,
}

impl MentionResult {
    /// A negative result with zero confidence.
    #[must_use]
    pub fn none() -> Self {
        Self {
            is_mentioned: false,
            matched_variation: None,
            confidence: 0.0,
            fuzzy_match: false,
            gpt_enhanced: false,
            indirect_reference: false,
        }
    }
}

// ── Phonetic rule and mishearing tables ─────────────────────────────────

/// A single substitution rule. `trailing` rules only apply to the end of
/// the word; the rest replace every occurrence.
struct PhoneticRule {
    pattern: &'static str,
    replacement: &'static str,
    trailing: bool,
}

/// Ordered substitution rules modeling common speech-to-text confusions.
const PHONETIC_RULES: &[PhoneticRule] = &[
    PhoneticRule { pattern: "ph", replacement: "f", trailing: false },
    PhoneticRule { pattern: "ck", replacement: "k", trailing: false },
    PhoneticRule { pattern: "ee", replacement: "i", trailing: false },
    PhoneticRule { pattern: "ea", replacement: "e", trailing: false },
    PhoneticRule { pattern: "oo", replacement: "u", trailing: false },
    PhoneticRule { pattern: "ou", replacement: "ow", trailing: false },
    PhoneticRule { pattern: "ie", replacement: "y", trailing: false },
    PhoneticRule { pattern: "ey", replacement: "ee", trailing: false },
    PhoneticRule { pattern: "y", replacement: "ie", trailing: true },
    PhoneticRule { pattern: "v", replacement: "b", trailing: false },
    PhoneticRule { pattern: "th", replacement: "d", trailing: false },
    PhoneticRule { pattern: "s", replacement: "z", trailing: true },
];

/// Curated mishearings for common first names. Applied when a variation
/// equals the key. These cover confusions the substitution rules cannot
/// express (whole-word swaps a recognizer actually produces).
const MISHEARING_TABLE: &[(&str, &[&str])] = &[
    ("steve", &["steev", "steven", "stephen", "steph"]),
    ("alex", &["alec", "alexa", "aleks"]),
    ("sam", &["sammy", "cam"]),
    ("max", &["mac", "maks"]),
    ("mike", &["mick", "michael", "mic"]),
    ("kate", &["cate", "katie", "kay"]),
    ("sarah", &["sara", "zara", "sera"]),
    ("john", &["jon", "juan", "sean"]),
    ("anna", &["ana", "hannah"]),
    ("emma", &["emmy", "ema", "gemma"]),
    ("claire", &["clare", "clair"]),
    ("grace", &["gracie", "grays"]),
];

// ── Question / request gate ─────────────────────────────────────────────

/// Words that open a question, contractions included ("what's on the
/// agenda" carries no question mark in live captions).
const QUESTION_WORDS: &[&str] = &[
    "what", "what's", "how", "how's", "why", "when", "when's", "where",
    "where's", "who", "who's", "which", "can", "could", "would", "will",
    "should", "is", "are", "do", "does",
];

/// Phrases that mark a request even without question syntax.
const REQUEST_PHRASES: &[&str] = &[
    "tell me",
    "please",
    "can you",
    "could you",
    "would you",
    "help me",
    "help us",
    "give me",
    "show me",
    "explain",
    "summarize",
    "describe",
    "update us",
    "walk us through",
];

// ── Matcher ─────────────────────────────────────────────────────────────

/// Classifies whether caption or chat text mentions the agent.
pub struct NameMatcher {
    /// Canonical agent name, lowercased.
    agent_name: String,
    /// Literal variations, lowercased and deduplicated.
    variations: Vec<String>,
    /// `(variant, canonical variation)` pairs from the phonetic rules and
    /// the mishearing table.
    phonetic_variants: Vec<(String, String)>,
    fuzzy_match_threshold: f32,
    min_word_len: usize,
}

impl NameMatcher {
    /// Build a matcher for `agent_name`.
    ///
    /// When `explicit_variations` is empty, variations are derived: the full
    /// lowercased name, each word of at least three characters, and a
    /// "first-name + last-initial" combo for multi-word names.
    #[must_use]
    pub fn new(agent_name: &str, explicit_variations: &[String], config: &MatcherConfig) -> Self {
        let agent_name = agent_name.trim().to_lowercase();

        let mut variations: Vec<String> = if explicit_variations.is_empty() {
            derive_variations(&agent_name)
        } else {
            explicit_variations
                .iter()
                .map(|v| v.trim().to_lowercase())
                .filter(|v| !v.is_empty())
                .collect()
        };
        dedup_preserving_order(&mut variations);

        let phonetic_variants = expand_phonetic_variants(&variations);

        debug!(
            "name matcher for '{}': {} variations, {} phonetic variants",
            agent_name,
            variations.len(),
            phonetic_variants.len()
        );

        Self {
            agent_name,
            variations,
            phonetic_variants,
            fuzzy_match_threshold: config.fuzzy_match_threshold,
            min_word_len: config.min_word_len,
        }
    }

    /// The canonical (lowercased) agent name.
    #[must_use]
    pub fn agent_name(&self) -> &str {
        &self.agent_name
    }

    /// The literal variation set.
    #[must_use]
    pub fn variations(&self) -> &[String] {
        &self.variations
    }

    /// Detect whether `text` mentions the agent.
    ///
    /// Three tiers, first hit wins: exact variation substring (confidence
    /// 1.0), phonetic variant substring (0.9), then per-word Levenshtein
    /// similarity at or above the configured threshold.
    #[must_use]
    pub fn detect_mention(&self, text: &str) -> MentionResult {
        let lower = text.to_lowercase();

        // ── Tier 1: exact variation substring ───────────────────────────
        for variation in &self.variations {
            if lower.contains(variation.as_str()) {
                return MentionResult {
                    is_mentioned: true,
                    matched_variation: Some(variation.clone()),
                    confidence: EXACT_CONFIDENCE,
                    fuzzy_match: false,
                    gpt_enhanced: false,
                    indirect_reference: false,
                };
            }
        }

        // ── Tier 2: phonetic variant substring ──────────────────────────
        for (variant, canonical) in &self.phonetic_variants {
            if lower.contains(variant.as_str()) {
                debug!("phonetic hit '{variant}' for variation '{canonical}'");
                return MentionResult {
                    is_mentioned: true,
                    matched_variation: Some(canonical.clone()),
                    confidence: PHONETIC_CONFIDENCE,
                    fuzzy_match: true,
                    gpt_enhanced: false,
                    indirect_reference: false,
                };
            }
        }

        // ── Tier 3: per-word edit distance ──────────────────────────────
        for word in lower.split_whitespace() {
            let cleaned = clean_word(word);
            if cleaned.len() < self.min_word_len {
                continue;
            }
            for variation in &self.variations {
                let similarity = word_similarity(&cleaned, variation);
                if similarity >= self.fuzzy_match_threshold {
                    debug!(
                        "fuzzy hit '{cleaned}' ~ '{variation}' (similarity {similarity:.2})"
                    );
                    return MentionResult {
                        is_mentioned: true,
                        matched_variation: Some(variation.clone()),
                        confidence: similarity,
                        fuzzy_match: true,
                        gpt_enhanced: false,
                        indirect_reference: false,
                    };
                }
            }
        }

        MentionResult::none()
    }

    /// Literal containment check against the variation set only.
    ///
    /// Chat text is typed, not speech-recognized, so the phonetic and
    /// fuzzy tiers are unnecessary there.
    #[must_use]
    pub fn matches_literal(&self, text: &str) -> Option<&str> {
        let lower = text.to_lowercase();
        self.variations
            .iter()
            .find(|v| lower.contains(v.as_str()))
            .map(String::as_str)
    }

    /// Whether `text` contains a question or a request.
    ///
    /// Used to gate whether a mention should trigger immediately or wait
    /// for a follow-up.
    #[must_use]
    pub fn contains_question_or_request(&self, text: &str) -> bool {
        if text.contains('?') {
            return true;
        }

        let lower = text.to_lowercase();
        if let Some(first) = lower.split_whitespace().next() {
            let first = clean_word(first);
            if QUESTION_WORDS.contains(&first.as_str()) {
                return true;
            }
        }

        REQUEST_PHRASES.iter().any(|p| lower.contains(p))
    }
}

// ── Variation derivation ────────────────────────────────────────────────

/// Derive the default variation set from a lowercased full name.
fn derive_variations(agent_name: &str) -> Vec<String> {
    let mut variations = Vec::new();
    if agent_name.is_empty() {
        return variations;
    }

    variations.push(agent_name.to_owned());

    let words: Vec<&str> = agent_name.split_whitespace().collect();
    for word in &words {
        if word.len() >= 3 {
            variations.push((*word).to_owned());
        }
    }

    // "steve j" for "steve jones".
    if words.len() >= 2 {
        if let Some(initial) = words[words.len() - 1].chars().next() {
            variations.push(format!("{} {initial}", words[0]));
        }
    }

    variations
}

fn dedup_preserving_order(variations: &mut Vec<String>) {
    let mut seen = BTreeSet::new();
    variations.retain(|v| seen.insert(v.clone()));
}

/// Expand each variation through the substitution rules and the mishearing
/// table, returning `(variant, canonical)` pairs. Variants that collide
/// with a literal variation are skipped — tier 1 already covers them.
fn expand_phonetic_variants(variations: &[String]) -> Vec<(String, String)> {
    let mut variants = Vec::new();
    let mut seen = BTreeSet::new();

    for variation in variations {
        for rule in PHONETIC_RULES {
            let variant = if rule.trailing {
                match variation.strip_suffix(rule.pattern) {
                    Some(stem) => format!("{stem}{}", rule.replacement),
                    None => continue,
                }
            } else {
                if !variation.contains(rule.pattern) {
                    continue;
                }
                variation.replace(rule.pattern, rule.replacement)
            };

            if variant != *variation
                && !variations.contains(&variant)
                && seen.insert(variant.clone())
            {
                variants.push((variant, variation.clone()));
            }
        }

        for (name, mishearings) in MISHEARING_TABLE {
            if variation == name {
                for misheard in *mishearings {
                    let misheard = (*misheard).to_owned();
                    if !variations.contains(&misheard) && seen.insert(misheard.clone()) {
                        variants.push((misheard, variation.clone()));
                    }
                }
            }
        }
    }

    variants
}

// ── Word helpers ────────────────────────────────────────────────────────

/// Strip leading/trailing punctuation and lowercase the remainder.
fn clean_word(word: &str) -> String {
    word.trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase()
}

/// Levenshtein similarity: `1 - distance / max_len`.
fn word_similarity(word: &str, variation: &str) -> f32 {
    let max_len = word.chars().count().max(variation.chars().count());
    if max_len == 0 {
        return 0.0;
    }
    let distance = strsim::levenshtein(word, variation);
    1.0 - distance as f32 / max_len as f32
}

// ── Tests ───────────────────────────────────────────────────────────────
