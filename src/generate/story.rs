/// On-demand story module generation.
///
/// Asks the model for a complete parable following a fixed narrative
/// template, then coerces whatever comes back into a valid [`Module`]:
/// unknown fields get defaults, inflection keys are repaired and made
/// unique, and a reflection card is always appended. Every failure short
/// of a missing credential lands on a hand-authored fallback module so the
/// learner is never blocked.

use rand::Rng;
use rustc_hash::FxHashSet;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::warn;

use crate::schema::card::{
    Card, CardId, InflectionCard, Palette, ReflectionCard, StoryCard, StoryTone,
};
use crate::schema::module::{Category, InflectionContext, Module};

use super::backend::{CompletionRequest, GenerationBackend, GenerationError};
use super::parse::extract_json_object;

pub const STORY_TEMPERATURE: f32 = 0.72;
pub const STORY_MAX_TOKENS: u32 = 2600;

// Text caps applied while coercing model output.
const TITLE_CAP: usize = 80;
const SUBTITLE_CAP: usize = 100;
const BODY_CAP: usize = 1400;
const STICKER_QUERY_CAP: usize = 24;
const PROMPT_CAP: usize = 700;
const PLACEHOLDER_CAP: usize = 120;
const LABEL_CAP: usize = 80;
const STORY_CONTEXT_CAP: usize = 600;

/// Generate a module from a free-text theme.
///
/// The only error surfaced to the caller is a missing API credential;
/// every transient or structural failure is masked by the fallback module.
pub async fn generate_story_module(
    backend: &dyn GenerationBackend,
    user_input: &str,
) -> Result<Module, GenerationError> {
    let prompt = build_story_prompt(user_input);

    let completion = match backend
        .complete(CompletionRequest {
            prompt,
            temperature: STORY_TEMPERATURE,
            max_tokens: STORY_MAX_TOKENS,
        })
        .await
    {
        Ok(completion) => completion,
        Err(err @ GenerationError::MissingCredentials(_)) => return Err(err),
        Err(err) => {
            warn!(error = %err, "story generation failed, using fallback module");
            return Ok(fallback_module(user_input));
        }
    };

    let parsed = match extract_json_object(&completion.content) {
        Ok(value) => value,
        Err(err) => {
            warn!(error = %err, "story output was not parseable, using fallback module");
            return Ok(fallback_module(user_input));
        }
    };

    Ok(normalize_module(parsed, user_input))
}

fn build_story_prompt(user_input: &str) -> String {
    format!(
        r#"You are writing a short illustrated parable — not a self-help article, not a listicle, not a lesson plan.
The story follows ONE named protagonist through a series of encounters. Each encounter features a SECOND character (a soldier, a ferryman, a monk, a bookseller, an old woman, etc.) whose words and actions carry the wisdom of a specific tradition.

USER'S THEME / SITUATION:
"{}"

NARRATIVE RULES — follow every one or rewrite:
1. Open with a concrete world and a named protagonist with a specific problem, rendered as scene not concept.
2. Each story card is a SCENE. A stranger arrives, interrupts, offers something — an object, a question, a small story-within-story. The tradition's wisdom is spoken by that stranger or embedded in their action. Never state it as moral or life-coach advice.
3. Use specific detail — a cracked cup, a sandal left behind, a note found on a door — not abstract language.
4. No self-help vocabulary. Cut these words: "journey", "growth", "healing", "process", "embrace", "navigate", "feelings", "authentic", "empower", "transform", "mindful", "intentional", "step", "path", "remind yourself".
5. Inflection prompts are addressed to "you" and ask a sharp concrete question tied to the story — not generic reflection. They connect the protagonist's moment to the reader's life without being preachy.
6. The closing card resolves the protagonist's arc with a concrete action — something they do, say, or notice — not a moral statement.

REQUIRED JSON STRUCTURE — return ONLY this, no markdown fences, no commentary:
{{
  "title": "three to five words, title-case, evocative noun phrase",
  "subtitle": "a parable about [one word] — from six traditions",
  "category": "Friendship|Purpose|Inner Peace|Self-Worth|Courage|Healing|Clarity",
  "cards": [
    {{ "type": "story", "tradition": null, "body": "SCENE — protagonist intro, specific world, concrete problem", "visual": "single emoji", "stickerQuery": "1-3 word image search", "tone": "narrative" }},
    {{ "type": "story", "tradition": null, "body": "SCENE — protagonist's failed coping strategy, shown not told", "visual": "single emoji", "stickerQuery": "1-3 word image search", "tone": "narrative" }},
    {{ "type": "inflection", "inflectionKey": "firstPause", "prompt": "SHARP question connecting protagonist's dilemma to reader's life", "placeholder": "short invitation to write" }},
    {{ "type": "story", "tradition": "Bhagavad Gita", "body": "SCENE — a stranger arrives with a Gita story embedded in dialogue, wisdom lands through the character's words or action, not narrated directly", "visual": "single emoji", "stickerQuery": "1-3 word image search", "tone": "gita" }},
    {{ "type": "story", "tradition": "Tao Te Ching", "body": "SCENE — a different stranger with a Taoist image (water, empty vessel, uncarved wood), wisdom delivered through observation or a single question", "visual": "single emoji", "stickerQuery": "1-3 word image search", "tone": "tao" }},
    {{ "type": "story", "tradition": "Buddhism", "body": "SCENE — a third stranger with a Buddhist parable (the raft, the mustard seed, the monk's sandal), told inside dialogue", "visual": "single emoji", "stickerQuery": "1-3 word image search", "tone": "buddhism" }},
    {{ "type": "inflection", "inflectionKey": "secondPause", "prompt": "SHARP question — two pieces of wisdom have now been heard, ask which resonates and why it lands personally", "placeholder": "short invitation to write" }},
    {{ "type": "story", "tradition": "Hadith · Rumi", "body": "SCENE — protagonist acts differently because of what they heard, a concrete change in behaviour, another encounter with a different stranger, wisdom via Rumi verse or Hadith embedded in speech", "visual": "single emoji", "stickerQuery": "1-3 word image search", "tone": "rumi" }},
    {{ "type": "story", "tradition": null, "body": "CLOSING SCENE — protagonist does one small concrete thing that resolves the arc. No summary. No moral. End on action or image.", "visual": "single emoji", "stickerQuery": "1-3 word image search", "tone": "narrative" }}
  ],
  "inflectionContext": {{
    "firstPause": {{ "label": "3-5 word label describing what the reader just named", "storyContext": "Two sentences: what the protagonist is experiencing + which tradition wisdom will follow and why it's relevant" }},
    "secondPause": {{ "label": "3-5 word label describing what the reader just named", "storyContext": "Two sentences: the two wisdoms heard so far + how both circle back to the protagonist's and reader's real situation" }}
  }}
}}"#,
        user_input.trim()
    )
}

// Raw shapes for coercing whatever JSON the model produced.

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawModule {
    title: Option<String>,
    subtitle: Option<String>,
    category: Option<String>,
    cards: Option<Vec<serde_json::Value>>,
    inflection_context: Option<HashMap<String, RawContext>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawCard {
    #[serde(rename = "type")]
    kind: Option<String>,
    tradition: Option<String>,
    body: Option<String>,
    visual: Option<String>,
    sticker_query: Option<String>,
    tone: Option<String>,
    inflection_key: Option<String>,
    prompt: Option<String>,
    placeholder: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawContext {
    label: Option<String>,
    story_context: Option<String>,
}

fn normalize_module(parsed: serde_json::Value, user_input: &str) -> Module {
    let raw: RawModule = match serde_json::from_value(parsed) {
        Ok(raw) => raw,
        Err(err) => {
            warn!(error = %err, "story output violated the module shape, using fallback");
            return fallback_module(user_input);
        }
    };

    let Some(raw_cards) = raw.cards else {
        return fallback_module(user_input);
    };

    let mut cards: Vec<Card> = Vec::new();
    for value in raw_cards {
        let raw_card: RawCard = serde_json::from_value(value).unwrap_or_default();
        let position = cards.len() as u32 + 1;
        if let Some(card) = normalize_card(raw_card, position) {
            cards.push(card);
        }
    }

    ensure_unique_inflection_keys(&mut cards);

    if cards.is_empty() {
        return fallback_module(user_input);
    }

    let category = raw
        .category
        .as_deref()
        .and_then(Category::parse)
        .unwrap_or(Category::Clarity);

    let inflection_context =
        rebuild_inflection_context(raw.inflection_context.unwrap_or_default(), &cards);

    cards.push(Card::Reflection(ReflectionCard::new(CardId(
        cards.len() as u32 + 1,
    ))));

    Module {
        id: format!("generated-{:08x}", rand::thread_rng().gen::<u32>()),
        title: safe_text(raw.title.as_deref(), "A Story in Progress", TITLE_CAP),
        subtitle: safe_text(
            raw.subtitle.as_deref(),
            "a realtime parable shaped by your prompt",
            SUBTITLE_CAP,
        ),
        category,
        topic: category.topic().to_string(),
        icon: category.icon().to_string(),
        accent_color: category.accent_color().to_string(),
        cards,
        inflection_context,
    }
}

fn normalize_card(raw: RawCard, position: u32) -> Option<Card> {
    match raw.kind.as_deref() {
        Some("story") => {
            let tone = raw
                .tone
                .as_deref()
                .map(StoryTone::parse)
                .unwrap_or_default();
            Some(Card::Story(StoryCard {
                id: CardId(position),
                tradition: raw.tradition.filter(|t| !t.trim().is_empty()),
                body: safe_text(raw.body.as_deref(), "A new chapter unfolds.", BODY_CAP),
                visual: safe_emoji(raw.visual.as_deref(), "📖"),
                sticker_query: safe_text(raw.sticker_query.as_deref(), "wisdom", STICKER_QUERY_CAP),
                tone,
                palette: Palette::story(tone),
            }))
        }
        Some("inflection") => Some(Card::Inflection(InflectionCard {
            id: CardId(position),
            inflection_key: safe_key(
                raw.inflection_key.as_deref(),
                &format!("insight{}", position),
            ),
            prompt: safe_text(
                raw.prompt.as_deref(),
                "What does this moment reveal about you?",
                PROMPT_CAP,
            ),
            placeholder: safe_text(
                raw.placeholder.as_deref(),
                "Write your reflection...",
                PLACEHOLDER_CAP,
            ),
            visual: "✍️".to_string(),
            palette: Palette::inflection(),
        })),
        _ => None,
    }
}

/// Later occurrences of a duplicated key are suffixed `key2`, `key3`, ...
/// in first-seen order until unique.
fn ensure_unique_inflection_keys(cards: &mut [Card]) {
    let mut seen: FxHashSet<String> = FxHashSet::default();

    for card in cards.iter_mut() {
        if let Card::Inflection(inflection) = card {
            let base = inflection.inflection_key.clone();
            let mut key = base.clone();
            let mut suffix = 2;
            while seen.contains(&key) {
                key = format!("{}{}", base, suffix);
                suffix += 1;
            }
            inflection.inflection_key = key.clone();
            seen.insert(key);
        }
    }
}

/// Exactly one context entry per surviving inflection card, in card order,
/// pulling from the model's output when available.
fn rebuild_inflection_context(
    raw: HashMap<String, RawContext>,
    cards: &[Card],
) -> Vec<(String, InflectionContext)> {
    cards
        .iter()
        .filter_map(|card| card.inflection_key())
        .map(|key| {
            let candidate = raw.get(key);
            (
                key.to_string(),
                InflectionContext {
                    label: safe_text(
                        candidate.and_then(|c| c.label.as_deref()),
                        "Your response",
                        LABEL_CAP,
                    ),
                    story_context: safe_text(
                        candidate.and_then(|c| c.story_context.as_deref()),
                        "You are responding to a turning point in the story and naming what it \
means in your own life.",
                        STORY_CONTEXT_CAP,
                    ),
                },
            )
        })
        .collect()
}

/// Hand-authored module used whenever generation cannot produce a usable
/// one. Six cards, two inflection points, satisfies every module invariant.
pub fn fallback_module(user_input: &str) -> Module {
    let title = if user_input.trim().is_empty() {
        "A Story in Progress".to_string()
    } else {
        format!("A Parable on {}", safe_text(Some(user_input), "Your Theme", 40))
    };

    Module {
        id: "generated-fallback".to_string(),
        title,
        subtitle: "a realtime parable shaped by your prompt".to_string(),
        category: Category::Clarity,
        topic: "Self-Reflection".to_string(),
        icon: "🧭".to_string(),
        accent_color: "#6366f1".to_string(),
        cards: vec![
            Card::Story(StoryCard {
                id: CardId(1),
                tradition: None,
                body: "A traveler arrived at a crossroads with a full bag and a restless mind. \
Every path looked urgent, but none felt true."
                    .to_string(),
                visual: "🧭".to_string(),
                sticker_query: "crossroads".to_string(),
                tone: StoryTone::Narrative,
                palette: Palette::story(StoryTone::Narrative),
            }),
            Card::Inflection(InflectionCard {
                id: CardId(2),
                inflection_key: "firstTurn".to_string(),
                prompt: "When you feel pulled in too many directions, what signal tells you \
which choice is truly yours?"
                    .to_string(),
                placeholder: "Write the signal you trust most...".to_string(),
                visual: "✍️".to_string(),
                palette: Palette::inflection(),
            }),
            Card::Story(StoryCard {
                id: CardId(3),
                tradition: Some("Tao Te Ching".to_string()),
                body: "A ferryman told the traveler, 'Water does not panic at every bend. It \
keeps moving and lets shape reveal itself.'"
                    .to_string(),
                visual: "💧".to_string(),
                sticker_query: "river".to_string(),
                tone: StoryTone::Tao,
                palette: Palette::story(StoryTone::Tao),
            }),
            Card::Inflection(InflectionCard {
                id: CardId(4),
                inflection_key: "secondTurn".to_string(),
                prompt: "What is one place in your life where forcing outcomes has made things \
heavier instead of clearer?"
                    .to_string(),
                placeholder: "Name the place where you can loosen your grip...".to_string(),
                visual: "✍️".to_string(),
                palette: Palette::inflection(),
            }),
            Card::Story(StoryCard {
                id: CardId(5),
                tradition: Some("Buddhism".to_string()),
                body: "At sunset, the traveler sat in silence and noticed the noise was mostly \
fear of being misunderstood. The fear softened once it was named."
                    .to_string(),
                visual: "⛰️".to_string(),
                sticker_query: "meditation".to_string(),
                tone: StoryTone::Buddhism,
                palette: Palette::story(StoryTone::Buddhism),
            }),
            Card::Reflection(ReflectionCard::new(CardId(6))),
        ],
        inflection_context: vec![
            (
                "firstTurn".to_string(),
                InflectionContext {
                    label: "Your signal for a true choice".to_string(),
                    story_context: "The traveler stands at a crossroads, overwhelmed by options. \
Tao wisdom invites flowing instead of forcing and trusting what feels aligned rather than \
urgent."
                        .to_string(),
                },
            ),
            (
                "secondTurn".to_string(),
                InflectionContext {
                    label: "Where forcing is making life heavier".to_string(),
                    story_context: "After hearing wisdom from the ferryman, the traveler sees \
that control can create strain. Naming fear and loosening the grip creates clarity."
                        .to_string(),
                },
            ),
        ],
    }
}

/// Collapse whitespace, trim, cap length; empty or non-string input gets
/// the fixed default.
fn safe_text(value: Option<&str>, fallback: &str, max_len: usize) -> String {
    let cleaned = value
        .map(|v| v.split_whitespace().collect::<Vec<_>>().join(" "))
        .unwrap_or_default();
    if cleaned.is_empty() {
        return fallback.to_string();
    }
    cleaned.chars().take(max_len).collect()
}

/// Keys keep only `[A-Za-z0-9_-]`; anything left empty gets the fallback.
fn safe_key(value: Option<&str>, fallback: &str) -> String {
    let cleaned: String = value
        .unwrap_or_default()
        .trim()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    if cleaned.is_empty() {
        fallback.to_string()
    } else {
        cleaned
    }
}

fn safe_emoji(value: Option<&str>, fallback: &str) -> String {
    let cleaned = value.unwrap_or_default().trim();
    if cleaned.is_empty() {
        fallback.to_string()
    } else {
        cleaned.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::backend::ScriptedBackend;

    #[tokio::test]
    async fn malformed_output_yields_valid_fallback() {
        let backend = ScriptedBackend::new().with_reply("nothing like json");
        let module = generate_story_module(&backend, "choices").await.unwrap();
        assert_eq!(module.id, "generated-fallback");
        assert!(module.validate().is_ok());
        assert_eq!(module.title, "A Parable on choices");
        assert_eq!(module.inflection_keys().count(), 2);
    }

    #[tokio::test]
    async fn endpoint_failure_yields_fallback() {
        let backend = ScriptedBackend::new().with_failure(GenerationError::Endpoint {
            status: 503,
            body: "unavailable".to_string(),
        });
        let module = generate_story_module(&backend, "").await.unwrap();
        assert_eq!(module.title, "A Story in Progress");
        assert!(module.validate().is_ok());
    }

    #[tokio::test]
    async fn missing_credentials_surface_to_the_caller() {
        let backend = ScriptedBackend::unconfigured();
        let result = generate_story_module(&backend, "courage").await;
        assert!(matches!(
            result,
            Err(GenerationError::MissingCredentials(_))
        ));
    }

    #[tokio::test]
    async fn generated_module_is_coerced_and_completed() {
        let backend = ScriptedBackend::new().with_reply(
            r#"```json
{
  "title": "The Mapmaker's Dilemma",
  "subtitle": "a parable about courage — from six traditions",
  "category": "Bravery",
  "cards": [
    { "type": "story", "tradition": null, "body": "Sana drew maps of every range but her own.", "visual": "🗺️", "stickerQuery": "mountains", "tone": "mystery" },
    { "type": "inflection", "inflectionKey": "first pause!", "prompt": "What have you mapped but never walked?", "placeholder": "Name it..." },
    { "type": "story", "tradition": "Tao Te Ching", "body": "The ferryman pointed at the river without looking up.", "visual": "💧", "stickerQuery": "river", "tone": "tao" },
    { "type": "poem", "body": "ignored" }
  ],
  "inflectionContext": {
    "firstpause": { "label": "The unwalked map", "storyContext": "Sana has prepared forever and never begun." }
  }
}
```"#,
        );

        let module = generate_story_module(&backend, "preparation as hiding")
            .await
            .unwrap();
        assert!(module.validate().is_ok());
        assert_eq!(module.title, "The Mapmaker's Dilemma");
        // "Bravery" is not a category label; coerced to the default.
        assert_eq!(module.category, Category::Clarity);
        // Unknown card type dropped, reflection appended last.
        assert_eq!(module.cards.len(), 4);
        assert!(module.cards[3].is_reflection());
        // Key sanitized ("first pause!" → "firstpause") and its context found.
        assert_eq!(
            module.context_for("firstpause").unwrap().label,
            "The unwalked map"
        );
        // Unknown tone falls back to narrative accents.
        match &module.cards[0] {
            Card::Story(story) => {
                assert_eq!(story.tone, StoryTone::Narrative);
                assert_eq!(story.palette.accent, "#6366f1");
            }
            other => panic!("expected story card, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn duplicate_keys_are_suffixed_deterministically() {
        let backend = ScriptedBackend::new().with_reply(
            r#"{
  "title": "Turning",
  "category": "Clarity",
  "cards": [
    { "type": "inflection", "inflectionKey": "turn", "prompt": "First?", "placeholder": "..." },
    { "type": "story", "body": "Between the two questions.", "tone": "narrative" },
    { "type": "inflection", "inflectionKey": "turn", "prompt": "Second?", "placeholder": "..." }
  ]
}"#,
        );

        let module = generate_story_module(&backend, "turning").await.unwrap();
        let keys: Vec<_> = module.inflection_keys().collect();
        assert_eq!(keys, vec!["turn", "turn2"]);
        assert!(module.validate().is_ok());
        assert!(module.context_for("turn2").is_some());
    }

    #[tokio::test]
    async fn zero_usable_cards_yields_fallback() {
        let backend = ScriptedBackend::new()
            .with_reply(r#"{"title": "Empty", "cards": [{"type": "poem"}]}"#);
        let module = generate_story_module(&backend, "emptiness").await.unwrap();
        assert_eq!(module.id, "generated-fallback");
        assert!(module.validate().is_ok());
    }

    #[test]
    fn fallback_module_satisfies_invariants() {
        let module = fallback_module("");
        assert!(module.validate().is_ok());
        assert_eq!(module.cards.len(), 6);
        assert_eq!(module.inflection_keys().count(), 2);
        assert!(module.cards[5].is_reflection());
    }

    #[test]
    fn safe_text_collapses_and_caps() {
        assert_eq!(safe_text(Some("  a   b  "), "d", 10), "a b");
        assert_eq!(safe_text(Some(""), "default", 10), "default");
        assert_eq!(safe_text(None, "default", 10), "default");
        assert_eq!(safe_text(Some("abcdefghij"), "d", 4), "abcd");
    }

    #[test]
    fn safe_key_strips_invalid_characters() {
        assert_eq!(safe_key(Some("first pause!"), "x"), "firstpause");
        assert_eq!(safe_key(Some("ok_key-2"), "x"), "ok_key-2");
        assert_eq!(safe_key(Some("!!!"), "insight3"), "insight3");
        assert_eq!(safe_key(None, "insight3"), "insight3");
    }
}
