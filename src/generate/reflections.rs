/// Reflection generation — turns collected inflection responses into
/// per-key reflective commentary.
///
/// One prompt covers every inflection; the model is asked for a strict
/// JSON object keyed by inflection key. Truncated output earns one retry
/// with a larger budget; whatever comes back is normalized so that every
/// expected key ends up with a non-empty, properly terminated reflection,
/// synthesizing a deterministic fallback from the learner's own words
/// where the model's answer is missing or broken.

use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use crate::core::reflection::ReflectionMap;
use crate::schema::module::InflectionContext;

use super::backend::{CompletionRequest, GenerationBackend, GenerationError};
use super::parse::extract_json_object;

/// Title and subtitle of the active module, woven into the prompt.
#[derive(Debug, Clone, Copy)]
pub struct ModuleMeta<'a> {
    pub title: &'a str,
    pub subtitle: &'a str,
}

/// Token budget and sampling temperature for one generation attempt.
#[derive(Debug, Clone, Copy)]
pub struct AttemptBudget {
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Tunable thresholds for reflection generation and repair. The defaults
/// mirror one specific model's truncation behavior; treat them as policy,
/// not constants.
#[derive(Debug, Clone)]
pub struct ReflectionPolicy {
    /// Attempt schedule, tried in order. A retry happens only when the
    /// previous attempt was truncated and failed to parse.
    pub attempts: Vec<AttemptBudget>,
    /// Longest learner quote embedded in a fallback reflection.
    pub quote_cap: usize,
    /// Function words that mark a trailing fragment as incomplete.
    pub dangling_words: Vec<&'static str>,
}

impl Default for ReflectionPolicy {
    fn default() -> Self {
        ReflectionPolicy {
            attempts: vec![
                AttemptBudget {
                    max_tokens: 1000,
                    temperature: 0.8,
                },
                AttemptBudget {
                    max_tokens: 2000,
                    temperature: 0.4,
                },
            ],
            quote_cap: 120,
            dangling_words: DANGLING_WORDS.to_vec(),
        }
    }
}

/// Conjunctions, prepositions, articles, and auxiliaries that no complete
/// sentence ends on.
const DANGLING_WORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "but", "nor", "so", "to", "of", "in", "on", "at", "by", "for",
    "with", "from", "as", "into", "onto", "over", "under", "about", "between", "because", "that",
    "which", "your", "their", "his", "her", "its", "is", "are", "was", "were", "be", "been",
    "has", "have", "had", "will", "would", "could", "should",
];

/// Characters a complete value may end on.
const TERMINAL_CHARS: &[char] = &['.', '!', '?', ')', ']', '"', '\'', '”', '’'];

/// Generate one reflection per context key.
///
/// On success the returned map has exactly one entry per key in `context`,
/// every entry non-empty and properly terminated. Failure is reserved for
/// the call itself failing outright (network, endpoint, or an unparseable
/// final attempt); per-key gaps are always masked by fallback synthesis.
pub async fn generate_reflections(
    backend: &dyn GenerationBackend,
    policy: &ReflectionPolicy,
    responses: &FxHashMap<String, String>,
    context: &[(String, InflectionContext)],
    meta: ModuleMeta<'_>,
) -> Result<ReflectionMap, GenerationError> {
    let prompt = build_prompt(responses, context, meta);

    let mut parsed = None;
    let attempt_count = policy.attempts.len().max(1);
    for (attempt, budget) in policy.attempts.iter().enumerate() {
        let completion = backend
            .complete(CompletionRequest {
                prompt: prompt.clone(),
                temperature: budget.temperature,
                max_tokens: budget.max_tokens,
            })
            .await?;

        match extract_json_object(&completion.content) {
            Ok(value) => {
                parsed = Some(value);
                break;
            }
            Err(err) => {
                let last = attempt + 1 == attempt_count;
                if completion.finish_reason.is_truncated() && !last {
                    debug!(attempt, "truncated reflection output, retrying with larger budget");
                    continue;
                }
                return Err(err);
            }
        }
    }
    let parsed = parsed.ok_or(GenerationError::EmptyResponse)?;

    let mut reflections = ReflectionMap::default();
    for (key, ctx) in context {
        let raw = parsed.get(key).and_then(|v| v.as_str());
        let response = responses.get(key).map(String::as_str);
        reflections.insert(
            key.clone(),
            normalize_reflection(raw, response, &ctx.label, policy),
        );
    }
    Ok(reflections)
}

/// Builds the prompt string sent to the model — works for any module.
fn build_prompt(
    responses: &FxHashMap<String, String>,
    context: &[(String, InflectionContext)],
    meta: ModuleMeta<'_>,
) -> String {
    let story_title = if meta.title.is_empty() {
        "a parable"
    } else {
        meta.title
    };

    let inflection_blocks = context
        .iter()
        .enumerate()
        .map(|(i, (key, ctx))| {
            let answer = responses.get(key).map(String::as_str).unwrap_or("(skipped)");
            format!(
                "INFLECTION {} — \"{}\"\nContext: {}\nStudent wrote: \"{}\"",
                i + 1,
                ctx.label,
                ctx.story_context,
                answer
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    let json_shape = context
        .iter()
        .map(|(key, _)| format!("\"{}\": \"your reflection on their response\"", key))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "You are a wise, warm teacher reflecting on a student's responses to \"{}\" — a parable \
drawing on multiple wisdom traditions (Bhagavad Gita, Tao Te Ching, Buddhism, Bible, Quran, \
Rumi, Stoicism).\n\n\
At key inflection points in the story, the student paused and shared their thoughts. Your job \
is to reflect their answers back to them — not lecture, but mirror. Be specific about THEIR \
words.\n\n\
For each response:\n\
- If their thinking aligns with the wisdom: affirm it specifically and deepen it by connecting \
to the tradition.\n\
- If there's a gap: gently show what both paths might look like. Let them see the difference \
themselves.\n\
- If they're partially right: acknowledge what they got, then show the missing piece.\n\n\
Be concise (3-4 sentences per reflection). Write like a thoughtful friend, not a professor. \
Use \"you\" directly.\n\n\
{}\n\n\
Respond ONLY with a JSON object — no markdown, no backticks, no preamble:\n\
{{{}}}",
        story_title, inflection_blocks, json_shape
    )
}

/// Collapse to a clean value, or synthesize a fallback when the model's
/// output for this key is missing, empty, or looks cut off.
fn normalize_reflection(
    raw: Option<&str>,
    response: Option<&str>,
    label: &str,
    policy: &ReflectionPolicy,
) -> String {
    let collapsed = raw.map(collapse_whitespace).unwrap_or_default();
    if looks_incomplete(&collapsed, &policy.dangling_words) {
        if raw.is_some() {
            warn!(label, "reflection value looked incomplete, substituting fallback");
        }
        return fallback_reflection(response, label, policy.quote_cap);
    }
    ensure_terminated(collapsed)
}

fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// A value is incomplete when it is empty, does not end in terminal
/// punctuation, or trails off on a function word — the signature of
/// truncated model output slipping through as a false answer.
fn looks_incomplete(value: &str, dangling_words: &[&str]) -> bool {
    if value.is_empty() {
        return true;
    }
    if !value.ends_with(TERMINAL_CHARS) {
        return true;
    }

    let last_word: String = value
        .split_whitespace()
        .last()
        .unwrap_or("")
        .chars()
        .filter(|c| c.is_alphabetic())
        .collect::<String>()
        .to_lowercase();
    dangling_words.contains(&last_word.as_str())
}

/// Values ending in a closing quote or bracket are complete but may lack
/// sentence punctuation; give them a period.
fn ensure_terminated(mut value: String) -> String {
    if !value.ends_with(['.', '!', '?']) {
        value.push('.');
    }
    value
}

/// Deterministic substitute reflection built from the learner's own words,
/// so the reflection card never shows a blank or broken string.
fn fallback_reflection(response: Option<&str>, label: &str, quote_cap: usize) -> String {
    match response {
        Some(answer) if !answer.trim().is_empty() => {
            let answer = collapse_whitespace(answer);
            let quote: String = if answer.chars().count() > quote_cap {
                let mut q: String = answer.chars().take(quote_cap).collect();
                q.push('…');
                q
            } else {
                answer
            };
            format!(
                "You wrote \"{}\" — stay with that. What you noticed at \"{}\" is the part of \
the story that belongs to you, and naming it is already the work.",
                quote, label
            )
        }
        _ => format!(
            "You let \"{}\" pass without an answer this time. The question stays open — it will \
still be here when the story has settled.",
            label
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::backend::ScriptedBackend;

    fn context_of(keys: &[&str]) -> Vec<(String, InflectionContext)> {
        keys.iter()
            .map(|k| {
                (
                    k.to_string(),
                    InflectionContext {
                        label: format!("label {}", k),
                        story_context: "A turning point.".to_string(),
                    },
                )
            })
            .collect()
    }

    fn responses_of(entries: &[(&str, &str)]) -> FxHashMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    const META: ModuleMeta<'static> = ModuleMeta {
        title: "The Trader's Ledger",
        subtitle: "a parable about connection",
    };

    #[test]
    fn complete_sentence_is_accepted_unmodified() {
        let policy = ReflectionPolicy::default();
        let out = normalize_reflection(
            Some("You noticed the pattern."),
            Some("my answer"),
            "label",
            &policy,
        );
        assert_eq!(out, "You noticed the pattern.");
    }

    #[test]
    fn dangling_fragment_is_replaced_by_fallback() {
        let policy = ReflectionPolicy::default();
        let out = normalize_reflection(Some("You really"), Some("my answer"), "label", &policy);
        assert!(out.contains("my answer"));
        assert!(out.ends_with('.'));
    }

    #[test]
    fn dangling_function_word_with_punctuation_is_replaced() {
        let policy = ReflectionPolicy::default();
        // Ends in terminal punctuation but trails off on "the".
        let out = normalize_reflection(Some("You saw the."), Some("noticing"), "label", &policy);
        assert!(out.contains("noticing"));
    }

    #[test]
    fn quote_ending_gets_a_period() {
        let policy = ReflectionPolicy::default();
        let out = normalize_reflection(
            Some("You called it \"keeping score\""),
            Some("keeping score"),
            "label",
            &policy,
        );
        assert_eq!(out, "You called it \"keeping score\".");
    }

    #[test]
    fn internal_whitespace_is_collapsed() {
        let policy = ReflectionPolicy::default();
        let out = normalize_reflection(
            Some("You  noticed\n the   pattern."),
            None,
            "label",
            &policy,
        );
        assert_eq!(out, "You noticed the pattern.");
    }

    #[test]
    fn long_answers_are_quoted_with_ellipsis() {
        let long = "x".repeat(200);
        let out = fallback_reflection(Some(&long), "label", 120);
        assert!(out.contains('…'));
        assert!(out.contains(&"x".repeat(120)));
        assert!(!out.contains(&"x".repeat(121)));
    }

    #[test]
    fn skipped_fallback_references_label() {
        let out = fallback_reflection(None, "Your signal for a true choice", 120);
        assert!(out.contains("Your signal for a true choice"));
        assert!(out.ends_with('.'));
    }

    #[test]
    fn prompt_enumerates_context_in_order() {
        let context = context_of(&["advice", "reaction"]);
        let responses = responses_of(&[("advice", "drop the ledger")]);
        let prompt = build_prompt(&responses, &context, META);

        let advice_pos = prompt.find("INFLECTION 1").unwrap();
        let reaction_pos = prompt.find("INFLECTION 2").unwrap();
        assert!(advice_pos < reaction_pos);
        assert!(prompt.contains("drop the ledger"));
        assert!(prompt.contains("(skipped)"));
        assert!(prompt.contains("The Trader's Ledger"));
        assert!(prompt.contains("\"advice\": \"your reflection on their response\""));
    }

    #[tokio::test]
    async fn round_trip_fills_every_key() {
        let backend = ScriptedBackend::new()
            .with_reply(r#"{"a": "You chose honesty over comfort."}"#);
        let context = context_of(&["a", "b"]);
        let responses = responses_of(&[("a", "foo")]);

        let map = generate_reflections(
            &backend,
            &ReflectionPolicy::default(),
            &responses,
            &context,
            META,
        )
        .await
        .unwrap();

        assert_eq!(map.len(), 2);
        assert_eq!(map["a"], "You chose honesty over comfort.");
        // b was skipped and absent from the model output: fallback text.
        assert!(!map["b"].is_empty());
        assert!(map["b"].contains("label b"));
        assert!(map["b"].ends_with('.'));
    }

    #[tokio::test]
    async fn truncated_first_attempt_retries_once() {
        let backend = ScriptedBackend::new()
            .with_truncated(r#"{"a": "You noticed"#)
            .with_reply(r#"{"a": "You noticed the pattern."}"#);
        let context = context_of(&["a"]);
        let responses = responses_of(&[("a", "foo")]);

        let map = generate_reflections(
            &backend,
            &ReflectionPolicy::default(),
            &responses,
            &context,
            META,
        )
        .await
        .unwrap();

        assert_eq!(backend.call_count(), 2);
        assert_eq!(map["a"], "You noticed the pattern.");
    }

    #[tokio::test]
    async fn unparseable_complete_output_fails_without_retry() {
        let backend = ScriptedBackend::new().with_reply("no json at all");
        let context = context_of(&["a"]);

        let result = generate_reflections(
            &backend,
            &ReflectionPolicy::default(),
            &FxHashMap::default(),
            &context,
            META,
        )
        .await;

        assert!(matches!(result, Err(GenerationError::MissingPayload)));
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn truncated_final_attempt_fails() {
        let backend = ScriptedBackend::new()
            .with_truncated(r#"{"a": "You noticed"#)
            .with_truncated(r#"{"a": "You noticed the"#);
        let context = context_of(&["a"]);

        let result = generate_reflections(
            &backend,
            &ReflectionPolicy::default(),
            &FxHashMap::default(),
            &context,
            META,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(backend.call_count(), 2);
    }

    #[tokio::test]
    async fn endpoint_failure_aborts_immediately() {
        let backend = ScriptedBackend::new().with_failure(GenerationError::Endpoint {
            status: 500,
            body: "server error".to_string(),
        });
        let context = context_of(&["a"]);

        let result = generate_reflections(
            &backend,
            &ReflectionPolicy::default(),
            &FxHashMap::default(),
            &context,
            META,
        )
        .await;

        assert!(matches!(result, Err(GenerationError::Endpoint { .. })));
        assert_eq!(backend.call_count(), 1);
    }
}
