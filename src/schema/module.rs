use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::card::Card;

#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("module has no cards")]
    Empty,
    #[error("module must contain exactly one reflection card, found {0}")]
    ReflectionCount(usize),
    #[error("the reflection card must be the last card")]
    ReflectionNotLast,
    #[error("duplicate inflection key: {0}")]
    DuplicateKey(String),
    #[error("inflection key has no context entry: {0}")]
    MissingContext(String),
}

/// The lesson category taxonomy. Each category carries fixed display
/// metadata consumed by the module grid and generated-module coercion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Friendship,
    Purpose,
    InnerPeace,
    SelfWorth,
    Courage,
    Healing,
    Clarity,
}

impl Category {
    /// Display name, e.g. "Inner Peace".
    pub fn label(&self) -> &'static str {
        match self {
            Self::Friendship => "Friendship",
            Self::Purpose => "Purpose",
            Self::InnerPeace => "Inner Peace",
            Self::SelfWorth => "Self-Worth",
            Self::Courage => "Courage",
            Self::Healing => "Healing",
            Self::Clarity => "Clarity",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            Self::Friendship => "🤝",
            Self::Purpose => "🧭",
            Self::InnerPeace => "🕊️",
            Self::SelfWorth => "🌱",
            Self::Courage => "🔥",
            Self::Healing => "💚",
            Self::Clarity => "🔎",
        }
    }

    pub fn accent_color(&self) -> &'static str {
        match self {
            Self::Friendship => "#6366f1",
            Self::Purpose => "#f97316",
            Self::InnerPeace => "#0ea5e9",
            Self::SelfWorth => "#ec4899",
            Self::Courage => "#d97706",
            Self::Healing => "#8b5cf6",
            Self::Clarity => "#22c55e",
        }
    }

    pub fn topic(&self) -> &'static str {
        match self {
            Self::Friendship => "Connection",
            Self::Purpose => "Direction",
            Self::InnerPeace => "Calm",
            Self::SelfWorth => "Identity",
            Self::Courage => "Bravery",
            Self::Healing => "Recovery",
            Self::Clarity => "Insight",
        }
    }

    /// Parse a category label. Returns `None` for anything unrecognized;
    /// the generation boundary decides the default.
    pub fn parse(value: &str) -> Option<Category> {
        match value.trim() {
            "Friendship" => Some(Self::Friendship),
            "Purpose" => Some(Self::Purpose),
            "Inner Peace" => Some(Self::InnerPeace),
            "Self-Worth" => Some(Self::SelfWorth),
            "Courage" => Some(Self::Courage),
            "Healing" => Some(Self::Healing),
            "Clarity" => Some(Self::Clarity),
            _ => None,
        }
    }
}

/// Per-inflection metadata consumed only by the generation client when
/// building reflections. Never shown verbatim to the learner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InflectionContext {
    pub label: String,
    pub story_context: String,
}

/// A complete lesson: ordered card sequence, per-inflection context, and
/// display metadata. Immutable once active.
///
/// Invariants (checked by [`Module::validate`]): `cards` is non-empty,
/// exactly one reflection card exists and it is last, and every inflection
/// card's key is unique and has a matching context entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Module {
    pub id: String,
    pub title: String,
    pub subtitle: String,
    pub category: Category,
    pub topic: String,
    pub icon: String,
    pub accent_color: String,
    pub cards: Vec<Card>,
    /// Ordered `(inflection_key, context)` entries. Insertion order drives
    /// prompt enumeration, so this is a sequence rather than a map.
    pub inflection_context: Vec<(String, InflectionContext)>,
}

impl Module {
    pub fn validate(&self) -> Result<(), ModuleError> {
        if self.cards.is_empty() {
            return Err(ModuleError::Empty);
        }

        let reflection_count = self.cards.iter().filter(|c| c.is_reflection()).count();
        if reflection_count != 1 {
            return Err(ModuleError::ReflectionCount(reflection_count));
        }
        if !self.cards[self.cards.len() - 1].is_reflection() {
            return Err(ModuleError::ReflectionNotLast);
        }

        let mut seen = FxHashSet::default();
        for card in &self.cards {
            if let Some(key) = card.inflection_key() {
                if !seen.insert(key.to_string()) {
                    return Err(ModuleError::DuplicateKey(key.to_string()));
                }
                if self.context_for(key).is_none() {
                    return Err(ModuleError::MissingContext(key.to_string()));
                }
            }
        }

        Ok(())
    }

    /// Context entry for an inflection key, if present.
    pub fn context_for(&self, key: &str) -> Option<&InflectionContext> {
        self.inflection_context
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, ctx)| ctx)
    }

    /// All inflection keys, in card order.
    pub fn inflection_keys(&self) -> impl Iterator<Item = &str> {
        self.cards.iter().filter_map(|c| c.inflection_key())
    }

    pub fn card_count(&self) -> usize {
        self.cards.len()
    }

    /// True when the module has an inflection card carrying this key.
    pub fn has_inflection_key(&self, key: &str) -> bool {
        self.inflection_keys().any(|k| k == key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::card::{
        CardId, InflectionCard, Palette, ReflectionCard, StoryCard, StoryTone,
    };

    fn story(id: u32) -> Card {
        Card::Story(StoryCard {
            id: CardId(id),
            tradition: None,
            body: "A traveler arrived at a crossroads.".to_string(),
            visual: "🧭".to_string(),
            sticker_query: "crossroads".to_string(),
            tone: StoryTone::Narrative,
            palette: Palette::story(StoryTone::Narrative),
        })
    }

    fn inflection(id: u32, key: &str) -> Card {
        Card::Inflection(InflectionCard {
            id: CardId(id),
            inflection_key: key.to_string(),
            prompt: "What would you do?".to_string(),
            placeholder: "Write...".to_string(),
            visual: "✍️".to_string(),
            palette: Palette::inflection(),
        })
    }

    fn context(key: &str) -> (String, InflectionContext) {
        (
            key.to_string(),
            InflectionContext {
                label: format!("label for {}", key),
                story_context: "A turning point in the story.".to_string(),
            },
        )
    }

    fn valid_module() -> Module {
        Module {
            id: "test".to_string(),
            title: "The Crossroads".to_string(),
            subtitle: "a test parable".to_string(),
            category: Category::Clarity,
            topic: Category::Clarity.topic().to_string(),
            icon: Category::Clarity.icon().to_string(),
            accent_color: Category::Clarity.accent_color().to_string(),
            cards: vec![
                story(1),
                inflection(2, "firstTurn"),
                story(3),
                Card::Reflection(ReflectionCard::new(CardId(4))),
            ],
            inflection_context: vec![context("firstTurn")],
        }
    }

    #[test]
    fn valid_module_passes() {
        assert!(valid_module().validate().is_ok());
    }

    #[test]
    fn empty_module_rejected() {
        let mut m = valid_module();
        m.cards.clear();
        assert!(matches!(m.validate(), Err(ModuleError::Empty)));
    }

    #[test]
    fn missing_reflection_rejected() {
        let mut m = valid_module();
        m.cards.pop();
        assert!(matches!(m.validate(), Err(ModuleError::ReflectionCount(0))));
    }

    #[test]
    fn reflection_not_last_rejected() {
        let mut m = valid_module();
        m.cards.swap(2, 3);
        assert!(matches!(m.validate(), Err(ModuleError::ReflectionNotLast)));
    }

    #[test]
    fn duplicate_key_rejected() {
        let mut m = valid_module();
        m.cards.insert(2, inflection(5, "firstTurn"));
        assert!(matches!(m.validate(), Err(ModuleError::DuplicateKey(k)) if k == "firstTurn"));
    }

    #[test]
    fn missing_context_rejected() {
        let mut m = valid_module();
        m.inflection_context.clear();
        assert!(matches!(m.validate(), Err(ModuleError::MissingContext(k)) if k == "firstTurn"));
    }

    #[test]
    fn context_lookup_and_key_iteration() {
        let m = valid_module();
        assert!(m.context_for("firstTurn").is_some());
        assert!(m.context_for("missing").is_none());
        assert_eq!(m.inflection_keys().collect::<Vec<_>>(), vec!["firstTurn"]);
        assert!(m.has_inflection_key("firstTurn"));
    }

    #[test]
    fn category_metadata_table() {
        assert_eq!(Category::parse("Inner Peace"), Some(Category::InnerPeace));
        assert_eq!(Category::parse("unknown"), None);
        assert_eq!(Category::Purpose.topic(), "Direction");
        assert_eq!(Category::Friendship.accent_color(), "#6366f1");
        assert_eq!(Category::Clarity.icon(), "🔎");
    }
}
