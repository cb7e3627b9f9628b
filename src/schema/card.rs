use serde::{Deserialize, Serialize};

/// Newtype wrapper for card ids (1-based position within a module).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CardId(pub u32);

/// The tradition flavor of a story card, used to derive its color accents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StoryTone {
    Narrative,
    Gita,
    Tao,
    Buddhism,
    Bible,
    Rumi,
}

impl Default for StoryTone {
    fn default() -> Self {
        Self::Narrative
    }
}

impl StoryTone {
    /// Parse a tone name, falling back to `Narrative` for anything
    /// unrecognized.
    pub fn parse(value: &str) -> StoryTone {
        match value.trim().to_ascii_lowercase().as_str() {
            "gita" => Self::Gita,
            "tao" => Self::Tao,
            "buddhism" => Self::Buddhism,
            "bible" => Self::Bible,
            "rumi" => Self::Rumi,
            _ => Self::Narrative,
        }
    }

    /// Accent color for this tone.
    pub fn accent(&self) -> &'static str {
        match self {
            Self::Narrative => "#6366f1",
            Self::Gita => "#f97316",
            Self::Tao => "#0ea5e9",
            Self::Buddhism => "#8b5cf6",
            Self::Bible => "#d97706",
            Self::Rumi => "#ec4899",
        }
    }

    /// Accent background color for this tone.
    pub fn accent_bg(&self) -> &'static str {
        match self {
            Self::Narrative => "#eef2ff",
            Self::Gita => "#fff7ed",
            Self::Tao => "#f0f9ff",
            Self::Buddhism => "#faf5ff",
            Self::Bible => "#fffbeb",
            Self::Rumi => "#fdf2f8",
        }
    }
}

/// The color accents a card carries for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Palette {
    pub bg: String,
    pub accent_bg: String,
    pub text_color: String,
    pub accent: String,
}

impl Palette {
    /// Palette for a story card, derived from its tone.
    pub fn story(tone: StoryTone) -> Palette {
        Palette {
            bg: "#ffffff".to_string(),
            accent_bg: tone.accent_bg().to_string(),
            text_color: "#0f172a".to_string(),
            accent: tone.accent().to_string(),
        }
    }

    /// Fixed palette for inflection cards.
    pub fn inflection() -> Palette {
        Palette {
            bg: "#fefce8".to_string(),
            accent_bg: "#fef9c3".to_string(),
            text_color: "#0f172a".to_string(),
            accent: "#ca8a04".to_string(),
        }
    }

    /// Fixed palette for the reflection card.
    pub fn reflection() -> Palette {
        Palette {
            bg: "#ffffff".to_string(),
            accent_bg: "#f8fafc".to_string(),
            text_color: "#0f172a".to_string(),
            accent: "#22c55e".to_string(),
        }
    }
}

/// A narrative scene. Display-only, immutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoryCard {
    pub id: CardId,
    pub tradition: Option<String>,
    pub body: String,
    pub visual: String,
    pub sticker_query: String,
    pub tone: StoryTone,
    pub palette: Palette,
}

/// A point that requires learner input before forward progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InflectionCard {
    pub id: CardId,
    pub inflection_key: String,
    pub prompt: String,
    pub placeholder: String,
    pub visual: String,
    pub palette: Palette,
}

/// The terminal card. Carries no authored content — its content is
/// produced at runtime by the generation client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReflectionCard {
    pub id: CardId,
    pub visual: String,
    pub palette: Palette,
}

impl ReflectionCard {
    pub fn new(id: CardId) -> ReflectionCard {
        ReflectionCard {
            id,
            visual: "🪞".to_string(),
            palette: Palette::reflection(),
        }
    }
}

/// A single unit of a lesson module. Cards are created once, at module
/// construction, and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Card {
    Story(StoryCard),
    Inflection(InflectionCard),
    Reflection(ReflectionCard),
}

impl Card {
    pub fn id(&self) -> CardId {
        match self {
            Self::Story(c) => c.id,
            Self::Inflection(c) => c.id,
            Self::Reflection(c) => c.id,
        }
    }

    pub fn palette(&self) -> &Palette {
        match self {
            Self::Story(c) => &c.palette,
            Self::Inflection(c) => &c.palette,
            Self::Reflection(c) => &c.palette,
        }
    }

    pub fn visual(&self) -> &str {
        match self {
            Self::Story(c) => &c.visual,
            Self::Inflection(c) => &c.visual,
            Self::Reflection(c) => &c.visual,
        }
    }

    pub fn is_inflection(&self) -> bool {
        matches!(self, Self::Inflection(_))
    }

    pub fn is_reflection(&self) -> bool {
        matches!(self, Self::Reflection(_))
    }

    /// The inflection key, for inflection cards only.
    pub fn inflection_key(&self) -> Option<&str> {
        match self {
            Self::Inflection(c) => Some(&c.inflection_key),
            _ => None,
        }
    }

    /// The sticker search query, for story cards only.
    pub fn sticker_query(&self) -> Option<&str> {
        match self {
            Self::Story(c) => Some(&c.sticker_query),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tone_parse_known() {
        assert_eq!(StoryTone::parse("tao"), StoryTone::Tao);
        assert_eq!(StoryTone::parse("Gita"), StoryTone::Gita);
        assert_eq!(StoryTone::parse(" rumi "), StoryTone::Rumi);
    }

    #[test]
    fn tone_parse_unknown_defaults_to_narrative() {
        assert_eq!(StoryTone::parse("stoicism"), StoryTone::Narrative);
        assert_eq!(StoryTone::parse(""), StoryTone::Narrative);
    }

    #[test]
    fn story_palette_follows_tone() {
        let p = Palette::story(StoryTone::Buddhism);
        assert_eq!(p.accent, "#8b5cf6");
        assert_eq!(p.accent_bg, "#faf5ff");
        assert_eq!(p.bg, "#ffffff");
    }

    #[test]
    fn card_accessors() {
        let card = Card::Inflection(InflectionCard {
            id: CardId(3),
            inflection_key: "firstPause".to_string(),
            prompt: "What do you see?".to_string(),
            placeholder: "Write...".to_string(),
            visual: "✍️".to_string(),
            palette: Palette::inflection(),
        });
        assert_eq!(card.id(), CardId(3));
        assert!(card.is_inflection());
        assert!(!card.is_reflection());
        assert_eq!(card.inflection_key(), Some("firstPause"));
        assert_eq!(card.sticker_query(), None);
    }

    #[test]
    fn reflection_card_defaults() {
        let card = Card::Reflection(ReflectionCard::new(CardId(6)));
        assert!(card.is_reflection());
        assert_eq!(card.visual(), "🪞");
        assert_eq!(card.palette().accent, "#22c55e");
    }
}
