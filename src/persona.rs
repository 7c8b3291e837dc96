//! Tutor personas and the system prompts which condition them.

use std::str::FromStr;

/// Used for any level outside the table.
pub(crate) const DEFAULT_PROMPT: &str = "You are a helpful French tutor.";

/// CEFR proficiency levels, from beginner to mastery.
///
/// `to_string` and `FromStr` are part of the CLI and config file.
#[derive(
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    Clone,
    Copy,
    serde::Serialize,
    serde::Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::EnumIter,
)]
#[strum(ascii_case_insensitive)]
pub(crate) enum Level {
    #[default]
    A1,
    A2,
    B1,
    B2,
    C1,
    C2,
}

impl Level {
    pub(crate) fn system_prompt(self) -> &'static str {
        match self {
            Level::A1 => "You are a friendly French tutor. Focus on the user's specific question. Use simple French and explain in English. If helpful, you may include word origins or cultural notes, but avoid unrelated tangents and voice features.",
            Level::A2 => "You are a patient French tutor. Respond to the user's question clearly. You may include brief relevant background such as word origin, common mistakes, or cultural usage — but only if directly related to the question. Do not mention or suggest voice interaction.",
            Level::B1 => "You are a helpful French tutor. Use mostly French and minimal English. You can add short on-topic insights (like grammar tips or usage context) but avoid unrelated vocabulary or tools.",
            Level::B2 => "You are a French tutor. Respond primarily in French and include only concise, relevant elaborations. Avoid suggesting voice interaction or unrelated content.",
            Level::C1 => "You are a native French tutor. Use fluent French and address only what was asked, but you may include brief cultural or historical context if directly relevant.",
            Level::C2 => "You are a French language professor. Use sophisticated French to answer only the question. You may include historical or linguistic nuance but avoid speculation or tool suggestions.",
        }
    }
}

/// Looks up the prompt for a level tag. Unknown tags get [`DEFAULT_PROMPT`].
pub(crate) fn system_prompt(tag: &str) -> &'static str {
    Level::from_str(tag.trim())
        .map(Level::system_prompt)
        .unwrap_or(DEFAULT_PROMPT)
}

/// The persona selected for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Persona {
    Level(Level),
    /// A free-text system prompt supplied by the user
    Custom(String),
    Default,
}

impl Persona {
    /// Resolves a level tag. Unknown tags select the default persona.
    pub(crate) fn from_tag(tag: &str) -> Persona {
        match Level::from_str(tag.trim()) {
            Ok(level) => Persona::Level(level),
            Err(_) => Persona::Default,
        }
    }

    pub(crate) fn system_prompt(&self) -> &str {
        match self {
            Persona::Level(level) => level.system_prompt(),
            Persona::Custom(prompt) => prompt,
            Persona::Default => DEFAULT_PROMPT,
        }
    }

    /// Short label for prompts and diagnostics.
    pub(crate) fn label(&self) -> String {
        match self {
            Persona::Level(level) => level.to_string(),
            Persona::Custom(_) => "custom".to_string(),
            Persona::Default => "default".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_known_levels() {
        assert!(system_prompt("A1").contains("friendly French tutor"));
        assert!(system_prompt("A2").contains("patient French tutor"));
        assert!(system_prompt("C2").starts_with("You are a French language professor."));

        for level in Level::iter() {
            assert_eq!(system_prompt(&level.to_string()), level.system_prompt());
            assert_ne!(level.system_prompt(), DEFAULT_PROMPT);
        }
    }

    #[test]
    fn test_unknown_level_falls_back() {
        for tag in ["Z9", "", "A", "A1 B1", "débutant"] {
            assert_eq!(system_prompt(tag), "You are a helpful French tutor.");
        }
    }

    #[test]
    fn test_tags_are_case_insensitive() {
        assert_eq!(system_prompt("b2"), Level::B2.system_prompt());
        assert_eq!(Persona::from_tag(" c1 "), Persona::Level(Level::C1));
    }

    #[test]
    fn test_persona_prompts() {
        assert_eq!(
            Persona::Custom("Tu es un poète.".to_string()).system_prompt(),
            "Tu es un poète."
        );
        assert_eq!(Persona::from_tag("Z9"), Persona::Default);
        assert_eq!(Persona::Default.system_prompt(), DEFAULT_PROMPT);
        assert_eq!(Persona::Level(Level::A1).label(), "A1");
    }
}
