//! Type definitions for chat primitives
//!

use serde::{Deserialize, Serialize};

/// The author of a `Message`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub(crate) enum Role {
    /// An authoritative message which conditions the tutor persona. It
    /// always appears first in a transcript.
    System,

    /// A message authored by the learner
    User,

    /// A message authored by the model
    Assistant,
}

/// A `Message` in a chat conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Message {
    /// The author of the message
    pub role: Role,
    /// The contents of the message
    pub content: String,
}

impl Message {
    pub(crate) fn new(role: Role, content: String) -> Message {
        Message { role, content }
    }

    pub(crate) fn system(content: &str) -> Message {
        Message::new(Role::System, content.to_string())
    }

    pub(crate) fn user(content: &str) -> Message {
        Message::new(Role::User, content.to_string())
    }

    pub(crate) fn assistant(content: &str) -> Message {
        Message::new(Role::Assistant, content.to_string())
    }
}

/// One completed exchange. Either half may be absent, for example when a
/// reply was abandoned.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub(crate) struct Turn(pub Option<String>, pub Option<String>);

/// Prior turns of a conversation, as handed over by the front end.
///
/// Two shapes are accepted: a list of `[user, assistant]` pairs, or a flat
/// list of already role-tagged messages. A list mixing both shapes is
/// rejected when deserializing.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub(crate) enum History {
    Pairs(Vec<Turn>),
    Messages(Vec<Message>),
}

impl Default for History {
    fn default() -> Self {
        History::Pairs(Vec::new())
    }
}

fn non_empty(text: &Option<String>) -> Option<&str> {
    text.as_deref().filter(|t| !t.is_empty())
}

impl History {
    pub(crate) fn is_empty(&self) -> bool {
        match self {
            History::Pairs(turns) => turns.is_empty(),
            History::Messages(messages) => messages.is_empty(),
        }
    }

    /// Flattens the history into role-tagged messages in chronological order.
    ///
    /// Pairs contribute their user half then their assistant half; empty
    /// halves are skipped. Tagged messages are passed through in order,
    /// except `system` entries: the transcript carries exactly one system
    /// prompt, and it is the current persona's.
    pub(crate) fn normalize(&self) -> Vec<Message> {
        match self {
            History::Pairs(turns) => {
                let mut messages = Vec::with_capacity(turns.len() * 2);

                for turn in turns {
                    if let Some(user) = non_empty(&turn.0) {
                        messages.push(Message::user(user));
                    }

                    if let Some(assistant) = non_empty(&turn.1) {
                        messages.push(Message::assistant(assistant));
                    }
                }

                messages
            }
            History::Messages(messages) => messages
                .iter()
                .filter(|m| m.role != Role::System)
                .cloned()
                .collect(),
        }
    }

    /// Records a completed exchange, keeping the history's shape.
    pub(crate) fn push_turn(&mut self, user: String, assistant: String) {
        match self {
            History::Pairs(turns) => turns.push(Turn(Some(user), Some(assistant))),
            History::Messages(messages) => {
                messages.push(Message::new(Role::User, user));
                messages.push(Message::new(Role::Assistant, assistant));
            }
        }
    }

    pub(crate) fn clear(&mut self) {
        match self {
            History::Pairs(turns) => turns.clear(),
            History::Messages(messages) => messages.clear(),
        }
    }
}

/// Assembles the transcript sent for one turn: the system prompt, then the
/// prior turns, then the new user message.
pub(crate) fn build_messages(system_prompt: &str, history: &History, message: &str) -> Vec<Message> {
    let mut messages = vec![Message::system(system_prompt)];

    messages.extend(history.normalize());

    messages.push(Message::user(message));

    messages
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roles(messages: &[Message]) -> Vec<Role> {
        messages.iter().map(|m| m.role).collect()
    }

    #[test]
    fn test_empty_history() {
        let messages = build_messages("prompt", &History::default(), "Bonjour");

        assert_eq!(
            messages,
            vec![Message::system("prompt"), Message::user("Bonjour")]
        );
    }

    #[test]
    fn test_paired_history_alternates() {
        let history = History::Pairs(vec![
            Turn(Some("Salut".into()), Some("Salut ! Ça va ?".into())),
            Turn(Some("Oui".into()), Some("Très bien.".into())),
        ]);

        let messages = build_messages("prompt", &history, "Merci");

        assert_eq!(
            roles(&messages),
            vec![
                Role::System,
                Role::User,
                Role::Assistant,
                Role::User,
                Role::Assistant,
                Role::User
            ]
        );
        assert_eq!(messages[2].content, "Salut ! Ça va ?");
        assert_eq!(messages.last().unwrap().content, "Merci");
    }

    #[test]
    fn test_paired_history_skips_empty_halves() {
        let history = History::Pairs(vec![
            Turn(Some("Une question".into()), None),
            Turn(Some(String::new()), Some("Une réponse".into())),
        ]);

        let messages = build_messages("prompt", &history, "Et alors ?");

        assert_eq!(
            messages,
            vec![
                Message::system("prompt"),
                Message::user("Une question"),
                Message::assistant("Une réponse"),
                Message::user("Et alors ?"),
            ]
        );
    }

    #[test]
    fn test_flat_history_is_kept_verbatim() {
        let flat = vec![
            Message::user("Comment dit-on cat ?"),
            Message::assistant("On dit « chat »."),
            Message::assistant("Le mot vient du latin cattus."),
        ];

        let messages = build_messages("prompt", &History::Messages(flat.clone()), "Et dog ?");

        assert_eq!(messages.len(), flat.len() + 2);
        assert_eq!(messages[0], Message::system("prompt"));
        assert_eq!(&messages[1..=flat.len()], flat.as_slice());
        assert_eq!(messages[flat.len() + 1], Message::user("Et dog ?"));
    }

    #[test]
    fn test_flat_history_drops_system_entries() {
        let history: History = serde_json::from_str(
            r#"[
                {"role": "system", "content": "You are a pirate."},
                {"role": "user", "content": "Bonjour"},
                {"role": "assistant", "content": "Bonjour !"}
            ]"#,
        )
        .unwrap();

        let messages = build_messages("prompt", &history, "Ça va ?");

        assert_eq!(
            roles(&messages),
            vec![Role::System, Role::User, Role::Assistant, Role::User]
        );
        assert_eq!(messages[0], Message::system("prompt"));
    }

    #[test]
    fn test_deserialize_pairs() {
        let history: History =
            serde_json::from_str(r#"[["Bonjour", "Bonjour !"], ["Au revoir", null]]"#).unwrap();

        assert_eq!(
            history,
            History::Pairs(vec![
                Turn(Some("Bonjour".into()), Some("Bonjour !".into())),
                Turn(Some("Au revoir".into()), None),
            ])
        );
    }

    #[test]
    fn test_deserialize_tagged_messages() {
        let history: History = serde_json::from_str(
            r#"[{"role": "user", "content": "Bonjour"}, {"role": "assistant", "content": "Salut"}]"#,
        )
        .unwrap();

        assert_eq!(
            history,
            History::Messages(vec![Message::user("Bonjour"), Message::assistant("Salut")])
        );
    }

    #[test]
    fn test_deserialize_empty_list() {
        let history: History = serde_json::from_str("[]").unwrap();

        assert!(history.is_empty());
        assert!(history.normalize().is_empty());
    }

    #[test]
    fn test_push_turn_keeps_shape() {
        let mut pairs = History::default();
        pairs.push_turn("a".into(), "b".into());
        assert_eq!(pairs, History::Pairs(vec![Turn(Some("a".into()), Some("b".into()))]));

        let mut flat = History::Messages(Vec::new());
        flat.push_turn("a".into(), "b".into());
        assert_eq!(
            flat,
            History::Messages(vec![Message::user("a"), Message::assistant("b")])
        );

        flat.clear();
        assert!(flat.is_empty());
    }
}
