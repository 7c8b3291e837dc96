use reedline::{
    default_emacs_keybindings, default_vi_insert_keybindings, default_vi_normal_keybindings,
    ColumnarMenu, DefaultCompleter, EditCommand, EditMode, Emacs, KeyCode, KeyModifiers,
    MenuBuilder, Reedline, ReedlineEvent, ReedlineMenu, Signal, Vi,
};
use nu_ansi_term::{Color, Style};

use crate::color::{self, MaybePaint};
use crate::config;
use crate::persona::{Level, Persona};
use crate::warn;

use super::highlighter::Highlighter;
use super::prompt::{completion_marker, Prompt};
use super::Session;

const HELP: &str = "\
/level <TAG>     switch to the tutor for a CEFR level (A1 to C2)
/persona <TEXT>  use TEXT as the tutor's system prompt
/params          show the generation parameters
/clear           forget the conversation so far
/exit            leave";

/// A line starting with `/`.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Command {
    Exit,
    Clear,
    Level(String),
    Persona(String),
    Params,
    Help,
    Unknown(String),
}

/// Recognizes REPL commands. Anything not starting with `/` is a message.
pub(crate) fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim();

    if !line.starts_with('/') {
        return None;
    }

    let (name, rest) = match line.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (line, ""),
    };

    Some(match name {
        "/exit" | "/quit" => Command::Exit,
        "/clear" => Command::Clear,
        "/level" => Command::Level(rest.to_string()),
        "/persona" => Command::Persona(rest.to_string()),
        "/params" => Command::Params,
        "/help" => Command::Help,
        other => Command::Unknown(other.to_string()),
    })
}

fn notice(text: &str) {
    println!("{}", color::NOTICE_TEXT.maybe_paint(text));
}

fn edit_mode(keybindings: config::Keybindings) -> Box<dyn EditMode> {
    match keybindings {
        config::Keybindings::Vi => {
            let mut insert_bindings = default_vi_insert_keybindings();

            insert_bindings.add_binding(
                KeyModifiers::NONE,
                KeyCode::Tab,
                ReedlineEvent::UntilFound(vec![
                    ReedlineEvent::Menu("completion_menu".to_string()),
                    ReedlineEvent::MenuNext,
                ]),
            );

            Box::new(Vi::new(insert_bindings, default_vi_normal_keybindings()))
        }
        config::Keybindings::Emacs => {
            let mut keybindings = default_emacs_keybindings();

            keybindings.add_binding(
                KeyModifiers::NONE,
                KeyCode::Tab,
                ReedlineEvent::UntilFound(vec![
                    ReedlineEvent::Menu("completion_menu".to_string()),
                    ReedlineEvent::MenuNext,
                ]),
            );

            keybindings.add_binding(
                KeyModifiers::CONTROL,
                KeyCode::Char('j'),
                ReedlineEvent::Edit(vec![EditCommand::InsertNewline]),
            );

            Box::new(Emacs::new(keybindings))
        }
    }
}

pub(crate) struct Repl {
    line_editor: Reedline,
    prompt: Prompt,
}

impl Repl {
    pub(crate) fn new(keybindings: config::Keybindings) -> Repl {
        use strum::IntoEnumIterator;

        let mut commands: Vec<String> = ["/exit", "/clear", "/params", "/persona", "/help"]
            .iter()
            .map(|c| c.to_string())
            .collect();

        commands.extend(Level::iter().map(|level| format!("/level {}", level)));

        let mut completer = Box::new(DefaultCompleter::with_inclusions(&['/', ' ']));

        completer.insert(commands);

        let completion_menu = Box::new(
            ColumnarMenu::default()
                .with_name("completion_menu")
                .with_marker(&completion_marker().to_string())
                .with_text_style(Style::new().fg(Color::Default))
                .with_selected_text_style(Style::new().fg(Color::Blue).on(Color::DarkGray))
                .with_selected_match_text_style(
                    Style::new().fg(Color::Blue).bold().on(Color::DarkGray),
                ),
        );

        let line_editor = Reedline::create()
            .with_completer(completer)
            .with_menu(ReedlineMenu::EngineCompleter(completion_menu))
            .with_edit_mode(edit_mode(keybindings))
            .with_highlighter(Box::new(Highlighter));

        Repl {
            line_editor,
            prompt: Prompt::default(),
        }
    }

    fn apply(&self, command: Command, session: &mut Session) {
        match command {
            Command::Exit => {}
            Command::Clear => {
                session.history.clear();
                notice("conversation cleared");
            }
            Command::Level(tag) => {
                session.persona = Persona::from_tag(&tag);

                if session.persona == Persona::Default {
                    warn!("unknown level \"{}\", using the default tutor", tag);
                } else {
                    notice(&format!("level set to {}", session.persona.label()));
                }
            }
            Command::Persona(text) if text.is_empty() => {
                warn!("usage: /persona <TEXT>");
            }
            Command::Persona(text) => {
                session.persona = Persona::Custom(text);
                notice("custom persona set");
            }
            Command::Params => notice(&format!("model={} {}", session.model, session.params)),
            Command::Help => notice(HELP),
            Command::Unknown(name) => warn!("unknown command \"{}\", try /help", name),
        }
    }

    /// Reads lines until the learner enters a message, which is returned.
    /// Returns `None` when the session should end.
    pub(crate) fn edit(&mut self, session: &mut Session) -> Option<String> {
        loop {
            let sig = self.line_editor.read_line(&self.prompt);

            match sig {
                Ok(Signal::Success(line)) => match parse_command(&line) {
                    Some(Command::Exit) => return None,
                    Some(command) => self.apply(command, session),
                    None if line.trim().is_empty() => continue,
                    None => return Some(line),
                },
                Ok(Signal::CtrlD) => return None,
                Ok(Signal::CtrlC) => continue,
                #[allow(unreachable_patterns)]
                Ok(_) => return None,
                Err(err) => {
                    warn!("failed to read input: {}", err);
                    return None;
                }
            }
        }
    }
}
