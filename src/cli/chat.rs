mod highlighter;
mod prompt;
mod repl;

use std::io::{self, IsTerminal, Read, Write};
use std::path::Path;

use futures_util::StreamExt;
use tokio::{select, signal};
use tracing::info;

use self::repl::Repl;
use crate::chat::History;
use crate::config::{self, Config};
use crate::params::GenerationParameters;
use crate::persona::Persona;
use crate::providers::{HuggingFaceProvider, DEFAULT_API_BASE, DEFAULT_MODEL};
use crate::relay::{self, FAILURE_NOTICE};
use crate::{die, warn, ChatArgs};
use prompt::tutor_prompt;

/// Everything a turn needs. The front end owns the history and hands it to
/// the relay on every turn.
pub(crate) struct Session {
    pub provider: HuggingFaceProvider,
    pub model: String,
    pub persona: Persona,
    pub params: GenerationParameters,
    pub history: History,
}

/// Picks the persona: free text beats a level, the command line beats the
/// config file.
fn resolve_persona(args: &ChatArgs, config: &config::Tutor) -> Persona {
    if let Some(persona) = &args.persona {
        return Persona::Custom(persona.clone());
    }

    if let Some(level) = &args.level {
        return level_persona(level);
    }

    if let Some(persona) = &config.persona {
        return Persona::Custom(persona.clone());
    }

    match &config.level {
        Some(level) => level_persona(level),
        None => Persona::Level(Default::default()),
    }
}

fn level_persona(tag: &str) -> Persona {
    let persona = Persona::from_tag(tag);

    if persona == Persona::Default {
        warn!("unknown level \"{}\", using the default tutor", tag);
    }

    persona
}

fn resolve_params(args: &ChatArgs, config: &config::Generation) -> GenerationParameters {
    let defaults = GenerationParameters::default();

    let requested = GenerationParameters {
        max_tokens: args
            .max_tokens
            .or(config.max_tokens)
            .unwrap_or(defaults.max_tokens),
        temperature: args
            .temperature
            .or(config.temperature)
            .unwrap_or(defaults.temperature),
        top_p: args.top_p.or(config.top_p).unwrap_or(defaults.top_p),
    };

    let params = requested.clamped();

    if params != requested {
        warn!("generation parameters out of range, using {}", params);
    }

    params
}

fn load_history(path: &Path) -> History {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) => die!("failed to read history \"{}\": {}", path.display(), err),
    };

    match serde_json::from_str::<History>(&raw) {
        Ok(history) => history,
        Err(err) => die!(
            "history \"{}\" must be a list of [user, assistant] pairs or of {{role, content}} messages: {}",
            path.display(),
            err
        ),
    }
}

fn flush_or_die() {
    if let Err(err) = io::stdout().flush() {
        die!("failed to flush the output stream: {}", err);
    }
}

pub(crate) async fn chat_cmd(config: Config, args: &ChatArgs) {
    let in_terminal = io::stdin().is_terminal();
    let out_terminal = io::stdout().is_terminal();

    // Without an explicit prompt, run interactively only when attached to a terminal.
    let interactive = if args.prompt.is_some() {
        args.interactive
    } else {
        in_terminal && out_terminal
    };

    if args.prompt.is_some() && !in_terminal {
        die!("it appears that an initial prompt is being provided both through standard input and the prompt argument");
    }

    let initial_prompt = if let Some(prompt) = &args.prompt {
        Some(prompt.clone())
    } else if !in_terminal {
        let mut buf = String::new();

        if let Err(err) = io::stdin().read_to_string(&mut buf) {
            die!("failed to read the initial prompt from standard input: {}", err);
        }

        Some(buf)
    } else {
        None
    };

    if !interactive && initial_prompt.as_deref().map_or(true, |p| p.trim().is_empty()) {
        die!("the prompt is empty, there is nothing to ask");
    }

    let api_key = match config.api_key() {
        Ok(api_key) => api_key,
        Err(err) => die!("{}", err),
    };

    if api_key.is_none() {
        info!(
            "no API token configured, set {} for authenticated access",
            config::TOKEN_ENV_VAR
        );
    }

    let api_base = args
        .api_base
        .clone()
        .or_else(|| config.endpoint.api_base.clone())
        .unwrap_or_else(|| DEFAULT_API_BASE.to_string());

    let provider = match HuggingFaceProvider::new(api_base.as_str(), api_key.as_deref(), config.timeout()) {
        Ok(provider) => provider,
        Err(err) => die!("invalid api base \"{}\": {}", api_base, err),
    };

    let model = args
        .model
        .clone()
        .or_else(|| config.endpoint.model.clone())
        .unwrap_or_else(|| DEFAULT_MODEL.to_string());

    let history = match &args.history {
        Some(path) => load_history(path),
        None => History::default(),
    };

    if !history.is_empty() {
        info!("resuming a conversation of {} messages", history.normalize().len());
    }

    let mut session = Session {
        provider,
        model,
        persona: resolve_persona(args, &config.tutor),
        params: resolve_params(args, &config.generation),
        history,
    };

    // If the output is a terminal (e.g., user-facing), incrementally print it.
    let incremental = out_terminal;

    chat(
        &mut session,
        config.keybindings,
        initial_prompt,
        interactive,
        incremental,
    )
    .await;
}

/// Streams one reply to standard output. Returns the final text, or `None`
/// when the turn should not be recorded: it was abandoned with Ctrl-C or the
/// request failed.
async fn stream_reply(session: &Session, message: &str, incremental: bool) -> Option<String> {
    let (reply, abandoned) = {
        let stream = relay::respond(
            &session.provider,
            &session.model,
            message,
            &session.history,
            session.persona.system_prompt(),
            session.params,
        );

        futures_util::pin_mut!(stream);

        let mut latest = String::new();
        let mut abandoned = false;

        loop {
            select! {
                update = stream.next() => {
                    let text = match update {
                        Some(text) => text,
                        None => break,
                    };

                    if incremental {
                        match text.strip_prefix(latest.as_str()) {
                            Some(suffix) => print!("{}", suffix),
                            None => print!("\n{}", text),
                        }

                        flush_or_die();
                    }

                    latest = text;
                }
                _ = signal::ctrl_c() => {
                    abandoned = true;
                    break;
                }
            }
        }

        (latest, abandoned)
    };

    if incremental {
        println!("\n");
    } else {
        println!("{}", reply);
    }

    if abandoned || reply.starts_with(FAILURE_NOTICE) {
        None
    } else {
        Some(reply)
    }
}

async fn chat(
    session: &mut Session,
    keybindings: config::Keybindings,
    initial_prompt: Option<String>,
    interactive: bool,
    incremental: bool,
) {
    if interactive {
        println!(
            "{} version {} ({}, tutor {})",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
            session.model,
            session.persona.label()
        );
    }

    let mut pending_prompt = initial_prompt;

    // Only initialize the REPL if it is really needed.
    let mut repl = if interactive {
        Some(Repl::new(keybindings))
    } else {
        None
    };

    loop {
        let message = match (pending_prompt.take(), repl.as_mut()) {
            (Some(prompt), _) => prompt,
            (None, Some(repl)) => match repl.edit(session) {
                Some(message) => message,
                None => break,
            },
            (None, None) => break,
        };

        if interactive {
            print!("{}", tutor_prompt(&session.persona.label()));
            flush_or_die();
        }

        if let Some(reply) = stream_reply(session, &message, incremental).await {
            session.history.push_turn(message, reply);
        }

        if !interactive {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persona::Level;

    fn args(argv: &[&str]) -> ChatArgs {
        use clap::Parser;

        ChatArgs::parse_from(std::iter::once("chat").chain(argv.iter().copied()))
    }

    #[test]
    fn test_persona_precedence() {
        let tutor = config::Tutor {
            level: Some("C1".to_string()),
            persona: None,
        };

        assert_eq!(resolve_persona(&args(&[]), &tutor), Persona::Level(Level::C1));
        assert_eq!(
            resolve_persona(&args(&["--level", "a2"]), &tutor),
            Persona::Level(Level::A2)
        );
        assert_eq!(
            resolve_persona(&args(&["--persona", "Sois bref."]), &tutor),
            Persona::Custom("Sois bref.".to_string())
        );
        assert_eq!(
            resolve_persona(&args(&["--level", "Z9"]), &tutor),
            Persona::Default
        );
        assert_eq!(
            resolve_persona(&args(&[]), &config::Tutor::default()),
            Persona::Level(Level::A1)
        );
    }

    #[test]
    fn test_params_precedence_and_clamping() {
        let generation = config::Generation {
            max_tokens: Some(100),
            temperature: Some(1.0),
            top_p: None,
        };

        let params = resolve_params(&args(&["--temperature", "7.5"]), &generation);

        assert_eq!(params.max_tokens, 100);
        assert_eq!(params.temperature, 4.0);
        assert_eq!(params.top_p, 0.85);
    }
}
