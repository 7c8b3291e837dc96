mod table;

use strum::IntoEnumIterator;
use table::Table;

use crate::persona::{Level, DEFAULT_PROMPT};
use crate::{die, LevelsArgs, ListingFormat};

/// Prompts longer than this are cut in table listings unless `--full` is given.
const PROMPT_PREVIEW_CHARS: usize = 60;

#[derive(Debug, serde::Serialize)]
struct LevelEntry {
    level: String,
    system_prompt: &'static str,
}

fn entries() -> Vec<LevelEntry> {
    Level::iter()
        .map(|level| LevelEntry {
            level: level.to_string(),
            system_prompt: level.system_prompt(),
        })
        .chain(std::iter::once(LevelEntry {
            level: "default".to_string(),
            system_prompt: DEFAULT_PROMPT,
        }))
        .collect()
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_string(),
    }
}

fn table(entries: &[LevelEntry], full: bool) -> Table {
    let mut tab = Table::with_header(["LEVEL", "SYSTEM_PROMPT"]);

    for entry in entries {
        let prompt = if full {
            entry.system_prompt.to_string()
        } else {
            truncate(entry.system_prompt, PROMPT_PREVIEW_CHARS)
        };

        tab.add_row(vec![entry.level.clone(), prompt]);
    }

    tab
}

pub(crate) fn levels_cmd(args: &LevelsArgs) {
    let entries = entries();

    match args.format {
        ListingFormat::Json => match serde_json::to_string_pretty(&entries) {
            Ok(output) => println!("{}", output),
            Err(err) => die!("failed to serialize the level listing: {}", err),
        },
        ListingFormat::Table => print!("{}", table(&entries, args.full)),
        ListingFormat::HeaderlessTable => {
            let mut tab = table(&entries, args.full);

            tab.print_header(false);

            print!("{}", tab);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entries_cover_every_level_and_the_fallback() {
        let entries = entries();

        assert_eq!(entries.len(), 7);
        assert_eq!(entries[0].level, "A1");
        assert_eq!(entries[6].level, "default");
        assert_eq!(entries[6].system_prompt, "You are a helpful French tutor.");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("Bonjour", 10), "Bonjour");
        assert_eq!(truncate("Très bien", 4), "Très...");
    }

    #[test]
    fn test_table_truncates_unless_full() {
        let entries = entries();

        let short = table(&entries, false).to_string();
        let full = table(&entries, true).to_string();

        assert!(short.starts_with("LEVEL"));
        assert!(!short.contains(Level::C2.system_prompt()));
        assert!(full.contains(Level::C2.system_prompt()));
    }

    #[test]
    fn test_json_listing() {
        let json = serde_json::to_value(entries()).unwrap();

        assert_eq!(json[1]["level"], "A2");
        assert_eq!(json[1]["system_prompt"], Level::A2.system_prompt());
    }
}
