use crate::color;

/// Renders learner input in bold, and slash commands in the command color.
#[derive(Default)]
pub(crate) struct Highlighter;

impl reedline::Highlighter for Highlighter {
    fn highlight(&self, line: &str, _cursor: usize) -> reedline::StyledText {
        let style = if line.starts_with('/') {
            *color::COMMAND_TEXT
        } else {
            *color::USER_TEXT
        };

        reedline::StyledText {
            buffer: vec![(style, line.to_string())],
        }
    }
}
