//! User-facing diagnostics. These go to standard error, independent of the
//! tracing subscriber, and honor the color mode.

use crate::color::{self, MaybePaint};
use std::fmt;

pub const DEFAULT_EXIT_CODE: i32 = 1;

pub(crate) fn fmt_error<S: fmt::Display>(f: &mut impl fmt::Write, text: S) -> fmt::Result {
    write!(
        f,
        "{} {}",
        color::ERROR_INDICATOR.maybe_paint("error:"),
        color::ERROR_TEXT.maybe_paint(text.to_string())
    )
}

pub(crate) fn fmt_warn<S: fmt::Display>(f: &mut impl fmt::Write, text: S) -> fmt::Result {
    write!(
        f,
        "{} {}",
        color::WARNING_INDICATOR.maybe_paint("warning:"),
        color::WARNING_TEXT.maybe_paint(text.to_string())
    )
}

pub(crate) fn error_internal(text: &str) {
    let mut line = String::new();

    if fmt_error(&mut line, text).is_ok() {
        eprintln!("{}", line);
    }
}

pub(crate) fn warn_internal(text: &str) {
    let mut line = String::new();

    if fmt_warn(&mut line, text).is_ok() {
        eprintln!("{}", line);
    }
}

#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => ({
        let formatted = format!($($arg)*);
        $crate::utils::errors::warn_internal(&formatted);
    })
}

#[macro_export]
macro_rules! die {
    ($($arg:tt)*) => ({
        let formatted = format!($($arg)*);
        $crate::utils::errors::error_internal(&formatted);
        ::std::process::exit($crate::utils::errors::DEFAULT_EXIT_CODE);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::ColorMode;

    #[test]
    fn test_plain_diagnostics() {
        color::configure_color(ColorMode::Off);

        let mut out = String::new();
        fmt_warn(&mut out, "unknown level \"Z9\"").unwrap();
        assert_eq!(out, "warning: unknown level \"Z9\"");

        let mut out = String::new();
        fmt_error(&mut out, format_args!("{} failed", "request")).unwrap();
        assert_eq!(out, "error: request failed");
    }
}
