//! Sampling parameters sent with every completion request.

use std::ops::RangeInclusive;

pub(crate) const MAX_TOKENS_RANGE: RangeInclusive<u32> = 1..=2048;
pub(crate) const TEMPERATURE_RANGE: RangeInclusive<f64> = 0.1..=4.0;
pub(crate) const TOP_P_RANGE: RangeInclusive<f64> = 0.1..=1.0;

/// Generation parameters for a single request.
///
/// These are passed through to the service as-is. Range checking belongs to
/// whoever collects them from the user; see [`GenerationParameters::clamped`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct GenerationParameters {
    /// Upper bound on the length of the reply, in tokens
    pub max_tokens: u32,
    pub temperature: f64,
    /// Nucleus sampling mass, in (0, 1]
    pub top_p: f64,
}

impl Default for GenerationParameters {
    fn default() -> Self {
        GenerationParameters {
            max_tokens: 400,
            temperature: 0.5,
            top_p: 0.85,
        }
    }
}

fn clamp_to<T: PartialOrd + Copy>(value: T, range: &RangeInclusive<T>) -> T {
    if value < *range.start() {
        *range.start()
    } else if value > *range.end() {
        *range.end()
    } else {
        value
    }
}

impl GenerationParameters {
    /// Returns a copy with every field forced into its allowed range. NaN
    /// values are replaced by the default.
    pub(crate) fn clamped(self) -> GenerationParameters {
        let defaults = GenerationParameters::default();

        let temperature = if self.temperature.is_nan() {
            defaults.temperature
        } else {
            clamp_to(self.temperature, &TEMPERATURE_RANGE)
        };

        let top_p = if self.top_p.is_nan() {
            defaults.top_p
        } else {
            clamp_to(self.top_p, &TOP_P_RANGE)
        };

        GenerationParameters {
            max_tokens: clamp_to(self.max_tokens, &MAX_TOKENS_RANGE),
            temperature,
            top_p,
        }
    }
}

impl std::fmt::Display for GenerationParameters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "max_tokens={} temperature={} top_p={}",
            self.max_tokens, self.temperature, self.top_p
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_in_range() {
        let params = GenerationParameters::default();

        assert_eq!(params, params.clamped());
    }

    #[test]
    fn test_clamping() {
        let params = GenerationParameters {
            max_tokens: 0,
            temperature: 9.0,
            top_p: 0.0,
        }
        .clamped();

        assert_eq!(params.max_tokens, 1);
        assert_eq!(params.temperature, 4.0);
        assert_eq!(params.top_p, 0.1);

        let params = GenerationParameters {
            max_tokens: 100_000,
            temperature: f64::NAN,
            top_p: 1.5,
        }
        .clamped();

        assert_eq!(params.max_tokens, 2048);
        assert_eq!(params.temperature, 0.5);
        assert_eq!(params.top_p, 1.0);
    }
}
