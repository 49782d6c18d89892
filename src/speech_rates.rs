//! Text-to-speech rate presets

use std::sync::LazyLock;

/// Rate used for keys outside the preset table
pub const DEFAULT_RATE: f32 = 1.0;

static RATES: LazyLock<Vec<(&'static str, f32)>> = LazyLock::new(|| {
    vec![("0.75x", 0.75), ("1x", 1.0), ("1.5x", 1.5), ("2x", 2.0)]
});

/// Presets in display order, as `(label, multiplier)`
#[must_use]
pub fn rates() -> &'static [(&'static str, f32)] {
    &RATES
}

#[must_use]
pub fn rate_for(key: &str) -> f32 {
    RATES
        .iter()
        .find(|(label, _)| *label == key)
        .map_or(DEFAULT_RATE, |(_, rate)| *rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_keep_their_order() {
        let labels: Vec<_> = rates().iter().map(|(label, _)| *label).collect();
        assert_eq!(labels, ["0.75x", "1x", "1.5x", "2x"]);
    }

    #[test]
    fn known_and_unknown_keys() {
        assert_eq!(rate_for("1.5x"), 1.5);
        assert_eq!(rate_for("0.75x"), 0.75);
        assert_eq!(rate_for("3x"), DEFAULT_RATE);
        assert_eq!(rate_for(""), DEFAULT_RATE);
    }
}
