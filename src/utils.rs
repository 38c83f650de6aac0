//! Shared numeric policy helpers.

/// Round an estimated draw to the nearest whole watt.
pub fn round_watts(watts: f64) -> f64 {
    watts.round()
}

/// Round to two decimals (audit trail precision).
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(21488.4, 21488.0)]
    #[case(21488.5, 21489.0)]
    #[case(0.0, 0.0)]
    fn rounds_to_whole_watts(#[case] input: f64, #[case] expected: f64) {
        assert_eq!(round_watts(input), expected);
    }

    #[rstest]
    #[case(87.3333, 87.33)]
    #[case(62.5, 62.5)]
    #[case(100.0, 100.0)]
    fn rounds_to_two_decimals(#[case] input: f64, #[case] expected: f64) {
        assert_eq!(round2(input), expected);
    }
}
