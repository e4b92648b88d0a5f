//! Distance to similarity percentage

/// Convert a squared L2 distance into a similarity percentage in (0, 100]
///
/// `100 / (1 + distance)`. Negative distances (float noise on identical
/// vectors) are treated as zero; NaN maps to the lowest similarity.
#[must_use]
pub fn similarity(distance: f32) -> f64 {
    let distance = f64::from(distance);
    if distance.is_nan() {
        return 0.0;
    }
    100.0 / (1.0 + distance.max(0.0))
}

/// Render a similarity as a two-decimal percentage, e.g. `87.50%`
#[must_use]
pub fn format_percent(similarity: f64) -> String {
    format!("{similarity:.2}%")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_distance_is_full_similarity() {
        assert!((similarity(0.0) - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn strictly_decreasing() {
        let distances = [0.0_f32, 0.01, 0.5, 1.0, 3.0, 10.0, 1e3, 1e6];
        let scores: Vec<f64> = distances.iter().map(|&d| similarity(d)).collect();
        assert!(scores.windows(2).all(|w| w[0] > w[1]));
        assert!(scores.iter().all(|&s| s > 0.0 && s <= 100.0));
    }

    #[test]
    fn known_values() {
        assert!((similarity(1.0) - 50.0).abs() < 1e-9);
        assert!((similarity(3.0) - 25.0).abs() < 1e-9);
    }

    #[test]
    fn negative_noise_clamps_to_full() {
        assert!((similarity(-1e-7) - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn formats_two_decimals() {
        assert_eq!(format_percent(similarity(3.0)), "25.00%");
        assert_eq!(format_percent(100.0 / 3.0), "33.33%");
    }
}
