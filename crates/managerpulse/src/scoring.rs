//! Mean-of-present scoring used by reviews and company aggregates.
//!
//! Reviewers may skip questions, so unanswered ratings are left out of the
//! mean instead of counting as zero. When nothing was answered there is no
//! score to claim and the result is `None`.

/// Mean of the values that are present, or `None` when all are absent.
pub fn mean_of_present<I, T>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = Option<T>>,
    T: Into<f64>,
{
    let (sum, count) = values
        .into_iter()
        .flatten()
        .fold((0.0_f64, 0_u32), |(sum, count), value| {
            (sum + value.into(), count + 1)
        });

    if count == 0 {
        None
    } else {
        Some(sum / f64::from(count))
    }
}

/// Representative score of a single review from its five 1-5 ratings.
pub fn average_score(ratings: [Option<i64>; 5]) -> Option<f64> {
    // Ratings are validated to 1..=5, so the conversion is exact.
    mean_of_present(ratings.map(|rating| rating.map(|value| value as f64)))
}

/// Representative score of a company aggregate from its five averages.
pub fn overall_score(averages: [Option<f64>; 5]) -> Option<f64> {
    mean_of_present(averages)
}

/// One-decimal rendering used by list and detail views; absent renders as `-`.
pub fn format_score(score: Option<f64>) -> String {
    match score {
        Some(value) => format!("{value:.1}"),
        None => "-".to_string(),
    }
}
