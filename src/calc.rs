use chrono::NaiveDate;
use std::collections::BTreeMap;

/// Average of all scores recorded on one date, used for progress charts.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyAverage {
    pub date: NaiveDate,
    pub average: f64,
    pub sample_count: usize,
}

/// Group (date, score) points by date and average each day's scores,
/// ascending by date.
pub fn progress_series<I>(points: I) -> Vec<DailyAverage>
where
    I: IntoIterator<Item = (NaiveDate, f64)>,
{
    let mut by_date: BTreeMap<NaiveDate, Vec<f64>> = BTreeMap::new();
    for (date, score) in points {
        by_date.entry(date).or_default().push(score);
    }
    by_date
        .into_iter()
        .map(|(date, scores)| DailyAverage {
            date,
            average: scores.iter().sum::<f64>() / (scores.len() as f64),
            sample_count: scores.len(),
        })
        .collect()
}

pub fn mean<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = f64>,
{
    let mut sum = 0.0;
    let mut count: usize = 0;
    for v in values {
        sum += v;
        count += 1;
    }
    if count == 0 {
        None
    } else {
        Some(sum / (count as f64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("date")
    }

    #[test]
    fn series_groups_by_date_ascending() {
        let series = progress_series(vec![
            (d("2025-03-10"), 80.0),
            (d("2025-03-01"), 60.0),
            (d("2025-03-10"), 90.0),
            (d("2025-03-01"), 70.0),
        ]);
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].date, d("2025-03-01"));
        assert_eq!(series[0].average, 65.0);
        assert_eq!(series[0].sample_count, 2);
        assert_eq!(series[1].average, 85.0);
    }

    #[test]
    fn series_of_nothing_is_empty() {
        assert!(progress_series(Vec::new()).is_empty());
    }

    #[test]
    fn mean_of_empty_is_none() {
        assert_eq!(mean(Vec::new()), None);
        assert_eq!(mean(vec![70.0, 90.0]), Some(80.0));
    }
}
