//! Classifier agreement, top counts, anomalies, and rare codes over defect facts.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::data::DefectFact;
use crate::types::{CanonicalKey, Description, FailureCode};

/// Recorded versus predicted failure code for one defect row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationSample {
    /// Zero-based row in the defect table.
    pub row: usize,
    /// Description as written.
    pub description: Description,
    /// Canonical form fed to the classifier.
    pub canonical: CanonicalKey,
    /// Code written in the defect log.
    pub recorded: FailureCode,
    /// Classifier output.
    pub predicted: FailureCode,
}

/// Share of rows where the classifier agrees with the recorded code.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgreementReport {
    /// Fraction in `0.0..=1.0`; 0 when there are no samples.
    pub kpi: f64,
    /// Samples with a recorded code.
    pub total: usize,
    /// Samples whose prediction matches the recorded code.
    pub agreeing: usize,
    /// Disagreeing samples in input order.
    pub divergences: Vec<ClassificationSample>,
}

/// Compare recorded and predicted codes.
pub fn agreement(samples: &[ClassificationSample]) -> AgreementReport {
    let divergences: Vec<ClassificationSample> = samples
        .iter()
        .filter(|sample| sample.recorded != sample.predicted)
        .cloned()
        .collect();
    let total = samples.len();
    let agreeing = total - divergences.len();
    let kpi = if total == 0 {
        0.0
    } else {
        agreeing as f64 / total as f64
    };
    AgreementReport {
        kpi,
        total,
        agreeing,
        divergences,
    }
}

/// Total for one key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyCount {
    /// Trimmed key.
    pub key: String,
    /// Summed weight.
    pub count: u64,
}

/// Sum weights per key (blank keys ignored), ordered by descending count.
/// Equal counts keep first-seen order; `top_n` of `None` keeps every key.
pub fn top_counts<'a, I>(items: I, top_n: Option<usize>) -> Vec<KeyCount>
where
    I: IntoIterator<Item = (&'a str, u64)>,
{
    let mut totals: IndexMap<&str, u64> = IndexMap::new();
    for (key, weight) in items {
        let key = key.trim();
        if !key.is_empty() {
            *totals.entry(key).or_insert(0) += weight;
        }
    }
    let mut out: Vec<KeyCount> = totals
        .into_iter()
        .map(|(key, count)| KeyCount {
            key: key.to_string(),
            count,
        })
        .collect();
    out.sort_by(|a, b| b.count.cmp(&a.count));
    if let Some(limit) = top_n {
        out.truncate(limit);
    }
    out
}

/// Defect volume per failure code.
pub fn failure_code_counts(defects: &[DefectFact]) -> Vec<KeyCount> {
    top_counts(
        defects
            .iter()
            .map(|fact| (fact.failure_code.as_str(), fact.count)),
        None,
    )
}

/// Defect volume per resolved model.
pub fn model_counts(defects: &[DefectFact], top_n: Option<usize>) -> Vec<KeyCount> {
    top_counts(
        defects.iter().map(|fact| (fact.model.as_str(), fact.count)),
        top_n,
    )
}

/// Defect volume per category.
pub fn category_counts(defects: &[DefectFact], top_n: Option<usize>) -> Vec<KeyCount> {
    top_counts(
        defects.iter().map(|fact| (fact.category.as_str(), fact.count)),
        top_n,
    )
}

/// Key whose count sits far above the mean.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    /// Anomalous key.
    pub key: String,
    /// Its total.
    pub count: u64,
    /// Standard deviations above the mean.
    pub z_score: f64,
}

/// Keys with `z >= z_threshold`, using the population standard deviation.
/// Uniform counts (zero deviation) produce no anomalies.
pub fn detect_anomalies(counts: &[KeyCount], z_threshold: f64) -> Vec<Anomaly> {
    if counts.is_empty() {
        return Vec::new();
    }
    let n = counts.len() as f64;
    let mean = counts.iter().map(|c| c.count as f64).sum::<f64>() / n;
    let variance = counts
        .iter()
        .map(|c| (c.count as f64 - mean).powi(2))
        .sum::<f64>()
        / n;
    let std_dev = variance.sqrt();
    if std_dev == 0.0 {
        return Vec::new();
    }
    counts
        .iter()
        .filter_map(|c| {
            let z_score = (c.count as f64 - mean) / std_dev;
            (z_score >= z_threshold).then(|| Anomaly {
                key: c.key.clone(),
                count: c.count,
                z_score,
            })
        })
        .collect()
}

/// Keys seen at most `threshold` times.
pub fn rare_keys(counts: &[KeyCount], threshold: u64) -> Vec<KeyCount> {
    counts
        .iter()
        .filter(|c| c.count <= threshold)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::metrics::{DEFAULT_ANOMALY_Z, DEFAULT_RARE_THRESHOLD};

    fn sample(row: usize, recorded: &str, predicted: &str) -> ClassificationSample {
        ClassificationSample {
            row,
            description: "nao liga".into(),
            canonical: "NAO_LIGA".into(),
            recorded: recorded.into(),
            predicted: predicted.into(),
        }
    }

    #[test]
    fn agreement_kpi_and_divergences() {
        let report = agreement(&[
            sample(0, "F001", "F001"),
            sample(1, "F002", "F001"),
            sample(2, "F003", "F003"),
            sample(3, "F004", ""),
        ]);
        assert_eq!(report.total, 4);
        assert_eq!(report.agreeing, 2);
        assert_eq!(report.kpi, 0.5);
        let rows: Vec<usize> = report.divergences.iter().map(|s| s.row).collect();
        assert_eq!(rows, vec![1, 3]);
        assert_eq!(agreement(&[]).kpi, 0.0);
    }

    #[test]
    fn top_counts_sum_and_keep_first_seen_on_ties() {
        let counts = top_counts(
            [("B", 2), ("A", 1), ("C", 3), ("A", 1), (" ", 9)],
            Some(3),
        );
        let keys: Vec<(&str, u64)> = counts.iter().map(|c| (c.key.as_str(), c.count)).collect();
        assert_eq!(keys, vec![("C", 3), ("B", 2), ("A", 2)]);
        assert_eq!(top_counts([("A", 1), ("B", 1)], Some(1))[0].key, "A");
    }

    #[test]
    fn anomalies_use_population_std() {
        let mut counts: Vec<KeyCount> = (0..9)
            .map(|i| KeyCount {
                key: format!("F00{i}"),
                count: 1,
            })
            .collect();
        counts.push(KeyCount {
            key: "F999".into(),
            count: 31,
        });
        // mean 4, population std 9, z(F999) = 3
        let anomalies = detect_anomalies(&counts, DEFAULT_ANOMALY_Z);
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].key, "F999");
        assert!((anomalies[0].z_score - 3.0).abs() < 1e-12);

        let uniform = vec![
            KeyCount {
                key: "A".into(),
                count: 2,
            },
            KeyCount {
                key: "B".into(),
                count: 2,
            },
        ];
        assert!(detect_anomalies(&uniform, 0.0).is_empty());
    }

    #[test]
    fn rare_keys_at_or_below_threshold() {
        let counts = top_counts([("A", 10), ("B", 3), ("C", 1)], None);
        let rare: Vec<String> = rare_keys(&counts, DEFAULT_RARE_THRESHOLD)
            .into_iter()
            .map(|c| c.key)
            .collect();
        assert_eq!(rare, vec!["B", "C"]);
    }
}
