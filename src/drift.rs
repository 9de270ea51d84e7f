//! Distribution drift detection with the Population Stability Index.
//!
//! Bins come from the reference distribution: edges sit at evenly spaced
//! percentiles of the reference, with the outermost edges pushed to
//! -inf/+inf so every current value lands in some bin. Bin frequencies get
//! additive smoothing so empty bins never produce `ln(0)` or a division by
//! zero.

use crate::feature_extractor::{FeatureExtractor, FeatureVector, FEATURE_NAMES};
use crate::types::score::round_score;
use crate::types::transaction::Transaction;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;
use tracing::{debug, warn};

/// PSI below this is no drift
pub const SLIGHT_DRIFT_PSI: f64 = 0.1;
/// PSI at or above this is significant drift
pub const SIGNIFICANT_DRIFT_PSI: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DriftSeverity {
    NoDrift,
    SlightDrift,
    SignificantDrift,
}

impl DriftSeverity {
    pub fn from_psi(psi: f64) -> Self {
        if psi < SLIGHT_DRIFT_PSI {
            DriftSeverity::NoDrift
        } else if psi < SIGNIFICANT_DRIFT_PSI {
            DriftSeverity::SlightDrift
        } else {
            DriftSeverity::SignificantDrift
        }
    }
}

/// Binning parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PsiConfig {
    pub bins: usize,
    /// Added to every bin count before normalizing
    pub smoothing: f64,
}

impl Default for PsiConfig {
    fn default() -> Self {
        Self {
            bins: 10,
            smoothing: 0.001,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureDrift {
    pub psi: f64,
    pub status: DriftSeverity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftReport {
    pub features: BTreeMap<String, FeatureDrift>,
    /// Worst per-feature severity
    pub overall_status: DriftSeverity,
    pub max_psi: f64,
    /// Requested features that were not evaluated
    pub skipped: Vec<String>,
}

/// Column-oriented numeric dataset
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    columns: BTreeMap<String, Vec<f64>>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a column, dropping non-finite values
    pub fn insert_column(&mut self, name: impl Into<String>, values: Vec<f64>) {
        let values = values.into_iter().filter(|v| v.is_finite()).collect();
        self.columns.insert(name.into(), values);
    }

    pub fn with_column(mut self, name: impl Into<String>, values: Vec<f64>) -> Self {
        self.insert_column(name, values);
        self
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// One column per derived feature
    pub fn from_feature_vectors<'a, I>(vectors: I) -> Self
    where
        I: IntoIterator<Item = &'a FeatureVector>,
    {
        let mut columns: Vec<Vec<f64>> = vec![Vec::new(); FEATURE_NAMES.len()];
        for vector in vectors {
            for (column, &value) in columns.iter_mut().zip(vector.values()) {
                column.push(value);
            }
        }

        let mut dataset = Self::new();
        for (name, values) in FEATURE_NAMES.iter().zip(columns) {
            dataset.insert_column(*name, values);
        }
        dataset
    }

    /// Derive features for every transaction and collect them column-wise
    pub fn from_transactions(transactions: &[Transaction], extractor: &FeatureExtractor) -> Self {
        let vectors: Vec<FeatureVector> = transactions.iter().map(|tx| extractor.extract(tx)).collect();
        Self::from_feature_vectors(&vectors)
    }

    /// Read a CSV with a header row.
    ///
    /// A column is kept only if every non-empty cell parses as a number or a
    /// boolean (`true`/`false`, mapped to 1/0); identifier and text columns
    /// drop out.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self> {
        let mut reader = csv::Reader::from_reader(reader);
        let headers: Vec<String> = reader
            .headers()
            .context("Failed to read CSV header")?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let mut columns: Vec<Option<Vec<f64>>> = vec![Some(Vec::new()); headers.len()];
        for (row, record) in reader.records().enumerate() {
            let record = record.with_context(|| format!("Failed to read CSV row {}", row + 1))?;
            for (idx, cell) in record.iter().enumerate() {
                let Some(Some(column)) = columns.get_mut(idx) else {
                    continue;
                };
                let cell = cell.trim();
                if cell.is_empty() {
                    continue;
                }
                match parse_cell(cell) {
                    Some(value) => column.push(value),
                    None => columns[idx] = None,
                }
            }
        }

        let mut dataset = Self::new();
        for (name, column) in headers.into_iter().zip(columns) {
            match column {
                Some(values) => dataset.insert_column(name, values),
                None => debug!(column = %name, "Skipping non-numeric column"),
            }
        }
        Ok(dataset)
    }

    pub fn from_csv_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open dataset {}", path.display()))?;
        Self::from_csv_reader(file).with_context(|| format!("Failed to parse {}", path.display()))
    }
}

fn parse_cell(cell: &str) -> Option<f64> {
    if let Ok(value) = cell.parse::<f64>() {
        return Some(value);
    }
    if cell.eq_ignore_ascii_case("true") {
        Some(1.0)
    } else if cell.eq_ignore_ascii_case("false") {
        Some(0.0)
    } else {
        None
    }
}

/// Percentile with linear interpolation between closest ranks
fn percentile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

/// Bin edges at evenly spaced reference percentiles, outer edges open
fn breakpoints(reference: &[f64], bins: usize) -> Vec<f64> {
    let mut sorted = reference.to_vec();
    sorted.sort_by(f64::total_cmp);

    let mut edges: Vec<f64> = (0..=bins)
        .map(|i| percentile(&sorted, i as f64 / bins as f64))
        .collect();
    edges[0] = f64::NEG_INFINITY;
    edges[bins] = f64::INFINITY;
    edges
}

/// Bin `i` holds `edges[i] <= x < edges[i + 1]`; the last bin is closed
fn bin_counts(values: &[f64], edges: &[f64]) -> Vec<u64> {
    let bins = edges.len() - 1;
    let mut counts = vec![0u64; bins];
    for &value in values {
        let upper = edges.partition_point(|&edge| edge <= value);
        let idx = upper.saturating_sub(1).min(bins - 1);
        counts[idx] += 1;
    }
    counts
}

fn proportions(counts: &[u64], total: usize, smoothing: f64) -> Vec<f64> {
    let denominator = total as f64 + smoothing * counts.len() as f64;
    counts
        .iter()
        .map(|&count| (count as f64 + smoothing) / denominator)
        .collect()
}

/// Population Stability Index of `actual` against `expected`.
///
/// Returns `None` when either sample is empty.
pub fn calculate_psi(expected: &[f64], actual: &[f64], config: &PsiConfig) -> Option<f64> {
    if expected.is_empty() || actual.is_empty() {
        return None;
    }
    let bins = config.bins.max(1);
    let edges = breakpoints(expected, bins);

    let expected_pct = proportions(&bin_counts(expected, &edges), expected.len(), config.smoothing);
    let actual_pct = proportions(&bin_counts(actual, &edges), actual.len(), config.smoothing);

    let psi = expected_pct
        .iter()
        .zip(&actual_pct)
        .map(|(&e, &a)| (a - e) * (a / e).ln())
        .sum();
    Some(psi)
}

/// Compare `current` against `reference` for each named feature.
///
/// Features missing from either dataset, or empty on either side, are
/// skipped rather than treated as errors.
pub fn check_drift(
    reference: &Dataset,
    current: &Dataset,
    features: &[impl AsRef<str>],
    config: &PsiConfig,
) -> DriftReport {
    let mut report = DriftReport {
        features: BTreeMap::new(),
        overall_status: DriftSeverity::NoDrift,
        max_psi: 0.0,
        skipped: Vec::new(),
    };
    let mut max_psi = 0.0f64;

    for feature in features {
        let name = feature.as_ref();
        let psi = match (reference.column(name), current.column(name)) {
            (Some(expected), Some(actual)) => calculate_psi(expected, actual, config),
            _ => None,
        };

        let Some(psi) = psi else {
            debug!(feature = %name, "Feature not comparable, skipping");
            report.skipped.push(name.to_string());
            continue;
        };

        let status = DriftSeverity::from_psi(psi);
        if status != DriftSeverity::NoDrift {
            warn!(feature = %name, psi, status = ?status, "Feature drift detected");
        }

        max_psi = max_psi.max(psi);
        report.overall_status = report.overall_status.max(status);
        report.features.insert(
            name.to_string(),
            FeatureDrift {
                psi: round_score(psi),
                status,
            },
        );
    }

    report.max_psi = round_score(max_psi);
    report
}

/// Drift monitor bound to one reference dataset
#[derive(Debug, Clone)]
pub struct DriftMonitor {
    reference: Dataset,
    features: Vec<String>,
    config: PsiConfig,
}

impl DriftMonitor {
    /// Monitor `features` with default binning
    pub fn new(reference: Dataset, features: Vec<String>) -> Self {
        Self::with_config(reference, features, PsiConfig::default())
    }

    pub fn with_config(reference: Dataset, features: Vec<String>, config: PsiConfig) -> Self {
        Self {
            reference,
            features,
            config,
        }
    }

    /// Monitor every derived model feature
    pub fn for_model_features(reference: Dataset, config: PsiConfig) -> Self {
        let features = FEATURE_NAMES.iter().map(|n| n.to_string()).collect();
        Self::with_config(reference, features, config)
    }

    /// Compare `current` against the bound reference
    pub fn check(&self, current: &Dataset) -> DriftReport {
        check_drift(&self.reference, current, &self.features, &self.config)
    }

    /// Features this monitor compares
    pub fn features(&self) -> &[String] {
        &self.features
    }
}
