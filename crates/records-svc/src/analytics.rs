//! Glucose time-in-range summary over stored measurement records.
//!
//! Bands follow the international consensus on CGM time in range:
//!
//! | band      | mg/dL      |
//! |-----------|------------|
//! | very low  | < 54       |
//! | low       | 54 – 69    |
//! | in range  | 70 – 180   |
//! | high      | 181 – 250  |
//! | very high | > 250      |
//!
//! Measurement documents carry `patient_id`, `type` (`"glucose"` or
//! `"insulin"`), a numeric `value` and an optional `unit` (`"mg/dL"` default,
//! or `"mmol/L"`). None of these fields are sensitive, so the summary reads
//! stored records directly.

use common::protocol::{GlucoseSummaryResponse, RangeBreakdown};
use uuid::Uuid;

use crate::records::model::{RecordKind, StoredRecord};
use crate::records::{RecordRepository, RepositoryError};

/// mg/dL per mmol/L of glucose.
pub const MMOL_TO_MG_DL: f64 = 18.0182;

/// Extract `patient_id`'s glucose readings, in mg/dL, from measurement records.
///
/// Records of other kinds, other patients, non-glucose types and non-numeric
/// or non-positive values are skipped.
pub fn glucose_readings(records: &[StoredRecord], patient_id: Uuid) -> Vec<f64> {
    let patient = patient_id.to_string();
    records
        .iter()
        .filter(|r| r.kind == RecordKind::Measurement)
        .map(|r| &r.document)
        .filter(|d| d.get("patient_id").and_then(|v| v.as_str()) == Some(patient.as_str()))
        .filter(|d| d.get("type").and_then(|v| v.as_str()) == Some("glucose"))
        .filter_map(|d| {
            let value = d.get("value")?.as_f64()?;
            let unit = d.get("unit").and_then(|v| v.as_str()).unwrap_or("mg/dL");
            let mg_dl = if unit.eq_ignore_ascii_case("mmol/l") {
                value * MMOL_TO_MG_DL
            } else {
                value
            };
            (mg_dl.is_finite() && mg_dl > 0.0).then_some(mg_dl)
        })
        .collect()
}

/// Summarise a set of glucose readings in mg/dL.
///
/// With no readings every statistic is `None` and every band is zero.
pub fn summarize(patient_id: Uuid, readings: &[f64]) -> GlucoseSummaryResponse {
    let n = readings.len();
    if n == 0 {
        return GlucoseSummaryResponse {
            patient_id,
            readings: 0,
            mean_mg_dl: None,
            min_mg_dl: None,
            max_mg_dl: None,
            coefficient_of_variation: None,
            gmi: None,
            time_in_range: RangeBreakdown::default(),
        };
    }

    let count = n as f64;
    let mean = readings.iter().sum::<f64>() / count;
    let variance = readings.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / count;
    let min = readings.iter().copied().fold(f64::INFINITY, f64::min);
    let max = readings.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    let mut bands = [0usize; 5];
    for &r in readings {
        bands[band(r)] += 1;
    }
    let pct = |c: usize| round1(c as f64 * 100.0 / count);

    GlucoseSummaryResponse {
        patient_id,
        readings: n,
        mean_mg_dl: Some(round1(mean)),
        min_mg_dl: Some(min),
        max_mg_dl: Some(max),
        coefficient_of_variation: Some(round1(variance.sqrt() / mean * 100.0)),
        gmi: Some(round1(3.31 + 0.02392 * mean)),
        time_in_range: RangeBreakdown {
            very_low: pct(bands[0]),
            low: pct(bands[1]),
            in_range: pct(bands[2]),
            high: pct(bands[3]),
            very_high: pct(bands[4]),
        },
    }
}

/// Summarise the glucose readings recorded for a stored patient.
///
/// # Errors
///
/// Returns [`RepositoryError::NotFound`] if `patient_id` is not a patient record.
pub fn patient_summary(
    repo: &RecordRepository,
    patient_id: Uuid,
) -> Result<GlucoseSummaryResponse, RepositoryError> {
    let patient = repo.get(patient_id)?;
    if patient.kind != RecordKind::Patient {
        return Err(RepositoryError::NotFound(patient_id));
    }
    let measurements = repo.list(RecordKind::Measurement)?;
    Ok(summarize(patient_id, &glucose_readings(&measurements, patient_id)))
}

fn band(mg_dl: f64) -> usize {
    match mg_dl {
        v if v < 54.0 => 0,
        v if v < 70.0 => 1,
        v if v <= 180.0 => 2,
        v if v <= 250.0 => 3,
        _ => 4,
    }
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}
