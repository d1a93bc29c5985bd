//! Derivation rules for biodiversity observation records.
//!
//! A domain collaborator: it turns the raw observation listing into the
//! frame the credit calculation consumes, applying the filtering and
//! shaping rules of the pipeline. Each stage reports its surviving row
//! count so the run can be audited from the remote log table.

use chrono::{DateTime, Months, NaiveDate, Utc};

use verdant_core::{Frame, FrameError, LinkCache, Record, Value};

use crate::airtable::{TableRef, TableStore, link_target, resolve_linked_field};

/// Field on a species record carrying its common name.
const SPECIES_NAME_FIELD: &str = "species_name_common_es";

/// Columns of the derived observation frame, in order.
const OBSERVATION_COLUMNS: [&str; 9] = [
    "eco_id",
    "eco_date",
    "name_common",
    "name_latin",
    "radius",
    "score",
    "lat",
    "long",
    "iNaturalist",
];

/// One audited derivation stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageCount {
    /// Event label for the remote log table.
    pub label: String,
    /// Event detail, usually a row count.
    pub detail: String,
}

impl StageCount {
    fn of(label: &str, detail: impl Into<String>) -> Self {
        Self {
            label: label.to_owned(),
            detail: detail.into(),
        }
    }
}

/// Derived observation frame plus its audit trail.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationReport {
    /// The derived frame, newest observation first.
    pub frame: Frame,
    /// Stage counts in derivation order.
    pub stages: Vec<StageCount>,
}

/// Apply the observation derivation rules to a raw listing.
///
/// Rules, in order: keep records carrying an integrity score; flatten
/// one-element list values of the name columns; fold the score and radius
/// lists to their maxima (radius rounded to two decimals); resolve linked
/// species names as a fallback for missing common names; keep positive
/// radii and western-hemisphere longitudes; parse observation dates and
/// drop everything older than ten years; keep the calculation columns and
/// order the rows newest first.
///
/// # Errors
///
/// Returns an error when the listing lacks a column the derivation needs.
pub async fn derive_observations<S: TableStore + ?Sized>(
    store: &S,
    table: &TableRef,
    records: &[Record],
) -> Result<ObservationReport, FrameError> {
    let mut stages = vec![StageCount::of(
        "Total observations fetched:",
        records.len().to_string(),
    )];
    if records.is_empty() {
        return Ok(ObservationReport {
            frame: Frame::new(OBSERVATION_COLUMNS),
            stages,
        });
    }

    let mut frame = Frame::from_records(records);
    frame.ensure_column("iNaturalist");

    retain_by(&mut frame, "integrity_score", |value| !value.is_null())?;
    stages.push(StageCount::of(
        "Observations with integrity score:",
        frame.len().to_string(),
    ));

    frame.map_column("name_latin", flatten_single)?;
    frame.map_column("name_common_es", flatten_single)?;
    frame.rename_column("name_common_es", "name_common")?;
    frame.map_column("integrity_score", fold_max)?;
    frame.rename_column("integrity_score", "score")?;
    frame.map_column("calc_radius", |value| round_2(fold_max(value)))?;
    frame.rename_column("calc_radius", "radius")?;

    resolve_species_names(store, table, &mut frame).await?;

    retain_by(&mut frame, "radius", |value| {
        value.as_f64().is_some_and(|radius| radius > 0.0)
    })?;
    stages.push(StageCount::of(
        "Observations with radius > 0:",
        frame.len().to_string(),
    ));

    retain_by(&mut frame, "eco_long", |value| {
        value.as_f64().is_some_and(|longitude| longitude < 0.0)
    })?;
    stages.push(StageCount::of(
        "Observations with eco_long < 0:",
        frame.len().to_string(),
    ));

    frame.rename_column("# ECO", "eco_id")?;
    frame.rename_column("eco_lat", "lat")?;
    frame.rename_column("eco_long", "long")?;

    frame.map_column("eco_date", parse_date)?;
    let cutoff = ten_year_cutoff();
    retain_by(&mut frame, "eco_date", |value| {
        matches!(value, Value::Timestamp(instant) if *instant >= cutoff)
    })?;
    stages.push(StageCount::of(
        "Observations < 10 years old:",
        frame.len().to_string(),
    ));

    let missing_inaturalist = frame
        .column_values("iNaturalist")
        .map_or(0, |values| values.filter(|value| value.is_null()).count());
    stages.push(StageCount::of(
        "Observations WITHOUT iNaturalist:",
        missing_inaturalist.to_string(),
    ));

    frame.select_columns(&OBSERVATION_COLUMNS)?;
    stages.push(StageCount::of(
        "Observations used:",
        frame.len().to_string(),
    ));
    stages.push(StageCount::of(
        "Scores seen:",
        distinct_descending(&frame, "score"),
    ));
    stages.push(StageCount::of(
        "Radius seen:",
        distinct_descending(&frame, "radius"),
    ));

    sort_newest_first(&mut frame)?;

    Ok(ObservationReport { frame, stages })
}

/// Resolve each observation's linked species record and use its common name
/// when the observation itself carries none.
async fn resolve_species_names<S: TableStore + ?Sized>(
    store: &S,
    table: &TableRef,
    frame: &mut Frame,
) -> Result<(), FrameError> {
    let Some(species_index) = frame.column_index("species_type") else {
        return Ok(());
    };
    let mut cache = LinkCache::new();
    for row_index in 0..frame.len() {
        let link = frame
            .row(row_index)
            .and_then(|row| row.get(species_index))
            .filter(|value| value.as_list().is_some_and(|items| items.len() == 1))
            .and_then(|value| link_target(Some(value)));
        let Some(species_id) = link else {
            continue;
        };
        let resolved =
            resolve_linked_field(store, table, &species_id, SPECIES_NAME_FIELD, &mut cache).await;
        let name_is_missing = frame
            .cell(row_index, "name_common")
            .is_none_or(|value| value.to_string().is_empty());
        if let (Some(name), true) = (resolved, name_is_missing) {
            frame.set_cell(row_index, "name_common", Value::Text(name.to_string()))?;
        }
    }
    Ok(())
}

fn retain_by<F>(frame: &mut Frame, column: &str, mut keep: F) -> Result<(), FrameError>
where
    F: FnMut(&Value) -> bool,
{
    let index = frame
        .column_index(column)
        .ok_or_else(|| FrameError::UnknownColumn {
            name: column.to_owned(),
        })?;
    frame.retain_rows(|row| row.get(index).is_some_and(&mut keep));
    Ok(())
}

/// Unwrap one-element lists; render longer lists as text.
fn flatten_single(value: Value) -> Value {
    match value {
        Value::List(mut items) if items.len() == 1 => items.pop().unwrap_or(Value::Null),
        Value::List(_) => Value::Text(value.to_string()),
        other => other,
    }
}

/// Fold a list onto its numeric maximum.
fn fold_max(value: Value) -> Value {
    match value {
        Value::List(items) => items
            .iter()
            .filter_map(Value::as_f64)
            .fold(None, |best: Option<f64>, candidate| {
                Some(best.map_or(candidate, |current| current.max(candidate)))
            })
            .map_or(Value::Null, Value::Number),
        other => other,
    }
}

fn round_2(value: Value) -> Value {
    match value {
        Value::Number(number) => Value::Number((number * 100.0).round() / 100.0),
        other => other,
    }
}

/// Parse an observation date, accepting RFC 3339 and plain dates.
fn parse_date(value: Value) -> Value {
    let Some(text) = value.as_str() else {
        return Value::Null;
    };
    if let Ok(instant) = DateTime::parse_from_rfc3339(text) {
        return Value::Timestamp(instant.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map_or_else(
            || {
                log::warn!("unparseable observation date {text:?}");
                Value::Null
            },
            |naive| Value::Timestamp(DateTime::from_naive_utc_and_offset(naive, Utc)),
        )
}

fn ten_year_cutoff() -> DateTime<Utc> {
    Utc::now()
        .checked_sub_months(Months::new(120))
        .unwrap_or_else(Utc::now)
}

fn distinct_descending(frame: &Frame, column: &str) -> String {
    let mut seen: Vec<f64> = Vec::new();
    if let Some(values) = frame.column_values(column) {
        for value in values.filter_map(Value::as_f64) {
            if !seen.iter().any(|existing| (existing - value).abs() < f64::EPSILON) {
                seen.push(value);
            }
        }
    }
    seen.sort_by(|left, right| right.partial_cmp(left).unwrap_or(std::cmp::Ordering::Equal));
    let rendered: Vec<String> = seen
        .into_iter()
        .map(|value| Value::Number(value).to_string())
        .collect();
    format!("[{}]", rendered.join(", "))
}

fn sort_newest_first(frame: &mut Frame) -> Result<(), FrameError> {
    let index = frame
        .column_index("eco_date")
        .ok_or_else(|| FrameError::UnknownColumn {
            name: "eco_date".to_owned(),
        })?;
    frame.sort_rows_by(|left, right| {
        let lhs = timestamp_at(left, index);
        let rhs = timestamp_at(right, index);
        rhs.cmp(&lhs)
    });
    Ok(())
}

fn timestamp_at(row: &[Value], index: usize) -> Option<DateTime<Utc>> {
    match row.get(index) {
        Some(Value::Timestamp(instant)) => Some(*instant),
        _ => None,
    }
}
