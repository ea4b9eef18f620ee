//! Typed decode of raw tabular input into entity records.
//!
//! Every row either decodes into a fully typed record or fails with a
//! [`DecodeError`] naming the table, line, field, and offending value. Type
//! coercion lives here and nowhere else; rules and metrics only ever see
//! typed records.
//!
//! Real district extracts rarely use the canonical column names, so each
//! table can carry a [`ColumnMapping`] that renames source headers before
//! any field is looked up. Columns that are not part of a record's schema
//! are ignored.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Display;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{
    AssessmentRecord, DistrictId, Educator, EducatorId, Enrollment, MAX_GRADE_LEVEL,
    MIN_GRADE_LEVEL, ProgramParticipation, School, SchoolId, SchoolYear, StaffingRecord, Student,
    StudentId,
};

/// A row or field that could not be decoded into its typed form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{table}: line {line}, field '{field}' (value {value:?}): {reason}")]
pub struct DecodeError {
    /// Table the row belongs to
    pub table: String,
    /// 1-based line in the source file; the header is line 1
    pub line: usize,
    /// Canonical column name
    pub field: String,
    /// Raw value as read from the file
    pub value: String,
    /// Why the value was rejected
    pub reason: String,
}

impl DecodeError {
    /// Creates a new decode error.
    pub fn new(
        table: impl Into<String>,
        line: usize,
        field: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            line,
            field: field.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }
}

/// Source header → canonical column renames for one table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnMapping(BTreeMap<String, String>);

impl ColumnMapping {
    /// Creates an empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to rename `source` to `canonical`.
    pub fn with_rename(mut self, source: impl Into<String>, canonical: impl Into<String>) -> Self {
        self.0.insert(source.into(), canonical.into());
        self
    }

    /// Returns the canonical name for a source header.
    pub fn canonical<'a>(&'a self, source: &'a str) -> &'a str {
        self.0.get(source).map_or(source, String::as_str)
    }
}

/// Input-side configuration: column mappings and decode defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Column mappings keyed by table name (e.g. `"educators"`)
    pub column_mappings: BTreeMap<String, ColumnMapping>,
    /// School year assumed for enrollment rows lacking a `school_year` column
    pub default_school_year: Option<SchoolYear>,
}

impl InputConfig {
    /// Creates a new input config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to set the mapping for one table.
    pub fn with_mapping(mut self, table: impl Into<String>, mapping: ColumnMapping) -> Self {
        self.column_mappings.insert(table.into(), mapping);
        self
    }

    /// Builder method to set the default enrollment school year.
    pub fn with_default_school_year(mut self, year: SchoolYear) -> Self {
        self.default_school_year = Some(year);
        self
    }

    fn mapping_for(&self, table: &str) -> Option<&ColumnMapping> {
        self.column_mappings.get(table)
    }
}

/// Canonical column positions for one table's header row.
#[derive(Debug)]
pub struct HeaderIndex {
    table: &'static str,
    columns: HashMap<String, usize>,
}

impl HeaderIndex {
    /// Indexes a header record, applying the table's column mapping.
    pub fn new(
        table: &'static str,
        headers: &csv::StringRecord,
        mapping: Option<&ColumnMapping>,
    ) -> Self {
        let mut columns = HashMap::with_capacity(headers.len());
        for (position, raw) in headers.iter().enumerate() {
            let source = raw.trim();
            let canonical = mapping.map_or(source, |m| m.canonical(source));
            // First occurrence wins when a mapping folds two headers together
            columns.entry(canonical.to_string()).or_insert(position);
        }
        Self { table, columns }
    }

    /// Fails if any of `required` is missing from the header.
    pub fn require(&self, required: &[&str]) -> Result<(), DecodeError> {
        match required.iter().find(|name| !self.columns.contains_key(**name)) {
            Some(missing) => Err(DecodeError::new(
                self.table,
                1,
                *missing,
                "",
                "required column is missing from the header",
            )),
            None => Ok(()),
        }
    }

    fn position(&self, field: &str) -> Option<usize> {
        self.columns.get(field).copied()
    }
}

/// A single raw row viewed through its table's header index.
#[derive(Debug)]
pub struct RowView<'a> {
    header: &'a HeaderIndex,
    record: &'a csv::StringRecord,
    line: usize,
}

impl<'a> RowView<'a> {
    /// Wraps a record read from the table described by `header`.
    pub fn new(header: &'a HeaderIndex, record: &'a csv::StringRecord, line: usize) -> Self {
        Self {
            header,
            record,
            line,
        }
    }

    /// Line of this row in the source file.
    pub fn line(&self) -> usize {
        self.line
    }

    /// Builds an error for `field` on this row.
    pub fn error(&self, field: &str, value: &str, reason: impl Into<String>) -> DecodeError {
        DecodeError::new(self.header.table, self.line, field, value, reason)
    }

    /// Returns the trimmed raw value, or an error if the column is absent.
    pub fn raw(&self, field: &str) -> Result<&'a str, DecodeError> {
        self.header
            .position(field)
            .and_then(|position| self.record.get(position))
            .map(str::trim)
            .ok_or_else(|| self.error(field, "", "column is missing"))
    }

    /// Returns the trimmed value, or `None` if the column is absent or blank.
    pub fn optional(&self, field: &str) -> Option<&'a str> {
        self.header
            .position(field)
            .and_then(|position| self.record.get(position))
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    /// Parses a required, non-blank field.
    pub fn parse<T>(&self, field: &str) -> Result<T, DecodeError>
    where
        T: FromStr,
        T::Err: Display,
    {
        let value = self.raw(field)?;
        if value.is_empty() {
            return Err(self.error(field, value, "value is required"));
        }
        value
            .parse::<T>()
            .map_err(|e| self.error(field, value, e.to_string()))
    }

    /// Parses a boolean flag (`1/0`, `true/false`, `yes/no`, `y/n`, `t/f`).
    pub fn flag(&self, field: &str) -> Result<bool, DecodeError> {
        let value = self.raw(field)?;
        match value.to_ascii_lowercase().as_str() {
            "1" | "1.0" | "true" | "t" | "yes" | "y" => Ok(true),
            "0" | "0.0" | "false" | "f" | "no" | "n" => Ok(false),
            _ => Err(self.error(field, value, "expected a boolean flag (0/1, true/false)")),
        }
    }

    /// Parses a finite, non-negative decimal.
    pub fn non_negative(&self, field: &str) -> Result<f64, DecodeError> {
        let parsed = self.finite(field)?;
        if parsed < 0.0 {
            return Err(self.error(field, self.raw(field)?, "value must not be negative"));
        }
        Ok(parsed)
    }

    /// Parses a finite decimal.
    pub fn finite(&self, field: &str) -> Result<f64, DecodeError> {
        let parsed: f64 = self.parse(field)?;
        if !parsed.is_finite() {
            return Err(self.error(field, self.raw(field)?, "value must be a finite number"));
        }
        Ok(parsed)
    }
}

/// A record type that can be decoded from one raw row.
pub trait DecodeRecord: Sized {
    /// Table name; also the file stem of the input CSV
    const TABLE: &'static str;

    /// Columns that must be present in the header
    const REQUIRED_COLUMNS: &'static [&'static str];

    /// Decodes one row.
    fn decode(row: &RowView<'_>, input: &InputConfig) -> Result<Self, DecodeError>;
}

/// Reads and decodes a whole table.
///
/// The first malformed row aborts the load: callers never see a partially
/// typed table.
pub fn load_table<T, R>(reader: R, input: &InputConfig) -> Result<Vec<T>, DecodeError>
where
    T: DecodeRecord,
    R: Read,
{
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(reader);

    let headers = csv_reader
        .headers()
        .map_err(|e| DecodeError::new(T::TABLE, 1, "<header>", "", e.to_string()))?
        .clone();
    let header = HeaderIndex::new(T::TABLE, &headers, input.mapping_for(T::TABLE));
    header.require(T::REQUIRED_COLUMNS)?;

    let mut records = Vec::new();
    let mut record = csv::StringRecord::new();
    // Header occupies line 1
    let mut line: usize = 1;
    loop {
        line = line.saturating_add(1);
        match csv_reader.read_record(&mut record) {
            Ok(false) => break,
            Ok(true) => {
                let line = record
                    .position()
                    .and_then(|p| usize::try_from(p.line()).ok())
                    .unwrap_or(line);
                records.push(T::decode(&RowView::new(&header, &record, line), input)?);
            }
            Err(e) => {
                let line = e
                    .position()
                    .and_then(|p| usize::try_from(p.line()).ok())
                    .unwrap_or(line);
                return Err(DecodeError::new(T::TABLE, line, "<row>", "", e.to_string()));
            }
        }
    }

    tracing::debug!("Decoded {} rows from '{}'", records.len(), T::TABLE);
    Ok(records)
}

/// Opens `path` and decodes it as table `T`.
pub fn load_table_from_path<T: DecodeRecord>(
    path: &Path,
    input: &InputConfig,
) -> crate::Result<Vec<T>> {
    let file = std::fs::File::open(path).map_err(|e| {
        crate::error::K12QaError::io(format!("Failed to open {}", path.display()), e)
    })?;
    Ok(load_table(std::io::BufReader::new(file), input)?)
}

fn grade_level(row: &RowView<'_>) -> Result<u8, DecodeError> {
    let raw = row.raw("grade_level")?;
    let grade = match raw.to_ascii_lowercase().as_str() {
        "k" | "kg" => MIN_GRADE_LEVEL,
        _ => row.parse::<u8>("grade_level")?,
    };
    if !(MIN_GRADE_LEVEL..=MAX_GRADE_LEVEL).contains(&grade) {
        return Err(row.error(
            "grade_level",
            raw,
            format!("grade must be between {MIN_GRADE_LEVEL} and {MAX_GRADE_LEVEL}"),
        ));
    }
    Ok(grade)
}

fn certification(row: &RowView<'_>) -> Option<String> {
    row.optional("certification")
        .filter(|value| !value.eq_ignore_ascii_case("none"))
        .map(str::to_string)
}

fn subject_label(row: &RowView<'_>, field: &str) -> Result<String, DecodeError> {
    let value = row.raw(field)?;
    if value.is_empty() {
        return Err(row.error(field, value, "value is required"));
    }
    let label = value.to_ascii_lowercase();
    if label == crate::metrics::ALL {
        return Err(row.error(field, value, "'all' is reserved for the combined subject"));
    }
    Ok(label)
}

impl DecodeRecord for School {
    const TABLE: &'static str = "schools";
    const REQUIRED_COLUMNS: &'static [&'static str] =
        &["school_id", "district_id", "school_level", "urbanicity"];

    fn decode(row: &RowView<'_>, _input: &InputConfig) -> Result<Self, DecodeError> {
        Ok(Self {
            school_id: row.parse::<SchoolId>("school_id")?,
            district_id: row.parse::<DistrictId>("district_id")?,
            school_name: row.optional("school_name").map(str::to_string),
            school_level: row.parse("school_level")?,
            urbanicity: row.parse("urbanicity")?,
        })
    }
}

impl DecodeRecord for Student {
    const TABLE: &'static str = "students";
    const REQUIRED_COLUMNS: &'static [&'static str] =
        &["student_id", "grade_level", "frpl_flag", "ell_flag", "iep_flag"];

    fn decode(row: &RowView<'_>, _input: &InputConfig) -> Result<Self, DecodeError> {
        let school_id = match row.optional("school_id") {
            Some(_) => Some(row.parse::<SchoolId>("school_id")?),
            None => None,
        };
        Ok(Self {
            student_id: row.parse::<StudentId>("student_id")?,
            grade_level: grade_level(row)?,
            frpl: row.flag("frpl_flag")?,
            ell: row.flag("ell_flag")?,
            iep: row.flag("iep_flag")?,
            school_id,
        })
    }
}

impl DecodeRecord for Educator {
    const TABLE: &'static str = "educators";
    const REQUIRED_COLUMNS: &'static [&'static str] = &[
        "educator_id",
        "role",
        "certification",
        "years_experience",
        "hire_year",
    ];

    fn decode(row: &RowView<'_>, _input: &InputConfig) -> Result<Self, DecodeError> {
        Ok(Self {
            educator_id: row.parse::<EducatorId>("educator_id")?,
            role: row.parse("role")?,
            certification: certification(row),
            years_experience: row.parse("years_experience")?,
            hire_year: row.parse("hire_year")?,
        })
    }
}

impl DecodeRecord for Enrollment {
    const TABLE: &'static str = "student_school";
    const REQUIRED_COLUMNS: &'static [&'static str] = &["student_id", "school_id"];

    fn decode(row: &RowView<'_>, input: &InputConfig) -> Result<Self, DecodeError> {
        let school_year = match (row.optional("school_year"), input.default_school_year) {
            (Some(_), _) => row.parse("school_year")?,
            (None, Some(year)) => year,
            (None, None) => {
                return Err(row.error(
                    "school_year",
                    "",
                    "no school_year value and no default_school_year configured",
                ));
            }
        };
        Ok(Self {
            student_id: row.parse("student_id")?,
            school_id: row.parse("school_id")?,
            school_year,
        })
    }
}

impl DecodeRecord for StaffingRecord {
    const TABLE: &'static str = "staffing";
    const REQUIRED_COLUMNS: &'static [&'static str] =
        &["school_id", "educator_id", "school_year", "fte", "subject_area"];

    fn decode(row: &RowView<'_>, _input: &InputConfig) -> Result<Self, DecodeError> {
        Ok(Self {
            school_id: row.parse("school_id")?,
            educator_id: row.parse("educator_id")?,
            school_year: row.parse("school_year")?,
            fte: row.non_negative("fte")?,
            subject_area: subject_label(row, "subject_area")?,
        })
    }
}

impl DecodeRecord for AssessmentRecord {
    const TABLE: &'static str = "assessments";
    const REQUIRED_COLUMNS: &'static [&'static str] = &[
        "student_id",
        "school_id",
        "school_year",
        "term",
        "subject",
        "scale_score",
        "proficient_flag",
    ];

    fn decode(row: &RowView<'_>, _input: &InputConfig) -> Result<Self, DecodeError> {
        Ok(Self {
            student_id: row.parse("student_id")?,
            school_id: row.parse("school_id")?,
            school_year: row.parse("school_year")?,
            term: row.parse("term")?,
            subject: subject_label(row, "subject")?,
            scale_score: row.finite("scale_score")?,
            proficient: row.flag("proficient_flag")?,
        })
    }
}

impl DecodeRecord for ProgramParticipation {
    const TABLE: &'static str = "programs";
    const REQUIRED_COLUMNS: &'static [&'static str] = &["student_id", "program"];

    fn decode(row: &RowView<'_>, _input: &InputConfig) -> Result<Self, DecodeError> {
        let program = row.raw("program")?;
        if program.is_empty() {
            return Err(row.error("program", program, "value is required"));
        }
        Ok(Self {
            student_id: row.parse("student_id")?,
            program: program.to_string(),
        })
    }
}
