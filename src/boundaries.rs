use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

/// One validated (grade, lower_bound, upper_bound) row from an upload.
/// `lower <= upper` is conventional but not enforced.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryRule {
    pub grade: i64,
    pub lower_bound: f64,
    pub upper_bound: f64,
}

/// Validation failures for a boundary upload. All of these are detected
/// before any row is written, so a rejected upload never touches storage.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
    EmptyInput,
    MalformedHeader { field_count: usize },
    SubjectMismatch { csv_subject: String, class_subject: String },
    MalformedRow { row_index: usize, field_count: usize },
    InvalidValue { row_index: usize, field_name: &'static str, raw: String },
}

impl ParseError {
    pub fn code(&self) -> &'static str {
        match self {
            ParseError::EmptyInput => "empty_input",
            ParseError::MalformedHeader { .. } => "malformed_header",
            ParseError::SubjectMismatch { .. } => "subject_mismatch",
            ParseError::MalformedRow { .. } => "malformed_row",
            ParseError::InvalidValue { .. } => "invalid_value",
        }
    }

    pub fn message(&self) -> String {
        match self {
            ParseError::EmptyInput => "CSV file is empty".to_string(),
            ParseError::MalformedHeader { field_count } => format!(
                "the first row should contain only the subject name (got {} fields)",
                field_count
            ),
            ParseError::SubjectMismatch {
                csv_subject,
                class_subject,
            } => format!(
                "CSV subject '{}' does not match the class's subject '{}'",
                csv_subject, class_subject
            ),
            ParseError::MalformedRow {
                row_index,
                field_count,
            } => format!(
                "row {} must have three values: grade, lower_bound, upper_bound (got {})",
                row_index, field_count
            ),
            ParseError::InvalidValue {
                row_index,
                field_name,
                raw,
            } => format!("row {}: '{}' is not a valid {}", row_index, raw, field_name),
        }
    }

    pub fn details(&self) -> serde_json::Value {
        match self {
            ParseError::EmptyInput => json!({}),
            ParseError::MalformedHeader { field_count } => json!({ "fieldCount": field_count }),
            ParseError::SubjectMismatch {
                csv_subject,
                class_subject,
            } => json!({ "csvSubject": csv_subject, "classSubject": class_subject }),
            ParseError::MalformedRow {
                row_index,
                field_count,
            } => json!({ "rowIndex": row_index, "fieldCount": field_count }),
            ParseError::InvalidValue {
                row_index,
                field_name,
                raw,
            } => json!({ "rowIndex": row_index, "field": field_name, "value": raw }),
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message())
    }
}

impl std::error::Error for ParseError {}

/// Parse uploaded CSV content against the owning class's subject.
///
/// Row 0 must be exactly the subject name (trimmed, case-sensitive match).
/// Every following row is `grade,lower_bound,upper_bound`. Blank trailing
/// lines are ignored, as the original upload form produces them.
pub fn parse_boundary_csv(content: &str, class_subject: &str) -> Result<Vec<BoundaryRule>, ParseError> {
    let rows: Vec<Vec<String>> = content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.split(',').map(|x| x.trim().to_string()).collect())
        .collect();

    if rows.is_empty() {
        return Err(ParseError::EmptyInput);
    }

    let header = &rows[0];
    if header.len() != 1 {
        return Err(ParseError::MalformedHeader {
            field_count: header.len(),
        });
    }
    let subject = header[0].as_str();
    if subject != class_subject {
        return Err(ParseError::SubjectMismatch {
            csv_subject: subject.to_string(),
            class_subject: class_subject.to_string(),
        });
    }

    let mut rules = Vec::with_capacity(rows.len() - 1);
    for (row_index, row) in rows.iter().enumerate().skip(1) {
        if row.len() != 3 {
            return Err(ParseError::MalformedRow {
                row_index,
                field_count: row.len(),
            });
        }
        let grade: i64 = row[0].parse().map_err(|_| ParseError::InvalidValue {
            row_index,
            field_name: "grade",
            raw: row[0].clone(),
        })?;
        let lower_bound: f64 = row[1].parse().map_err(|_| ParseError::InvalidValue {
            row_index,
            field_name: "lower_bound",
            raw: row[1].clone(),
        })?;
        let upper_bound: f64 = row[2].parse().map_err(|_| ParseError::InvalidValue {
            row_index,
            field_name: "upper_bound",
            raw: row[2].clone(),
        })?;
        rules.push(BoundaryRule {
            grade,
            lower_bound,
            upper_bound,
        });
    }

    Ok(rules)
}

/// Replace the class's active boundary set with `rules`, all-or-nothing.
/// A reader on the same connection never observes the intermediate empty
/// state. Returns the number of rows written.
pub fn replace_boundaries(
    conn: &Connection,
    class_id: &str,
    subject: &str,
    rules: &[BoundaryRule],
) -> rusqlite::Result<usize> {
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM grade_boundaries WHERE class_id = ?", [class_id])?;
    for rule in rules {
        tx.execute(
            "INSERT INTO grade_boundaries(id, subject, grade, lower_bound, upper_bound, class_id)
             VALUES(?, ?, ?, ?, ?, ?)",
            (
                Uuid::new_v4().to_string(),
                subject,
                rule.grade,
                rule.lower_bound,
                rule.upper_bound,
                class_id,
            ),
        )?;
    }
    tx.commit()?;
    Ok(rules.len())
}

/// The active set for a class, ascending by lower bound. This ordering is
/// what gives `resolve_grade` its overlap tie-break.
pub fn list_boundaries(conn: &Connection, class_id: &str) -> rusqlite::Result<Vec<BoundaryRule>> {
    let mut stmt = conn.prepare(
        "SELECT grade, lower_bound, upper_bound
         FROM grade_boundaries
         WHERE class_id = ?
         ORDER BY lower_bound",
    )?;
    let rules = stmt
        .query_map([class_id], |r| {
            Ok(BoundaryRule {
                grade: r.get(0)?,
                lower_bound: r.get(1)?,
                upper_bound: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rules)
}

/// Map a score to a grade tier via the class's active boundaries.
///
/// First match in ascending lower_bound order wins when intervals overlap.
/// `None` means "grade undetermined" (no interval contains the score, or the
/// set is empty) and is not an error. Score range enforcement belongs to the
/// caller; out-of-range scores simply fall outside every interval.
pub fn resolve_grade(conn: &Connection, class_id: &str, score: f64) -> rusqlite::Result<Option<i64>> {
    let rules = list_boundaries(conn, class_id)?;
    Ok(rules
        .iter()
        .find(|b| b.lower_bound <= score && score <= b.upper_bound)
        .map(|b| b.grade))
}
