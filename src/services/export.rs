//! CSV loan report
//!
//! The report is a small multi-section CSV document: a key/value loan
//! header, the covenant table and, when present, the risk prediction table.
//! Fields are quoted per RFC 4180 when they contain a comma, a double quote
//! or a line break. [`read_covenant_table`] parses the covenant section back.

use chrono::NaiveDate;
use thiserror::Error;

use crate::models::{Covenant, CovenantStatus, CovenantType, Loan};

pub const COVENANT_SECTION: &str = "Covenants";
pub const PREDICTION_SECTION: &str = "Risk Predictions";

pub const COVENANT_HEADER: [&str; 7] = [
    "Title",
    "Type",
    "Due Date",
    "Status",
    "Threshold",
    "Value",
    "Description",
];

pub const PREDICTION_HEADER: [&str; 7] = [
    "Covenant",
    "Current Value",
    "Threshold",
    "Predicted Breach Date",
    "Probability",
    "Trend",
    "Explanation",
];

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Errors raised while reading a report back
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExportError {
    #[error("Section '{0}' not found")]
    MissingSection(&'static str),

    #[error("Unexpected covenant table header: {0}")]
    UnexpectedHeader(String),

    #[error("Row {row}: {reason}")]
    MalformedRow { row: usize, reason: String },

    #[error("Unterminated quoted field")]
    UnterminatedQuote,
}

/// One row of the covenant table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CovenantRow {
    pub title: String,
    pub covenant_type: CovenantType,
    pub due_date: NaiveDate,
    pub status: CovenantStatus,
    pub threshold: Option<String>,
    pub value: Option<String>,
    pub description: Option<String>,
}

impl From<&Covenant> for CovenantRow {
    fn from(covenant: &Covenant) -> Self {
        let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());
        Self {
            title: covenant.title.clone(),
            covenant_type: covenant.covenant_type,
            due_date: covenant.due_date,
            status: covenant.status,
            threshold: covenant.threshold.as_deref().and_then(non_empty),
            value: covenant.value.as_deref().and_then(non_empty),
            description: non_empty(&covenant.description),
        }
    }
}

/// Suggested download name for a loan report
pub fn report_filename(loan: &Loan) -> String {
    let borrower: String = loan
        .borrower
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("loan_report_{}_{}.csv", borrower, loan.id.simple())
}

/// Quote a field when it needs it
pub fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\r', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn write_record<S: AsRef<str>>(out: &mut String, fields: &[S]) {
    let line: Vec<String> = fields.iter().map(|f| escape_field(f.as_ref())).collect();
    out.push_str(&line.join(","));
    out.push('\n');
}

/// Render the loan report
pub fn write_loan_csv(loan: &Loan, generated: NaiveDate) -> String {
    let mut out = String::new();

    write_record(&mut out, &["Loan Report"]);
    write_record(&mut out, &["Loan ID".to_string(), loan.id.to_string()]);
    write_record(&mut out, &["Borrower", loan.borrower.as_str()]);
    write_record(
        &mut out,
        &["Amount".to_string(), format!("{} {}", loan.currency, loan.amount)],
    );
    write_record(
        &mut out,
        &["Interest Rate".to_string(), format!("{}%", loan.interest_rate)],
    );
    write_record(
        &mut out,
        &["Start Date".to_string(), loan.start_date.format(DATE_FORMAT).to_string()],
    );
    write_record(
        &mut out,
        &["Maturity Date".to_string(), loan.maturity_date.format(DATE_FORMAT).to_string()],
    );
    write_record(&mut out, &["Status", loan.status.as_str()]);
    write_record(
        &mut out,
        &["Compliance Score".to_string(), format!("{}%", loan.compliance_score)],
    );
    write_record(
        &mut out,
        &["Generated".to_string(), generated.format(DATE_FORMAT).to_string()],
    );

    out.push('\n');
    write_record(&mut out, &[COVENANT_SECTION]);
    write_record(&mut out, &COVENANT_HEADER);
    for covenant in &loan.covenants {
        write_record(
            &mut out,
            &[
                covenant.title.clone(),
                covenant.covenant_type.to_string(),
                covenant.due_date.format(DATE_FORMAT).to_string(),
                covenant.status.to_string(),
                covenant.threshold.clone().unwrap_or_default(),
                covenant.value.clone().unwrap_or_default(),
                covenant.description.clone(),
            ],
        );
    }

    if !loan.risk_predictions.is_empty() {
        out.push('\n');
        write_record(&mut out, &[PREDICTION_SECTION]);
        write_record(&mut out, &PREDICTION_HEADER);
        for prediction in &loan.risk_predictions {
            write_record(
                &mut out,
                &[
                    prediction.covenant_title.clone(),
                    prediction.current_value.clone(),
                    prediction.threshold.clone(),
                    prediction.predicted_breach_date.clone(),
                    format!("{}%", prediction.probability),
                    prediction.trend.as_str().to_string(),
                    prediction.explanation.clone(),
                ],
            );
        }
    }

    out
}

/// Split CSV text into records, honouring quoted fields.
pub fn parse_records(input: &str) -> Result<Vec<Vec<String>>, ExportError> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut quoted = false;
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                other => field.push(other),
            }
            continue;
        }

        match c {
            '"' if field.is_empty() && !quoted => {
                in_quotes = true;
                quoted = true;
            }
            ',' => {
                record.push(std::mem::take(&mut field));
                quoted = false;
            }
            '\r' | '\n' => {
                if c == '\r' && chars.peek() == Some(&'\n') {
                    chars.next();
                }
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
                quoted = false;
            }
            other => field.push(other),
        }
    }

    if in_quotes {
        return Err(ExportError::UnterminatedQuote);
    }
    if !field.is_empty() || !record.is_empty() || quoted {
        record.push(field);
        records.push(record);
    }

    Ok(records)
}

fn is_blank(record: &[String]) -> bool {
    record.iter().all(|f| f.is_empty())
}

fn optional(cell: &str) -> Option<String> {
    (!cell.is_empty()).then(|| cell.to_string())
}

/// Read the covenant table out of a loan report.
///
/// Empty cells become `None`.
pub fn read_covenant_table(input: &str) -> Result<Vec<CovenantRow>, ExportError> {
    let records = parse_records(input)?;

    let start = records
        .iter()
        .position(|r| r.len() == 1 && r[0] == COVENANT_SECTION)
        .ok_or(ExportError::MissingSection(COVENANT_SECTION))?;

    let header = records
        .get(start + 1)
        .ok_or(ExportError::MissingSection(COVENANT_SECTION))?;
    if header.iter().map(String::as_str).ne(COVENANT_HEADER.iter().copied()) {
        return Err(ExportError::UnexpectedHeader(header.join(",")));
    }

    let mut rows = Vec::new();
    for (offset, record) in records[start + 2..].iter().enumerate() {
        if is_blank(record) {
            break;
        }
        let row = start + 3 + offset;
        let malformed = |reason: String| ExportError::MalformedRow { row, reason };

        if record.len() != COVENANT_HEADER.len() {
            return Err(malformed(format!(
                "expected {} fields, found {}",
                COVENANT_HEADER.len(),
                record.len()
            )));
        }

        rows.push(CovenantRow {
            title: record[0].clone(),
            covenant_type: record[1].parse().map_err(malformed)?,
            due_date: NaiveDate::parse_from_str(&record[2], DATE_FORMAT)
                .map_err(|e| malformed(format!("invalid due date '{}': {}", record[2], e)))?,
            status: record[3].parse().map_err(malformed)?,
            threshold: optional(&record[4]),
            value: optional(&record[5]),
            description: optional(&record[6]),
        });
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_field() {
        assert_eq!(escape_field("plain"), "plain");
        assert_eq!(escape_field("a,b"), "\"a,b\"");
        assert_eq!(escape_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(escape_field("two\nlines"), "\"two\nlines\"");
    }

    #[test]
    fn test_parse_records_handles_quotes_and_newlines() {
        let records = parse_records("a,\"b,c\",\"d\"\"e\"\r\n\"multi\nline\",\n").unwrap();
        assert_eq!(
            records,
            vec![
                vec!["a".to_string(), "b,c".to_string(), "d\"e".to_string()],
                vec!["multi\nline".to_string(), String::new()],
            ]
        );
    }

    #[test]
    fn test_parse_records_keeps_quoted_empty_field() {
        let records = parse_records("\"\"").unwrap();
        assert_eq!(records, vec![vec![String::new()]]);
    }

    #[test]
    fn test_unterminated_quote() {
        assert_eq!(
            parse_records("\"open,field\n"),
            Err(ExportError::UnterminatedQuote)
        );
    }

    #[test]
    fn test_missing_section() {
        assert_eq!(
            read_covenant_table("Loan Report\n"),
            Err(ExportError::MissingSection(COVENANT_SECTION))
        );
    }

    #[test]
    fn test_rejects_bad_rows() {
        let csv = "Covenants\nTitle,Type,Due Date,Status,Threshold,Value,Description\nA,Financial,2024-13-01,Compliant,,,\n";
        assert!(matches!(
            read_covenant_table(csv),
            Err(ExportError::MalformedRow { row: 3, .. })
        ));

        let csv = "Covenants\nTitle,Type,Due Date,Status,Threshold,Value,Description\nA,Financial\n";
        assert!(matches!(
            read_covenant_table(csv),
            Err(ExportError::MalformedRow { .. })
        ));
    }
}
