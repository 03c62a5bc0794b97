//! Materializing document-extraction results on a loan

use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use uuid::Uuid;

use crate::models::{
    Covenant, CovenantStatus, CovenantType, ExtractionApplied, ExtractionResult, Loan, LoanDna,
    TimelineEvent, TimelineEventType,
};
use crate::services::compliance::compliance_score;

/// Days from extraction until an extracted covenant first falls due
pub const EXTRACTED_COVENANT_DUE_DAYS: i64 = 90;

/// Apply an extraction result to `loan`.
///
/// Every proposed covenant becomes a new Upcoming covenant appended after the
/// existing ones, the Loan DNA is overwritten, and two events are appended in
/// order: `Document Uploaded` then `Covenant Added`. The caller commits the
/// aggregate once, so the whole application is atomic.
pub fn apply_extraction(
    loan: &mut Loan,
    extraction: ExtractionResult,
    filename: &str,
    at: DateTime<Utc>,
) -> ExtractionApplied {
    let today = at.date_naive();
    let due_date = today + Duration::days(EXTRACTED_COVENANT_DUE_DAYS);

    let added: Vec<Covenant> = extraction
        .extracted_covenants
        .iter()
        .map(|proposal| Covenant {
            id: Uuid::new_v4(),
            title: proposal.title.trim().to_string(),
            covenant_type: CovenantType::from_label(&proposal.covenant_type),
            due_date,
            status: CovenantStatus::Upcoming,
            value: None,
            threshold: proposal.threshold.clone().filter(|t| !t.trim().is_empty()),
            description: proposal.description.clone(),
            frequency: proposal.frequency.clone().filter(|f| !f.trim().is_empty()),
            waiver_reason: None,
            waiver_date: None,
            waiver_approved_by: None,
        })
        .collect();

    let added_ids: Vec<Uuid> = added.iter().map(|c| c.id).collect();
    let titles: Vec<&str> = added.iter().map(|c| c.title.as_str()).collect();

    let dna = LoanDna::from_extraction(extraction, filename, today);

    let uploaded = TimelineEvent::new(
        TimelineEventType::DocumentUploaded,
        at,
        "Document Uploaded",
        format!(
            "Loan document \"{}\" analysed. {} covenant(s) identified with {}% confidence.",
            filename,
            added.len(),
            dna.confidence
        ),
    )
    .with_metadata(json!({ "filename": filename, "confidence": dna.confidence }));

    let covenant_summary = if titles.is_empty() {
        format!("No new covenants were added from \"{}\".", filename)
    } else {
        format!(
            "{} covenant(s) added to monitoring from \"{}\": {}.",
            titles.len(),
            filename,
            titles.join(", ")
        )
    };

    let covenants_added = TimelineEvent::new(
        TimelineEventType::CovenantAdded,
        at,
        "Covenants Extracted",
        covenant_summary,
    )
    .with_metadata(json!({ "covenantIds": added_ids }));

    let event_ids = vec![uploaded.id, covenants_added.id];

    loan.covenants.extend(added);
    loan.loan_dna = Some(dna);
    loan.timeline_events.push(uploaded);
    loan.timeline_events.push(covenants_added);
    loan.compliance_score = compliance_score(&loan.covenants);
    loan.updated_at = at;

    ExtractionApplied {
        loan_id: loan.id,
        added_covenant_ids: added_ids,
        event_ids,
        compliance_score: loan.compliance_score,
    }
}
