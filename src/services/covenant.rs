//! Covenant mutations on a loan aggregate
//!
//! These functions operate on an in-memory [`Loan`] and never touch storage;
//! [`LoanService`](super::LoanService) loads the aggregate, applies one of
//! them and commits the result in a single repository write.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::{
    Covenant, CovenantStatus, CreateCovenantRequest, Loan, TimelineEvent, TimelineEventType,
    UpdateCovenantRequest,
};
use crate::services::compliance::compliance_score;

/// Reason recorded when a waiver is granted without one
const UNSPECIFIED_WAIVER_REASON: &str = "Not specified";

/// A requested covenant status change
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub covenant_id: Uuid,
    pub new_status: CovenantStatus,
    pub value: Option<String>,
    pub waiver_reason: Option<String>,
}

/// What a status change did to the aggregate
#[derive(Debug, Clone)]
pub struct StatusChangeOutcome {
    pub previous_status: CovenantStatus,
    pub covenant: Covenant,
    pub event: Option<TimelineEvent>,
    pub previous_score: i32,
    pub compliance_score: i32,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn waiver_reason(value: Option<String>) -> String {
    non_blank(value).unwrap_or_else(|| UNSPECIFIED_WAIVER_REASON.to_string())
}

/// Apply a status transition to one covenant of `loan`.
///
/// Emits at most one timeline event: `Waiver Granted` when the covenant
/// moves into Waived, `Status Changed` for any other actual change, nothing
/// when the status is unchanged. Waiver fields are populated only while the
/// covenant is Waived. The loan's compliance score is recomputed.
pub fn apply_status_change(
    loan: &mut Loan,
    change: StatusChange,
    actor: &str,
    at: DateTime<Utc>,
) -> ApiResult<StatusChangeOutcome> {
    let previous_score = loan.compliance_score;
    let supplied_value = non_blank(change.value);

    let covenant = loan
        .covenant_mut(change.covenant_id)
        .ok_or_else(|| ApiError::covenant_not_found(change.covenant_id))?;

    let previous_status = covenant.status;
    let new_status = change.new_status;

    covenant.status = new_status;
    if let Some(value) = &supplied_value {
        covenant.value = Some(value.clone());
    }

    if new_status == CovenantStatus::Waived {
        covenant.waiver_reason = Some(waiver_reason(change.waiver_reason));
        covenant.waiver_date = Some(at.date_naive());
        covenant.waiver_approved_by = Some(actor.to_string());
    } else {
        covenant.clear_waiver();
    }

    let updated = covenant.clone();

    let event = if previous_status == new_status {
        None
    } else if new_status == CovenantStatus::Waived {
        let reason = updated
            .waiver_reason
            .as_deref()
            .unwrap_or(UNSPECIFIED_WAIVER_REASON);
        Some(
            TimelineEvent::new(
                TimelineEventType::WaiverGranted,
                at,
                "Waiver Granted",
                format!(
                    "Waiver granted for \"{}\" covenant. Reason: {}. Approved by {}.",
                    updated.title, reason, actor
                ),
            )
            .for_covenant(updated.id),
        )
    } else {
        let mut description = format!(
            "Covenant status changed from {} to {}.",
            previous_status, new_status
        );
        if let Some(value) = &supplied_value {
            description.push_str(&format!(" Current value: {}.", value));
        }
        Some(
            TimelineEvent::new(
                TimelineEventType::StatusChanged,
                at,
                format!("{} Status Changed", updated.title),
                description,
            )
            .for_covenant(updated.id),
        )
    };

    if let Some(event) = &event {
        loan.timeline_events.push(event.clone());
    }

    loan.compliance_score = compliance_score(&loan.covenants);
    loan.updated_at = at;

    Ok(StatusChangeOutcome {
        previous_status,
        covenant: updated,
        event,
        previous_score,
        compliance_score: loan.compliance_score,
    })
}

/// Append a new covenant to `loan` and record a `Covenant Added` event.
pub fn add_covenant(
    loan: &mut Loan,
    request: CreateCovenantRequest,
    actor: &str,
    at: DateTime<Utc>,
) -> Covenant {
    let status = request.status.unwrap_or(CovenantStatus::Upcoming);
    let waived = status == CovenantStatus::Waived;

    let covenant = Covenant {
        id: Uuid::new_v4(),
        title: request.title.trim().to_string(),
        covenant_type: request.covenant_type,
        due_date: request.due_date,
        status,
        value: non_blank(request.value),
        threshold: non_blank(request.threshold),
        description: request.description,
        frequency: non_blank(request.frequency),
        waiver_reason: waived.then(|| waiver_reason(request.waiver_reason)),
        waiver_date: waived.then(|| at.date_naive()),
        waiver_approved_by: waived.then(|| actor.to_string()),
    };

    let event = TimelineEvent::new(
        TimelineEventType::CovenantAdded,
        at,
        "Covenant Added",
        format!(
            "New {} covenant \"{}\" added to monitoring. Threshold: {}.",
            covenant.covenant_type,
            covenant.title,
            covenant.threshold.as_deref().unwrap_or("N/A")
        ),
    )
    .for_covenant(covenant.id);

    loan.covenants.push(covenant.clone());
    loan.timeline_events.push(event);
    loan.compliance_score = compliance_score(&loan.covenants);
    loan.updated_at = at;

    covenant
}

/// Edit covenant fields; a status in the request goes through
/// [`apply_status_change`] so events and waiver fields stay consistent.
pub fn edit_covenant(
    loan: &mut Loan,
    covenant_id: Uuid,
    request: UpdateCovenantRequest,
    actor: &str,
    at: DateTime<Utc>,
) -> ApiResult<(Covenant, Option<TimelineEvent>)> {
    let covenant = loan
        .covenant_mut(covenant_id)
        .ok_or_else(|| ApiError::covenant_not_found(covenant_id))?;

    if let Some(title) = request.title {
        covenant.title = title.trim().to_string();
    }
    if let Some(covenant_type) = request.covenant_type {
        covenant.covenant_type = covenant_type;
    }
    if let Some(due_date) = request.due_date {
        covenant.due_date = due_date;
    }
    if let Some(threshold) = request.threshold {
        covenant.threshold = non_blank(Some(threshold));
    }
    if let Some(description) = request.description {
        covenant.description = description;
    }
    if let Some(frequency) = request.frequency {
        covenant.frequency = non_blank(Some(frequency));
    }

    let status = request.status.unwrap_or(covenant.status);
    let reason = match (status, request.waiver_reason) {
        (CovenantStatus::Waived, None) if covenant.status == CovenantStatus::Waived => {
            covenant.waiver_reason.clone()
        }
        (_, reason) => reason,
    };

    let outcome = if status == CovenantStatus::Waived && covenant.status == CovenantStatus::Waived {
        // Staying waived keeps the original grant date and approver
        if let Some(value) = non_blank(request.value) {
            covenant.value = Some(value);
        }
        covenant.waiver_reason = Some(waiver_reason(reason));
        let updated = covenant.clone();
        loan.updated_at = at;
        (updated, None)
    } else {
        let outcome = apply_status_change(
            loan,
            StatusChange {
                covenant_id,
                new_status: status,
                value: request.value,
                waiver_reason: reason,
            },
            actor,
            at,
        )?;
        (outcome.covenant, outcome.event)
    };

    loan.compliance_score = compliance_score(&loan.covenants);
    Ok(outcome)
}

/// Remove a covenant and any prediction about it.
pub fn remove_covenant(loan: &mut Loan, covenant_id: Uuid, at: DateTime<Utc>) -> ApiResult<Covenant> {
    let index = loan
        .covenants
        .iter()
        .position(|c| c.id == covenant_id)
        .ok_or_else(|| ApiError::covenant_not_found(covenant_id))?;

    let removed = loan.covenants.remove(index);
    loan.risk_predictions.retain(|p| p.covenant_id != covenant_id);
    loan.compliance_score = compliance_score(&loan.covenants);
    loan.updated_at = at;

    Ok(removed)
}
