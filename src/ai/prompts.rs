//! Prompt templates

use serde_json::json;

use crate::models::{Covenant, CovenantStatus, Loan, TimelineEvent};

pub struct Prompt {
    pub system: &'static str,
    pub user: String,
}

fn pretty(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

pub fn loan_summary(loan: &Loan) -> Prompt {
    let covenants: Vec<_> = loan
        .covenants
        .iter()
        .map(|c| {
            json!({
                "title": c.title,
                "type": c.covenant_type,
                "status": c.status,
                "value": c.value,
                "threshold": c.threshold,
            })
        })
        .collect();
    let at_risk = loan
        .covenants
        .iter()
        .filter(|c| c.status.needs_attention())
        .count();

    Prompt {
        system: "You are a senior credit risk analyst at a major financial institution. \
Provide concise, professional executive summaries for loan facilities. \
Be direct and highlight key risks if any exist. Maximum 4 sentences.",
        user: format!(
            "Analyze this loan and provide an executive summary:\n\n\
Borrower: {}\nAmount: {} {}\nInterest Rate: {}%\nStatus: {}\nCompliance Score: {}/100\n\
Start Date: {}\nMaturity Date: {}\n\n\
Covenants ({} total, {} at risk/breached):\n{}\n\n\
Provide a brief executive summary highlighting the loan's current standing and any concerns.",
            loan.borrower,
            loan.currency,
            loan.amount,
            loan.interest_rate,
            loan.status,
            loan.compliance_score,
            loan.start_date,
            loan.maturity_date,
            covenants.len(),
            at_risk,
            pretty(&json!(covenants)),
        ),
    }
}

pub fn status_guidance(status: CovenantStatus) -> &'static str {
    match status {
        CovenantStatus::Compliant => {
            "The covenant is currently being met. Explain why this is positive and what to monitor."
        }
        CovenantStatus::AtRisk => {
            "The covenant is approaching breach. Explain the urgency and recommended actions."
        }
        CovenantStatus::Breached => {
            "The covenant has been breached. Explain implications and immediate steps needed."
        }
        CovenantStatus::Upcoming => {
            "The covenant test is upcoming. Explain what needs to be prepared."
        }
        CovenantStatus::Waived => {
            "The covenant has been waived. Explain what this means and any conditions."
        }
    }
}

pub fn covenant_explanation(loan: &Loan, covenant: &Covenant) -> Prompt {
    let waiver = match (&covenant.waiver_reason, covenant.status) {
        (Some(reason), CovenantStatus::Waived) => format!(
            "\nWaiver Info: Granted on {} by {}. Reason: {}",
            covenant
                .waiver_date
                .map(|d| d.to_string())
                .unwrap_or_default(),
            covenant.waiver_approved_by.as_deref().unwrap_or("Unknown"),
            reason
        ),
        _ => String::new(),
    };

    Prompt {
        system: "You are a credit risk expert explaining covenant compliance to stakeholders. \
Be clear, educational, and professional. Include actionable insights when relevant. \
Tailor your explanation to the specific status of the covenant.",
        user: format!(
            "Explain this covenant's current status and its significance:\n\n\
Covenant: {}\nType: {}\nDescription: {}\nCurrent Value: {}\nThreshold: {}\nStatus: {}\n\
Due Date: {}\nBorrower: {}\nLoan Compliance Score: {}\n\n{}{}\n\n\
Provide a clear explanation (2-3 paragraphs) of this covenant's status and its implications.",
            covenant.title,
            covenant.covenant_type,
            covenant.description,
            covenant.value.as_deref().unwrap_or("Not yet measured"),
            covenant.threshold.as_deref().unwrap_or("Not specified"),
            covenant.status,
            covenant.due_date,
            loan.borrower,
            loan.compliance_score,
            status_guidance(covenant.status),
            waiver,
        ),
    }
}

pub fn risk_predictions(loan: &Loan, covenants: &[&Covenant]) -> Prompt {
    let info: Vec<_> = covenants
        .iter()
        .map(|c| {
            json!({
                "id": c.id,
                "title": c.title,
                "current_value": c.value.as_deref().unwrap_or("Unknown"),
                "threshold": c.threshold.as_deref().unwrap_or("Unknown"),
                "status": c.status,
                "due_date": c.due_date,
            })
        })
        .collect();

    Prompt {
        system: "You are a quantitative risk analyst specializing in credit risk modeling.\n\
Analyze covenant data and provide breach probability predictions.\n\
Be realistic and base predictions on the current status and trends.\n\
For each covenant, provide a JSON object with these exact fields:\n\
- probability (0-100 integer)\n\
- trend (\"improving\", \"stable\", or \"deteriorating\")\n\
- predicted_breach_date (ISO date string or \"N/A\" or \"Already breached\")\n\
- explanation (1-2 sentences)",
        user: format!(
            "Analyze breach risk for these financial covenants:\n\n\
Loan: {}\nCurrent Compliance Score: {}\nLoan Status: {}\n\nCovenants:\n{}\n\n\
For EACH covenant, analyze the risk and return a JSON array with predictions.\n\
Each prediction must have: probability, trend, predicted_breach_date, explanation.\n\n\
Return ONLY valid JSON array, no other text.",
            loan.borrower,
            loan.compliance_score,
            loan.status,
            pretty(&json!(info)),
        ),
    }
}

pub fn what_changed(loan: &Loan, events: &[TimelineEvent]) -> Prompt {
    let data: Vec<_> = events
        .iter()
        .map(|e| {
            json!({
                "type": e.event_type,
                "date": e.date,
                "title": e.title,
                "description": e.description,
            })
        })
        .collect();

    Prompt {
        system: "You are a credit monitoring specialist providing status updates.\n\
Summarize recent activity clearly and highlight any items requiring attention.\n\
Use markdown formatting for better readability.",
        user: format!(
            "Summarize recent activity for this loan:\n\n\
Borrower: {}\nCurrent Compliance Score: {}\nLoan Status: {}\n\nRecent Events:\n{}\n\n\
Provide:\n1. A summary of key changes\n2. Current risk assessment\n3. Recommended actions if any\n\n\
Format with markdown headers and bullet points.",
            loan.borrower,
            loan.compliance_score,
            loan.status,
            pretty(&json!(data)),
        ),
    }
}

pub fn loan_dna_extraction(document_text: &str) -> Prompt {
    Prompt {
        system: "You are an expert in parsing loan agreements and credit facility documentation.\n\
Extract structured information and return it as valid JSON.\n\
Be thorough and accurate. Extract exact thresholds and requirements.",
        user: format!(
            r#"Extract loan DNA from this document and return as JSON:

DOCUMENT TEXT:
{}

Return a JSON object with this exact structure:
{{
  "keyTerms": {{
    "facilityType": "string",
    "purpose": "string",
    "securityType": "string",
    "governingLaw": "string"
  }},
  "extractedCovenants": [
    {{
      "title": "string",
      "type": "Financial|Reporting|Affirmative|Negative",
      "threshold": "string",
      "frequency": "string",
      "description": "string"
    }}
  ],
  "riskFactors": ["string"],
  "summary": "string (2-3 sentences)"
}}

Return ONLY valid JSON, no other text."#,
            document_text
        ),
    }
}
