//! PostgreSQL repositories
//!
//! Each loan aggregate is spread over the `loans`, `covenants`,
//! `timeline_events`, `loan_dna`, `risk_predictions` and
//! `uploaded_documents` tables. Writes go through one transaction per
//! aggregate; timeline events are only ever inserted.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::{LoanRepository, RepositoryError, RepositoryResult, UserRepository};
use crate::models::{
    Covenant, CovenantStatus, CovenantType, KeyTerms, Loan, LoanDna, LoanStatus, ProposedCovenant,
    RiskPrediction, TimelineEvent, TimelineEventType, Trend, UploadedDocument, User,
};

// ============================================================================
// Row types
// ============================================================================

#[derive(sqlx::FromRow)]
struct LoanRecord {
    id: Uuid,
    borrower: String,
    amount: Decimal,
    currency: String,
    interest_rate: Decimal,
    start_date: NaiveDate,
    maturity_date: NaiveDate,
    status: LoanStatus,
    compliance_score: i32,
    risk_summary: Option<String>,
    created_by: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct CovenantRecord {
    loan_id: Uuid,
    id: Uuid,
    title: String,
    covenant_type: CovenantType,
    due_date: NaiveDate,
    status: CovenantStatus,
    value: Option<String>,
    threshold: Option<String>,
    description: String,
    frequency: Option<String>,
    waiver_reason: Option<String>,
    waiver_date: Option<NaiveDate>,
    waiver_approved_by: Option<String>,
}

impl From<CovenantRecord> for Covenant {
    fn from(row: CovenantRecord) -> Self {
        Self {
            id: row.id,
            title: row.title,
            covenant_type: row.covenant_type,
            due_date: row.due_date,
            status: row.status,
            value: row.value,
            threshold: row.threshold,
            description: row.description,
            frequency: row.frequency,
            waiver_reason: row.waiver_reason,
            waiver_date: row.waiver_date,
            waiver_approved_by: row.waiver_approved_by,
        }
    }
}

#[derive(sqlx::FromRow)]
struct EventRecord {
    loan_id: Uuid,
    id: Uuid,
    event_type: TimelineEventType,
    date: NaiveDate,
    title: String,
    description: String,
    related_covenant_id: Option<Uuid>,
    metadata: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
}

impl From<EventRecord> for TimelineEvent {
    fn from(row: EventRecord) -> Self {
        Self {
            id: row.id,
            event_type: row.event_type,
            date: row.date,
            title: row.title,
            description: row.description,
            related_covenant_id: row.related_covenant_id,
            metadata: row.metadata,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct DnaRecord {
    loan_id: Uuid,
    extracted_at: NaiveDate,
    source_document: String,
    confidence: i32,
    summary: String,
    key_terms: Json<KeyTerms>,
    extracted_covenants: Json<Vec<ProposedCovenant>>,
    risk_factors: Json<Vec<String>>,
}

impl From<DnaRecord> for LoanDna {
    fn from(row: DnaRecord) -> Self {
        Self {
            extracted_at: row.extracted_at,
            source_document: row.source_document,
            confidence: row.confidence,
            summary: row.summary,
            key_terms: row.key_terms.0,
            extracted_covenants: row.extracted_covenants.0,
            risk_factors: row.risk_factors.0,
        }
    }
}

#[derive(sqlx::FromRow)]
struct PredictionRecord {
    loan_id: Uuid,
    covenant_id: Uuid,
    covenant_title: String,
    current_value: String,
    threshold: String,
    predicted_breach_date: String,
    probability: i32,
    trend: Trend,
    explanation: String,
}

impl From<PredictionRecord> for RiskPrediction {
    fn from(row: PredictionRecord) -> Self {
        Self {
            covenant_id: row.covenant_id,
            covenant_title: row.covenant_title,
            current_value: row.current_value,
            threshold: row.threshold,
            predicted_breach_date: row.predicted_breach_date,
            probability: row.probability,
            trend: row.trend,
            explanation: row.explanation,
        }
    }
}

#[derive(sqlx::FromRow)]
struct DocumentRecord {
    loan_id: Uuid,
    id: Uuid,
    filename: String,
    stored_path: String,
    size_bytes: i64,
    sha256: String,
    uploaded_at: DateTime<Utc>,
}

impl From<DocumentRecord> for UploadedDocument {
    fn from(row: DocumentRecord) -> Self {
        Self {
            id: row.id,
            filename: row.filename,
            stored_path: row.stored_path,
            size_bytes: row.size_bytes,
            sha256: row.sha256,
            uploaded_at: row.uploaded_at,
        }
    }
}

fn group_by_loan<R, T>(rows: Vec<R>, loan_id: impl Fn(&R) -> Uuid) -> HashMap<Uuid, Vec<T>>
where
    T: From<R>,
{
    let mut grouped: HashMap<Uuid, Vec<T>> = HashMap::new();
    for row in rows {
        grouped.entry(loan_id(&row)).or_default().push(T::from(row));
    }
    grouped
}

// ============================================================================
// Loans
// ============================================================================

/// Loan aggregates stored in PostgreSQL
#[derive(Clone)]
pub struct PgLoanRepository {
    pool: PgPool,
}

impl PgLoanRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Load the owned children of `records` and assemble aggregates
    async fn assemble(&self, records: Vec<LoanRecord>) -> RepositoryResult<Vec<Loan>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<Uuid> = records.iter().map(|r| r.id).collect();

        let covenants = sqlx::query_as::<_, CovenantRecord>(
            r#"
            SELECT loan_id, id, title, covenant_type, due_date, status, value, threshold,
                   description, frequency, waiver_reason, waiver_date, waiver_approved_by
            FROM covenants
            WHERE loan_id = ANY($1)
            ORDER BY loan_id, position
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let events = sqlx::query_as::<_, EventRecord>(
            r#"
            SELECT loan_id, id, event_type, date, title, description, related_covenant_id,
                   metadata, created_at
            FROM timeline_events
            WHERE loan_id = ANY($1)
            ORDER BY seq
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let dna = sqlx::query_as::<_, DnaRecord>(
            r#"
            SELECT loan_id, extracted_at, source_document, confidence, summary, key_terms,
                   extracted_covenants, risk_factors
            FROM loan_dna
            WHERE loan_id = ANY($1)
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let predictions = sqlx::query_as::<_, PredictionRecord>(
            r#"
            SELECT loan_id, covenant_id, covenant_title, current_value, threshold,
                   predicted_breach_date, probability, trend, explanation
            FROM risk_predictions
            WHERE loan_id = ANY($1)
            ORDER BY loan_id, position
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let documents = sqlx::query_as::<_, DocumentRecord>(
            r#"
            SELECT loan_id, id, filename, stored_path, size_bytes, sha256, uploaded_at
            FROM uploaded_documents
            WHERE loan_id = ANY($1)
            ORDER BY uploaded_at DESC
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut covenants: HashMap<Uuid, Vec<Covenant>> = group_by_loan(covenants, |r| r.loan_id);
        let mut events: HashMap<Uuid, Vec<TimelineEvent>> = group_by_loan(events, |r| r.loan_id);
        let mut predictions: HashMap<Uuid, Vec<RiskPrediction>> =
            group_by_loan(predictions, |r| r.loan_id);
        let mut documents: HashMap<Uuid, Vec<UploadedDocument>> =
            group_by_loan(documents, |r| r.loan_id);
        let mut dna: HashMap<Uuid, LoanDna> = dna
            .into_iter()
            .map(|row| (row.loan_id, LoanDna::from(row)))
            .collect();

        Ok(records
            .into_iter()
            .map(|r| Loan {
                covenants: covenants.remove(&r.id).unwrap_or_default(),
                timeline_events: events.remove(&r.id).unwrap_or_default(),
                loan_dna: dna.remove(&r.id),
                risk_predictions: predictions.remove(&r.id).unwrap_or_default(),
                documents: documents.remove(&r.id).unwrap_or_default(),
                id: r.id,
                borrower: r.borrower,
                amount: r.amount,
                currency: r.currency,
                interest_rate: r.interest_rate,
                start_date: r.start_date,
                maturity_date: r.maturity_date,
                status: r.status,
                compliance_score: r.compliance_score,
                risk_summary: r.risk_summary,
                created_by: r.created_by,
                created_at: r.created_at,
                updated_at: r.updated_at,
            })
            .collect())
    }
}

/// Write every owned child of `loan` inside the caller's transaction
async fn write_children(conn: &mut PgConnection, loan: &Loan) -> Result<(), sqlx::Error> {
    let covenant_ids: Vec<Uuid> = loan.covenants.iter().map(|c| c.id).collect();

    sqlx::query("DELETE FROM covenants WHERE loan_id = $1 AND NOT (id = ANY($2))")
        .bind(loan.id)
        .bind(&covenant_ids)
        .execute(&mut *conn)
        .await?;

    for (position, covenant) in loan.covenants.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO covenants (
                id, loan_id, position, title, covenant_type, due_date, status, value,
                threshold, description, frequency, waiver_reason, waiver_date, waiver_approved_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (id) DO UPDATE SET
                position = EXCLUDED.position,
                title = EXCLUDED.title,
                covenant_type = EXCLUDED.covenant_type,
                due_date = EXCLUDED.due_date,
                status = EXCLUDED.status,
                value = EXCLUDED.value,
                threshold = EXCLUDED.threshold,
                description = EXCLUDED.description,
                frequency = EXCLUDED.frequency,
                waiver_reason = EXCLUDED.waiver_reason,
                waiver_date = EXCLUDED.waiver_date,
                waiver_approved_by = EXCLUDED.waiver_approved_by
            "#,
        )
        .bind(covenant.id)
        .bind(loan.id)
        .bind(position as i32)
        .bind(&covenant.title)
        .bind(covenant.covenant_type)
        .bind(covenant.due_date)
        .bind(covenant.status)
        .bind(&covenant.value)
        .bind(&covenant.threshold)
        .bind(&covenant.description)
        .bind(&covenant.frequency)
        .bind(&covenant.waiver_reason)
        .bind(covenant.waiver_date)
        .bind(&covenant.waiver_approved_by)
        .execute(&mut *conn)
        .await?;
    }

    for event in &loan.timeline_events {
        sqlx::query(
            r#"
            INSERT INTO timeline_events (
                id, loan_id, event_type, date, title, description, related_covenant_id,
                metadata, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(event.id)
        .bind(loan.id)
        .bind(event.event_type)
        .bind(event.date)
        .bind(&event.title)
        .bind(&event.description)
        .bind(event.related_covenant_id)
        .bind(&event.metadata)
        .bind(event.created_at)
        .execute(&mut *conn)
        .await?;
    }

    match &loan.loan_dna {
        Some(dna) => {
            sqlx::query(
                r#"
                INSERT INTO loan_dna (
                    loan_id, extracted_at, source_document, confidence, summary, key_terms,
                    extracted_covenants, risk_factors
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (loan_id) DO UPDATE SET
                    extracted_at = EXCLUDED.extracted_at,
                    source_document = EXCLUDED.source_document,
                    confidence = EXCLUDED.confidence,
                    summary = EXCLUDED.summary,
                    key_terms = EXCLUDED.key_terms,
                    extracted_covenants = EXCLUDED.extracted_covenants,
                    risk_factors = EXCLUDED.risk_factors
                "#,
            )
            .bind(loan.id)
            .bind(dna.extracted_at)
            .bind(&dna.source_document)
            .bind(dna.confidence)
            .bind(&dna.summary)
            .bind(Json(&dna.key_terms))
            .bind(Json(&dna.extracted_covenants))
            .bind(Json(&dna.risk_factors))
            .execute(&mut *conn)
            .await?;
        }
        None => {
            sqlx::query("DELETE FROM loan_dna WHERE loan_id = $1")
                .bind(loan.id)
                .execute(&mut *conn)
                .await?;
        }
    }

    sqlx::query("DELETE FROM risk_predictions WHERE loan_id = $1")
        .bind(loan.id)
        .execute(&mut *conn)
        .await?;

    for (position, prediction) in loan.risk_predictions.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO risk_predictions (
                loan_id, covenant_id, position, covenant_title, current_value, threshold,
                predicted_breach_date, probability, trend, explanation
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(loan.id)
        .bind(prediction.covenant_id)
        .bind(position as i32)
        .bind(&prediction.covenant_title)
        .bind(&prediction.current_value)
        .bind(&prediction.threshold)
        .bind(&prediction.predicted_breach_date)
        .bind(prediction.probability)
        .bind(prediction.trend)
        .bind(&prediction.explanation)
        .execute(&mut *conn)
        .await?;
    }

    let document_ids: Vec<Uuid> = loan.documents.iter().map(|d| d.id).collect();

    sqlx::query("DELETE FROM uploaded_documents WHERE loan_id = $1 AND NOT (id = ANY($2))")
        .bind(loan.id)
        .bind(&document_ids)
        .execute(&mut *conn)
        .await?;

    for document in &loan.documents {
        sqlx::query(
            r#"
            INSERT INTO uploaded_documents (
                id, loan_id, filename, stored_path, size_bytes, sha256, uploaded_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(document.id)
        .bind(loan.id)
        .bind(&document.filename)
        .bind(&document.stored_path)
        .bind(document.size_bytes)
        .bind(&document.sha256)
        .bind(document.uploaded_at)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

const SELECT_LOANS: &str = r#"
    SELECT id, borrower, amount, currency, interest_rate, start_date, maturity_date, status,
           compliance_score, risk_summary, created_by, created_at, updated_at
    FROM loans
"#;

#[async_trait]
impl LoanRepository for PgLoanRepository {
    async fn list(&self) -> RepositoryResult<Vec<Loan>> {
        let records =
            sqlx::query_as::<_, LoanRecord>(&format!("{} ORDER BY created_at DESC, id", SELECT_LOANS))
                .fetch_all(&self.pool)
                .await?;

        self.assemble(records).await
    }

    async fn get(&self, id: Uuid) -> RepositoryResult<Option<Loan>> {
        let record = sqlx::query_as::<_, LoanRecord>(&format!("{} WHERE id = $1", SELECT_LOANS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match record {
            Some(record) => Ok(self.assemble(vec![record]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn insert(&self, loan: &Loan) -> RepositoryResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO loans (
                id, borrower, amount, currency, interest_rate, start_date, maturity_date,
                status, compliance_score, risk_summary, created_by, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(loan.id)
        .bind(&loan.borrower)
        .bind(loan.amount)
        .bind(&loan.currency)
        .bind(loan.interest_rate)
        .bind(loan.start_date)
        .bind(loan.maturity_date)
        .bind(loan.status)
        .bind(loan.compliance_score)
        .bind(&loan.risk_summary)
        .bind(loan.created_by)
        .bind(loan.created_at)
        .bind(loan.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| unique_violation(e, || format!("Loan {} already exists", loan.id)))?;

        write_children(&mut *tx, loan).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn save(&self, loan: &Loan) -> RepositoryResult<()> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE loans SET
                borrower = $2, amount = $3, currency = $4, interest_rate = $5,
                start_date = $6, maturity_date = $7, status = $8, compliance_score = $9,
                risk_summary = $10, updated_at = $11
            WHERE id = $1
            "#,
        )
        .bind(loan.id)
        .bind(&loan.borrower)
        .bind(loan.amount)
        .bind(&loan.currency)
        .bind(loan.interest_rate)
        .bind(loan.start_date)
        .bind(loan.maturity_date)
        .bind(loan.status)
        .bind(loan.compliance_score)
        .bind(&loan.risk_summary)
        .bind(loan.updated_at)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(RepositoryError::loan_not_found(loan.id));
        }

        write_children(&mut *tx, loan).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> RepositoryResult<bool> {
        let result = sqlx::query("DELETE FROM loans WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn loan_id_for_covenant(&self, covenant_id: Uuid) -> RepositoryResult<Option<Uuid>> {
        let loan_id = sqlx::query_scalar::<_, Uuid>("SELECT loan_id FROM covenants WHERE id = $1")
            .bind(covenant_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(loan_id)
    }
}

fn unique_violation(err: sqlx::Error, message: impl FnOnce() -> String) -> RepositoryError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            RepositoryError::Conflict(message())
        }
        _ => RepositoryError::Database(err),
    }
}

// ============================================================================
// Users
// ============================================================================

/// User accounts stored in PostgreSQL
#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    async fn find_by_username(&self, username: &str) -> RepositoryResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE LOWER(username) = LOWER($1)")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    async fn insert(&self, user: &User) -> RepositoryResult<()> {
        sqlx::query(
            r#"
            INSERT INTO users (
                id, username, email, first_name, last_name, role, department,
                password_hash, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.role)
        .bind(&user.department)
        .bind(&user.password_hash)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| unique_violation(e, || format!("Username '{}' is already taken", user.username)))?;

        Ok(())
    }

    async fn update(&self, user: &User) -> RepositoryResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE users SET
                email = $2, first_name = $3, last_name = $4, role = $5, department = $6,
                password_hash = $7, updated_at = $8
            WHERE id = $1
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.role)
        .bind(&user.department)
        .bind(&user.password_hash)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::user_not_found(user.id));
        }
        Ok(())
    }
}
