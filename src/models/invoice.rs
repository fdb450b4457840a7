use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// One row per processor invoice id (the upsert conflict key), so redelivery
/// of the same invoice event is a true no-op. A failed payment inserts a
/// zero-amount "failed" row; a later retry that pays the same invoice
/// overwrites it in place.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Invoice {
    pub member_id: Uuid,
    pub stripe_invoice_id: String,
    pub amount_paid_cents: i64,
    pub status: String,
    pub hosted_invoice_url: Option<String>,
    pub invoice_pdf: Option<String>,
    /// Taken from the processor's event timestamp, not ingestion time.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct InvoiceUpsert {
    pub member_id: Uuid,
    pub stripe_invoice_id: String,
    pub amount_paid_cents: i64,
    pub status: String,
    pub hosted_invoice_url: Option<String>,
    pub invoice_pdf: Option<String>,
    pub created_at: OffsetDateTime,
}
