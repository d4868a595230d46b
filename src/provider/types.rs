//! Wire models for the payment-provider integration.
//!
//! Only the fields this system actually consumes are modeled; unknown JSON
//! fields are ignored at the serde layer. Log payloads are an explicit tagged
//! enum over the known shapes rather than a generic attribute map.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Transfer/invoice amounts are integer minor-currency units (RRRRCC).
pub const AMOUNT_MAX: i64 = 10_000_000_000;

/// Inbound webhook body: `{"event": {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEnvelope {
    pub event: InboundEvent,
}

/// One provider event notification. Read-only to this system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEvent {
    pub id: String,
    pub subscription: String,
    pub created: DateTime<Utc>,
    #[serde(rename = "workspaceId")]
    pub workspace_id: String,
    pub log: EventLog,
}

/// The event's log payload. Common fields plus a `type`-tagged detail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLog {
    pub id: String,
    pub created: DateTime<Utc>,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(flatten)]
    pub detail: LogDetail,
}

/// Known log shapes, discriminated by the nested `type` field.
///
/// Log types this system does not act on deserialize as `Other` and are
/// acknowledged without action.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LogDetail {
    Created { invoice: InvoiceSnapshot },
    Credited { invoice: InvoiceSnapshot },
    Paid { invoice: InvoiceSnapshot },
    #[serde(other)]
    Other,
}

/// Invoice fields consumed from a log payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceSnapshot {
    pub id: String,
    pub amount: i64,
    #[serde(default)]
    pub fee: i64,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("amount must be positive, got {0}")]
    AmountNotPositive(i64),
    #[error("amount {0} exceeds maximum of {AMOUNT_MAX}")]
    AmountTooLarge(i64),
    #[error("name cannot be empty")]
    EmptyName,
    #[error("invalid account number: {0}")]
    InvalidAccountNumber(String),
    #[error("unknown account type: {0}")]
    UnknownAccountType(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    Checking,
    Payment,
    Salary,
    Savings,
}

impl std::str::FromStr for AccountType {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "checking" => Ok(Self::Checking),
            "payment" => Ok(Self::Payment),
            "salary" => Ok(Self::Salary),
            "savings" => Ok(Self::Savings),
            other => Err(ModelError::UnknownAccountType(other.to_string())),
        }
    }
}

/// Destination bank account for outgoing transfers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationAccount {
    pub bank_code: String,
    pub branch: String,
    pub account: String,
    pub name: String,
    pub tax_id: String,
    pub account_type: AccountType,
}

impl DestinationAccount {
    /// Account numbers are 1-20 digits, or 1-19 digits plus a hyphenated
    /// check digit.
    pub fn validate_account_number(account: &str) -> Result<(), ModelError> {
        let invalid = || ModelError::InvalidAccountNumber(account.to_string());

        match account.split_once('-') {
            None => {
                if account.is_empty()
                    || account.len() > 20
                    || !account.chars().all(|c| c.is_ascii_digit())
                {
                    return Err(invalid());
                }
            }
            Some((digits, check)) => {
                if digits.is_empty()
                    || digits.len() > 19
                    || !digits.chars().all(|c| c.is_ascii_digit())
                    || check.len() != 1
                    || !check.chars().all(|c| c.is_ascii_digit())
                {
                    return Err(invalid());
                }
            }
        }
        Ok(())
    }
}

/// A fund-transfer instruction handed to the banking collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub account: DestinationAccount,
    pub amount: i64,
}

impl Transfer {
    pub fn new(account: DestinationAccount, amount: i64) -> Result<Self, ModelError> {
        check_amount(amount)?;
        Ok(Self { account, amount })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub name: String,
    pub tax_id: String,
}

impl Person {
    pub fn new(name: impl Into<String>, tax_id: impl Into<String>) -> Result<Self, ModelError> {
        let name = name.into();
        if name.is_empty() {
            return Err(ModelError::EmptyName);
        }
        Ok(Self {
            name,
            tax_id: tax_id.into(),
        })
    }
}

/// An invoice to issue against a person.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    pub amount: i64,
    pub person: Person,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
}

impl Invoice {
    pub fn new(
        amount: i64,
        person: Person,
        due_date: Option<NaiveDate>,
    ) -> Result<Self, ModelError> {
        check_amount(amount)?;
        Ok(Self {
            amount,
            person,
            due_date,
        })
    }
}

fn check_amount(amount: i64) -> Result<(), ModelError> {
    if amount <= 0 {
        return Err(ModelError::AmountNotPositive(amount));
    }
    if amount >= AMOUNT_MAX {
        return Err(ModelError::AmountTooLarge(amount));
    }
    Ok(())
}
