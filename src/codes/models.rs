//! One-time code rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Single active unblock code per account. Consumption deletes the row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnblockCode {
    pub uid: Uuid,
    pub code: String,
    pub created_at: DateTime<Utc>,
}

/// Signin code row, keyed by its hex form. One-time use.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SigninCode {
    pub code: String,
    pub uid: Uuid,
    pub flow_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// What a successful signin-code consumption returns.
#[derive(Clone, Debug, PartialEq)]
pub struct ConsumedSigninCode {
    pub uid: Uuid,
    pub email: String,
    pub flow_id: Option<String>,
}
