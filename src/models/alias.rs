use serde::{Deserialize, Serialize};

/// Response wrapper shared by every vendor endpoint.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub success: bool,
    pub result: Option<T>,
    #[serde(default)]
    pub error: Option<VendorFailure>,
    pub reason: Option<String>,
}

/// The `error` member is a detail object on most endpoints and a bare flag
/// (`1` or `true`) on others, where the message lives in `reason`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum VendorFailure {
    Detail(VendorError),
    Flag(serde_json::Value),
}

impl VendorFailure {
    fn message(self) -> Option<String> {
        match self {
            Self::Detail(detail) => detail.error_message.or(detail.error_code),
            Self::Flag(serde_json::Value::String(message)) => Some(message),
            Self::Flag(_) => None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VendorError {
    pub error_message: Option<String>,
    pub error_code: Option<String>,
}

impl<T> Envelope<T> {
    /// Splits the envelope into its payload or the vendor's failure message.
    pub fn into_outcome(self) -> Result<Option<T>, String> {
        if self.success {
            return Ok(self.result);
        }
        let message = self
            .error
            .and_then(VendorFailure::message)
            .filter(|message| !message.trim().is_empty())
            .or(self.reason)
            .filter(|message| !message.trim().is_empty())
            .unwrap_or_else(|| "unknown vendor error".to_string());
        Err(message)
    }
}

#[derive(Debug, Deserialize)]
pub struct GenerateResult {
    pub hme: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResult {
    #[serde(default)]
    pub hme_emails: Vec<HmeEmail>,
}

/// One alias as returned by the list endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HmeEmail {
    pub hme: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub create_timestamp: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateBody<'a> {
    pub lang_code: &'a str,
}

#[derive(Debug, Serialize)]
pub struct ReserveBody<'a> {
    pub hme: &'a str,
    pub label: &'a str,
    pub note: &'a str,
}

/// Listing row after filtering and timestamp formatting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasRecord {
    pub sequence_number: usize,
    pub label: String,
    pub address: String,
    pub created_at: String,
    pub is_active: bool,
}

impl AliasRecord {
    pub fn status(&self) -> &'static str {
        if self.is_active { "Active" } else { "Inactive" }
    }
}
