use serde::{Deserialize, Serialize};
use serde_json::Value;

// --- Orchestrator API types ---

/// Every orchestrator response wraps its payload the same way
#[derive(Debug, Serialize, Deserialize)]
pub struct Envelope<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

impl<T> Envelope<T> {
    pub fn into_first(self) -> Option<T> {
        self.data.into_iter().next()
    }
}

/// Error body returned with non-2xx statuses
#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub errors: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
pub struct ErrorDetail {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub details: Option<String>,
}

impl ErrorBody {
    pub fn summary(&self) -> Option<String> {
        let parts: Vec<String> = self
            .errors
            .iter()
            .map(|e| match &e.details {
                Some(d) if !d.is_empty() => format!("{}: {}", e.message, d),
                _ => e.message.clone(),
            })
            .filter(|m| !m.is_empty())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("; "))
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RenewBody<'a> {
    pub lease_end_time: &'a str,
}

/// Slice id as echoed back by create
#[derive(Debug, Deserialize)]
pub struct CreatedSlice {
    #[serde(alias = "slice_id")]
    pub id: String,
}

/// Accept-modify returns whatever the orchestrator reports about the slice
pub type AcceptResult = Value;
