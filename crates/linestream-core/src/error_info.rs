//! Server error details
//!
//! Streaming APIs report failures either as an error JSON document or as
//! plain text. Both end up in a [`ServerErrorInfo`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One error entry reported by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerErrorDetail {
    #[serde(default)]
    pub code: Option<i64>,
    pub message: String,
}

/// Everything the server told us about a failure
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ServerErrorInfo {
    pub details: Vec<ServerErrorDetail>,
    /// Raw payload as received
    pub raw: String,
}

impl ServerErrorInfo {
    /// Extract error details from a payload
    ///
    /// Understands `{"errors": [{"code": .., "message": ..}]}` and
    /// `{"error": ".."}`; anything else is kept as a single raw message.
    pub fn from_payload(payload: &str) -> Self {
        let raw = payload.trim().to_string();
        let details = match serde_json::from_str::<Value>(&raw) {
            Ok(json) => details_from_json(&json),
            Err(_) => Vec::new(),
        };

        let details = if details.is_empty() && !raw.is_empty() {
            vec![ServerErrorDetail {
                code: None,
                message: raw.clone(),
            }]
        } else {
            details
        };

        Self { details, raw }
    }

    /// Messages joined for display
    pub fn summary(&self) -> String {
        if self.details.is_empty() {
            return "<empty response>".to_string();
        }
        self.details
            .iter()
            .map(|d| match d.code {
                Some(code) => format!("[{}] {}", code, d.message),
                None => d.message.clone(),
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

fn details_from_json(json: &Value) -> Vec<ServerErrorDetail> {
    if let Some(errors) = json.get("errors").and_then(|e| e.as_array()) {
        return errors
            .iter()
            .filter_map(|entry| {
                let message = entry.get("message").and_then(|m| m.as_str())?;
                Some(ServerErrorDetail {
                    code: entry.get("code").and_then(|c| c.as_i64()),
                    message: message.to_string(),
                })
            })
            .collect();
    }

    if let Some(message) = json.get("error").and_then(|e| e.as_str()) {
        return vec![ServerErrorDetail {
            code: None,
            message: message.to_string(),
        }];
    }

    Vec::new()
}

/// Human description of an HTTP status code returned by a streaming endpoint
pub fn describe_status(status: u16) -> Option<&'static str> {
    let description = match status {
        200 => "Success",
        304 => "Not Modified: there was no new data to return",
        400 => "Bad Request: the request was invalid",
        401 => "Unauthorized: missing or incorrect authentication credentials",
        403 => "Forbidden: the request is understood but has been refused",
        404 => "Not Found: the requested resource does not exist",
        406 => "Not Acceptable: invalid parameters were given to the stream",
        410 => "Gone: this resource is gone",
        413 => "Too Long: a parameter list is too long",
        416 => "Range Unacceptable: a count parameter is out of range",
        420 => "Enhance Your Calm: too many connection attempts",
        429 => "Too Many Requests: rate limit exceeded",
        500 => "Internal Server Error",
        502 => "Bad Gateway: the service is down or being upgraded",
        503 => "Service Unavailable: the servers are overloaded",
        504 => "Gateway Timeout: the request could not be serviced in time",
        _ => return None,
    };
    Some(description)
}
