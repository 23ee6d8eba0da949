//! Business error-code classification.
//!
//! Some control planes conflate "not found" with generic 400/403/500-level
//! errors and only disambiguate through an application error code embedded
//! in the body. Classification therefore inspects the body, not just the
//! status line. The (status, code) → absence mapping is data: each resource
//! family declares its own [`NotFoundRule`] table.

use serde_json::Value;

use crate::error::ProviderError;
use crate::path::path_str;

/// A rule reclassifying an API error as absence.
///
/// Matches when the HTTP status equals `status` and the JSON error body
/// carries one of `codes` at `code_field`.
#[derive(Debug, Clone)]
pub struct NotFoundRule {
    /// The HTTP status the control plane actually returns.
    pub status: u16,
    /// Path of the business error code inside the error body,
    /// e.g. `error_code` or `error.code`.
    pub code_field: String,
    /// Codes known to mean "resource absent" for this resource family.
    pub codes: Vec<String>,
}

impl NotFoundRule {
    /// Rule for a business code carried in a 400 response.
    pub fn on_400(code_field: impl Into<String>, codes: &[&str]) -> Self {
        Self::new(400, code_field, codes)
    }

    /// Rule for an arbitrary status.
    pub fn new(status: u16, code_field: impl Into<String>, codes: &[&str]) -> Self {
        Self {
            status,
            code_field: code_field.into(),
            codes: codes.iter().map(|c| c.to_string()).collect(),
        }
    }

    fn matches(&self, status: u16, body: &str) -> bool {
        if status != self.status {
            return false;
        }
        let parsed: Value = match serde_json::from_str(body) {
            Ok(v) => v,
            Err(_) => return false,
        };
        let code = path_str(&self.code_field, &parsed, "");
        !code.is_empty() && self.codes.iter().any(|c| c == &code)
    }
}

/// Reclassify `err` as [`ProviderError::NotFound`] when one of `rules`
/// matches its status and embedded business code. Unmatched errors pass
/// through unchanged.
pub fn apply_rules(err: ProviderError, rules: &[NotFoundRule]) -> ProviderError {
    match &err {
        ProviderError::Api { status, body } => {
            for rule in rules {
                if rule.matches(*status, body) {
                    tracing::debug!(
                        status = *status,
                        "reclassifying business error code as absence"
                    );
                    return ProviderError::NotFound(format!(
                        "treated as deleted (status {status}): {body}"
                    ));
                }
            }
            err
        }
        _ => err,
    }
}
