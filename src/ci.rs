use serde::{Deserialize, Serialize};

use crate::errors::DiveInError;

pub const RULES_FILENAME: &str = ".dive-ci";

/// Thresholds for a `.dive-ci` rules file. Absent fields are left out.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RulesRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lowest_efficiency: Option<f64>,
    /// Human size such as `20MB`, passed through verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highest_wasted_bytes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highest_user_wasted_percent: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesResponse {
    pub filename: String,
    pub content: String,
}

#[derive(Serialize)]
struct RulesFile {
    rules: RulesRequest,
}

/// Render the rules file. At least one threshold must be set.
pub fn generate_rules(request: &RulesRequest) -> Result<RulesResponse, DiveInError> {
    let rules = RulesRequest {
        lowest_efficiency: request.lowest_efficiency,
        highest_wasted_bytes: request
            .highest_wasted_bytes
            .clone()
            .filter(|v| !v.trim().is_empty()),
        highest_user_wasted_percent: request.highest_user_wasted_percent,
    };

    if rules == RulesRequest::default() {
        return Err(DiveInError::Validation(
            "at least one rule threshold is required".to_string(),
        ));
    }

    let content = serde_yaml::to_string(&RulesFile { rules })
        .map_err(|e| DiveInError::Internal(format!("failed to render rules: {}", e)))?;

    Ok(RulesResponse {
        filename: RULES_FILENAME.to_string(),
        content,
    })
}
