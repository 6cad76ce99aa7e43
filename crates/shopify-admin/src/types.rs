//! Admin API data types

use serde::{Deserialize, Serialize};

/// One form field the staged upload target requires, replayed verbatim
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedUploadParameter {
    pub name: String,
    pub value: String,
}

/// Short-lived, single-use upload destination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StagedUploadTarget {
    pub url: String,
    pub resource_url: String,
    #[serde(default)]
    pub parameters: Vec<StagedUploadParameter>,
}

/// The registered file as reported by the platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFileRecord {
    pub id: String,
    #[serde(default)]
    pub file_status: Option<String>,
    #[serde(default)]
    pub original_source: Option<String>,
}

/// `userErrors` entry of a mutation payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserError {
    #[serde(default)]
    pub field: Option<Vec<String>>,
    pub message: String,
}

/// Steps of a file registration, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStep {
    StageRequest,
    BinaryUpload,
    FileCreate,
    FileStatusFetch,
}

impl std::fmt::Display for RegistrationStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistrationStep::StageRequest => write!(f, "stage_request"),
            RegistrationStep::BinaryUpload => write!(f, "binary_upload"),
            RegistrationStep::FileCreate => write!(f, "file_create"),
            RegistrationStep::FileStatusFetch => write!(f, "file_status_fetch"),
        }
    }
}
