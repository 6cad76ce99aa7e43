//! Staged file registration
//!
//! A file reaches the store's Files section in four strictly sequential
//! steps, each consuming the previous step's output:
//!
//! 1. `stagedUploadsCreate` yields an upload URL, a resource URL and form parameters
//! 2. the file is POSTed to the upload URL with those parameters
//! 3. `fileCreate` registers the resource URL as a generic file
//! 4. the new file node is fetched once for confirmation
//!
//! There are no retries and no compensation: the first failing step ends the
//! registration. Step 4 is best-effort and only logged.

use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::client::{AdminApi, PDF_MIME_TYPE};
use crate::error::{AdminError, RegistrationError};
use crate::types::{RegistrationStep, RemoteFileRecord, StagedUploadTarget, UserError};

const STAGED_UPLOADS_CREATE: &str = r#"
mutation stagedUploadsCreate($input: [StagedUploadInput!]!) {
  stagedUploadsCreate(input: $input) {
    stagedTargets {
      resourceUrl
      url
      parameters {
        name
        value
      }
    }
    userErrors {
      field
      message
    }
  }
}
"#;

const FILE_CREATE: &str = r#"
mutation fileCreate($files: [FileCreateInput!]!) {
  fileCreate(files: $files) {
    files {
      id
      fileStatus
    }
    userErrors {
      field
      message
    }
  }
}
"#;

const FILE_BY_ID: &str = r#"
query getFileByID($fileId: ID!) {
  node(id: $fileId) {
    ... on GenericFile {
      id
      fileStatus
      originalSource: url
    }
  }
}
"#;

/// Alt text attached to registered documents
pub const DEFAULT_ALT_TEXT: &str = "Uploaded PDF File";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StagedUploadsCreateData {
    staged_uploads_create: StagedUploadsCreatePayload,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StagedUploadsCreatePayload {
    #[serde(default)]
    staged_targets: Vec<StagedUploadTarget>,
    #[serde(default)]
    user_errors: Vec<UserError>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileCreateData {
    file_create: FileCreatePayload,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileCreatePayload {
    #[serde(default)]
    files: Vec<CreatedFile>,
    #[serde(default)]
    user_errors: Vec<UserError>,
}

#[derive(Deserialize)]
struct CreatedFile {
    id: String,
}

#[derive(Deserialize)]
struct NodeData {
    node: Option<RemoteFileRecord>,
}

fn parse<T: for<'de> Deserialize<'de>>(data: Value, what: &str) -> Result<T, AdminError> {
    serde_json::from_value(data)
        .map_err(|e| AdminError::UnexpectedResponse(format!("Malformed {} payload: {}", what, e)))
}

/// Pushes local files into the store's file storage
#[derive(Clone)]
pub struct FileRegistrar {
    api: Arc<dyn AdminApi>,
    alt_text: String,
}

impl FileRegistrar {
    pub fn new(api: Arc<dyn AdminApi>) -> Self {
        Self {
            api,
            alt_text: DEFAULT_ALT_TEXT.to_string(),
        }
    }

    pub fn with_alt_text(mut self, alt_text: impl Into<String>) -> Self {
        self.alt_text = alt_text.into();
        self
    }

    /// Stage, upload, register and look up the file at `path`
    pub async fn register_file(&self, path: &Path) -> Result<RemoteFileRecord, RegistrationError> {
        let stage = |e| RegistrationError::new(RegistrationStep::StageRequest, e);

        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                stage(AdminError::UnexpectedResponse(format!(
                    "Invalid file path: {}",
                    path.display()
                )))
            })?
            .to_string();
        let contents = tokio::fs::read(path).await.map_err(|e| stage(e.into()))?;

        let target = self
            .stage_upload(&file_name, contents.len())
            .await
            .map_err(stage)?;
        info!("Staged upload URL created for {}", file_name);

        self.api
            .upload_staged(&target, &file_name, contents)
            .await
            .map_err(|e| RegistrationError::new(RegistrationStep::BinaryUpload, e))?;
        info!("{} uploaded to staged URL", file_name);

        let file_id = self
            .create_file(&target.resource_url)
            .await
            .map_err(|e| RegistrationError::new(RegistrationStep::FileCreate, e))?;
        info!("{} registered, file ID {}", file_name, file_id);

        match self.fetch_file(&file_id).await {
            Ok(record) => {
                info!(
                    "Registered file details: id={} status={:?} source={:?}",
                    record.id, record.file_status, record.original_source
                );
                Ok(record)
            }
            Err(e) => {
                warn!(
                    "{} failed for {}: {}",
                    RegistrationStep::FileStatusFetch,
                    file_id,
                    e
                );
                Ok(RemoteFileRecord {
                    id: file_id,
                    file_status: None,
                    original_source: None,
                })
            }
        }
    }

    /// Step 1: request a staged upload slot
    pub async fn stage_upload(
        &self,
        file_name: &str,
        file_size: usize,
    ) -> Result<StagedUploadTarget, AdminError> {
        let variables = json!({
            "input": [{
                "resource": "FILE",
                "filename": file_name,
                "mimeType": PDF_MIME_TYPE,
                "fileSize": file_size.to_string(),
                "httpMethod": "POST",
            }]
        });

        let data = self.api.graphql(STAGED_UPLOADS_CREATE, variables).await?;
        let payload = parse::<StagedUploadsCreateData>(data, "stagedUploadsCreate")?
            .staged_uploads_create;

        if !payload.user_errors.is_empty() {
            return Err(AdminError::UserErrors(payload.user_errors));
        }

        payload
            .staged_targets
            .into_iter()
            .next()
            .ok_or_else(|| AdminError::UnexpectedResponse("No staged target returned".into()))
    }

    /// Step 3: register an uploaded resource as a generic file, returning its ID
    pub async fn create_file(&self, resource_url: &str) -> Result<String, AdminError> {
        let variables = json!({
            "files": [{
                "alt": self.alt_text,
                "contentType": "FILE",
                "originalSource": resource_url,
            }]
        });

        let data = self.api.graphql(FILE_CREATE, variables).await?;
        let payload = parse::<FileCreateData>(data, "fileCreate")?.file_create;

        if !payload.user_errors.is_empty() {
            return Err(AdminError::UserErrors(payload.user_errors));
        }

        payload
            .files
            .into_iter()
            .next()
            .map(|file| file.id)
            .ok_or_else(|| AdminError::UnexpectedResponse("No file returned by fileCreate".into()))
    }

    /// Step 4: look up a registered file
    pub async fn fetch_file(&self, file_id: &str) -> Result<RemoteFileRecord, AdminError> {
        let data = self
            .api
            .graphql(FILE_BY_ID, json!({ "fileId": file_id }))
            .await?;

        parse::<NodeData>(data, "node")?
            .node
            .ok_or_else(|| AdminError::UnexpectedResponse(format!("File {} not found", file_id)))
    }
}
