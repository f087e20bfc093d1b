use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::response::{ApiError, AppQuery, JSend};
use crate::lifecycle::{IncomingFile, PlacedFile};
use crate::storage::models::{StudySet, StudySetFile};
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct StudySetResponse {
    pub id: u64,
    pub user_id: u64,
    pub name: String,
    pub description: Option<String>,
    pub creation_date: String,
    pub modification_date: String,
}

#[derive(Debug, Serialize)]
pub struct StudySetUploadResponse {
    pub message: String,
    #[serde(flatten)]
    pub study_set: StudySetResponse,
    pub files: Vec<PlacedFile>,
}

#[derive(Debug, Serialize)]
pub struct FileEntry {
    pub file_id: u64,
    pub file_path: String,
}

#[derive(Debug, Serialize)]
pub struct StudySetDetailsResponse {
    #[serde(flatten)]
    pub study_set: StudySetResponse,
    pub files: Vec<FileEntry>,
}

#[derive(Debug, Serialize)]
pub struct StudySetFileResponse {
    pub id: u64,
    pub study_set_id: u64,
    pub file_path: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct ListStudySetsParams {
    #[serde(default, rename = "userId", alias = "user_id")]
    pub user_id: Option<String>,
}

/// Fields of a create/update multipart form. Files are already staged.
#[derive(Debug, Default)]
struct StudySetForm {
    user_id: Option<String>,
    name: Option<String>,
    description: Option<String>,
    files: Vec<IncomingFile>,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn create_study_set(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<JSend<StudySetUploadResponse>>), ApiError> {
    let form = read_form(&state, multipart).await?;

    let owner_id = match parse_user_id(form.user_id.as_deref()) {
        Ok(owner_id) => owner_id,
        Err(e) => {
            state.manager.discard_staged(&form.files).await;
            return Err(e);
        }
    };

    let created = state
        .manager
        .create_study_set(
            owner_id,
            form.name.as_deref().unwrap_or_default(),
            form.description.as_deref(),
            form.files,
        )
        .await?;

    let message = if created.files.is_empty() {
        "Study set created successfully without files."
    } else {
        "Study set created successfully with files."
    };

    Ok((
        StatusCode::CREATED,
        JSend::success(StudySetUploadResponse {
            message: message.to_string(),
            study_set: study_set_to_response(&created.study_set),
            files: created.files,
        }),
    ))
}

pub async fn list_study_sets(
    State(state): State<Arc<AppState>>,
    AppQuery(params): AppQuery<ListStudySetsParams>,
) -> Result<Json<JSend<Vec<StudySetResponse>>>, ApiError> {
    let owner_id = parse_user_id(params.user_id.as_deref())?;
    let study_sets = state.manager.get_all_study_sets(owner_id)?;

    Ok(JSend::success(
        study_sets.iter().map(study_set_to_response).collect(),
    ))
}

pub async fn get_study_set(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JSend<StudySetDetailsResponse>>, ApiError> {
    let id = parse_path_id(&id, "Study set not found.")?;
    let details = state.manager.get_study_set_details(id)?;

    Ok(JSend::success(StudySetDetailsResponse {
        study_set: study_set_to_response(&details.study_set),
        files: details
            .files
            .into_iter()
            .map(|f| FileEntry {
                file_id: f.id,
                file_path: f.file_path,
            })
            .collect(),
    }))
}

pub async fn list_study_set_files(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JSend<Vec<StudySetFileResponse>>>, ApiError> {
    let id = parse_path_id(&id, "Study set not found.")?;
    let files = state.manager.get_files_for_study_set(id)?;

    Ok(JSend::success(files.iter().map(file_to_response).collect()))
}

pub async fn update_study_set(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    multipart: Multipart,
) -> Result<Json<JSend<StudySetUploadResponse>>, ApiError> {
    let form = read_form(&state, multipart).await?;

    let id = match parse_path_id(&id, "Study set not found.") {
        Ok(id) => id,
        Err(e) => {
            state.manager.discard_staged(&form.files).await;
            return Err(e);
        }
    };

    let updated = state
        .manager
        .update_study_set(
            id,
            form.name.as_deref().unwrap_or_default(),
            form.description.as_deref(),
            form.files,
        )
        .await?;

    let message = if updated.files.is_empty() {
        "Study set updated successfully without files."
    } else {
        "Study set updated successfully with files."
    };

    Ok(JSend::success(StudySetUploadResponse {
        message: message.to_string(),
        study_set: study_set_to_response(&updated.study_set),
        files: updated.files,
    }))
}

pub async fn delete_study_set(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JSend<MessageResponse>>, ApiError> {
    let id = parse_path_id(&id, "Study set not found.")?;
    let deleted = state.manager.delete_study_set(id).await?;

    tracing::debug!(study_set_id = id, files = deleted.files_removed, "Deleted study set");
    Ok(JSend::success(MessageResponse {
        message: "Study set and associated directory deleted successfully.".to_string(),
    }))
}

pub async fn delete_file_from_study_set(
    State(state): State<Arc<AppState>>,
    Path(file_id): Path<String>,
) -> Result<Json<JSend<MessageResponse>>, ApiError> {
    let file_id = parse_path_id(&file_id, "File not found.")?;
    state.manager.delete_file_from_study_set(file_id).await?;

    Ok(JSend::success(MessageResponse {
        message: "File deleted successfully.".to_string(),
    }))
}

// ============================================================================
// Helpers
// ============================================================================

/// Read a create/update form, staging every file part as it arrives. On any
/// error the files staged so far are discarded.
async fn read_form(state: &AppState, mut multipart: Multipart) -> Result<StudySetForm, ApiError> {
    let mut form = StudySetForm::default();
    if let Err(e) = read_fields(state, &mut multipart, &mut form).await {
        state.manager.discard_staged(&form.files).await;
        return Err(e);
    }
    Ok(form)
}

async fn read_fields(
    state: &AppState,
    multipart: &mut Multipart,
    form: &mut StudySetForm,
) -> Result<(), ApiError> {
    let limits = &state.config.uploads;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart data: {e}")))?
    {
        let field_name = field.name().unwrap_or("").to_string();

        match field_name.as_str() {
            "files" | "files[]" | "file" => {
                let original_name = field.file_name().unwrap_or("").to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Failed to read file: {e}")))?;

                // Browsers send an empty part when no file was chosen.
                if original_name.is_empty() && data.is_empty() {
                    continue;
                }

                if form.files.len() >= limits.max_files_per_request {
                    return Err(ApiError::bad_request(format!(
                        "At most {} files can be uploaded per request",
                        limits.max_files_per_request
                    )));
                }

                if data.len() as u64 > limits.max_upload_size {
                    return Err(ApiError::payload_too_large(format!(
                        "File exceeds maximum upload size of {} bytes",
                        limits.max_upload_size
                    )));
                }

                let staged = state.manager.stage(&original_name, data).await?;
                form.files.push(staged);
            }
            "userId" | "user_id" => {
                form.user_id = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| ApiError::bad_request(format!("Invalid userId: {e}")))?,
                );
            }
            "name" => {
                form.name = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| ApiError::bad_request(format!("Invalid name: {e}")))?,
                );
            }
            "description" => {
                form.description = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| ApiError::bad_request(format!("Invalid description: {e}")))?,
                );
            }
            _ => {
                // Ignore unknown fields
            }
        }
    }

    Ok(())
}

/// A missing or blank user id maps to 0, which the lifecycle layer rejects
/// as a validation error.
fn parse_user_id(raw: Option<&str>) -> Result<u64, ApiError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(0),
        Some(value) => value
            .parse()
            .map_err(|_| ApiError::bad_request("User ID must be a positive integer.")),
    }
}

fn parse_path_id(raw: &str, not_found: &str) -> Result<u64, ApiError> {
    raw.parse().map_err(|_| ApiError::not_found(not_found))
}

fn study_set_to_response(study_set: &StudySet) -> StudySetResponse {
    StudySetResponse {
        id: study_set.id,
        user_id: study_set.owner_id,
        name: study_set.name.clone(),
        description: study_set.description.clone(),
        creation_date: study_set.created_at.to_rfc3339(),
        modification_date: study_set.modified_at.to_rfc3339(),
    }
}

fn file_to_response(file: &StudySetFile) -> StudySetFileResponse {
    StudySetFileResponse {
        id: file.id,
        study_set_id: file.study_set_id,
        file_path: file.file_path.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::create_router;
    use crate::lifecycle::STAGING_DIR;
    use crate::testutil::{test_state, test_state_with_limits};
    use axum::body::Body;
    use axum::http::{header, Request};
    use bytes::Bytes;
    use tower::ServiceExt;

    const BOUNDARY: &str = "study-set-form-boundary";

    enum Part<'a> {
        Text(&'a str, &'a str),
        File(&'a str, &'a str, &'a [u8]),
    }

    fn multipart_request(method: &str, uri: &str, parts: &[Part]) -> Request<Body> {
        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            match part {
                Part::Text(name, value) => {
                    body.extend_from_slice(
                        format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                            .as_bytes(),
                    );
                }
                Part::File(name, file_name, data) => {
                    body.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\n\
                             Content-Type: application/octet-stream\r\n\r\n"
                        )
                        .as_bytes(),
                    );
                    body.extend_from_slice(data);
                    body.extend_from_slice(b"\r\n");
                }
            }
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method(method)
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn send(state: &Arc<AppState>, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = create_router(Arc::clone(state))
            .oneshot(request)
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn staged_count(dir: &tempfile::TempDir) -> usize {
        std::fs::read_dir(dir.path().join("uploads").join(STAGING_DIR))
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    fn status<T>(result: Result<T, ApiError>) -> StatusCode {
        match result {
            Ok(_) => StatusCode::OK,
            Err(ApiError::Fail(code, _)) | Err(ApiError::Error(code, _)) => code,
        }
    }

    async fn seeded(state: &AppState, files: usize) -> (u64, Vec<u64>) {
        let mut incoming = Vec::new();
        for i in 0..files {
            incoming.push(
                state
                    .manager
                    .stage(&format!("notes-{i}.pdf"), Bytes::from("content"))
                    .await
                    .unwrap(),
            );
        }
        let created = state
            .manager
            .create_study_set(1, "Biology", Some("Cells"), incoming)
            .await
            .unwrap();
        let file_ids = state
            .manager
            .get_files_for_study_set(created.study_set.id)
            .unwrap()
            .iter()
            .map(|f| f.id)
            .collect();
        (created.study_set.id, file_ids)
    }

    #[tokio::test]
    async fn test_get_study_set_returns_files() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        let (id, _) = seeded(&state, 2).await;

        let Json(body) = get_study_set(State(Arc::clone(&state)), Path(id.to_string()))
            .await
            .unwrap();
        assert_eq!(body.data.study_set.name, "Biology");
        assert_eq!(body.data.study_set.user_id, 1);
        assert_eq!(body.data.files.len(), 2);
    }

    #[tokio::test]
    async fn test_get_study_set_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        let result = get_study_set(State(Arc::clone(&state)), Path("42".to_string())).await;
        assert_eq!(status(result), StatusCode::NOT_FOUND);

        let result = get_study_set(State(state), Path("not-a-number".to_string())).await;
        assert_eq!(status(result), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_list_study_sets_requires_user_id() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        let result = list_study_sets(
            State(Arc::clone(&state)),
            AppQuery(ListStudySetsParams { user_id: None }),
        )
        .await;
        assert_eq!(status(result), StatusCode::BAD_REQUEST);

        seeded(&state, 0).await;
        let Json(body) = list_study_sets(
            State(state),
            AppQuery(ListStudySetsParams {
                user_id: Some("1".to_string()),
            }),
        )
        .await
        .unwrap();
        assert_eq!(body.data.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_file_then_study_set() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        let (id, file_ids) = seeded(&state, 2).await;

        delete_file_from_study_set(State(Arc::clone(&state)), Path(file_ids[0].to_string()))
            .await
            .unwrap();
        let Json(files) = list_study_set_files(State(Arc::clone(&state)), Path(id.to_string()))
            .await
            .unwrap();
        assert_eq!(files.data.len(), 1);

        let Json(body) = delete_study_set(State(Arc::clone(&state)), Path(id.to_string()))
            .await
            .unwrap();
        assert_eq!(
            body.data.message,
            "Study set and associated directory deleted successfully."
        );

        let result = get_study_set(State(state), Path(id.to_string())).await;
        assert_eq!(status(result), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_parse_user_id() {
        assert_eq!(parse_user_id(None).unwrap(), 0);
        assert_eq!(parse_user_id(Some("  ")).unwrap(), 0);
        assert_eq!(parse_user_id(Some("17")).unwrap(), 17);
        assert!(parse_user_id(Some("abc")).is_err());
    }

    #[tokio::test]
    async fn test_create_study_set_with_files() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state_with_limits(&dir, 1024, 3);

        let request = multipart_request(
            "POST",
            "/api/study-set",
            &[
                Part::Text("userId", "1"),
                Part::Text("name", "Biology"),
                Part::Text("description", "Cells"),
                Part::File("files", "cells.pdf", b"cells"),
                Part::File("files", "genetics.pdf", b"genetics"),
            ],
        );
        let (code, body) = send(&state, request).await;

        assert_eq!(code, StatusCode::CREATED);
        assert_eq!(body["status"], "success");
        assert_eq!(
            body["data"]["message"],
            "Study set created successfully with files."
        );
        assert_eq!(body["data"]["files"].as_array().unwrap().len(), 2);

        let id = body["data"]["id"].as_u64().unwrap();
        assert_eq!(state.manager.get_files_for_study_set(id).unwrap().len(), 2);
        assert_eq!(staged_count(&dir), 0);
    }

    #[tokio::test]
    async fn test_create_rejects_too_many_files() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state_with_limits(&dir, 1024, 2);

        let request = multipart_request(
            "POST",
            "/api/study-set",
            &[
                Part::Text("userId", "1"),
                Part::Text("name", "Biology"),
                Part::File("files", "a.pdf", b"a"),
                Part::File("files", "b.pdf", b"b"),
                Part::File("files", "c.pdf", b"c"),
            ],
        );
        let (code, body) = send(&state, request).await;

        assert_eq!(code, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], "fail");
        assert_eq!(staged_count(&dir), 0);
        assert!(state.manager.get_all_study_sets(1).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_rejects_oversized_file() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state_with_limits(&dir, 8, 5);

        let request = multipart_request(
            "POST",
            "/api/study-set",
            &[
                Part::Text("userId", "1"),
                Part::Text("name", "Biology"),
                Part::File("files", "small.pdf", b"ok"),
                Part::File("files", "large.pdf", b"0123456789abcdef"),
            ],
        );
        let (code, body) = send(&state, request).await;

        assert_eq!(code, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body["status"], "fail");
        assert_eq!(staged_count(&dir), 0);
        assert!(state.manager.get_all_study_sets(1).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_skips_empty_file_part() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        let request = multipart_request(
            "POST",
            "/api/study-set",
            &[
                Part::Text("userId", "1"),
                Part::Text("name", "Biology"),
                Part::File("files", "", b""),
            ],
        );
        let (code, body) = send(&state, request).await;

        assert_eq!(code, StatusCode::CREATED);
        assert_eq!(
            body["data"]["message"],
            "Study set created successfully without files."
        );
        assert!(body["data"]["files"].as_array().unwrap().is_empty());
        assert_eq!(staged_count(&dir), 0);
    }

    #[tokio::test]
    async fn test_create_requires_name() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        let request = multipart_request(
            "POST",
            "/api/study-set",
            &[
                Part::Text("userId", "1"),
                Part::File("files", "cells.pdf", b"cells"),
            ],
        );
        let (code, body) = send(&state, request).await;

        assert_eq!(code, StatusCode::BAD_REQUEST);
        assert_eq!(body["data"]["message"], "Study set name is required.");
        assert_eq!(staged_count(&dir), 0);
    }

    #[tokio::test]
    async fn test_update_study_set_with_file() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        let (id, _) = seeded(&state, 1).await;

        let request = multipart_request(
            "PUT",
            &format!("/api/study-set/{id}"),
            &[
                Part::Text("name", "Biology II"),
                Part::File("files", "genetics.pdf", b"genetics"),
            ],
        );
        let (code, body) = send(&state, request).await;

        assert_eq!(code, StatusCode::OK);
        assert_eq!(body["data"]["name"], "Biology II");
        assert_eq!(
            body["data"]["message"],
            "Study set updated successfully with files."
        );

        let details = state.manager.get_study_set_details(id).unwrap();
        assert_eq!(details.study_set.name, "Biology II");
        assert_eq!(details.files.len(), 2);
        assert_eq!(staged_count(&dir), 0);
    }

    #[tokio::test]
    async fn test_update_unknown_study_set_discards_upload() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        let request = multipart_request(
            "PUT",
            "/api/study-set/99",
            &[
                Part::Text("name", "Biology"),
                Part::File("files", "cells.pdf", b"cells"),
            ],
        );
        let (code, _) = send(&state, request).await;

        assert_eq!(code, StatusCode::NOT_FOUND);
        assert_eq!(staged_count(&dir), 0);
    }
}
