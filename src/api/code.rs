use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;

use crate::error::{ApiError, ErrorCode};
use crate::models::code_embedding::CodeSearchFilters;
use crate::models::indexing_job::{IndexingJob, IndexingJobStatus, IndexingOptions};
use crate::models::CodeEmbedding;
use crate::vector::SearchOptions;

use super::{ok, ApiResponse, AppState, RequestContext};

#[derive(Deserialize)]
pub struct SearchCodeRequest {
    query: String,
    #[serde(default)]
    filters: CodeSearchFilters,
    limit: Option<usize>,
    score_threshold: Option<f32>,
}

pub async fn search_code(State(state): State<AppState>, ctx: RequestContext, Json(body): Json<SearchCodeRequest>) -> Response {
    let Some(embeddings) = &state.kernel.embeddings else {
        return ApiResponse(ApiError::new(ErrorCode::ExternalServiceError, "no embedding provider configured"), ctx.request_id).into_response();
    };
    let Some(project_id) = &ctx.project_id else {
        return ApiResponse(ApiError::validation("x-project-id header is required"), ctx.request_id).into_response();
    };
    let options = SearchOptions {
        limit: body.limit.unwrap_or(10),
        score_threshold: body.score_threshold.unwrap_or(0.7),
    };
    let query_embedding = match embeddings.generate(&body.query).await {
        Ok(v) => v,
        Err(e) => return ApiResponse(e.into(), ctx.request_id).into_response(),
    };
    match state.kernel.vectors.search(&query_embedding, project_id, &body.filters, options).await {
        Ok(hits) => ok(hits),
        Err(e) => ApiResponse(e.into(), ctx.request_id).into_response(),
    }
}

#[derive(Deserialize)]
pub struct CodeChunkInput {
    repository_name: String,
    file_path: String,
    start_line: u32,
    end_line: u32,
    language: String,
    content: String,
}

#[derive(Deserialize)]
pub struct IndexCodeRequest {
    repository_name: String,
    branch: String,
    chunks: Vec<CodeChunkInput>,
    options: Option<IndexingOptions>,
}

/// Embeds and upserts every chunk, then returns the completed
/// `IndexingJob`. There is no persisted, cancellable background job here
/// (the request blocks for the whole batch) — that tracking shape is
/// still the right one to report progress/status through, so it's
/// populated synchronously rather than replaced with an ad hoc response.
pub async fn index_code(State(state): State<AppState>, ctx: RequestContext, Json(body): Json<IndexCodeRequest>) -> Response {
    let Some(embeddings) = &state.kernel.embeddings else {
        return ApiResponse(ApiError::new(ErrorCode::ExternalServiceError, "no embedding provider configured"), ctx.request_id).into_response();
    };
    let Some(project_id) = &ctx.project_id else {
        return ApiResponse(ApiError::validation("x-project-id header is required"), ctx.request_id).into_response();
    };

    if let Err(e) = state.kernel.vectors.ensure_vector_index(embeddings.dimension()).await {
        return ApiResponse(e.into(), ctx.request_id).into_response();
    }

    let mut job = IndexingJob::builder()
        .project_id(project_id.clone())
        .repository_name(body.repository_name.clone())
        .branch(body.branch.clone())
        .options(body.options.unwrap_or_else(|| IndexingOptions::builder().build()))
        .status(IndexingJobStatus::InProgress)
        .started_at(Some(Utc::now()))
        .build();

    let max_files = job.options.max_files;
    for (file_index, chunk) in body.chunks.into_iter().enumerate() {
        if let Some(max_files) = max_files {
            if file_index as u32 >= max_files {
                job.progress.files_skipped += 1;
                continue;
            }
        }
        job.progress.files_scanned += 1;

        let embedding = match embeddings.generate(&chunk.content).await {
            Ok(v) => v,
            Err(_) => {
                job.progress.files_skipped += 1;
                continue;
            }
        };
        let record = CodeEmbedding::builder()
            .project_id(project_id.clone())
            .repository_name(chunk.repository_name)
            .file_path(chunk.file_path)
            .start_line(chunk.start_line)
            .end_line(chunk.end_line)
            .language(chunk.language)
            .content(chunk.content)
            .embedding(embedding)
            .build();
        match state.kernel.vectors.upsert(record).await {
            Ok(()) => {
                job.progress.files_indexed += 1;
                job.progress.chunks_indexed += 1;
            }
            Err(_) => job.progress.files_skipped += 1,
        }
    }

    job.status = IndexingJobStatus::Completed;
    job.completed_at = Some(Utc::now());
    ok(job)
}
