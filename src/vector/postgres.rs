use async_trait::async_trait;
use pgvector::Vector;
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

use crate::error::VectorError;
use crate::models::code_embedding::{CodeSearchFilters, CodeSearchHit};
use crate::models::CodeEmbedding;

use super::{SearchOptions, VectorIndex};

/// Postgres + pgvector backed index, grounded on the reference service's
/// raw `sqlx::query_as` cosine-similarity query over `m.embedding <=> $1`.
pub struct PostgresVectorIndex {
    pool: PgPool,
}

impl PostgresVectorIndex {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct EmbeddingRow {
    id: Uuid,
    project_id: String,
    repository_name: String,
    file_path: String,
    start_line: i32,
    end_line: i32,
    language: String,
    content: String,
    embedding: Vector,
    indexed_at: chrono::DateTime<chrono::Utc>,
    similarity: f32,
}

#[async_trait]
impl VectorIndex for PostgresVectorIndex {
    #[instrument(skip(self, embedding))]
    async fn upsert(&self, embedding: CodeEmbedding) -> Result<(), VectorError> {
        let vector = Vector::from(embedding.embedding.clone());
        sqlx::query(
            r#"
            INSERT INTO code_embeddings (id, project_id, repository_name, file_path, start_line, end_line, language, content, embedding, indexed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (id) DO UPDATE SET
                content = EXCLUDED.content,
                embedding = EXCLUDED.embedding,
                indexed_at = EXCLUDED.indexed_at
            "#,
        )
        .bind(embedding.id)
        .bind(&embedding.project_id)
        .bind(&embedding.repository_name)
        .bind(&embedding.file_path)
        .bind(embedding.start_line as i32)
        .bind(embedding.end_line as i32)
        .bind(&embedding.language)
        .bind(&embedding.content)
        .bind(vector)
        .bind(embedding.indexed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self, query_embedding))]
    async fn search(&self, query_embedding: &[f32], project_id: &str, filters: &CodeSearchFilters, options: SearchOptions) -> Result<Vec<CodeSearchHit>, VectorError> {
        let query_vector = Vector::from(query_embedding.to_vec());
        // numCandidates = limit * 10 first-stage fan-out before the score
        // threshold and extra filters are applied.
        let candidate_count = (options.limit * 10) as i64;

        let rows: Vec<EmbeddingRow> = sqlx::query_as(
            r#"
            SELECT id, project_id, repository_name, file_path, start_line, end_line, language, content, embedding, indexed_at,
                   1 - (embedding <=> $1) AS similarity
            FROM code_embeddings
            WHERE project_id = $2
              AND ($3::text IS NULL OR repository_name = $3)
              AND ($4::text IS NULL OR language = $4)
            ORDER BY embedding <=> $1
            LIMIT $5
            "#,
        )
        .bind(&query_vector)
        .bind(project_id)
        .bind(&filters.repository_name)
        .bind(&filters.language)
        .bind(candidate_count)
        .fetch_all(&self.pool)
        .await?;

        let file_path_re = filters.file_path.as_ref().and_then(|p| regex::Regex::new(p).ok());

        let mut hits: Vec<CodeSearchHit> = rows
            .into_iter()
            .filter(|row| row.similarity >= options.score_threshold)
            .filter(|row| file_path_re.as_ref().map_or(true, |re| re.is_match(&row.file_path)))
            .map(|row| CodeSearchHit {
                score: row.similarity,
                embedding: CodeEmbedding {
                    id: row.id,
                    project_id: row.project_id,
                    repository_name: row.repository_name,
                    file_path: row.file_path,
                    start_line: row.start_line as u32,
                    end_line: row.end_line as u32,
                    language: row.language,
                    content: row.content,
                    embedding: row.embedding.to_vec(),
                    indexed_at: row.indexed_at,
                },
            })
            .collect();

        hits.truncate(options.limit);
        Ok(hits)
    }

    async fn delete_repository_embeddings(&self, project_id: &str, repository_name: &str) -> Result<u64, VectorError> {
        let result = sqlx::query("DELETE FROM code_embeddings WHERE project_id = $1 AND repository_name = $2")
            .bind(project_id)
            .bind(repository_name)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// `CREATE INDEX IF NOT EXISTS` makes re-creation idempotent; this
    /// assumes the `code_embeddings.embedding` column was declared with
    /// the target dimension via migration, since pgvector bakes the
    /// dimension into the column type rather than the index.
    async fn ensure_vector_index(&self, _dimension: usize) -> Result<(), VectorError> {
        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS code_embeddings_embedding_cosine_idx
            ON code_embeddings USING ivfflat (embedding vector_cosine_ops)
            WITH (lists = 100)
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
