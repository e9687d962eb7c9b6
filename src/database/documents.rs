use async_trait::async_trait;
use pgvector::Vector;

use super::Database;
use crate::pipeline::Document;
use crate::pipeline::DocumentSource;
use crate::pipeline::SearchHit;
use crate::pipeline::VectorSearch;
use crate::RagRunError;
use crate::Result;

#[derive(Debug, sqlx::FromRow)]
struct HitRow {
    id: String,
    score: f32,
}

impl Database {
    /// Cosine-similarity search over document embeddings, best first
    pub async fn search_documents(&self, embedding: &[f32], limit: usize) -> Result<Vec<SearchHit>> {
        if embedding.len() != self.embedding_dimension {
            return Err(RagRunError::EmbeddingError(format!(
                "Query embedding has {} dimensions, index expects {}",
                embedding.len(),
                self.embedding_dimension
            )));
        }

        let rows = sqlx::query_as::<_, HitRow>(
            r"
            SELECT id, (1 - (embedding <=> $1))::real AS score
            FROM documents
            WHERE embedding IS NOT NULL
            ORDER BY embedding <=> $1
            LIMIT $2
            ",
        )
        .bind(Vector::from(embedding.to_vec()))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        tracing::debug!("Vector search returned {} hits", rows.len());

        Ok(rows
            .into_iter()
            .map(|row| SearchHit {
                id: row.id,
                score: row.score,
            })
            .collect())
    }

    /// Fetch document bodies by id; order is not guaranteed
    pub async fn fetch_documents(&self, ids: &[String]) -> Result<Vec<Document>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let documents = sqlx::query_as::<_, Document>(
            "SELECT id, title, content FROM documents WHERE id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(documents)
    }

    /// Number of documents with an embedding, for diagnostics
    pub async fn count_indexed_documents(&self) -> Result<i64> {
        let count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM documents WHERE embedding IS NOT NULL")
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}

#[async_trait]
impl VectorSearch for Database {
    async fn search(&self, embedding: &[f32], limit: usize) -> Result<Vec<SearchHit>> {
        self.search_documents(embedding, limit).await
    }
}

#[async_trait]
impl DocumentSource for Database {
    async fn fetch(&self, ids: &[String]) -> Result<Vec<Document>> {
        self.fetch_documents(ids).await
    }
}
