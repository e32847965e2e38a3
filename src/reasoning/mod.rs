//! C8 — append-only reasoning chain store, lexical search, and analysis.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use uuid::Uuid;

use crate::error::ReasoningError;
use crate::models::reasoning::{ReasoningAnalysis, ReasoningSearchFilters, StepQuality, StepType};
use crate::models::ReasoningStep;
use crate::sessions::SessionStore;

/// Keyed by session id so `get_chain` never scans the whole store.
pub struct ReasoningStore {
    sessions: Arc<SessionStore>,
    by_session: DashMap<Uuid, Vec<ReasoningStep>>,
}

impl ReasoningStore {
    pub fn new(sessions: Arc<SessionStore>) -> Self {
        Self { sessions, by_session: DashMap::new() }
    }

    /// Assigns `step_number` from the owning session's chain length so
    /// numbering survives concurrent writers across process restarts of
    /// the in-memory session counter.
    pub async fn store(&self, mut step: ReasoningStep) -> Result<ReasoningStep, ReasoningError> {
        let step_number = self
            .sessions
            .next_step_number(step.session_id)
            .await
            .map_err(|_| ReasoningError::SessionNotFound(step.session_id))?;
        step.step_number = step_number;
        self.by_session.entry(step.session_id).or_default().push(step.clone());
        Ok(step)
    }

    pub async fn get_chain(&self, session_id: Uuid) -> Vec<ReasoningStep> {
        self.by_session.get(&session_id).map(|e| e.value().clone()).unwrap_or_default()
    }

    /// Lexical search: ranks by fraction of query terms matched in
    /// `content.raw` + `content.keywords`, tied back by recency. Not a
    /// substitute for a real index, but the only ranking signal a
    /// tenant's own reasoning chain actually needs.
    pub async fn search(&self, query: &str, filters: &ReasoningSearchFilters) -> Vec<ReasoningStep> {
        let terms: Vec<String> = query.to_lowercase().split_whitespace().map(String::from).collect();
        if terms.is_empty() {
            return Vec::new();
        }

        let candidates: Vec<ReasoningStep> = match filters.session_id {
            Some(id) => self.get_chain(id).await,
            None => self.by_session.iter().flat_map(|e| e.value().clone()).collect(),
        };

        let mut scored: Vec<(f32, ReasoningStep)> = candidates
            .into_iter()
            .filter(|step| filters.step_type.is_none() || filters.step_type == Some(step.step_type))
            .filter_map(|step| {
                let haystack = format!("{} {}", step.content.raw, step.content.keywords.join(" ")).to_lowercase();
                let matched = terms.iter().filter(|t| haystack.contains(t.as_str())).count();
                if matched == 0 {
                    None
                } else {
                    Some((matched as f32 / terms.len() as f32, step))
                }
            })
            .collect();

        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.1.metadata.timestamp.cmp(&a.1.metadata.timestamp))
        });
        scored.into_iter().map(|(_, step)| step).collect()
    }

    pub async fn analyze(&self, session_id: Uuid) -> ReasoningAnalysis {
        let chain = self.get_chain(session_id).await;

        let mut type_distribution = HashMap::new();
        let mut tool_usage = HashMap::new();
        let mut file_touch_histogram = HashMap::new();
        let mut keyword_counts: HashMap<String, u32> = HashMap::new();
        let mut phase_sequence = Vec::new();
        let (mut clarity, mut completeness, mut usefulness) = (0.0f32, 0.0f32, 0.0f32);

        for step in &chain {
            *type_distribution.entry(format!("{:?}", step.step_type)).or_insert(0) += 1;
            phase_sequence.push(step.step_type);
            for tool in &step.context.tools_used {
                *tool_usage.entry(tool.clone()).or_insert(0) += 1;
            }
            for file in step.context.files_referenced.iter().chain(step.context.files_modified.iter()) {
                *file_touch_histogram.entry(file.clone()).or_insert(0) += 1;
            }
            for keyword in &step.content.keywords {
                *keyword_counts.entry(keyword.clone()).or_insert(0) += 1;
            }
            clarity += step.quality.clarity;
            completeness += step.quality.completeness;
            usefulness += step.quality.usefulness;
        }

        let count = chain.len().max(1) as f32;
        let average_quality = StepQuality {
            clarity: clarity / count,
            completeness: completeness / count,
            usefulness: usefulness / count,
        };

        let mut top_keywords: Vec<(String, u32)> = keyword_counts.into_iter().collect();
        top_keywords.sort_by(|a, b| b.1.cmp(&a.1));
        top_keywords.truncate(10);

        ReasoningAnalysis {
            type_distribution,
            tool_usage,
            file_touch_histogram,
            average_quality,
            top_keywords,
            phase_sequence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::reasoning::StepContent;
    use crate::models::Session;

    fn step(session_id: Uuid, step_type: StepType, raw: &str, keywords: Vec<&str>) -> ReasoningStep {
        ReasoningStep::builder()
            .session_id(session_id)
            .step_type(step_type)
            .content(
                StepContent::builder()
                    .raw(raw.to_string())
                    .keywords(keywords.into_iter().map(String::from).collect())
                    .build(),
            )
            .build()
    }

    async fn store_with_session() -> (ReasoningStore, Uuid) {
        let sessions = Arc::new(SessionStore::new());
        let session = sessions.create(Session::builder().project_id("p1".to_string()).build()).await;
        (ReasoningStore::new(sessions), session.session_id)
    }

    #[tokio::test]
    async fn step_numbers_increment_from_session_chain_length() {
        let (store, session_id) = store_with_session().await;
        let first = store.store(step(session_id, StepType::Analysis, "inspect the queue", vec![])).await.unwrap();
        let second = store.store(step(session_id, StepType::Execution, "run the worker", vec![])).await.unwrap();
        assert_eq!(first.step_number, 1);
        assert_eq!(second.step_number, 2);
    }

    #[tokio::test]
    async fn search_ranks_by_term_overlap_then_recency() {
        let (store, session_id) = store_with_session().await;
        store.store(step(session_id, StepType::Analysis, "inspect the broker queue", vec!["broker"])).await.unwrap();
        store.store(step(session_id, StepType::Execution, "retry the job", vec!["retry"])).await.unwrap();

        let results = store.search("broker queue", &ReasoningSearchFilters::default()).await;
        assert_eq!(results.len(), 1);
        assert!(results[0].content.raw.contains("broker"));
    }

    #[tokio::test]
    async fn analyze_computes_type_distribution_and_quality() {
        let (store, session_id) = store_with_session().await;
        store.store(step(session_id, StepType::Analysis, "a", vec!["x"])).await.unwrap();
        store.store(step(session_id, StepType::Analysis, "b", vec!["x", "y"])).await.unwrap();

        let analysis = store.analyze(session_id).await;
        assert_eq!(analysis.type_distribution.get("Analysis"), Some(&2));
        assert_eq!(analysis.phase_sequence.len(), 2);
        assert_eq!(analysis.top_keywords[0].0, "x");
        assert_eq!(analysis.top_keywords[0].1, 2);
    }
}
