// src/recommend.rs
//
// Hybrid ranking of candidate actions for one learner state.
//
// If the value table holds a non-zero value for any candidate in this state,
// candidates are ranked by learned value. Otherwise they are ranked by the
// heuristic scorer. Never random. Ties break by action id.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::catalog::ActionCatalog;
use crate::cluster::ClusterClassifier;
use crate::error::ValidationError;
use crate::features::FeatureMap;
use crate::rl::policy::{by_value_then_id, HeuristicScorer, HeuristicWeights};
use crate::rl::value_table::ValueTable;
use crate::state::StateEncoder;
use crate::types::{Action, ActionType, Difficulty, LearnerState, Tier};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    Learned,
    Heuristic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub action_id: String,
    pub name: String,
    pub action_type: ActionType,
    pub difficulty: Difficulty,
    /// Learned value or heuristic score, depending on `method`.
    pub value: f64,
    pub method: Method,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommenderConfig {
    pub top_k: usize,
    pub weights: HeuristicWeights,
}

impl Default for RecommenderConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            weights: HeuristicWeights::default(),
        }
    }
}

impl RecommenderConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.top_k == 0 {
            return Err(ValidationError::new("recommender.top_k", "must be > 0"));
        }
        self.weights.validate()
    }
}

pub struct Recommender<'a> {
    table: Arc<ValueTable>,
    catalog: &'a ActionCatalog,
    encoder: &'a StateEncoder,
    classifier: Option<&'a ClusterClassifier>,
    scorer: HeuristicScorer,
}

impl<'a> Recommender<'a> {
    pub fn new(
        table: Arc<ValueTable>,
        catalog: &'a ActionCatalog,
        encoder: &'a StateEncoder,
        scorer: HeuristicScorer,
    ) -> Self {
        Self {
            table,
            catalog,
            encoder,
            classifier: None,
            scorer,
        }
    }

    /// Resolve `group_id` features through this classifier.
    pub fn with_classifier(mut self, classifier: &'a ClusterClassifier) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Serve from a different table snapshot.
    pub fn set_table(&mut self, table: Arc<ValueTable>) {
        self.table = table;
    }

    pub fn table(&self) -> &ValueTable {
        &self.table
    }

    /// Rank `candidates` for `state`, skipping excluded ids and duplicates.
    pub fn recommend(
        &self,
        state: &LearnerState,
        candidates: &[&Action],
        top_k: usize,
        excluded: &HashSet<String>,
    ) -> Vec<Recommendation> {
        let mut seen = HashSet::new();
        let mut pool: Vec<&Action> = Vec::with_capacity(candidates.len());
        for a in candidates.iter().copied() {
            if !excluded.contains(&a.id) && seen.insert(a.id.as_str()) {
                pool.push(a);
            }
        }

        let learned: Vec<(&Action, f64)> = pool
            .iter()
            .map(|a| (*a, self.table.value(state, &a.id)))
            .collect();

        let (mut ranked, method) = if learned.iter().any(|(_, v)| *v != 0.0) {
            (learned, Method::Learned)
        } else {
            (self.scorer.rank(state, &pool), Method::Heuristic)
        };
        ranked.sort_by(by_value_then_id);
        ranked.truncate(top_k);

        debug!(state = %state, candidates = pool.len(), ?method, "ranked candidates");

        ranked
            .into_iter()
            .map(|(a, value)| Recommendation {
                action_id: a.id.clone(),
                name: a.name.clone(),
                action_type: a.action_type,
                difficulty: a.difficulty,
                value,
                method,
            })
            .collect()
    }

    /// Candidates default to the state's module; when every action there is
    /// excluded, the whole catalog is used. The state must name a module of
    /// this course.
    pub fn recommend_for_state(
        &self,
        state: &LearnerState,
        top_k: usize,
        excluded: &HashSet<String>,
    ) -> Result<Vec<Recommendation>, ValidationError> {
        self.encoder.validate_state(state)?;
        let module: Vec<&Action> = self.catalog.by_module(state.module_index as usize);
        if module.iter().any(|a| !excluded.contains(&a.id)) {
            return Ok(self.recommend(state, &module, top_k, excluded));
        }
        let all: Vec<&Action> = self.catalog.iter().collect();
        Ok(self.recommend(state, &all, top_k, excluded))
    }

    /// Encode a feature map, then rank. `tier` overrides tier fields in the
    /// map.
    pub fn recommend_from_features(
        &self,
        features: &FeatureMap,
        tier: Option<Tier>,
        top_k: usize,
        excluded: &HashSet<String>,
    ) -> Result<Vec<Recommendation>, ValidationError> {
        let state = self.encoder.encode_features(features, tier, self.classifier)?;
        self.recommend_for_state(&state, top_k, excluded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::EncoderConfig;
    use crate::types::Quartile;

    const COURSE: &str = r#"{"course_id": "c", "sections": [
        {"id": "s1", "name": "One", "subsections": [{"id": "u1", "name": "U", "resources": [
            {"id": "v1", "name": "Intro video", "kind": "video"},
            {"id": "q1", "name": "Quiz", "kind": "quiz"},
            {"id": "r1", "name": "Self-check quiz", "kind": "quiz"},
            {"id": "p1", "name": "Reading", "kind": "page"},
            {"id": "a1", "name": "Advanced assignment", "kind": "assign"}
        ]}]},
        {"id": "s2", "name": "Two", "subsections": [{"id": "u2", "name": "U", "resources": [
            {"id": "f2", "name": "Discussion", "kind": "forum"}
        ]}]}
    ]}"#;

    fn state() -> LearnerState {
        LearnerState {
            tier: Tier::Medium,
            module_index: 0,
            progress_bin: Quartile::Q25,
            score_bin: Quartile::Q50,
            recent_action: Some(ActionType::WatchVideo),
            stuck: false,
        }
    }

    fn setup() -> (ActionCatalog, StateEncoder) {
        let catalog = ActionCatalog::from_json_str(COURSE).unwrap();
        let encoder = StateEncoder::new(EncoderConfig::default(), catalog.module_count());
        (catalog, encoder)
    }

    #[test]
    fn cold_state_falls_back_to_heuristic() {
        let (catalog, encoder) = setup();
        let rec = Recommender::new(
            Arc::new(ValueTable::new()),
            &catalog,
            &encoder,
            HeuristicScorer::default(),
        );
        let out = rec.recommend_for_state(&state(), 10, &HashSet::new()).unwrap();
        assert_eq!(out.len(), 5);
        assert!(out.iter().all(|r| r.method == Method::Heuristic));
        assert!(out.windows(2).all(|w| w[0].value >= w[1].value));
    }

    #[test]
    fn learned_values_take_over() {
        let (catalog, encoder) = setup();
        let mut table = ValueTable::new();
        let s = state();
        table
            .td_update(s, "p1", 2.0, &s, true, 0.5, 0.95, (-5.0, 5.0))
            .unwrap();
        table
            .td_update(s, "a1", -2.0, &s, true, 0.5, 0.95, (-5.0, 5.0))
            .unwrap();

        let rec = Recommender::new(Arc::new(table), &catalog, &encoder, HeuristicScorer::default());
        let out = rec.recommend_for_state(&s, 2, &HashSet::new()).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].action_id, "p1");
        assert_eq!(out[0].method, Method::Learned);
        // zeros tie and break by id
        assert_eq!(out[1].action_id, "q1");
    }

    #[test]
    fn exclusions_and_module_fallback() {
        let (catalog, encoder) = setup();
        let rec = Recommender::new(
            Arc::new(ValueTable::new()),
            &catalog,
            &encoder,
            HeuristicScorer::default(),
        );
        let excluded: HashSet<String> = ["v1", "q1", "r1", "p1", "a1"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let out = rec.recommend_for_state(&state(), 3, &excluded).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].action_id, "f2");
    }

    #[test]
    fn state_outside_the_course_is_rejected() {
        let (catalog, encoder) = setup();
        let rec = Recommender::new(
            Arc::new(ValueTable::new()),
            &catalog,
            &encoder,
            HeuristicScorer::default(),
        );
        let s = LearnerState {
            module_index: 2,
            ..state()
        };
        let err = rec.recommend_for_state(&s, 3, &HashSet::new()).unwrap_err();
        assert_eq!(err.field, "module_index");
    }

    #[test]
    fn from_features_reports_missing_field() {
        let (catalog, encoder) = setup();
        let rec = Recommender::new(
            Arc::new(ValueTable::new()),
            &catalog,
            &encoder,
            HeuristicScorer::default(),
        );
        let mut f = FeatureMap::new();
        f.insert("module_index", 0).insert("module_progress", 0.2);
        let err = rec
            .recommend_from_features(&f, Some(Tier::Weak), 3, &HashSet::new())
            .unwrap_err();
        assert_eq!(err.field, "avg_score");
    }
}
