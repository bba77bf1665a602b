// src/catalog.rs
//
// Course definition -> flat action catalog.
//
// The course document is a three-level hierarchy:
//   sections -> subsections -> resources
// Each visible section that yields at least one learning resource becomes a
// module (dense index). Organizational nodes (labels, headers) and hidden
// nodes are dropped. All structural errors are reported at build time.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::CatalogError;
use crate::types::{Action, ActionType, Difficulty};

/// Resource kinds that carry no learning activity.
const ORGANIZATIONAL_KINDS: &[&str] = &["label", "header", "subsection", "text", "heading"];

/// Name fragments that turn a quiz into a review quiz.
const REVIEW_KEYWORDS: &[&str] = &["review", "practice", "revision", "self-check", "self check"];

const HARD_KEYWORDS: &[&str] = &["advanced", "challenge", "hard", "expert", "complex", "deep dive"];
const EASY_KEYWORDS: &[&str] = &["intro", "basic", "beginner", "easy", "overview", "fundamental"];
const MEDIUM_KEYWORDS: &[&str] = &["intermediate", "medium", "standard", "applied"];

fn default_visible() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct CourseDocument {
    pub course_id: Option<String>,
    #[serde(default)]
    pub sections: Vec<SectionDoc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SectionDoc {
    pub id: Option<String>,
    pub name: Option<String>,
    #[serde(default = "default_visible")]
    pub visible: bool,
    #[serde(default)]
    pub subsections: Vec<SubsectionDoc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubsectionDoc {
    pub id: Option<String>,
    pub name: Option<String>,
    #[serde(default = "default_visible")]
    pub visible: bool,
    #[serde(default)]
    pub resources: Vec<ResourceDoc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResourceDoc {
    pub id: Option<String>,
    pub name: Option<String>,
    pub kind: Option<String>,
    #[serde(default = "default_visible")]
    pub visible: bool,
    pub estimated_minutes: Option<f64>,
}

/// Flat, immutable list of recommendable actions.
#[derive(Debug, Clone)]
pub struct ActionCatalog {
    course_id: String,
    actions: Vec<Action>,
    index: BTreeMap<String, usize>,
    module_names: Vec<String>,
}

impl ActionCatalog {
    pub fn from_json_str(json: &str) -> Result<Self, CatalogError> {
        let doc: CourseDocument = serde_json::from_str(json)?;
        Self::from_document(&doc)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, CatalogError> {
        let contents =
            std::fs::read_to_string(path.as_ref()).map_err(|source| CatalogError::Io {
                path: path.as_ref().to_path_buf(),
                source,
            })?;
        Self::from_json_str(&contents)
    }

    pub fn from_document(doc: &CourseDocument) -> Result<Self, CatalogError> {
        let course_id = required(&doc.course_id, "course", "course_id")?.to_string();

        let mut actions = Vec::new();
        let mut index = BTreeMap::new();
        let mut module_names = Vec::new();
        let mut section_ids = HashSet::new();

        for (si, section) in doc.sections.iter().enumerate() {
            let section_path = format!("sections[{si}]");
            let section_id = required(&section.id, &section_path, "id")?;
            if !section_ids.insert(section_id.to_string()) {
                return Err(CatalogError::DuplicateId(section_id.to_string()));
            }
            if !section.visible {
                debug!(section = section_id, "skipping hidden section");
                continue;
            }

            let module_ref = module_names.len();
            let before = actions.len();

            for (ui, sub) in section.subsections.iter().enumerate() {
                let sub_path = format!("{section_path}.subsections[{ui}]");
                required(&sub.id, &sub_path, "id")?;
                if !sub.visible {
                    continue;
                }

                for (ri, res) in sub.resources.iter().enumerate() {
                    let res_path = format!("{sub_path}.resources[{ri}]");
                    let id = required(&res.id, &res_path, "id")?;
                    let kind = required(&res.kind, &res_path, "kind")?;

                    if !res.visible || is_organizational(kind) {
                        continue;
                    }
                    let name = required(&res.name, &res_path, "name")?;

                    let Some(action_type) = action_type_for_kind(kind, name) else {
                        debug!(resource = id, kind, "skipping non-learning resource kind");
                        continue;
                    };

                    if index.contains_key(id) {
                        return Err(CatalogError::DuplicateId(id.to_string()));
                    }

                    let difficulty = infer_difficulty(name);
                    let expected_minutes = res
                        .estimated_minutes
                        .filter(|m| m.is_finite() && *m > 0.0)
                        .unwrap_or_else(|| default_minutes(action_type, difficulty));

                    index.insert(id.to_string(), actions.len());
                    actions.push(Action {
                        id: id.to_string(),
                        name: name.to_string(),
                        action_type,
                        purpose: action_type.purpose(),
                        difficulty,
                        module_ref,
                        expected_minutes,
                    });
                }
            }

            if actions.len() > before {
                module_names.push(
                    section
                        .name
                        .clone()
                        .unwrap_or_else(|| section_id.to_string()),
                );
            }
        }

        if actions.is_empty() {
            return Err(CatalogError::Empty(course_id));
        }

        info!(
            course = %course_id,
            actions = actions.len(),
            modules = module_names.len(),
            "action catalog built"
        );

        Ok(Self {
            course_id,
            actions,
            index,
            module_names,
        })
    }

    pub fn course_id(&self) -> &str {
        &self.course_id
    }

    pub fn by_id(&self, id: &str) -> Option<&Action> {
        self.index.get(id).map(|&i| &self.actions[i])
    }

    pub fn by_type(&self, action_type: ActionType) -> Vec<&Action> {
        self.actions
            .iter()
            .filter(|a| a.action_type == action_type)
            .collect()
    }

    pub fn by_difficulty(&self, difficulty: Difficulty) -> Vec<&Action> {
        self.actions
            .iter()
            .filter(|a| a.difficulty == difficulty)
            .collect()
    }

    pub fn by_module(&self, module_ref: usize) -> Vec<&Action> {
        self.actions
            .iter()
            .filter(|a| a.module_ref == module_ref)
            .collect()
    }

    /// All actions whose id is not in `excluded`.
    pub fn excluding(&self, excluded: &HashSet<String>) -> Vec<&Action> {
        self.actions
            .iter()
            .filter(|a| !excluded.contains(&a.id))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Action> {
        self.actions.iter()
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn module_count(&self) -> usize {
        self.module_names.len()
    }

    pub fn module_name(&self, module_ref: usize) -> Option<&str> {
        self.module_names.get(module_ref).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

fn required<'a>(
    value: &'a Option<String>,
    path: &str,
    field: &str,
) -> Result<&'a str, CatalogError> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(CatalogError::MissingField {
            path: path.to_string(),
            field: field.to_string(),
        }),
    }
}

fn is_organizational(kind: &str) -> bool {
    let k = kind.trim().to_ascii_lowercase();
    ORGANIZATIONAL_KINDS.contains(&k.as_str())
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// Map a resource kind to an action type. None for kinds that are not
/// recommendable.
pub fn action_type_for_kind(kind: &str, name: &str) -> Option<ActionType> {
    let name = name.to_ascii_lowercase();
    match kind.trim().to_ascii_lowercase().as_str() {
        "video" | "lecture" => Some(ActionType::WatchVideo),
        "quiz" => {
            if contains_any(&name, REVIEW_KEYWORDS) {
                Some(ActionType::ReviewQuiz)
            } else {
                Some(ActionType::DoQuiz)
            }
        }
        "forum" | "discussion" => Some(ActionType::ForumPost),
        "page" | "url" | "file" | "book" | "resource" | "folder" => Some(ActionType::ReadResource),
        "assign" | "assignment" | "workshop" => Some(ActionType::DoAssignment),
        _ => None,
    }
}

/// Infer difficulty from the display name. Hard keywords win over easy,
/// easy over medium; no match means medium.
pub fn infer_difficulty(name: &str) -> Difficulty {
    let name = name.to_ascii_lowercase();
    [
        (Difficulty::Hard, HARD_KEYWORDS),
        (Difficulty::Easy, EASY_KEYWORDS),
        (Difficulty::Medium, MEDIUM_KEYWORDS),
    ]
    .into_iter()
    .find(|(_, keywords)| contains_any(&name, keywords))
    .map(|(level, _)| level)
    .unwrap_or(Difficulty::Medium)
}

fn default_minutes(action_type: ActionType, difficulty: Difficulty) -> f64 {
    let base = match action_type {
        ActionType::WatchVideo => 12.0,
        ActionType::DoQuiz => 15.0,
        ActionType::ForumPost => 10.0,
        ActionType::ReviewQuiz => 10.0,
        ActionType::ReadResource => 8.0,
        ActionType::DoAssignment => 45.0,
    };
    let scale = match difficulty {
        Difficulty::Easy => 0.8,
        Difficulty::Medium => 1.0,
        Difficulty::Hard => 1.4,
    };
    base * scale
}

#[cfg(test)]
mod tests {
    use super::*;

    const COURSE: &str = r#"{
        "course_id": "algebra-101",
        "sections": [
            {"id": "s0", "name": "Welcome", "subsections": [
                {"id": "s0a", "name": "Info", "resources": [
                    {"id": "lbl", "name": "Read me", "kind": "label"}
                ]}
            ]},
            {"id": "s1", "name": "Linear equations", "subsections": [
                {"id": "s1a", "name": "Learn", "resources": [
                    {"id": "v1", "name": "Intro to equations", "kind": "video"},
                    {"id": "r1", "name": "Worked examples", "kind": "page"},
                    {"id": "hidden", "name": "Draft", "kind": "page", "visible": false}
                ]},
                {"id": "s1b", "name": "Check", "resources": [
                    {"id": "q1", "name": "Equations quiz", "kind": "quiz"},
                    {"id": "q1r", "name": "Practice quiz", "kind": "quiz"},
                    {"id": "q1h", "name": "Advanced challenge quiz", "kind": "quiz", "estimated_minutes": 30}
                ]}
            ]},
            {"id": "s2", "name": "Hidden", "visible": false, "subsections": [
                {"id": "s2a", "name": "x", "resources": [
                    {"id": "v9", "name": "Video", "kind": "video"}
                ]}
            ]},
            {"id": "s3", "name": "Project", "subsections": [
                {"id": "s3a", "name": "Do", "resources": [
                    {"id": "a1", "name": "Applied project", "kind": "assign"},
                    {"id": "f1", "name": "Discuss your project", "kind": "forum"},
                    {"id": "lti", "name": "External tool", "kind": "lti"}
                ]}
            ]}
        ]
    }"#;

    #[test]
    fn flattens_visible_learning_resources() {
        let c = ActionCatalog::from_json_str(COURSE).unwrap();
        let ids: Vec<&str> = c.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["v1", "r1", "q1", "q1r", "q1h", "a1", "f1"]);
        assert_eq!(c.module_count(), 2);
        assert_eq!(c.by_id("a1").unwrap().module_ref, 1);
        assert_eq!(c.module_name(0), Some("Linear equations"));
    }

    #[test]
    fn infers_types_and_difficulty() {
        let c = ActionCatalog::from_json_str(COURSE).unwrap();
        assert_eq!(c.by_id("q1r").unwrap().action_type, ActionType::ReviewQuiz);
        assert_eq!(c.by_id("q1").unwrap().action_type, ActionType::DoQuiz);
        assert_eq!(c.by_id("v1").unwrap().difficulty, Difficulty::Easy);
        assert_eq!(c.by_id("q1h").unwrap().difficulty, Difficulty::Hard);
        assert_eq!(c.by_id("q1h").unwrap().expected_minutes, 30.0);
        assert_eq!(c.by_id("q1").unwrap().difficulty, Difficulty::Medium);
        assert_eq!(c.by_type(ActionType::ForumPost).len(), 1);
        assert_eq!(c.by_difficulty(Difficulty::Hard).len(), 1);
    }

    #[test]
    fn excluding_filters_by_id() {
        let c = ActionCatalog::from_json_str(COURSE).unwrap();
        let excluded: HashSet<String> = ["v1".to_string(), "q1".to_string()].into();
        let rest = c.excluding(&excluded);
        assert_eq!(rest.len(), c.len() - 2);
        assert!(rest.iter().all(|a| a.id != "v1" && a.id != "q1"));
    }

    #[test]
    fn duplicate_ids_fail_at_build() {
        let doc = r#"{"course_id": "c", "sections": [{"id": "s", "subsections": [
            {"id": "u", "resources": [
                {"id": "x", "name": "A", "kind": "video"},
                {"id": "x", "name": "B", "kind": "page"}
            ]}]}]}"#;
        let err = ActionCatalog::from_json_str(doc).unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateId(id) if id == "x"));
    }

    #[test]
    fn missing_fields_and_malformed_documents_fail() {
        let doc = r#"{"course_id": "c", "sections": [{"id": "s", "subsections": [
            {"id": "u", "resources": [{"name": "A", "kind": "video"}]}]}]}"#;
        let err = ActionCatalog::from_json_str(doc).unwrap_err();
        assert!(matches!(err, CatalogError::MissingField { field, .. } if field == "id"));

        let err = ActionCatalog::from_json_str(r#"{"course_id": "c", "sections": 3}"#).unwrap_err();
        assert!(matches!(err, CatalogError::Malformed(_)));

        let err = ActionCatalog::from_json_str(r#"{"course_id": "c", "sections": []}"#).unwrap_err();
        assert!(matches!(err, CatalogError::Empty(_)));
    }
}
