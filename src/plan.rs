//! Build plan types and parsing.
//!
//! A `BuildPlan` is produced once by the planning oracle at pipeline start
//! and is immutable afterwards. Oracle replies are JSON but frequently
//! arrive wrapped in markdown fences or prose, so parsing extracts the
//! outermost JSON object before deserializing.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// The decomposition of a prompt into named, described components.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildPlan {
    /// Free-text strategy summary from the planning oracle
    pub overview: String,
    /// Ordered component specs
    pub components: Vec<ComponentPlan>,
}

/// One part of the asset, as planned by the oracle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentPlan {
    /// Unique within the plan
    pub id: String,
    pub name: String,
    pub description: String,
    /// Free-text hint passed through to the construction oracle, never
    /// interpreted by the core
    #[serde(default)]
    pub geometry_type: String,
    #[serde(default)]
    pub material_type: String,
    /// Ids of other components this part attaches onto
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl BuildPlan {
    /// Parse an oracle reply into a plan.
    ///
    /// Tolerates markdown wrapping and leading/trailing prose by slicing
    /// from the first `{` to the last `}`. Component ids must be unique;
    /// dangling or cyclic dependency references are allowed here and
    /// handled by the sequencer.
    pub fn parse(reply: &str) -> Result<Self> {
        let cleaned = extract_json_object(reply).unwrap_or(reply);
        let plan: BuildPlan =
            serde_json::from_str(cleaned).context("Failed to parse planning reply as JSON")?;
        plan.validate()?;
        Ok(plan)
    }

    fn validate(&self) -> Result<()> {
        if self.components.is_empty() {
            anyhow::bail!("Plan contains no components");
        }
        let mut seen = std::collections::HashSet::new();
        for component in &self.components {
            if component.id.is_empty() {
                anyhow::bail!("Component '{}' has an empty id", component.name);
            }
            if !seen.insert(component.id.as_str()) {
                anyhow::bail!("Duplicate component id: {}", component.id);
            }
        }
        Ok(())
    }

    /// Look up a component by id.
    pub fn get(&self, id: &str) -> Option<&ComponentPlan> {
        self.components.iter().find(|c| c.id == id)
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

/// Slice a string down to its outermost `{...}` span, if any.
pub(crate) fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end > start { Some(&text[start..=end]) } else { None }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan_json() -> &'static str {
        r#"{
            "overview": "A low-poly oak: trunk first, then crown and roots.",
            "components": [
                {
                    "id": "trunk",
                    "name": "Trunk",
                    "description": "Tapered cylinder, bark brown",
                    "geometry_type": "cylinder",
                    "material_type": "standard",
                    "dependencies": []
                },
                {
                    "id": "crown",
                    "name": "Crown",
                    "description": "Cluster of spheres",
                    "geometry_type": "sphere",
                    "material_type": "standard",
                    "dependencies": ["trunk"]
                }
            ]
        }"#
    }

    #[test]
    fn parse_plain_json() {
        let plan = BuildPlan::parse(plan_json()).unwrap();
        assert_eq!(plan.components.len(), 2);
        assert_eq!(plan.components[0].id, "trunk");
        assert_eq!(plan.components[1].dependencies, vec!["trunk"]);
        assert!(plan.overview.contains("oak"));
    }

    #[test]
    fn parse_markdown_wrapped_json() {
        let wrapped = format!("Here is the plan:\n```json\n{}\n```\nDone.", plan_json());
        let plan = BuildPlan::parse(&wrapped).unwrap();
        assert_eq!(plan.components.len(), 2);
    }

    #[test]
    fn parse_rejects_duplicate_ids() {
        let json = r#"{
            "overview": "x",
            "components": [
                {"id": "a", "name": "A", "description": "d"},
                {"id": "a", "name": "A again", "description": "d"}
            ]
        }"#;
        let err = BuildPlan::parse(json).unwrap_err();
        assert!(err.to_string().contains("Duplicate"));
    }

    #[test]
    fn parse_rejects_empty_plan() {
        let json = r#"{"overview": "x", "components": []}"#;
        assert!(BuildPlan::parse(json).is_err());
    }

    #[test]
    fn parse_rejects_non_json() {
        assert!(BuildPlan::parse("sorry, I cannot help with that").is_err());
    }

    #[test]
    fn hint_fields_default_to_empty() {
        let json = r#"{
            "overview": "x",
            "components": [{"id": "a", "name": "A", "description": "d"}]
        }"#;
        let plan = BuildPlan::parse(json).unwrap();
        assert_eq!(plan.components[0].geometry_type, "");
        assert!(plan.components[0].dependencies.is_empty());
    }

    #[test]
    fn get_finds_by_id() {
        let plan = BuildPlan::parse(plan_json()).unwrap();
        assert_eq!(plan.get("crown").unwrap().name, "Crown");
        assert!(plan.get("missing").is_none());
    }
}
