//! Dependency sequencer: linear build/attachment order from declared
//! dependency edges.
//!
//! Unlike a strict DAG validator, this sequencer is tolerant by contract:
//! dangling dependency ids are ignored, and a cycle degrades to "skip the
//! back-edge" with a logged warning rather than failing the run — the
//! planning oracle is stochastic and its graphs are advisory.

use std::collections::HashMap;

use crate::plan::BuildPlan;

/// The computed order. The anchor — the base every other part attaches
/// onto — is the first element, surfaced as an explicit field so the role
/// does not hinge on positional convention alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequencedPlan {
    pub order: Vec<String>,
    pub anchor_id: String,
    /// Back-edges that were skipped because they closed a cycle, as
    /// `(component, dependency)` pairs. Surfaced so callers can log them.
    pub cycle_edges: Vec<(String, String)>,
}

impl SequencedPlan {
    /// Ids of everything except the anchor, in attachment order.
    pub fn attachments(&self) -> &[String] {
        &self.order[1..]
    }
}

/// Depth-first sequencing in plan input order: for each unvisited
/// component, visit its declared dependencies first, then append the
/// component itself.
pub fn sequence(plan: &BuildPlan) -> Option<SequencedPlan> {
    let index: HashMap<&str, usize> = plan
        .components
        .iter()
        .enumerate()
        .map(|(i, c)| (c.id.as_str(), i))
        .collect();

    let mut visited = vec![false; plan.components.len()];
    let mut in_progress = vec![false; plan.components.len()];
    let mut order = Vec::with_capacity(plan.components.len());
    let mut cycle_edges = Vec::new();

    for i in 0..plan.components.len() {
        visit(plan, &index, i, &mut visited, &mut in_progress, &mut order, &mut cycle_edges);
    }

    let anchor_id = order.first()?.clone();
    Some(SequencedPlan { order, anchor_id, cycle_edges })
}

fn visit(
    plan: &BuildPlan,
    index: &HashMap<&str, usize>,
    i: usize,
    visited: &mut [bool],
    in_progress: &mut [bool],
    order: &mut Vec<String>,
    cycle_edges: &mut Vec<(String, String)>,
) {
    if visited[i] {
        return;
    }
    in_progress[i] = true;

    let component = &plan.components[i];
    for dep in &component.dependencies {
        // Dangling ids refer to no plan member and are silently ignored
        let Some(&dep_index) = index.get(dep.as_str()) else {
            continue;
        };
        if in_progress[dep_index] && !visited[dep_index] {
            tracing::warn!(
                component = %component.id,
                dependency = %dep,
                "dependency cycle detected; ignoring back-edge"
            );
            cycle_edges.push((component.id.clone(), dep.clone()));
            continue;
        }
        visit(plan, index, dep_index, visited, in_progress, order, cycle_edges);
    }

    in_progress[i] = false;
    visited[i] = true;
    order.push(component.id.clone());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::ComponentPlan;

    fn plan_of(parts: &[(&str, &[&str])]) -> BuildPlan {
        BuildPlan {
            overview: "test".into(),
            components: parts
                .iter()
                .map(|(id, deps)| ComponentPlan {
                    id: id.to_string(),
                    name: id.to_string(),
                    description: String::new(),
                    geometry_type: String::new(),
                    material_type: String::new(),
                    dependencies: deps.iter().map(|d| d.to_string()).collect(),
                })
                .collect(),
        }
    }

    #[test]
    fn single_component() {
        let seq = sequence(&plan_of(&[("a", &[])])).unwrap();
        assert_eq!(seq.order, vec!["a"]);
        assert_eq!(seq.anchor_id, "a");
        assert!(seq.attachments().is_empty());
    }

    #[test]
    fn fan_out_keeps_input_order() {
        let seq = sequence(&plan_of(&[("a", &[]), ("b", &["a"]), ("c", &["a"])])).unwrap();
        assert_eq!(seq.order, vec!["a", "b", "c"]);
        assert_eq!(seq.anchor_id, "a");
    }

    #[test]
    fn dependency_precedes_dependent() {
        // "b" declared first but depends on "a" — "a" must come out first
        let seq = sequence(&plan_of(&[("b", &["a"]), ("a", &[])])).unwrap();
        assert_eq!(seq.order, vec!["a", "b"]);
        assert_eq!(seq.anchor_id, "a");
    }

    #[test]
    fn acyclic_property_holds_for_a_deeper_graph() {
        let plan = plan_of(&[
            ("wheel", &["axle"]),
            ("axle", &["frame"]),
            ("frame", &[]),
            ("seat", &["frame"]),
        ]);
        let seq = sequence(&plan).unwrap();
        let pos = |id: &str| seq.order.iter().position(|x| x == id).unwrap();
        for component in &plan.components {
            for dep in &component.dependencies {
                assert!(
                    pos(dep) < pos(&component.id),
                    "{} should precede {}",
                    dep,
                    component.id
                );
            }
        }
        assert!(seq.cycle_edges.is_empty());
    }

    #[test]
    fn two_cycle_terminates_with_each_exactly_once() {
        let seq = sequence(&plan_of(&[("a", &["b"]), ("b", &["a"])])).unwrap();
        assert_eq!(seq.order.len(), 2);
        assert_eq!(
            seq.order.iter().filter(|id| id.as_str() == "a").count(),
            1
        );
        assert_eq!(
            seq.order.iter().filter(|id| id.as_str() == "b").count(),
            1
        );
        // Deterministic given fixed input order: a visits b first, b's
        // back-edge to a is dropped, so b lands before a.
        assert_eq!(seq.order, vec!["b", "a"]);
        assert_eq!(seq.cycle_edges, vec![("b".to_string(), "a".to_string())]);
    }

    #[test]
    fn self_cycle_is_tolerated() {
        let seq = sequence(&plan_of(&[("a", &["a"]), ("b", &["a"])])).unwrap();
        assert_eq!(seq.order, vec!["a", "b"]);
        assert_eq!(seq.cycle_edges.len(), 1);
    }

    #[test]
    fn dangling_dependencies_are_ignored() {
        let seq = sequence(&plan_of(&[("a", &["ghost"]), ("b", &["a"])])).unwrap();
        assert_eq!(seq.order, vec!["a", "b"]);
        assert!(seq.cycle_edges.is_empty());
    }

    #[test]
    fn empty_plan_yields_none() {
        assert!(sequence(&plan_of(&[])).is_none());
    }
}
