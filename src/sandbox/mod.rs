//! Execution sandbox for generated construction and attachment logic.
//!
//! Generated logic is a vetted JSON instruction program, never evaluated as
//! code. The sandbox is the interpreter boundary: it sanitizes the raw
//! oracle output, parses the program, and walks its ops against a narrow,
//! injected capability surface — a [`PartBuilder`] for construction, and the
//! root/part node handles for attachment. Anything outside that surface is
//! an [`ExecError`].
//!
//! The sandbox never retries; every failure is reported upward and counted
//! against the caller's attempt budget.

use std::collections::HashMap;

use serde::Deserialize;

use crate::errors::ExecError;
use crate::scene::{MaterialDesc, SceneNode, Shape, Vec3};

/// Strip module-boundary declarations and markdown fences so the snippet is
/// self-contained. Idempotent: `sanitize(sanitize(x)) == sanitize(x)`.
pub fn sanitize(code: &str) -> String {
    let mut out = String::with_capacity(code.len());
    for line in code.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("import ") {
            continue;
        }
        let mut rest = trimmed;
        loop {
            if let Some(stripped) = rest.strip_prefix("export default ") {
                rest = stripped.trim_start();
            } else if let Some(stripped) = rest.strip_prefix("export ") {
                rest = stripped.trim_start();
            } else {
                break;
            }
        }
        out.push_str(rest);
        out.push('\n');
    }
    out.trim().to_string()
}

/// A parsed instruction program.
#[derive(Debug, Clone, Deserialize)]
pub struct Program {
    /// Name of the single entry point the program exposes
    pub entry: String,
    #[serde(default)]
    pub ops: Vec<Op>,
}

/// One instruction. The tags are the whole vocabulary the oracle may use.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Op {
    /// Mint a primitive mesh node
    Primitive {
        id: String,
        shape: String,
        #[serde(default)]
        dims: Vec<f64>,
    },
    /// Assign a material to an existing node
    Material {
        target: String,
        color: [f64; 3],
        #[serde(default)]
        roughness: f64,
        #[serde(default)]
        metalness: f64,
        #[serde(default)]
        kind: String,
    },
    /// Set position/rotation/scale on an existing node
    Transform {
        target: String,
        #[serde(default)]
        position: Option<[f64; 3]>,
        #[serde(default)]
        rotation: Option<[f64; 3]>,
        #[serde(default)]
        scale: Option<[f64; 3]>,
    },
    /// Collect previously built nodes under a new group node
    Group { id: String, children: Vec<String> },
    /// Re-parent a node onto the assembly (attachment programs only)
    Attach {
        child: String,
        #[serde(default = "default_attach_parent")]
        parent: String,
    },
    /// Yield the built object (construction programs only, final op)
    Return { target: String },
}

fn default_attach_parent() -> String {
    "root".to_string()
}

impl Op {
    fn name(&self) -> &'static str {
        match self {
            Op::Primitive { .. } => "primitive",
            Op::Material { .. } => "material",
            Op::Transform { .. } => "transform",
            Op::Group { .. } => "group",
            Op::Attach { .. } => "attach",
            Op::Return { .. } => "return",
        }
    }
}

impl Program {
    /// Sanitize and parse raw oracle output into a program.
    pub fn parse(code: &str) -> Result<Self, ExecError> {
        let cleaned = sanitize(code);
        let json = crate::plan::extract_json_object(&cleaned).unwrap_or(&cleaned);
        let program: Program = serde_json::from_str(json)?;
        if program.entry.trim().is_empty() {
            return Err(ExecError::Invalid {
                index: 0,
                message: "entry point name is empty".into(),
            });
        }
        Ok(program)
    }
}

/// The geometry/material toolkit injected into construction programs.
/// The only way a program can create scene content.
#[derive(Debug, Default)]
pub struct PartBuilder;

impl PartBuilder {
    fn primitive(
        &self,
        index: usize,
        id: &str,
        shape: &str,
        dims: &[f64],
    ) -> Result<SceneNode, ExecError> {
        let shape = Shape::from_name(shape).ok_or_else(|| ExecError::UnknownShape {
            index,
            shape: shape.to_string(),
        })?;
        if dims.iter().any(|d| !d.is_finite() || *d < 0.0) {
            return Err(ExecError::Invalid {
                index,
                message: format!("non-finite or negative dimension in '{}'", id),
            });
        }
        Ok(SceneNode::mesh(id, shape, dims.to_vec()))
    }

    fn apply_material(
        &self,
        node: &mut SceneNode,
        color: [f64; 3],
        roughness: f64,
        metalness: f64,
        kind: String,
    ) {
        node.material = Some(MaterialDesc { color, roughness, metalness, kind });
    }
}

fn apply_transform(
    node: &mut SceneNode,
    position: Option<[f64; 3]>,
    rotation: Option<[f64; 3]>,
    scale: Option<[f64; 3]>,
) {
    if let Some([x, y, z]) = position {
        node.position = Vec3::new(x, y, z);
    }
    if let Some([x, y, z]) = rotation {
        node.rotation = Vec3::new(x, y, z);
    }
    if let Some([x, y, z]) = scale {
        node.scale = Vec3::new(x, y, z);
    }
}

/// Executes vetted programs in an isolated binding scope.
#[derive(Debug, Default)]
pub struct Sandbox {
    builder: PartBuilder,
}

impl Sandbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run a construction program and extract its single returned object.
    ///
    /// The program builds nodes in a private scope via the injected
    /// [`PartBuilder`] and must end with exactly one `return` op naming the
    /// node to yield. Anything else is an [`ExecError`].
    pub fn run_construction(&self, code: &str) -> Result<SceneNode, ExecError> {
        let program = Program::parse(code)?;
        let mut scope: HashMap<String, SceneNode> = HashMap::new();
        let mut returned: Option<SceneNode> = None;

        let op_count = program.ops.len();
        for (index, op) in program.ops.into_iter().enumerate() {
            match op {
                Op::Primitive { id, shape, dims } => {
                    if scope.contains_key(&id) {
                        return Err(ExecError::DuplicateId { index, id });
                    }
                    let node = self.builder.primitive(index, &id, &shape, &dims)?;
                    scope.insert(id, node);
                }
                Op::Material { target, color, roughness, metalness, kind } => {
                    let node = lookup_mut(&mut scope, &target, index)?;
                    self.builder.apply_material(node, color, roughness, metalness, kind);
                }
                Op::Transform { target, position, rotation, scale } => {
                    let node = lookup_mut(&mut scope, &target, index)?;
                    apply_transform(node, position, rotation, scale);
                }
                Op::Group { id, children } => {
                    if scope.contains_key(&id) {
                        return Err(ExecError::DuplicateId { index, id });
                    }
                    let mut group = SceneNode::group(&id);
                    for child_id in &children {
                        let child = scope.remove(child_id).ok_or_else(|| {
                            ExecError::UnknownTarget { index, target: child_id.clone() }
                        })?;
                        group.add_child(child);
                    }
                    scope.insert(id, group);
                }
                Op::Attach { .. } => {
                    return Err(ExecError::ForbiddenOp { index, op: "attach".into() });
                }
                Op::Return { target } => {
                    if index + 1 != op_count {
                        return Err(ExecError::EarlyReturn(index));
                    }
                    let node = scope
                        .remove(&target)
                        .ok_or(ExecError::UnknownTarget { index, target })?;
                    returned = Some(node);
                }
            }
        }

        returned.ok_or(ExecError::MissingReturn)
    }

    /// Run an attachment program against the assembly root and a candidate
    /// part. The program mutates `root` in place; success is "did not
    /// throw" — there is no return value.
    ///
    /// Callers pass clones, never the committed assembly: a failed program
    /// may leave `root` half-mutated, and transactional isolation is the
    /// caller's job.
    pub fn run_attachment(
        &self,
        code: &str,
        root: &mut SceneNode,
        part: SceneNode,
    ) -> Result<(), ExecError> {
        let program = Program::parse(code)?;
        // "part" stays in the side scope until an attach op moves it into
        // the root tree.
        let mut part_slot: Option<SceneNode> = Some(part);
        let mut attached = false;

        for (index, op) in program.ops.into_iter().enumerate() {
            match op {
                Op::Transform { target, position, rotation, scale } => {
                    let node = resolve_attachment_target(root, &mut part_slot, &target, index)?;
                    apply_transform(node, position, rotation, scale);
                }
                Op::Attach { child, parent } => {
                    let child_node = if child == "part" {
                        part_slot
                            .take()
                            .ok_or(ExecError::UnknownTarget { index, target: child })?
                    } else if let Some(part_node) = part_slot.as_mut() {
                        part_node
                            .detach(&child)
                            .or_else(|| root.detach(&child))
                            .ok_or(ExecError::UnknownTarget { index, target: child })?
                    } else {
                        root.detach(&child)
                            .ok_or(ExecError::UnknownTarget { index, target: child })?
                    };
                    let parent_node = if parent == "root" {
                        &mut *root
                    } else {
                        root.find_mut(&parent)
                            .ok_or(ExecError::UnknownTarget { index, target: parent })?
                    };
                    parent_node.add_child(child_node);
                    attached = true;
                }
                Op::Return { .. } => {
                    return Err(ExecError::ForbiddenOp { index, op: "return".into() });
                }
                other => {
                    return Err(ExecError::ForbiddenOp { index, op: other.name().into() });
                }
            }
        }

        if !attached {
            return Err(ExecError::Invalid {
                index: 0,
                message: "attachment program never attached the part".into(),
            });
        }
        Ok(())
    }
}

fn lookup_mut<'a>(
    scope: &'a mut HashMap<String, SceneNode>,
    target: &str,
    index: usize,
) -> Result<&'a mut SceneNode, ExecError> {
    scope.get_mut(target).ok_or_else(|| ExecError::UnknownTarget {
        index,
        target: target.to_string(),
    })
}

fn resolve_attachment_target<'a>(
    root: &'a mut SceneNode,
    part_slot: &'a mut Option<SceneNode>,
    target: &str,
    index: usize,
) -> Result<&'a mut SceneNode, ExecError> {
    if target == "root" {
        return Ok(root);
    }
    if target == "part" {
        return part_slot
            .as_mut()
            .ok_or_else(|| ExecError::UnknownTarget { index, target: target.to_string() });
    }
    if let Some(part_node) = part_slot.as_mut()
        && part_node.find(target).is_some()
    {
        return Ok(part_node.find_mut(target).expect("checked above"));
    }
    root.find_mut(target)
        .ok_or_else(|| ExecError::UnknownTarget { index, target: target.to_string() })
}
