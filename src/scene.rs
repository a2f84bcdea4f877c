//! Constructed-object model: a renderable tree of nodes with local
//! transforms and a parent/child containment relation.
//!
//! Nodes are plain data — mesh and material are descriptors interpreted by
//! whatever render stage is plugged in. `Clone` is a deep copy, which is
//! what gives the assembly loop its transactional draft semantics.

use serde::{Deserialize, Serialize};

/// Three-component vector. Also used for Euler rotations (radians).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 { x: 0.0, y: 0.0, z: 0.0 };
    pub const ONE: Vec3 = Vec3 { x: 1.0, y: 1.0, z: 1.0 };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn add(&self, other: &Vec3) -> Vec3 {
        Vec3::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }

    pub fn sub(&self, other: &Vec3) -> Vec3 {
        Vec3::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }

    pub fn scale(&self, factor: f64) -> Vec3 {
        Vec3::new(self.x * factor, self.y * factor, self.z * factor)
    }

    pub fn length(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Normalize to unit length; zero vectors are returned unchanged.
    pub fn normalized(&self) -> Vec3 {
        let len = self.length();
        if len == 0.0 { *self } else { self.scale(1.0 / len) }
    }
}

/// Primitive shapes the sandbox capability surface can mint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Shape {
    Box,
    Sphere,
    Cylinder,
    Cone,
    Plane,
    Torus,
}

impl Shape {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "box" | "cube" => Some(Self::Box),
            "sphere" => Some(Self::Sphere),
            "cylinder" => Some(Self::Cylinder),
            "cone" => Some(Self::Cone),
            "plane" => Some(Self::Plane),
            "torus" => Some(Self::Torus),
            _ => None,
        }
    }
}

/// Geometry descriptor: shape plus its characteristic dimensions
/// (width/height/depth, or radius/height, shape-dependent).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshDesc {
    pub shape: Shape,
    pub dims: Vec<f64>,
}

/// Material descriptor, passed through to the render stage uninterpreted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialDesc {
    /// RGB, each 0.0..=1.0
    pub color: [f64; 3],
    #[serde(default)]
    pub roughness: f64,
    #[serde(default)]
    pub metalness: f64,
    #[serde(default)]
    pub kind: String,
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn center(&self) -> Vec3 {
        self.min.add(&self.max).scale(0.5)
    }

    pub fn size(&self) -> Vec3 {
        self.max.sub(&self.min)
    }

    /// Largest edge of the box.
    pub fn max_extent(&self) -> f64 {
        let s = self.size();
        s.x.max(s.y).max(s.z)
    }

    fn merge(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: Vec3::new(
                self.min.x.min(other.min.x),
                self.min.y.min(other.min.y),
                self.min.z.min(other.min.z),
            ),
            max: Vec3::new(
                self.max.x.max(other.max.x),
                self.max.y.max(other.max.y),
                self.max.z.max(other.max.z),
            ),
        }
    }
}

/// A node in a constructed-object tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneNode {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub position: Vec3,
    pub rotation: Vec3,
    pub scale: Vec3,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mesh: Option<MeshDesc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material: Option<MaterialDesc>,
    #[serde(default)]
    pub children: Vec<SceneNode>,
}

impl SceneNode {
    /// Create an empty group node at the origin.
    pub fn group(id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
            mesh: None,
            material: None,
            children: Vec::new(),
        }
    }

    /// Create a mesh node with the given shape and dimensions.
    pub fn mesh(id: &str, shape: Shape, dims: Vec<f64>) -> Self {
        let mut node = Self::group(id);
        node.mesh = Some(MeshDesc { shape, dims });
        node
    }

    pub fn add_child(&mut self, child: SceneNode) {
        self.children.push(child);
    }

    /// Depth-first search for a descendant (or self) by id.
    pub fn find(&self, id: &str) -> Option<&SceneNode> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(id))
    }

    pub fn find_mut(&mut self, id: &str) -> Option<&mut SceneNode> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter_mut().find_map(|c| c.find_mut(id))
    }

    /// Remove a direct or transitive child by id, returning it.
    pub fn detach(&mut self, id: &str) -> Option<SceneNode> {
        if let Some(pos) = self.children.iter().position(|c| c.id == id) {
            return Some(self.children.remove(pos));
        }
        self.children.iter_mut().find_map(|c| c.detach(id))
    }

    /// Count of nodes in the tree, including self.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(SceneNode::node_count).sum::<usize>()
    }

    /// Compute the axis-aligned bounding box of the tree in the parent's
    /// coordinate space. Rotation is approximated by bounding the rotated
    /// box's sphere — adequate for camera framing, which is the only
    /// consumer. Group-only trees yield a point box at the node origin.
    pub fn bounding_box(&self) -> Aabb {
        self.bounding_box_inner(Vec3::ZERO, Vec3::ONE)
    }

    fn bounding_box_inner(&self, offset: Vec3, inherited_scale: Vec3) -> Aabb {
        let scale = Vec3::new(
            inherited_scale.x * self.scale.x,
            inherited_scale.y * self.scale.y,
            inherited_scale.z * self.scale.z,
        );
        let origin = offset.add(&Vec3::new(
            self.position.x * inherited_scale.x,
            self.position.y * inherited_scale.y,
            self.position.z * inherited_scale.z,
        ));

        let mut aabb = match &self.mesh {
            Some(mesh) => {
                let half = mesh_half_extents(mesh);
                let rotated = if self.rotation == Vec3::ZERO {
                    half
                } else {
                    // Conservative: bound the rotated box by its sphere
                    let r = half.length();
                    Vec3::new(r, r, r)
                };
                let half_scaled =
                    Vec3::new(rotated.x * scale.x, rotated.y * scale.y, rotated.z * scale.z);
                Aabb {
                    min: origin.sub(&half_scaled),
                    max: origin.add(&half_scaled),
                }
            }
            None => Aabb { min: origin, max: origin },
        };

        for child in &self.children {
            aabb = aabb.merge(&child.bounding_box_inner(origin, scale));
        }
        aabb
    }

    /// Translate the node so its bounding-box center sits at the origin.
    pub fn recenter(&mut self) {
        let center = self.bounding_box().center();
        self.position = self.position.sub(&center);
    }
}

fn mesh_half_extents(mesh: &MeshDesc) -> Vec3 {
    let dim = |i: usize, default: f64| mesh.dims.get(i).copied().unwrap_or(default);
    match mesh.shape {
        Shape::Box => Vec3::new(dim(0, 1.0) / 2.0, dim(1, 1.0) / 2.0, dim(2, 1.0) / 2.0),
        Shape::Sphere => {
            let r = dim(0, 0.5);
            Vec3::new(r, r, r)
        }
        Shape::Cylinder | Shape::Cone => {
            let r = dim(0, 0.5);
            Vec3::new(r, dim(1, 1.0) / 2.0, r)
        }
        Shape::Plane => Vec3::new(dim(0, 1.0) / 2.0, 0.0, dim(1, 1.0) / 2.0),
        Shape::Torus => {
            let r = dim(0, 0.5) + dim(1, 0.2);
            Vec3::new(r, dim(1, 0.2), r)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec3_basics() {
        let v = Vec3::new(3.0, 0.0, 4.0);
        assert_eq!(v.length(), 5.0);
        let n = v.normalized();
        assert!((n.length() - 1.0).abs() < 1e-12);
        assert_eq!(Vec3::ZERO.normalized(), Vec3::ZERO);
    }

    #[test]
    fn shape_from_name_accepts_aliases() {
        assert_eq!(Shape::from_name("cube"), Some(Shape::Box));
        assert_eq!(Shape::from_name("sphere"), Some(Shape::Sphere));
        assert_eq!(Shape::from_name("dodecahedron"), None);
    }

    #[test]
    fn bounding_box_of_unit_box() {
        let node = SceneNode::mesh("b", Shape::Box, vec![2.0, 4.0, 6.0]);
        let aabb = node.bounding_box();
        assert_eq!(aabb.min, Vec3::new(-1.0, -2.0, -3.0));
        assert_eq!(aabb.max, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(aabb.max_extent(), 6.0);
    }

    #[test]
    fn bounding_box_includes_translated_children() {
        let mut root = SceneNode::group("root");
        let mut child = SceneNode::mesh("c", Shape::Sphere, vec![1.0]);
        child.position = Vec3::new(5.0, 0.0, 0.0);
        root.add_child(child);
        let aabb = root.bounding_box();
        assert_eq!(aabb.max.x, 6.0);
        // The group origin itself is part of the box
        assert_eq!(aabb.min.x, 0.0);
    }

    #[test]
    fn bounding_box_of_empty_group_is_a_point() {
        let node = SceneNode::group("g");
        let aabb = node.bounding_box();
        assert_eq!(aabb.min, aabb.max);
        assert_eq!(aabb.max_extent(), 0.0);
    }

    #[test]
    fn recenter_moves_bbox_center_to_origin() {
        let mut node = SceneNode::mesh("b", Shape::Box, vec![2.0, 2.0, 2.0]);
        node.position = Vec3::new(10.0, -3.0, 7.0);
        node.recenter();
        let center = node.bounding_box().center();
        assert!(center.length() < 1e-9);
    }

    #[test]
    fn find_and_detach() {
        let mut root = SceneNode::group("root");
        let mut arm = SceneNode::group("arm");
        arm.add_child(SceneNode::mesh("hand", Shape::Box, vec![1.0, 1.0, 1.0]));
        root.add_child(arm);

        assert!(root.find("hand").is_some());
        let hand = root.detach("hand").unwrap();
        assert_eq!(hand.id, "hand");
        assert!(root.find("hand").is_none());
        assert!(root.find("arm").is_some());
    }

    #[test]
    fn clone_is_deep() {
        let mut root = SceneNode::group("root");
        root.add_child(SceneNode::mesh("a", Shape::Box, vec![1.0, 1.0, 1.0]));
        let snapshot = root.clone();
        root.children[0].position = Vec3::new(9.0, 9.0, 9.0);
        assert_eq!(snapshot.children[0].position, Vec3::ZERO);
    }

    #[test]
    fn serde_round_trip() {
        let mut root = SceneNode::group("root");
        let mut leaf = SceneNode::mesh("leaf", Shape::Torus, vec![0.5, 0.1]);
        leaf.material = Some(MaterialDesc {
            color: [0.2, 0.8, 0.2],
            roughness: 0.7,
            metalness: 0.0,
            kind: "standard".into(),
        });
        root.add_child(leaf);

        let json = serde_json::to_string(&root).unwrap();
        let parsed: SceneNode = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, root);
    }

    #[test]
    fn node_count_counts_whole_tree() {
        let mut root = SceneNode::group("root");
        let mut a = SceneNode::group("a");
        a.add_child(SceneNode::group("b"));
        root.add_child(a);
        assert_eq!(root.node_count(), 3);
    }
}
