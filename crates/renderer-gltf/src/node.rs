use glam::{Mat4, Quat, Vec3};
use gltf::json;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecomposedTransform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for DecomposedTransform {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl From<DecomposedTransform> for Mat4 {
    fn from(value: DecomposedTransform) -> Self {
        Mat4::from_scale_rotation_translation(value.scale, value.rotation, value.translation)
    }
}

/// Local transform of an entity. An explicit matrix wins over the
/// separate components.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NodeTransform {
    Matrix(Mat4),
    Decomposed(DecomposedTransform),
}

impl Default for NodeTransform {
    fn default() -> Self {
        Self::Decomposed(DecomposedTransform::default())
    }
}

impl NodeTransform {
    pub fn from_node(node: &json::Node) -> Self {
        if let Some(matrix) = node.matrix {
            return NodeTransform::Matrix(Mat4::from_cols_array(&matrix));
        }
        let default = DecomposedTransform::default();
        NodeTransform::Decomposed(DecomposedTransform {
            translation: node
                .translation
                .map(Vec3::from_array)
                .unwrap_or(default.translation),
            rotation: node
                .rotation
                .map(|rotation| Quat::from_array(rotation.0))
                .unwrap_or(default.rotation),
            scale: node.scale.map(Vec3::from_array).unwrap_or(default.scale),
        })
    }

    pub fn matrix(&self) -> Mat4 {
        match self {
            NodeTransform::Matrix(matrix) => *matrix,
            NodeTransform::Decomposed(decomposed) => (*decomposed).into(),
        }
    }
}

impl From<NodeTransform> for Mat4 {
    fn from(value: NodeTransform) -> Self {
        value.matrix()
    }
}

#[cfg(test)]
mod test {
    use glam::{Mat4, Quat, Vec3};

    use gltf::json::{scene::UnitQuaternion, Node};

    use super::{DecomposedTransform, NodeTransform};

    #[test]
    fn defaults_are_identity() {
        let transform = NodeTransform::from_node(&Node::default());
        assert_eq!(transform.matrix(), Mat4::IDENTITY);
    }

    #[test]
    fn matrix_takes_precedence() {
        let matrix = Mat4::from_translation(Vec3::new(5.0, 6.0, 7.0));
        let node = Node {
            matrix: Some(matrix.to_cols_array()),
            translation: Some([1.0, 2.0, 3.0]),
            scale: Some([2.0, 2.0, 2.0]),
            ..Default::default()
        };
        assert_eq!(NodeTransform::from_node(&node), NodeTransform::Matrix(matrix));
    }

    #[test]
    fn decomposed_order() {
        let node = Node {
            translation: Some([1.0, 0.0, 0.0]),
            rotation: Some(UnitQuaternion(
                Quat::from_rotation_y(std::f32::consts::FRAC_PI_2).to_array(),
            )),
            scale: Some([2.0, 2.0, 2.0]),
            ..Default::default()
        };
        let transform = NodeTransform::from_node(&node);
        let point = transform.matrix().transform_point3(Vec3::X);
        assert!(point.abs_diff_eq(Vec3::new(1.0, 0.0, -2.0), 1e-5));
        assert!(matches!(
            transform,
            NodeTransform::Decomposed(DecomposedTransform { .. })
        ));
    }
}
