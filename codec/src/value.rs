//! Live field values exchanged with the component accessor.

use glam::{Quat, Vec2, Vec3};
use schema::FieldKind;

use crate::GhostId;

/// A field value in its live (unquantized) form.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Bool(bool),
    Int(i32),
    UInt(u32),
    Long(i64),
    ULong(u64),
    Float(f32),
    Double(f64),
    Vector2(Vec2),
    Vector3(Vec3),
    Quaternion(Quat),
    String(String),
    /// Reference to another ghost; `None` when unset or unresolved.
    Entity(Option<GhostId>),
}

impl FieldValue {
    /// The zero value of a kind: false, 0, empty string, identity rotation, no reference.
    #[must_use]
    pub fn zero(kind: FieldKind) -> Self {
        match kind {
            FieldKind::Bool => Self::Bool(false),
            FieldKind::Int => Self::Int(0),
            FieldKind::UInt => Self::UInt(0),
            FieldKind::Long => Self::Long(0),
            FieldKind::ULong => Self::ULong(0),
            FieldKind::Float => Self::Float(0.0),
            FieldKind::Double => Self::Double(0.0),
            FieldKind::Vector2 => Self::Vector2(Vec2::ZERO),
            FieldKind::Vector3 => Self::Vector3(Vec3::ZERO),
            FieldKind::Quaternion => Self::Quaternion(Quat::IDENTITY),
            FieldKind::FixedString(_) => Self::String(String::new()),
            FieldKind::Entity => Self::Entity(None),
        }
    }

    /// Short lowercase kind name, matching `FieldKind::name`.
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::UInt(_) => "uint",
            Self::Long(_) => "long",
            Self::ULong(_) => "ulong",
            Self::Float(_) => "float",
            Self::Double(_) => "double",
            Self::Vector2(_) => "vector2",
            Self::Vector3(_) => "vector3",
            Self::Quaternion(_) => "quaternion",
            Self::String(_) => "fixed-string",
            Self::Entity(_) => "entity",
        }
    }

    /// Distance between two values of the same floating kind.
    ///
    /// Returns `None` for kinds without a meaningful distance.
    #[must_use]
    pub fn distance(&self, other: &Self) -> Option<f32> {
        match (self, other) {
            (Self::Float(a), Self::Float(b)) => Some((a - b).abs()),
            (Self::Double(a), Self::Double(b)) => Some((a - b).abs() as f32),
            (Self::Vector2(a), Self::Vector2(b)) => Some(a.distance(*b)),
            (Self::Vector3(a), Self::Vector3(b)) => Some(a.distance(*b)),
            (Self::Quaternion(a), Self::Quaternion(b)) => Some(a.angle_between(*b)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_match_schema() {
        assert_eq!(FieldValue::Vector3(Vec3::ZERO).kind_name(), FieldKind::Vector3.name());
        assert_eq!(
            FieldValue::String(String::new()).kind_name(),
            FieldKind::FixedString(schema::StringCapacity::Bytes32).name()
        );
    }

    #[test]
    fn zero_values_match_kind() {
        for kind in [FieldKind::Bool, FieldKind::ULong, FieldKind::Quaternion, FieldKind::Entity] {
            assert_eq!(FieldValue::zero(kind).kind_name(), kind.name());
        }
    }

    #[test]
    fn distance() {
        let a = FieldValue::Vector3(Vec3::new(0.0, 0.0, 0.0));
        let b = FieldValue::Vector3(Vec3::new(3.0, 4.0, 0.0));
        assert_eq!(a.distance(&b), Some(5.0));
        assert_eq!(FieldValue::Int(1).distance(&FieldValue::Int(4)), None);
    }
}
