//! Field kinds, quantization and smoothing definitions.

/// Fixed string capacities, in bytes of backing storage.
///
/// Three bytes of every capacity are reserved for the length prefix and a
/// terminator, so `Bytes32` holds up to 29 bytes of UTF-8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StringCapacity {
    Bytes32,
    Bytes64,
    Bytes128,
    Bytes512,
    Bytes4096,
}

impl StringCapacity {
    /// Total backing storage in bytes.
    #[must_use]
    pub const fn bytes(self) -> usize {
        match self {
            Self::Bytes32 => 32,
            Self::Bytes64 => 64,
            Self::Bytes128 => 128,
            Self::Bytes512 => 512,
            Self::Bytes4096 => 4096,
        }
    }

    /// Longest string, in bytes, that fits.
    #[must_use]
    pub const fn max_len(self) -> usize {
        self.bytes() - 3
    }
}

/// Primitive kind of a replicated field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FieldKind {
    Bool,
    Int,
    UInt,
    Long,
    ULong,
    Float,
    Double,
    Vector2,
    Vector3,
    Quaternion,
    FixedString(StringCapacity),
    /// Reference to another ghost, as (id, spawn tick).
    Entity,
}

impl FieldKind {
    /// Number of 32-bit snapshot words the field occupies.
    #[must_use]
    pub const fn word_count(self) -> usize {
        match self {
            Self::Bool | Self::Int | Self::UInt | Self::Float => 1,
            Self::Long | Self::ULong | Self::Double | Self::Vector2 => 2,
            Self::Vector3 | Self::Entity => 3,
            Self::Quaternion => 4,
            Self::FixedString(capacity) => 1 + capacity.max_len().div_ceil(4),
        }
    }

    /// Number of scalar components (vectors and quaternions have several).
    #[must_use]
    pub const fn component_count(self) -> usize {
        match self {
            Self::Vector2 => 2,
            Self::Vector3 => 3,
            Self::Quaternion => 4,
            _ => 1,
        }
    }

    /// Returns `true` for kinds that accept a quantization factor.
    #[must_use]
    pub const fn is_floating(self) -> bool {
        matches!(
            self,
            Self::Float | Self::Double | Self::Vector2 | Self::Vector3 | Self::Quaternion
        )
    }

    /// Returns `true` for kinds whose components may share one change bit.
    #[must_use]
    pub const fn supports_composite(self) -> bool {
        matches!(self, Self::Vector2 | Self::Vector3)
    }

    /// Short lowercase name used in diagnostics.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::UInt => "uint",
            Self::Long => "long",
            Self::ULong => "ulong",
            Self::Float => "float",
            Self::Double => "double",
            Self::Vector2 => "vector2",
            Self::Vector3 => "vector3",
            Self::Quaternion => "quaternion",
            Self::FixedString(_) => "fixed-string",
            Self::Entity => "entity",
        }
    }
}

/// Fixed-point scaling applied before delta packing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Quantization {
    /// Stored and sent as raw IEEE bits.
    #[default]
    None,
    /// Stored as `round(value * factor)`.
    Factor(u32),
}

impl Quantization {
    /// Returns the factor, if quantized.
    #[must_use]
    pub const fn factor(self) -> Option<u32> {
        match self {
            Self::None => None,
            Self::Factor(factor) => Some(factor),
        }
    }
}

/// How the client restores a field between received snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Smoothing {
    /// Use the older snapshot's value as-is.
    #[default]
    Clamp,
    /// Interpolate between the bracketing snapshots.
    Interpolate,
    /// Interpolate, and extrapolate from the two newest snapshots when no newer one exists.
    InterpolateAndExtrapolate,
}

/// Field definition within a ghost type.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FieldDef {
    pub name: String,
    pub kind: FieldKind,
    #[cfg_attr(feature = "serde", serde(default))]
    pub quantization: Quantization,
    #[cfg_attr(feature = "serde", serde(default))]
    pub smoothing: Smoothing,
    /// Vector components share one change bit.
    #[cfg_attr(feature = "serde", serde(default))]
    pub composite: bool,
    /// Local-only fields are declared but never stored or sent.
    #[cfg_attr(feature = "serde", serde(default = "default_replicated"))]
    pub replicated: bool,
    /// Interpolation snaps instead of blending past this distance.
    #[cfg_attr(feature = "serde", serde(default))]
    pub max_smoothing_distance: Option<f32>,
}

#[cfg(feature = "serde")]
const fn default_replicated() -> bool {
    true
}

impl FieldDef {
    /// Creates an unquantized, clamped, replicated field.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            quantization: Quantization::None,
            smoothing: Smoothing::Clamp,
            composite: false,
            replicated: true,
            max_smoothing_distance: None,
        }
    }

    /// Sets a quantization factor.
    #[must_use]
    pub fn quantized(mut self, factor: u32) -> Self {
        self.quantization = Quantization::Factor(factor);
        self
    }

    /// Sets the smoothing mode.
    #[must_use]
    pub fn smoothing(mut self, smoothing: Smoothing) -> Self {
        self.smoothing = smoothing;
        self
    }

    /// Makes all components share a single change bit.
    #[must_use]
    pub fn composite(mut self) -> Self {
        self.composite = true;
        self
    }

    /// Marks the field as not replicated.
    #[must_use]
    pub fn local(mut self) -> Self {
        self.replicated = false;
        self
    }

    /// Sets the snap distance for interpolation.
    #[must_use]
    pub fn max_smoothing_distance(mut self, distance: f32) -> Self {
        self.max_smoothing_distance = Some(distance);
        self
    }

    /// Number of change-mask bits this field uses.
    #[must_use]
    pub const fn change_bit_count(&self) -> usize {
        if self.kind.supports_composite() && !self.composite {
            self.kind.component_count()
        } else {
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_capacities() {
        assert_eq!(StringCapacity::Bytes32.max_len(), 29);
        assert_eq!(StringCapacity::Bytes4096.max_len(), 4093);
        assert_eq!(FieldKind::FixedString(StringCapacity::Bytes32).word_count(), 1 + 8);
    }

    #[test]
    fn word_counts() {
        assert_eq!(FieldKind::Bool.word_count(), 1);
        assert_eq!(FieldKind::Double.word_count(), 2);
        assert_eq!(FieldKind::Vector3.word_count(), 3);
        assert_eq!(FieldKind::Quaternion.word_count(), 4);
        assert_eq!(FieldKind::Entity.word_count(), 3);
    }

    #[test]
    fn change_bits_per_field() {
        let vec = FieldDef::new("pos", FieldKind::Vector3).quantized(100);
        assert_eq!(vec.change_bit_count(), 3);
        assert_eq!(vec.composite().change_bit_count(), 1);
        assert_eq!(FieldDef::new("rot", FieldKind::Quaternion).change_bit_count(), 1);
        assert_eq!(FieldDef::new("hp", FieldKind::Int).change_bit_count(), 1);
    }

    #[test]
    fn builder_defaults() {
        let field = FieldDef::new("speed", FieldKind::Float);
        assert_eq!(field.quantization, Quantization::None);
        assert_eq!(field.smoothing, Smoothing::Clamp);
        assert!(field.replicated);
        assert!(!field.local().replicated);
    }
}
