//! Attribute types and variables.
//!
//! Every column a script reads or writes is declared up front as a
//! [`Variable`]: a name paired with one of a closed set of attribute types.
//! The type decides how many float and integer component streams the column
//! occupies in a data set, and how the value is padded when exported to a GPU
//! constant buffer.
//!
//! | Type | Float comps | Int comps | GPU size/align |
//! |------|-------------|-----------|----------------|
//! | [`AttributeType::Float`] | 1 | 0 | 4 / 4 |
//! | [`AttributeType::Int`] | 0 | 1 | 4 / 4 |
//! | [`AttributeType::Bool`] | 0 | 1 | 4 / 4 |
//! | [`AttributeType::Vec2`] | 2 | 0 | 8 / 8 |
//! | [`AttributeType::Vec3`] | 3 | 0 | 12 / 16 |
//! | [`AttributeType::Vec4`] | 4 | 0 | 16 / 16 |
//! | [`AttributeType::Mat4`] | 16 | 0 | 64 / 16 |
//! | [`AttributeType::SpawnInfo`] | 2 | 2 | 16 / 16 |
//! | [`AttributeType::ExecState`] | 0 | 1 | 4 / 4 |
//!
//! There is deliberately no runtime type registry beyond this enum: the
//! closed set keeps layout computation a couple of `match` arms.

use std::fmt;

/// The closed set of attribute types a data set column or parameter can have.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AttributeType {
    /// One 32-bit float component.
    Float,
    /// One 32-bit signed integer component.
    Int,
    /// Stored as one integer component (0 or 1).
    Bool,
    /// Two float components.
    Vec2,
    /// Three float components.
    Vec3,
    /// Four float components.
    Vec4,
    /// Sixteen float components, column major.
    Mat4,
    /// Per-tick spawn descriptor: interval, interpolation start offset
    /// (floats) plus count and spawn group (ints).
    SpawnInfo,
    /// An execution-state value, stored as one integer component.
    ExecState,
}

impl AttributeType {
    /// Number of 32-bit float component streams this type occupies.
    pub const fn float_components(self) -> usize {
        match self {
            AttributeType::Float => 1,
            AttributeType::Int | AttributeType::Bool | AttributeType::ExecState => 0,
            AttributeType::Vec2 => 2,
            AttributeType::Vec3 => 3,
            AttributeType::Vec4 => 4,
            AttributeType::Mat4 => 16,
            AttributeType::SpawnInfo => 2,
        }
    }

    /// Number of 32-bit integer component streams this type occupies.
    pub const fn int_components(self) -> usize {
        match self {
            AttributeType::Int | AttributeType::Bool | AttributeType::ExecState => 1,
            AttributeType::SpawnInfo => 2,
            _ => 0,
        }
    }

    /// Total number of 32-bit words, ignoring padding.
    pub const fn num_words(self) -> usize {
        self.float_components() + self.int_components()
    }

    /// Size in bytes in a padded GPU constant-buffer layout.
    pub const fn padded_size(self) -> usize {
        match self {
            AttributeType::Vec3 => 12,
            AttributeType::Mat4 => 64,
            AttributeType::SpawnInfo | AttributeType::Vec4 => 16,
            AttributeType::Vec2 => 8,
            _ => 4,
        }
    }

    /// Alignment in bytes in a padded GPU constant-buffer layout.
    pub const fn padded_align(self) -> usize {
        match self {
            AttributeType::Vec3 | AttributeType::Vec4 | AttributeType::Mat4 => 16,
            AttributeType::SpawnInfo => 16,
            AttributeType::Vec2 => 8,
            _ => 4,
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AttributeType::Float => "float",
            AttributeType::Int => "int",
            AttributeType::Bool => "bool",
            AttributeType::Vec2 => "vec2",
            AttributeType::Vec3 => "vec3",
            AttributeType::Vec4 => "vec4",
            AttributeType::Mat4 => "mat4",
            AttributeType::SpawnInfo => "spawn_info",
            AttributeType::ExecState => "exec_state",
        };
        f.write_str(name)
    }
}

/// One named, typed attribute column.
///
/// Two variables are the same column if and only if both name and type
/// match; declaring `position` as a `Vec3` in one script and a `Vec4` in
/// another is a layout mismatch, not a redefinition.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Variable {
    /// Attribute type.
    pub ty: AttributeType,
    /// Column name, e.g. `"position"` or `"emitter_a.execution_state"`.
    pub name: String,
}

impl Variable {
    /// Create a variable of an arbitrary type.
    pub fn new(ty: AttributeType, name: impl Into<String>) -> Self {
        Self { ty, name: name.into() }
    }

    /// Shorthand for a float variable.
    pub fn float(name: impl Into<String>) -> Self {
        Self::new(AttributeType::Float, name)
    }

    /// Shorthand for an int variable.
    pub fn int(name: impl Into<String>) -> Self {
        Self::new(AttributeType::Int, name)
    }

    /// Shorthand for a bool variable.
    pub fn bool(name: impl Into<String>) -> Self {
        Self::new(AttributeType::Bool, name)
    }

    /// Shorthand for a vec2 variable.
    pub fn vec2(name: impl Into<String>) -> Self {
        Self::new(AttributeType::Vec2, name)
    }

    /// Shorthand for a vec3 variable.
    pub fn vec3(name: impl Into<String>) -> Self {
        Self::new(AttributeType::Vec3, name)
    }

    /// Shorthand for a vec4 variable.
    pub fn vec4(name: impl Into<String>) -> Self {
        Self::new(AttributeType::Vec4, name)
    }

    /// Shorthand for a mat4 variable.
    pub fn mat4(name: impl Into<String>) -> Self {
        Self::new(AttributeType::Mat4, name)
    }

    /// Shorthand for a spawn-info variable.
    pub fn spawn_info(name: impl Into<String>) -> Self {
        Self::new(AttributeType::SpawnInfo, name)
    }

    /// Shorthand for an execution-state variable.
    pub fn exec_state(name: impl Into<String>) -> Self {
        Self::new(AttributeType::ExecState, name)
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.ty, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_counts() {
        assert_eq!(AttributeType::Vec3.float_components(), 3);
        assert_eq!(AttributeType::Vec3.int_components(), 0);
        assert_eq!(AttributeType::SpawnInfo.float_components(), 2);
        assert_eq!(AttributeType::SpawnInfo.int_components(), 2);
        assert_eq!(AttributeType::ExecState.num_words(), 1);
        assert_eq!(AttributeType::Mat4.num_words(), 16);
    }

    #[test]
    fn test_padded_layout() {
        assert_eq!(AttributeType::Vec3.padded_size(), 12);
        assert_eq!(AttributeType::Vec3.padded_align(), 16);
        assert_eq!(AttributeType::Float.padded_align(), 4);
        assert_eq!(AttributeType::Mat4.padded_size(), 64);
    }

    #[test]
    fn test_variable_identity() {
        let a = Variable::vec3("position");
        let b = Variable::new(AttributeType::Vec3, "position");
        let c = Variable::vec4("position");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
