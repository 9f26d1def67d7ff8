//! Values a simulation variable can hold.
//!
//! Domain quantities are either numeric (voltage, pH, population counts)
//! or boolean flags (microscope in focus, pendulum swinging).

use serde::{Deserialize, Serialize};

/// A single simulation variable value.
///
/// # Examples
///
/// ```
/// use labsim::VariableValue;
///
/// let voltage = VariableValue::Number(12.0);
/// let focused = VariableValue::Flag(true);
///
/// assert_eq!(voltage.as_number(), Some(12.0));
/// assert_eq!(focused.as_flag(), Some(true));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VariableValue {
    /// On/off state.
    Flag(bool),
    /// Numeric quantity.
    Number(f64),
}

impl VariableValue {
    /// True for numbers.
    pub const fn is_number(&self) -> bool {
        matches!(self, Self::Number(_))
    }

    /// True for flags.
    pub const fn is_flag(&self) -> bool {
        matches!(self, Self::Flag(_))
    }

    /// The number, if this is one.
    pub const fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(v) => Some(*v),
            Self::Flag(_) => None,
        }
    }

    /// The flag, if this is one.
    pub const fn as_flag(&self) -> Option<bool> {
        match self {
            Self::Flag(v) => Some(*v),
            Self::Number(_) => None,
        }
    }

    /// Returns a human-readable type name.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Number(_) => "number",
            Self::Flag(_) => "flag",
        }
    }
}

impl std::fmt::Display for VariableValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(v) => write!(f, "{v}"),
            Self::Flag(v) => write!(f, "{v}"),
        }
    }
}

impl From<bool> for VariableValue {
    fn from(v: bool) -> Self {
        Self::Flag(v)
    }
}

impl From<f64> for VariableValue {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<i32> for VariableValue {
    fn from(v: i32) -> Self {
        Self::Number(f64::from(v))
    }
}

impl From<u32> for VariableValue {
    fn from(v: u32) -> Self {
        Self::Number(f64::from(v))
    }
}
