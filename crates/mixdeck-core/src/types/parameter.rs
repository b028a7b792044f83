//! Uniform payload for parameter commands.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A small tagged value used for every "set/get parameter" call.
///
/// Effects, inputs and outputs interpret parameter ids themselves; the engine
/// only transports the value. Booleans travel as integers (0 or 1), durations
/// as floating-point seconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum ParameterValue {
    Integer(i64),
    Float(f64),
}

impl Default for ParameterValue {
    fn default() -> Self {
        Self::Integer(0)
    }
}

impl ParameterValue {
    pub const fn integer(value: i64) -> Self {
        Self::Integer(value)
    }

    pub const fn float(value: f64) -> Self {
        Self::Float(value)
    }

    pub const fn boolean(value: bool) -> Self {
        Self::Integer(value as i64)
    }

    pub fn seconds(duration: Duration) -> Self {
        Self::Float(duration.as_secs_f64())
    }

    /// Integer view; floats are truncated toward zero.
    pub fn as_integer(&self) -> i64 {
        match *self {
            Self::Integer(v) => v,
            Self::Float(v) => v as i64,
        }
    }

    /// Floating-point view.
    pub fn as_float(&self) -> f64 {
        match *self {
            Self::Integer(v) => v as f64,
            Self::Float(v) => v,
        }
    }

    pub fn as_bool(&self) -> bool {
        self.as_integer() != 0
    }

    /// Interpret the value as seconds. Negative or non-finite values clamp to zero.
    pub fn as_duration(&self) -> Duration {
        let secs = self.as_float();
        if secs.is_finite() && secs > 0.0 {
            Duration::from_secs_f64(secs)
        } else {
            Duration::ZERO
        }
    }
}

impl From<i64> for ParameterValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for ParameterValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for ParameterValue {
    fn from(value: bool) -> Self {
        Self::boolean(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_zero() {
        assert_eq!(ParameterValue::default().as_integer(), 0);
        assert!(!ParameterValue::default().as_bool());
    }

    #[test]
    #[allow(clippy::float_cmp)]
    fn test_views() {
        let v = ParameterValue::float(2.75);
        assert_eq!(v.as_integer(), 2);
        assert_eq!(v.as_float(), 2.75);
        assert!(v.as_bool());

        let v = ParameterValue::from(true);
        assert_eq!(v, ParameterValue::Integer(1));
    }

    #[test]
    fn test_durations() {
        let v = ParameterValue::seconds(Duration::from_millis(1500));
        assert_eq!(v.as_duration(), Duration::from_millis(1500));
        assert_eq!(ParameterValue::float(-3.0).as_duration(), Duration::ZERO);
        assert_eq!(ParameterValue::float(f64::NAN).as_duration(), Duration::ZERO);
    }
}
