//! Hyperparameter grids
//!
//! A grid maps parameter names to candidate value lists, as in the
//! `classifier_parameters` section of the configuration. Candidates are the
//! Cartesian product of all lists, generated in sorted key order with the last
//! key varying fastest.

use crate::error::{BakeoffError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A single hyperparameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// JSON `null`, e.g. `max_depth: null` for unlimited depth
    Null,
}

impl ParameterValue {
    /// Numeric value, accepting integers and floats
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParameterValue::Int(v) => Some(*v as f64),
            ParameterValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Non-negative integer value. Floats with no fractional part are accepted.
    pub fn as_usize(&self) -> Option<usize> {
        match self {
            ParameterValue::Int(v) if *v >= 0 => Some(*v as usize),
            ParameterValue::Float(v) if *v >= 0.0 && v.fract() == 0.0 => Some(*v as usize),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParameterValue::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParameterValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ParameterValue::Null)
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterValue::Bool(b) => write!(f, "{}", b),
            ParameterValue::Int(v) => write!(f, "{}", v),
            ParameterValue::Float(v) => write!(f, "{}", v),
            ParameterValue::Str(s) => write!(f, "{}", s),
            ParameterValue::Null => write!(f, "None"),
        }
    }
}

impl From<i64> for ParameterValue {
    fn from(v: i64) -> Self {
        ParameterValue::Int(v)
    }
}

impl From<f64> for ParameterValue {
    fn from(v: f64) -> Self {
        ParameterValue::Float(v)
    }
}

impl From<bool> for ParameterValue {
    fn from(v: bool) -> Self {
        ParameterValue::Bool(v)
    }
}

impl From<&str> for ParameterValue {
    fn from(v: &str) -> Self {
        ParameterValue::Str(v.to_string())
    }
}

/// One concrete hyperparameter combination
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamSet(pub BTreeMap<String, ParameterValue>);

impl ParamSet {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Builder-style insert
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParameterValue>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&ParameterValue> {
        self.0.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParameterValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ParamSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (k, v)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", k, v)?;
        }
        write!(f, "}}")
    }
}

/// Parameter name -> candidate values
pub type GridMap = BTreeMap<String, Vec<ParameterValue>>;

/// A parameter grid: a single map, or a list of maps whose candidates are
/// concatenated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamGrid {
    Single(GridMap),
    Multiple(Vec<GridMap>),
}

impl Default for ParamGrid {
    fn default() -> Self {
        ParamGrid::Single(GridMap::new())
    }
}

impl ParamGrid {
    /// Create an empty single grid
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert into a single grid
    pub fn with_values(mut self, name: impl Into<String>, values: Vec<ParameterValue>) -> Self {
        let name = name.into();
        match &mut self {
            ParamGrid::Single(map) => {
                map.insert(name, values);
            }
            ParamGrid::Multiple(maps) => {
                if maps.is_empty() {
                    maps.push(GridMap::new());
                }
                for map in maps.iter_mut() {
                    map.insert(name.clone(), values.clone());
                }
            }
        }
        self
    }

    fn maps(&self) -> Vec<&GridMap> {
        match self {
            ParamGrid::Single(map) => vec![map],
            ParamGrid::Multiple(maps) => maps.iter().collect(),
        }
    }

    /// Expand the grid into every parameter combination
    pub fn candidates(&self) -> Result<Vec<ParamSet>> {
        let mut out = Vec::new();
        for map in self.maps() {
            for (name, values) in map {
                if values.is_empty() {
                    return Err(BakeoffError::SearchError(format!(
                        "Parameter grid for '{}' must be a non-empty list",
                        name
                    )));
                }
            }

            // Odometer over sorted keys, last key fastest
            let keys: Vec<&String> = map.keys().collect();
            let sizes: Vec<usize> = keys.iter().map(|k| map[*k].len()).collect();
            let total: usize = sizes.iter().product();
            let mut counters = vec![0usize; keys.len()];

            for _ in 0..total {
                let mut params = ParamSet::new();
                for (i, key) in keys.iter().enumerate() {
                    params.0.insert((*key).clone(), map[*key][counters[i]].clone());
                }
                out.push(params);

                for i in (0..counters.len()).rev() {
                    counters[i] += 1;
                    if counters[i] < sizes[i] {
                        break;
                    }
                    counters[i] = 0;
                }
            }
        }
        Ok(out)
    }

    /// Number of candidates the grid expands to
    pub fn len(&self) -> usize {
        self.maps()
            .iter()
            .map(|m| m.values().map(|v| v.len()).product::<usize>())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
