//! Scalar metric collection over a pass.

use crate::common::*;

/// Collects named scalar values in insertion order of names.
#[derive(Debug, Clone, Default)]
pub struct Collector {
    values: IndexMap<String, Vec<f64>>,
}

impl Collector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: impl Into<String>, value: f64) {
        self.values.entry(name.into()).or_insert_with(Vec::new).push(value);
    }

    pub fn get(&self, name: &str) -> Option<&[f64]> {
        self.values.get(name).map(|values| values.as_slice())
    }

    /// The mean of recorded values, or `None` if the name is never recorded.
    pub fn mean(&self, name: &str) -> Option<f64> {
        let values = self.values.get(name)?;
        (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
    }

    pub fn means(&self) -> IndexMap<String, f64> {
        self.values
            .keys()
            .filter_map(|name| Some((name.clone(), self.mean(name)?)))
            .collect()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(|name| name.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn reset(&mut self) {
        self.values.clear();
    }
}
