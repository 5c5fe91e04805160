//! Configuration fragments and their identity.

use std::collections::BTreeMap;
use std::fmt;

/// Value the opt-in annotation must carry, compared exactly.
pub const ELIGIBLE_VALUE: &str = "true";

/// Namespace-qualified identity of a fragment.
///
/// Ordered by namespace, then name. Displayed as `namespace/name`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FragmentId {
    pub namespace: String,
    pub name: String,
}

impl FragmentId {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for FragmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// One externally owned unit of configuration.
///
/// `data` maps file names to raw text; iteration is sorted by file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub id: FragmentId,
    pub annotations: BTreeMap<String, String>,
    pub data: BTreeMap<String, String>,
}

impl Fragment {
    pub fn new(id: FragmentId) -> Self {
        Self {
            id,
            annotations: BTreeMap::new(),
            data: BTreeMap::new(),
        }
    }

    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    pub fn with_data(mut self, file: impl Into<String>, content: impl Into<String>) -> Self {
        self.data.insert(file.into(), content.into());
        self
    }

    /// True iff `annotation` is present with the value `"true"` exactly.
    pub fn is_eligible(&self, annotation: &str) -> bool {
        self.annotations
            .get(annotation)
            .is_some_and(|value| value == ELIGIBLE_VALUE)
    }
}
