//! Run-scoped variable store.

use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::sync::LazyLock;
use tracing::debug;

static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([^{}\s](?:[^{}]*[^{}\s])?)\s*\}\}")
        .expect("failed to compile placeholder regex")
});

/// Variables shared between the steps of one scenario run.
///
/// A store lives for exactly one run. It is mutated between steps, never
/// while a step is patching, so it carries no synchronization; parallel
/// runs each need their own instance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableStore {
    variables: BTreeMap<String, String>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite `name`.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.variables.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.variables.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Variables in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.variables
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Replace every `{{ name }}` placeholder whose name is stored.
    ///
    /// A name is any text without braces; whitespace around it is ignored.
    /// Placeholders naming unknown variables are left as they are.
    /// Substituted values are not scanned again.
    pub fn patch(&self, template: &str) -> String {
        PLACEHOLDER_RE
            .replace_all(template, |caps: &Captures| {
                let name = &caps[1];
                match self.variables.get(name) {
                    Some(value) => value.clone(),
                    None => {
                        debug!("Unresolved placeholder '{}'", &caps[0]);
                        caps[0].to_string()
                    }
                }
            })
            .into_owned()
    }
}

impl From<BTreeMap<String, String>> for VariableStore {
    fn from(variables: BTreeMap<String, String>) -> Self {
        Self { variables }
    }
}

impl<K, V> FromIterator<(K, V)> for VariableStore
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            variables: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
