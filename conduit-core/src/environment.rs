//! Environment variable overrides

use std::collections::BTreeMap;

/// Overrides applied on top of the inherited environment
///
/// `Some(value)` sets a variable, `None` removes an inherited one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentVariables {
    vars: BTreeMap<String, Option<String>>,
}

impl EnvironmentVariables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Look up an override; `Some(None)` means the variable is removed
    pub fn get(&self, name: &str) -> Option<Option<&str>> {
        self.vars.get(name).map(|v| v.as_deref())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_deref()))
    }

    /// The effective value of a variable, falling back to the current process
    pub fn resolve(&self, name: &str) -> Option<String> {
        match self.get(name) {
            Some(value) => value.map(str::to_string),
            None => std::env::var(name).ok(),
        }
    }
}

impl<K, V> FromIterator<(K, V)> for EnvironmentVariables
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), Some(v.into())))
                .collect(),
        }
    }
}

/// Incremental builder for [`EnvironmentVariables`]
#[derive(Debug, Clone, Default)]
pub struct EnvironmentVariablesBuilder {
    vars: BTreeMap<String, Option<String>>,
}

impl EnvironmentVariablesBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing set of overrides
    pub fn from_existing(existing: &EnvironmentVariables) -> Self {
        Self {
            vars: existing.vars.clone(),
        }
    }

    /// Set a variable for the child process
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.vars.insert(name.into(), Some(value.into()));
        self
    }

    /// Remove a variable the child would otherwise inherit
    pub fn remove(&mut self, name: impl Into<String>) -> &mut Self {
        self.vars.insert(name.into(), None);
        self
    }

    pub fn set_many<I, K, V>(&mut self, vars: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (name, value) in vars {
            self.set(name, value);
        }
        self
    }

    pub fn build(&self) -> EnvironmentVariables {
        EnvironmentVariables {
            vars: self.vars.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_set_and_remove() {
        let mut builder = EnvironmentVariablesBuilder::new();
        builder.set("A", "1").set("B", "2").remove("B").remove("HOME");
        let env = builder.build();

        assert_eq!(env.len(), 3);
        assert_eq!(env.get("A"), Some(Some("1")));
        assert_eq!(env.get("B"), Some(None));
        assert_eq!(env.get("C"), None);
        assert_eq!(env.resolve("HOME"), None);
    }

    #[test]
    fn test_from_existing_keeps_overrides() {
        let base: EnvironmentVariables = [("X", "1")].into_iter().collect();
        let mut builder = EnvironmentVariablesBuilder::from_existing(&base);
        builder.set_many([("Y", "2")]);
        let env = builder.build();

        assert_eq!(env.resolve("X").as_deref(), Some("1"));
        assert_eq!(env.resolve("Y").as_deref(), Some("2"));
        // The original set is untouched
        assert_eq!(base.len(), 1);
    }
}
