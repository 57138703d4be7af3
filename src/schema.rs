//! Schema model: parameters, sequence containers, and the registries built from them.
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;
use typed_builder::TypedBuilder;

use crate::criteria::MatchCriteria;
use crate::types::ParameterType;
use crate::{Error, Result};

/// A named value in a packet.
#[derive(TypedBuilder, Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Parameter {
    #[builder(setter(into))]
    pub name: String,
    #[builder(setter(into))]
    pub parameter_type: Arc<ParameterType>,
    #[builder(default, setter(strip_option, into))]
    pub short_description: Option<String>,
    #[builder(default, setter(strip_option, into))]
    pub long_description: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum RepeatCount {
    Fixed(usize),
    Dynamic {
        parameter: String,
        use_calibrated: bool,
    },
}

/// Repetition of a parameter entry. Can be described but not decoded.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RepeatEntry {
    pub count: RepeatCount,
}

/// Parameter reference in a container's entry list.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ParameterEntry {
    pub parameter: Arc<Parameter>,
    /// The parameter is only present if all of these are true.
    #[serde(default)]
    pub include_condition: Vec<MatchCriteria>,
    #[serde(default)]
    pub repeat: Option<RepeatEntry>,
}

impl ParameterEntry {
    #[must_use]
    pub fn new(parameter: Arc<Parameter>) -> Self {
        ParameterEntry {
            parameter,
            include_condition: Vec::new(),
            repeat: None,
        }
    }

    /// Only include the parameter when `criteria` is true. May be called more than once;
    /// all conditions must hold.
    #[must_use]
    pub fn include_if(mut self, criteria: impl Into<MatchCriteria>) -> Self {
        self.include_condition.push(criteria.into());
        self
    }

    #[must_use]
    pub fn repeated(mut self, count: RepeatCount) -> Self {
        self.repeat = Some(RepeatEntry { count });
        self
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum Entry {
    Parameter(ParameterEntry),
    /// Entries of another container decoded inline.
    Container(Arc<SequenceContainer>),
}

impl From<Arc<Parameter>> for Entry {
    fn from(p: Arc<Parameter>) -> Self {
        Entry::Parameter(ParameterEntry::new(p))
    }
}

impl From<ParameterEntry> for Entry {
    fn from(e: ParameterEntry) -> Self {
        Entry::Parameter(e)
    }
}

impl From<Arc<SequenceContainer>> for Entry {
    fn from(c: Arc<SequenceContainer>) -> Self {
        Entry::Container(c)
    }
}

/// An ordered layout of parameters, possibly specializing a base container.
///
/// A container with a `base_container` is a candidate after its base has been decoded;
/// it is chosen if all of its `restriction_criteria` match the fields decoded so far.
#[derive(TypedBuilder, Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SequenceContainer {
    #[builder(setter(into))]
    pub name: String,
    #[builder(default)]
    pub entries: Vec<Entry>,
    #[builder(default, setter(strip_option, into))]
    pub short_description: Option<String>,
    #[builder(default, setter(strip_option, into))]
    pub long_description: Option<String>,
    #[builder(default, setter(strip_option, into))]
    pub base_container: Option<String>,
    #[builder(default)]
    #[serde(default)]
    pub restriction_criteria: Vec<MatchCriteria>,
    /// An abstract container must be specialized by exactly one inheritor.
    #[builder(default)]
    #[serde(default, rename = "abstract")]
    pub is_abstract: bool,
}

/// Name keyed registry enforcing that a name maps to exactly one definition.
#[derive(Debug)]
struct Registry<T> {
    kind: &'static str,
    items: IndexMap<String, Arc<T>>,
}

impl<T: PartialEq> Registry<T> {
    fn new(kind: &'static str) -> Self {
        Registry {
            kind,
            items: IndexMap::new(),
        }
    }

    /// Returns true if `item` was added, false if an identical definition exists.
    fn register(&mut self, name: &str, item: &Arc<T>) -> Result<bool> {
        match self.items.entry(name.to_string()) {
            indexmap::map::Entry::Occupied(existing) if **existing.get() == **item => Ok(false),
            indexmap::map::Entry::Occupied(_) => Err(Error::DuplicateDefinition {
                kind: self.kind,
                name: name.to_string(),
            }),
            indexmap::map::Entry::Vacant(slot) => {
                slot.insert(item.clone());
                Ok(true)
            }
        }
    }

    fn get(&self, name: &str) -> Option<&Arc<T>> {
        self.items.get(name)
    }

    fn iter(&self) -> impl Iterator<Item = &Arc<T>> {
        self.items.values()
    }
}

/// Read-only registries of parameter types, parameters, and containers.
///
/// Built once from a set of containers; all nested definitions reachable from them are
/// registered. Container inheritance is indexed once the container set is complete.
#[derive(Debug)]
pub struct Schema {
    types: Registry<ParameterType>,
    parameters: Registry<Parameter>,
    containers: Registry<SequenceContainer>,
    /// Positions of each container's inheritors in the container registry, keyed by the
    /// base container's position.
    inheritors: Vec<Vec<usize>>,
}

impl Schema {
    /// Build a schema from `containers` and everything nested in them.
    ///
    /// # Errors
    /// - [Error::DuplicateDefinition] if a name is bound to non-identical definitions
    /// - [Error::ElementNotFound] if a base container does not exist
    /// - [Error::InvalidSchema] for inheritance cycles or invalid parameter types
    /// - [Error::Unsupported] for unsupported parameter types
    pub fn build<I>(containers: I) -> Result<Schema>
    where
        I: IntoIterator,
        I::Item: Into<Arc<SequenceContainer>>,
    {
        let mut schema = Schema {
            types: Registry::new("parameter type"),
            parameters: Registry::new("parameter"),
            containers: Registry::new("container"),
            inheritors: Vec::new(),
        };

        // collect every definition, depth first in declaration order
        let mut stack: Vec<Arc<SequenceContainer>> =
            containers.into_iter().map(Into::into).collect();
        stack.reverse();
        while let Some(container) = stack.pop() {
            if !schema.containers.register(&container.name, &container)? {
                continue;
            }
            let mut nested = Vec::new();
            for entry in &container.entries {
                match entry {
                    Entry::Parameter(pe) => schema.register_parameter(&pe.parameter)?,
                    Entry::Container(c) => nested.push(c.clone()),
                }
            }
            stack.extend(nested.into_iter().rev());
        }

        schema.inheritors = vec![Vec::new(); schema.containers.items.len()];
        for (idx, container) in schema.containers.iter().enumerate() {
            let Some(base) = &container.base_container else {
                continue;
            };
            let base_idx = schema.containers.items.get_index_of(base).ok_or_else(|| {
                Error::ElementNotFound(format!(
                    "base container {base} of {} does not exist",
                    container.name
                ))
            })?;
            schema.inheritors[base_idx].push(idx);
        }
        schema.check_inheritance_cycles()?;

        debug!(
            types = schema.types.items.len(),
            parameters = schema.parameters.items.len(),
            containers = schema.containers.items.len(),
            "built schema"
        );
        Ok(schema)
    }

    fn register_parameter(&mut self, parameter: &Arc<Parameter>) -> Result<()> {
        if self.parameters.register(&parameter.name, parameter)? {
            let ptype = &parameter.parameter_type;
            if self.types.register(&ptype.name, ptype)? {
                ptype.validate()?;
            }
        }
        Ok(())
    }

    fn check_inheritance_cycles(&self) -> Result<()> {
        let count = self.containers.items.len();
        for container in self.containers.iter() {
            let mut current = container;
            for _ in 0..=count {
                match &current.base_container {
                    Some(base) => match self.containers.get(base) {
                        Some(next) => current = next,
                        None => break,
                    },
                    None => break,
                }
                if current.name == container.name {
                    return Err(Error::InvalidSchema(format!(
                        "container {} inherits from itself",
                        container.name
                    )));
                }
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn parameter_type(&self, name: &str) -> Option<&Arc<ParameterType>> {
        self.types.get(name)
    }

    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&Arc<Parameter>> {
        self.parameters.get(name)
    }

    #[must_use]
    pub fn container(&self, name: &str) -> Option<&Arc<SequenceContainer>> {
        self.containers.get(name)
    }

    /// Containers that name `name` as their base, in registration order.
    pub fn inheritors(&self, name: &str) -> impl Iterator<Item = &Arc<SequenceContainer>> {
        self.containers
            .items
            .get_index_of(name)
            .map(|idx| self.inheritors[idx].as_slice())
            .unwrap_or_default()
            .iter()
            .filter_map(move |idx| self.containers.items.get_index(*idx).map(|(_, c)| c))
    }

    /// All containers, in registration order.
    pub fn containers(&self) -> impl Iterator<Item = &Arc<SequenceContainer>> {
        self.containers.iter()
    }

    pub fn parameters(&self) -> impl Iterator<Item = &Arc<Parameter>> {
        self.parameters.iter()
    }

    pub fn parameter_types(&self) -> impl Iterator<Item = &Arc<ParameterType>> {
        self.types.iter()
    }
}

/// Build a [Schema] from `containers`, see [Schema::build].
///
/// # Errors
/// See [Schema::build].
pub fn build_schema<I>(containers: I) -> Result<Schema>
where
    I: IntoIterator,
    I::Item: Into<Arc<SequenceContainer>>,
{
    Schema::build(containers)
}
