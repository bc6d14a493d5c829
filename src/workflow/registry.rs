//! Name → flow lookup

use super::error::FlowError;
use super::unit::{Flow, WorkflowUnit};
use crate::config::{DefaultParams, Params};
use crate::suggest::suggest_correction;
use std::any::TypeId;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Constructor for a fresh unit instance
pub type UnitFactory = Arc<dyn Fn() -> Box<dyn WorkflowUnit> + Send + Sync>;

/// Everything the manager needs to start a flow
pub struct FlowDefinition {
    name: String,
    description: String,
    /// Merged defaults, computed once at construction
    defaults: Params,
    factory: UnitFactory,
    type_id: Option<TypeId>,
}

impl FlowDefinition {
    /// Definition for a [`Flow`] type
    pub fn of<F: Flow>() -> Self {
        Self {
            name: F::NAME.to_string(),
            description: F::DESCRIPTION.to_string(),
            defaults: F::defaults().into_params(),
            factory: Arc::new(|| Box::new(F::default()) as Box<dyn WorkflowUnit>),
            type_id: Some(TypeId::of::<F>()),
        }
    }

    /// Definition built from a closure
    pub fn new<G>(
        name: impl Into<String>,
        description: impl Into<String>,
        defaults: DefaultParams,
        factory: G,
    ) -> Self
    where
        G: Fn() -> Box<dyn WorkflowUnit> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            defaults: defaults.into_params(),
            factory: Arc::new(factory),
            type_id: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn defaults(&self) -> &Params {
        &self.defaults
    }

    pub fn instantiate(&self) -> Box<dyn WorkflowUnit> {
        (self.factory)()
    }

    pub(crate) fn is_type<F: 'static>(&self) -> bool {
        self.type_id == Some(TypeId::of::<F>())
    }
}

impl fmt::Debug for FlowDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowDefinition")
            .field("name", &self.name)
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}

/// Validate a flow name and normalise `-` to `_`.
///
/// Names are dot-separated segments of ASCII letters, digits and `_`.
pub fn normalize_flow_name(name: &str) -> Result<String, FlowError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(FlowError::malformed(name, "name is empty"));
    }

    let normalized = trimmed.replace('-', "_");
    for segment in normalized.split('.') {
        if segment.is_empty() {
            return Err(FlowError::malformed(name, "empty name segment"));
        }
        if let Some(bad) = segment
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '_'))
        {
            return Err(FlowError::malformed(
                name,
                format!("invalid character '{}'", bad),
            ));
        }
    }

    Ok(normalized)
}

/// Registered flows, keyed by normalised name
#[derive(Debug, Default)]
pub struct FlowRegistry {
    flows: BTreeMap<String, Arc<FlowDefinition>>,
}

impl FlowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in flow
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        crate::flows::register_builtin(&mut registry);
        registry
    }

    pub fn register<F: Flow>(&mut self) -> &mut Self {
        self.register_definition(FlowDefinition::of::<F>())
    }

    /// Register a definition; a later registration under the same name wins.
    pub fn register_definition(&mut self, mut definition: FlowDefinition) -> &mut Self {
        let name = match normalize_flow_name(&definition.name) {
            Ok(name) => name,
            Err(e) => {
                tracing::warn!(error = %e, "skipping flow registration");
                return self;
            }
        };
        definition.name = name.clone();

        if self.flows.contains_key(&name) {
            tracing::warn!(flow = %name, "flow registered twice, replacing earlier definition");
        }
        tracing::debug!(flow = %name, "registered flow");
        self.flows.insert(name, Arc::new(definition));
        self
    }

    /// Resolve a user-supplied flow name
    pub fn lookup(&self, name: &str) -> Result<Arc<FlowDefinition>, FlowError> {
        let normalized = normalize_flow_name(name)?;
        match self.flows.get(&normalized) {
            Some(definition) => Ok(definition.clone()),
            None => Err(FlowError::NotFound {
                name: name.to_string(),
                suggestion: suggest_correction(&normalized, &self.names()),
            }),
        }
    }

    /// Exact-name lookup without normalisation
    pub fn get(&self, name: &str) -> Option<&Arc<FlowDefinition>> {
        self.flows.get(name)
    }

    pub fn definitions(&self) -> impl Iterator<Item = &Arc<FlowDefinition>> {
        self.flows.values()
    }

    pub fn names(&self) -> Vec<&str> {
        self.flows.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }
}
