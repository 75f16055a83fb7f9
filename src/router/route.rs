//! Route definitions and lookup.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::router::error::RouteError;
use crate::router::guard::Guard;
use crate::router::pattern::PathPattern;
use crate::vdom::{PropValue, Props};

/// A path pattern bound to a screen id, with default props and guards.
#[derive(Clone)]
pub struct RouteDefinition {
    pub path: String,
    pub screen: String,
    pub props: Props,
    pub guards: Vec<Arc<dyn Guard>>,
}

impl RouteDefinition {
    pub fn new(path: &str, screen: &str) -> Self {
        Self {
            path: path.to_string(),
            screen: screen.to_string(),
            props: Props::new(),
            guards: Vec::new(),
        }
    }

    pub fn prop(mut self, name: &str, value: impl Into<PropValue>) -> Self {
        self.props.insert(name, value.into());
        self
    }

    /// Guards run in the order they are added, after the global guards.
    pub fn guard(mut self, guard: impl Guard + 'static) -> Self {
        self.guards.push(Arc::new(guard));
        self
    }
}

impl fmt::Debug for RouteDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteDefinition")
            .field("path", &self.path)
            .field("screen", &self.screen)
            .field("props", &self.props)
            .field("guards", &self.guards.len())
            .finish()
    }
}

pub(crate) struct CompiledRoute {
    pub definition: RouteDefinition,
    pub pattern: PathPattern,
}

pub(crate) struct RouteMatch<'a> {
    pub route: &'a CompiledRoute,
    pub params: BTreeMap<String, String>,
}

/// Routes in registration order, plus an index of literal paths.
#[derive(Default)]
pub(crate) struct RouteTable {
    routes: Vec<CompiledRoute>,
    exact: HashMap<String, usize>,
}

impl RouteTable {
    pub fn build(definitions: Vec<RouteDefinition>) -> Result<Self, RouteError> {
        let mut table = RouteTable::default();
        for definition in definitions {
            if table.routes.iter().any(|r| r.definition.path == definition.path) {
                return Err(RouteError::Duplicate(definition.path));
            }
            let pattern = PathPattern::compile(&definition.path)?;
            if pattern.is_literal() {
                table
                    .exact
                    .insert(definition.path.clone(), table.routes.len());
            }
            table.routes.push(CompiledRoute {
                definition,
                pattern,
            });
        }
        Ok(table)
    }

    /// A literal route wins; otherwise the first pattern in registration
    /// order that matches.
    pub fn find(&self, path: &str) -> Option<RouteMatch<'_>> {
        if let Some(&index) = self.exact.get(path) {
            return Some(RouteMatch {
                route: &self.routes[index],
                params: BTreeMap::new(),
            });
        }
        self.routes.iter().find_map(|route| {
            route
                .pattern
                .captures(path)
                .map(|params| RouteMatch { route, params })
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &RouteDefinition> {
        self.routes.iter().map(|r| &r.definition)
    }
}
