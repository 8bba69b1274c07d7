//! Function registry.
//!
//! Populated during startup by a single thread, then moved into the dispatch host
//! where it is only read. Every descriptor is fully validated before it is
//! inserted, so a failed registration leaves the registry untouched.

use std::collections::HashSet;
use std::sync::Arc;

use fnhost_types::{AuthLevel, BindingDecl, Direction, HttpMethod, TriggerBinding, TriggerKind, TriggerSource};
use fnhost_util::{PathTemplate, UnresolvedPlaceholderError};
use indexmap::{IndexMap, IndexSet};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info};

use crate::descriptor::FunctionDescriptor;
use crate::error::RegistrationError;
use crate::schedule::CronSchedule;

static FUNCTION_NAME_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_-]*$").expect("function name regex should compile"));

/// Compiled trigger of a registered function.
#[derive(Debug, Clone)]
pub enum TriggerMatcher {
    Http {
        route: PathTemplate,
        methods: IndexSet<HttpMethod>,
        auth_level: AuthLevel,
    },
    Timer {
        schedule: CronSchedule,
    },
    Blob {
        pattern: PathTemplate,
    },
}

impl TriggerMatcher {
    fn compile(descriptor: &FunctionDescriptor) -> Result<Self, RegistrationError> {
        let function = descriptor.name();
        match descriptor.trigger() {
            TriggerBinding::Http {
                route,
                methods,
                auth_level,
            } => {
                if methods.is_empty() {
                    return Err(RegistrationError::invalid_descriptor(function, "HTTP trigger declares no methods"));
                }
                let route_text = route.as_deref().unwrap_or(function).trim_matches('/');
                let route = PathTemplate::parse_ignore_case(route_text).map_err(|source| RegistrationError::InvalidPattern {
                    function: function.to_string(),
                    binding: descriptor.trigger_name().to_string(),
                    source,
                })?;
                Ok(TriggerMatcher::Http {
                    route,
                    methods: methods.clone(),
                    auth_level: *auth_level,
                })
            }
            TriggerBinding::Timer { schedule } => CronSchedule::parse(schedule)
                .map(|schedule| TriggerMatcher::Timer { schedule })
                .map_err(|source| RegistrationError::InvalidSchedule {
                    function: function.to_string(),
                    source,
                }),
            TriggerBinding::Blob { path_pattern, .. } => PathTemplate::parse(path_pattern)
                .map(|pattern| TriggerMatcher::Blob { pattern })
                .map_err(|source| RegistrationError::InvalidPattern {
                    function: function.to_string(),
                    binding: descriptor.trigger_name().to_string(),
                    source,
                }),
        }
    }

    /// Captured route parameters when `source` fires this trigger.
    fn captures(&self, source: &TriggerSource) -> Option<IndexMap<String, String>> {
        match (self, source) {
            (TriggerMatcher::Http { route, methods, .. }, TriggerSource::Http { method, path }) => {
                if !methods.contains(method) {
                    return None;
                }
                route.matches(path.trim_matches('/'))
            }
            (TriggerMatcher::Timer { schedule }, TriggerSource::Timer { schedule: fired }) => {
                let fired = CronSchedule::parse(fired).ok()?;
                (fired.expression() == schedule.expression()).then(IndexMap::new)
            }
            (TriggerMatcher::Blob { pattern }, TriggerSource::Blob { path }) => pattern.matches(path),
            _ => None,
        }
    }
}

/// A descriptor accepted by the registry together with its compiled trigger.
#[derive(Debug)]
pub struct RegisteredFunction {
    descriptor: FunctionDescriptor,
    matcher: TriggerMatcher,
}

impl RegisteredFunction {
    pub fn name(&self) -> &str {
        self.descriptor.name()
    }

    pub fn descriptor(&self) -> &FunctionDescriptor {
        &self.descriptor
    }

    pub fn matcher(&self) -> &TriggerMatcher {
        &self.matcher
    }

    pub fn kind(&self) -> TriggerKind {
        self.descriptor.trigger().kind()
    }

    /// Route template of an HTTP function, relative to the route prefix.
    pub fn route(&self) -> Option<&PathTemplate> {
        match &self.matcher {
            TriggerMatcher::Http { route, .. } => Some(route),
            _ => None,
        }
    }

    pub fn auth_level(&self) -> Option<AuthLevel> {
        match &self.matcher {
            TriggerMatcher::Http { auth_level, .. } => Some(*auth_level),
            _ => None,
        }
    }

    pub fn schedule(&self) -> Option<&CronSchedule> {
        match &self.matcher {
            TriggerMatcher::Timer { schedule } => Some(schedule),
            _ => None,
        }
    }

    pub fn blob_pattern(&self) -> Option<&PathTemplate> {
        match &self.matcher {
            TriggerMatcher::Blob { pattern } => Some(pattern),
            _ => None,
        }
    }

    /// Route parameters captured when `source` fires this function, or `None` if it does not.
    pub fn captures(&self, source: &TriggerSource) -> Option<IndexMap<String, String>> {
        self.matcher.captures(source)
    }

    /// Short human-readable description of the trigger.
    pub fn trigger_summary(&self) -> String {
        match &self.matcher {
            TriggerMatcher::Http { route, methods, .. } => {
                let methods: Vec<&str> = methods.iter().map(HttpMethod::as_str).collect();
                format!("http {} /{}", methods.join(","), route.as_str())
            }
            TriggerMatcher::Timer { schedule } => format!("timer '{}'", schedule.expression()),
            TriggerMatcher::Blob { pattern } => format!("blob {}", pattern.as_str()),
        }
    }
}

/// Name-keyed set of registered functions, in registration order.
#[derive(Debug, Default)]
pub struct FunctionRegistry {
    functions: IndexMap<String, Arc<RegisteredFunction>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and add a function.
    ///
    /// # Errors
    ///
    /// Returns a [`RegistrationError`] describing the first problem found; the
    /// registry is unchanged in that case.
    pub fn register(&mut self, descriptor: FunctionDescriptor) -> Result<(), RegistrationError> {
        let name = descriptor.name().to_string();
        if !FUNCTION_NAME_REGEX.is_match(&name) {
            return Err(RegistrationError::invalid_name(
                name,
                "must start with a letter and contain only letters, digits, '_' or '-'",
            ));
        }
        if self.functions.contains_key(&name) {
            return Err(RegistrationError::duplicate_name(name));
        }

        validate_bindings(&descriptor)?;
        let matcher = TriggerMatcher::compile(&descriptor)?;
        self.check_route_conflict(&name, &matcher)?;
        validate_placeholders(&descriptor, &matcher)?;

        info!(function = %name, trigger = %descriptor.trigger().kind(), "function registered");
        self.functions.insert(name, Arc::new(RegisteredFunction { descriptor, matcher }));
        Ok(())
    }

    fn check_route_conflict(&self, function: &str, matcher: &TriggerMatcher) -> Result<(), RegistrationError> {
        let TriggerMatcher::Http { route, methods, .. } = matcher else {
            return Ok(());
        };
        let shape = route.shape();
        for existing in self.functions.values() {
            if let TriggerMatcher::Http {
                route: existing_route,
                methods: existing_methods,
                ..
            } = &existing.matcher
                && existing_route.shape() == shape
                && methods.iter().any(|method| existing_methods.contains(method))
            {
                return Err(RegistrationError::RouteConflict {
                    function: function.to_string(),
                    route: route.as_str().to_string(),
                    existing: existing.name().to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<RegisteredFunction>> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<RegisteredFunction>> {
        self.functions.values()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Every function fired by `source`, with the route parameters its trigger captured.
    pub fn matching(&self, source: &TriggerSource) -> Vec<(Arc<RegisteredFunction>, IndexMap<String, String>)> {
        let matches: Vec<_> = self
            .functions
            .values()
            .filter_map(|function| function.captures(source).map(|captures| (function.clone(), captures)))
            .collect();
        debug!(source = %source, matches = matches.len(), "trigger source matched");
        matches
    }

    /// HTTP functions whose route matches `path` regardless of method.
    pub fn routes_matching(&self, path: &str) -> Vec<Arc<RegisteredFunction>> {
        let path = path.trim_matches('/');
        self.functions
            .values()
            .filter(|function| function.route().is_some_and(|route| route.matches(path).is_some()))
            .cloned()
            .collect()
    }

    /// Distinct timer schedules, one per normalised expression.
    pub fn schedules(&self) -> Vec<CronSchedule> {
        let mut seen = HashSet::new();
        self.functions
            .values()
            .filter_map(|function| function.schedule())
            .filter(|schedule| seen.insert(schedule.expression().to_string()))
            .cloned()
            .collect()
    }

    /// Blob trigger patterns of all registered functions.
    pub fn blob_patterns(&self) -> Vec<PathTemplate> {
        self.functions
            .values()
            .filter_map(|function| function.blob_pattern())
            .cloned()
            .collect()
    }
}

fn validate_bindings(descriptor: &FunctionDescriptor) -> Result<(), RegistrationError> {
    let function = descriptor.name();
    let mut names = HashSet::new();
    if descriptor.trigger_name().trim().is_empty() {
        return Err(RegistrationError::invalid_descriptor(function, "trigger binding name is empty"));
    }
    names.insert(descriptor.trigger_name());

    let declared = descriptor
        .input_bindings()
        .iter()
        .map(|decl| (decl, Direction::In))
        .chain(descriptor.output_bindings().iter().map(|decl| (decl, Direction::Out)));
    for (decl, expected) in declared {
        if decl.name.trim().is_empty() {
            return Err(RegistrationError::invalid_descriptor(function, "binding name is empty"));
        }
        if !names.insert(decl.name.as_str()) {
            return Err(RegistrationError::invalid_descriptor(
                function,
                format!("binding name '{}' is used more than once", decl.name),
            ));
        }
        if decl.direction != expected {
            return Err(RegistrationError::invalid_descriptor(
                function,
                format!("binding '{}' is declared with the wrong direction", decl.name),
            ));
        }
        if decl.direction == Direction::Out && decl.path_pattern.is_none() {
            return Err(RegistrationError::invalid_descriptor(
                function,
                format!("output binding '{}' has no path pattern", decl.name),
            ));
        }
    }
    Ok(())
}

/// Binding patterns must parse, and for non-HTTP triggers every placeholder must be
/// captured by the trigger. HTTP placeholders may also come from the query string,
/// so those are checked per request.
fn validate_placeholders(descriptor: &FunctionDescriptor, matcher: &TriggerMatcher) -> Result<(), RegistrationError> {
    let available: Option<&[String]> = match matcher {
        TriggerMatcher::Http { .. } => None,
        TriggerMatcher::Timer { .. } => Some(&[] as &[String]),
        TriggerMatcher::Blob { pattern } => Some(pattern.placeholders()),
    };

    let bindings = descriptor.input_bindings().iter().chain(descriptor.output_bindings());
    for decl in bindings {
        let Some(template) = compile_binding(descriptor, decl)? else {
            continue;
        };
        let Some(available) = available else {
            continue;
        };
        if let Some(missing) = template.placeholders().iter().find(|name| !available.contains(*name)) {
            return Err(RegistrationError::UnresolvedPlaceholder {
                function: descriptor.name().to_string(),
                binding: decl.name.clone(),
                source: UnresolvedPlaceholderError {
                    template: template.as_str().to_string(),
                    placeholder: missing.clone(),
                },
            });
        }
    }
    Ok(())
}

fn compile_binding(descriptor: &FunctionDescriptor, decl: &BindingDecl) -> Result<Option<PathTemplate>, RegistrationError> {
    decl.path_pattern
        .as_deref()
        .map(PathTemplate::parse)
        .transpose()
        .map_err(|source| RegistrationError::InvalidPattern {
            function: descriptor.name().to_string(),
            binding: decl.name.clone(),
            source,
        })
}
