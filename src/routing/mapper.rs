//! Route templates and path matching.
//!
//! # Responsibilities
//! - Parse templates such as `/images/{image_id}/members{.format}`
//! - Match a method and path against the connected routes, in order
//! - Produce the path parameters of the first matching route
//!
//! # Design Decisions
//! - Literal segments are case-sensitive
//! - `{name}` captures exactly one non-empty segment
//! - `{name:.*}` captures the rest of the path and must come last
//! - A trailing `{.format}` makes an extension on the last segment optional
//! - No regex to keep matching linear in the number of segments

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::http::Method;

use crate::http::app::Application;

/// Invalid route template.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RouteError {
    #[error("route template must start with '/': {0}")]
    NotAbsolute(String),

    #[error("route template {template} has an unterminated or empty placeholder")]
    BadPlaceholder { template: String },

    #[error("route template {template} uses the parameter '{name}' twice")]
    DuplicateParameter { template: String, name: String },

    #[error("route template {template} has a tail capture before its last segment")]
    TailNotLast { template: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
    Tail(String),
}

pub(crate) struct Route {
    template: String,
    segments: Vec<Segment>,
    format_suffix: bool,
    methods: Vec<Method>,
    action: Option<String>,
    target: Arc<dyn Application>,
}

impl Route {
    fn allows(&self, method: &Method) -> bool {
        self.methods.is_empty() || self.methods.contains(method)
    }

    fn match_path(&self, path: &str) -> Option<BTreeMap<String, String>> {
        let path = path.strip_prefix('/')?;

        if self.format_suffix {
            if let Some((stem, format)) = split_format(path) {
                if let Some(mut params) = match_segments(&self.segments, stem) {
                    params.insert("format".to_string(), format.to_string());
                    return Some(params);
                }
            }
        }
        match_segments(&self.segments, path)
    }

    pub(crate) fn matches(
        &self,
        method: &Method,
        path: &str,
    ) -> Option<(Arc<dyn Application>, BTreeMap<String, String>)> {
        if !self.allows(method) {
            return None;
        }
        let mut params = self.match_path(path)?;
        if let Some(action) = &self.action {
            params.insert("action".to_string(), action.clone());
        }
        Some((Arc::clone(&self.target), params))
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("template", &self.template)
            .field("methods", &self.methods)
            .field("action", &self.action)
            .finish_non_exhaustive()
    }
}

/// Ordered collection of routes, consumed by [`crate::routing::Router`].
#[derive(Debug, Default)]
pub struct Mapper {
    routes: Vec<Route>,
}

impl Mapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect `template` to `target`.
    ///
    /// An empty `methods` slice matches every method. `action` is passed to
    /// the target as the `action` route parameter.
    pub fn connect(
        &mut self,
        template: &str,
        methods: &[Method],
        target: Arc<dyn Application>,
        action: Option<&str>,
    ) -> Result<&mut Self, RouteError> {
        let (segments, format_suffix) = parse_template(template)?;
        self.routes.push(Route {
            template: template.to_string(),
            segments,
            format_suffix,
            methods: methods.to_vec(),
            action: action.map(str::to_string),
            target,
        });
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub(crate) fn into_routes(self) -> Vec<Route> {
        self.routes
    }
}

fn parse_template(template: &str) -> Result<(Vec<Segment>, bool), RouteError> {
    let Some(body) = template.strip_prefix('/') else {
        return Err(RouteError::NotAbsolute(template.to_string()));
    };
    let (body, format_suffix) = match body.strip_suffix("{.format}") {
        Some(stripped) => (stripped, true),
        None => (body, false),
    };

    let raw: Vec<&str> = body.split('/').collect();
    let mut segments = Vec::with_capacity(raw.len());
    let mut names = Vec::new();

    for (i, part) in raw.iter().enumerate() {
        let segment = match part.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
            Some(inner) => {
                let (name, tail) = match inner.split_once(':') {
                    Some((name, ".*")) => (name, true),
                    Some(_) => {
                        return Err(RouteError::BadPlaceholder {
                            template: template.to_string(),
                        })
                    }
                    None => (inner, false),
                };
                if name.is_empty() || name.contains(['{', '}']) {
                    return Err(RouteError::BadPlaceholder {
                        template: template.to_string(),
                    });
                }
                if names.contains(&name) {
                    return Err(RouteError::DuplicateParameter {
                        template: template.to_string(),
                        name: name.to_string(),
                    });
                }
                names.push(name);
                if tail && i + 1 != raw.len() {
                    return Err(RouteError::TailNotLast {
                        template: template.to_string(),
                    });
                }
                if tail {
                    Segment::Tail(name.to_string())
                } else {
                    Segment::Param(name.to_string())
                }
            }
            None if part.contains(['{', '}']) => {
                return Err(RouteError::BadPlaceholder {
                    template: template.to_string(),
                })
            }
            None => Segment::Literal(part.to_string()),
        };
        segments.push(segment);
    }

    Ok((segments, format_suffix))
}

fn match_segments(segments: &[Segment], path: &str) -> Option<BTreeMap<String, String>> {
    let mut params = BTreeMap::new();
    let mut rest = Some(path);

    for segment in segments {
        let remaining = rest?;
        if let Segment::Tail(name) = segment {
            params.insert(name.clone(), remaining.to_string());
            return Some(params);
        }

        let (current, next) = match remaining.split_once('/') {
            Some((current, next)) => (current, Some(next)),
            None => (remaining, None),
        };
        match segment {
            Segment::Literal(literal) if literal == current => {}
            Segment::Param(name) if !current.is_empty() => {
                params.insert(name.clone(), current.to_string());
            }
            _ => return None,
        }
        rest = next;
    }

    rest.is_none().then_some(params)
}

/// Split `images/abc.json` into (`images/abc`, `json`).
fn split_format(path: &str) -> Option<(&str, &str)> {
    let last_start = path.rfind('/').map_or(0, |i| i + 1);
    let dot = path[last_start..].rfind('.')? + last_start;
    let (stem, format) = (&path[..dot], &path[dot + 1..]);
    (dot > last_start && !format.is_empty()).then_some((stem, format))
}
