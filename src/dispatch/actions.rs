//! Named action tables.
//!
//! A resource is made of three tables (deserializer, controller and
//! serializer), each mapping action names to functions. A table may carry a
//! `default` entry used for any action it does not name.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::http::error::HttpError;
use crate::http::request::Request;
use crate::http::response::Response;

/// Name of the fallback entry in every table.
pub const DEFAULT_ACTION: &str = "default";

/// Keyword arguments handed to a controller action.
pub type ActionArgs = Map<String, Value>;

/// What a controller action produced.
#[derive(Debug)]
pub enum ActionResult {
    /// Structured data for the serializer to render.
    Value(Value),
    /// A complete response, passed through when the serializer declines it.
    Response(Response),
}

impl From<Value> for ActionResult {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<Response> for ActionResult {
    fn from(response: Response) -> Self {
        Self::Response(response)
    }
}

/// Serializer failure.
#[derive(Debug, thiserror::Error)]
pub enum SerializeError {
    /// Rendered as the (translated) response.
    #[error(transparent)]
    Http(#[from] HttpError),

    /// The result cannot be rendered; the raw result is returned instead.
    #[error("result cannot be serialized: {0}")]
    Unserializable(String),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("no '{action}' action and no default action")]
    UnresolvedAction { action: String },
}

pub type DeserializeFn = dyn Fn(&Request) -> Result<ActionArgs, HttpError> + Send + Sync;
pub type HandleFn = dyn Fn(&Request, ActionArgs) -> Result<ActionResult, HttpError> + Send + Sync;
pub type SerializeFn = dyn Fn(&mut Response, &ActionResult) -> Result<(), SerializeError> + Send + Sync;

/// Builds request arguments from the body, per action.
pub type Deserializer = Actions<DeserializeFn>;
/// The business logic, per action.
pub type Controller = Actions<HandleFn>;
/// Renders an action result into the response, per action.
pub type Serializer = Actions<SerializeFn>;

/// A table of action functions resolved by name, built once at wire-up.
pub struct Actions<F: ?Sized> {
    named: HashMap<String, Arc<F>>,
    default: Option<Arc<F>>,
}

impl<F: ?Sized> Actions<F> {
    pub fn new() -> Self {
        Self {
            named: HashMap::new(),
            default: None,
        }
    }

    fn insert(mut self, name: &str, f: Arc<F>) -> Self {
        if name == DEFAULT_ACTION {
            self.default = Some(f);
        } else {
            self.named.insert(name.to_string(), f);
        }
        self
    }

    /// Whether `action` resolves, directly or through `default`.
    pub fn supports(&self, action: Option<&str>) -> bool {
        self.resolve(action).is_ok()
    }

    /// The function for `action`, falling back to `default`.
    pub fn resolve(&self, action: Option<&str>) -> Result<&F, DispatchError> {
        action
            .and_then(|name| self.named.get(name))
            .or(self.default.as_ref())
            .map(|f| f.as_ref())
            .ok_or_else(|| DispatchError::UnresolvedAction {
                action: action.unwrap_or(DEFAULT_ACTION).to_string(),
            })
    }
}

impl<F: ?Sized> Default for Actions<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: ?Sized> Clone for Actions<F> {
    fn clone(&self) -> Self {
        Self {
            named: self.named.clone(),
            default: self.default.clone(),
        }
    }
}

impl<F: ?Sized> std::fmt::Debug for Actions<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.named.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("Actions")
            .field("named", &names)
            .field("default", &self.default.is_some())
            .finish()
    }
}

impl Actions<DeserializeFn> {
    pub fn on(
        self,
        name: &str,
        f: impl Fn(&Request) -> Result<ActionArgs, HttpError> + Send + Sync + 'static,
    ) -> Self {
        self.insert(name, Arc::new(f))
    }
}

impl Actions<HandleFn> {
    pub fn on(
        self,
        name: &str,
        f: impl Fn(&Request, ActionArgs) -> Result<ActionResult, HttpError> + Send + Sync + 'static,
    ) -> Self {
        self.insert(name, Arc::new(f))
    }
}

impl Actions<SerializeFn> {
    pub fn on(
        self,
        name: &str,
        f: impl Fn(&mut Response, &ActionResult) -> Result<(), SerializeError> + Send + Sync + 'static,
    ) -> Self {
        self.insert(name, Arc::new(f))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn controller() -> Controller {
        Controller::new()
            .on("show", |_req, _args| Ok(json!("show").into()))
            .on("default", |_req, _args| Ok(json!("fallback").into()))
    }

    fn call(controller: &Controller, action: Option<&str>) -> Value {
        let req = Request::from(axum::http::Request::new(bytes::Bytes::new()));
        match controller.resolve(action).unwrap()(&req, ActionArgs::new()).unwrap() {
            ActionResult::Value(v) => v,
            ActionResult::Response(_) => panic!("expected a value"),
        }
    }

    #[test]
    fn named_action_wins_over_default() {
        assert_eq!(call(&controller(), Some("show")), json!("show"));
    }

    #[test]
    fn missing_action_uses_default() {
        assert_eq!(call(&controller(), Some("index")), json!("fallback"));
        assert_eq!(call(&controller(), None), json!("fallback"));
    }

    #[test]
    fn unresolved_without_default() {
        let controller = Controller::new().on("show", |_req, _args| Ok(json!(null).into()));
        assert!(controller.supports(Some("show")));
        assert!(!controller.supports(Some("delete")));
        assert_eq!(
            controller.resolve(Some("delete")).err(),
            Some(DispatchError::UnresolvedAction {
                action: "delete".to_string()
            })
        );
    }
}
