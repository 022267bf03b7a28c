//! Request dispatch through deserializer, controller and serializer.
//!
//! # Data Flow
//! ```text
//! Request (RouteMatch attached by the router)
//!     → route params minus controller/format, `action` popped
//!     → deserializer[action] → merged into args
//!     → controller[action](request, args) → ActionResult
//!     → serializer[action](response, result)
//!     → Response
//! ```
//!
//! # Design Decisions
//! - Errors from the deserializer or controller are translated and returned
//!   as `Err`; the serializer never runs for them
//! - Errors from the serializer are translated into the response itself
//! - A result the serializer cannot render is returned raw

use std::sync::Arc;

use serde_json::Value;
use tracing::{error, warn};

use crate::dispatch::actions::{
    ActionArgs, ActionResult, Controller, Deserializer, DispatchError, SerializeError, Serializer,
};
use crate::dispatch::json::{JsonRequestDeserializer, JsonResponseSerializer};
use crate::http::app::Application;
use crate::http::error::HttpError;
use crate::http::i18n::{translate_exception, Translator};
use crate::http::request::Request;
use crate::http::response::Response;
use crate::routing::{no_match, RouteMatch};

/// Per-request dispatch state.
#[derive(Debug, Default)]
pub struct DispatchContext {
    pub action: Option<String>,
    pub args: ActionArgs,
    pub result: Option<ActionResult>,
}

impl DispatchContext {
    /// Arguments from the route: every parameter except `controller` and
    /// `format`, with `action` taken out separately.
    pub fn from_route(route: &RouteMatch) -> Self {
        let mut args: ActionArgs = route
            .params
            .iter()
            .filter(|(name, _)| !matches!(name.as_str(), "controller" | "format"))
            .map(|(name, value)| (name.clone(), Value::String(value.clone())))
            .collect();

        let action = match args.remove("action") {
            Some(Value::String(action)) => Some(action),
            _ => None,
        };

        Self {
            action,
            args,
            result: None,
        }
    }
}

/// An application that (de)serializes around a controller.
pub struct Resource {
    controller: Controller,
    deserializer: Deserializer,
    serializer: Serializer,
    translator: Option<Arc<dyn Translator>>,
}

impl Resource {
    /// A resource using JSON in both directions.
    pub fn new(controller: Controller) -> Self {
        Self {
            controller,
            deserializer: JsonRequestDeserializer.actions(),
            serializer: JsonResponseSerializer.actions(),
            translator: None,
        }
    }

    pub fn with_deserializer(mut self, deserializer: Deserializer) -> Self {
        self.deserializer = deserializer;
        self
    }

    pub fn with_serializer(mut self, serializer: Serializer) -> Self {
        self.serializer = serializer;
        self
    }

    pub fn with_translator(mut self, translator: Arc<dyn Translator>) -> Self {
        self.translator = Some(translator);
        self
    }

    fn translate(&self, request: &Request, err: HttpError) -> HttpError {
        translate_exception(request, self.translator.as_deref(), err)
    }

    fn unresolved(&self, err: DispatchError) -> HttpError {
        error!(error = %err, "Resource cannot dispatch");
        HttpError::internal_server_error()
    }

    /// Deserialize and handle, filling in `ctx.result`.
    fn handle(&self, request: &Request, ctx: &mut DispatchContext) -> Result<(), HttpError> {
        let action = ctx.action.as_deref();

        let deserialize = self
            .deserializer
            .resolve(action)
            .map_err(|e| self.unresolved(e))?;
        let deserialized =
            deserialize(request).map_err(|e| self.translate(request, e))?;
        ctx.args.extend(deserialized);

        let handle = self
            .controller
            .resolve(action)
            .map_err(|e| self.unresolved(e))?;
        let args = std::mem::take(&mut ctx.args);
        let result = handle(request, args).map_err(|e| self.translate(request, e))?;
        ctx.result = Some(result);
        Ok(())
    }

    fn serialize(&self, request: &Request, ctx: DispatchContext) -> Response {
        let Some(result) = ctx.result else {
            return HttpError::internal_server_error().into_response();
        };

        let serialize = match self.serializer.resolve(ctx.action.as_deref()) {
            Ok(serialize) => serialize,
            Err(e) => return self.unresolved(e).into_response(),
        };

        let mut response = Response::default();
        match serialize(&mut response, &result) {
            Ok(()) => response,
            Err(SerializeError::Http(e)) => self.translate(request, e).into_response(),
            Err(SerializeError::Unserializable(reason)) => match result {
                ActionResult::Response(raw) => raw,
                ActionResult::Value(_) => {
                    warn!(reason = %reason, action = ?ctx.action, "Action result cannot be rendered");
                    HttpError::internal_server_error().into_response()
                }
            },
        }
    }
}

impl Application for Resource {
    fn call(&self, request: Request) -> Result<Response, HttpError> {
        let Some(route) = request.route_match() else {
            return Err(no_match(request.method()));
        };

        let mut ctx = DispatchContext::from_route(route);
        self.handle(&request, &mut ctx)?;
        Ok(self.serialize(&request, ctx))
    }
}

impl std::fmt::Debug for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resource")
            .field("controller", &self.controller)
            .field("deserializer", &self.deserializer)
            .field("serializer", &self.serializer)
            .field("translator", &self.translator.is_some())
            .finish()
    }
}
