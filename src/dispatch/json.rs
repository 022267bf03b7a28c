//! JSON request deserialization and response serialization.

use axum::http::header::{HeaderValue, CONTENT_TYPE};
use serde_json::Value;

use crate::dispatch::actions::{
    ActionArgs, ActionResult, Deserializer, SerializeError, Serializer, DEFAULT_ACTION,
};
use crate::http::error::HttpError;
use crate::http::request::Request;
use crate::http::response::Response;

const VALID_TRANSFER_ENCODINGS: [&str; 5] = ["chunked", "compress", "deflate", "gzip", "identity"];

/// Reads the request body as JSON into a `body` argument.
#[derive(Debug, Clone, Copy)]
pub struct JsonRequestDeserializer;

impl JsonRequestDeserializer {
    /// Whether the request carries an entity body.
    pub fn has_body(&self, request: &Request) -> bool {
        let valid_encoding = request
            .transfer_encoding()
            .is_some_and(|te| VALID_TRANSFER_ENCODINGS.contains(&te.as_str()));

        valid_encoding || request.content_length().is_some_and(|len| len > 0)
    }

    pub fn from_json(&self, data: &[u8]) -> Result<Value, HttpError> {
        serde_json::from_slice(data).map_err(|e| {
            tracing::debug!(error = %e, "Rejecting request body");
            HttpError::bad_request("Malformed JSON in request body.")
        })
    }

    pub fn default(&self, request: &Request) -> Result<ActionArgs, HttpError> {
        let mut args = ActionArgs::new();
        if self.has_body(request) {
            args.insert("body".to_string(), self.from_json(request.body())?);
        }
        Ok(args)
    }

    /// Action table using [`Self::default`] for every action.
    pub fn actions(self) -> Deserializer {
        Deserializer::new().on(DEFAULT_ACTION, move |request| self.default(request))
    }
}

/// Renders a value result as an `application/json` body.
#[derive(Debug, Clone, Copy)]
pub struct JsonResponseSerializer;

impl JsonResponseSerializer {
    pub fn to_json(&self, data: &Value) -> Result<Vec<u8>, SerializeError> {
        serde_json::to_vec(data).map_err(|e| SerializeError::Unserializable(e.to_string()))
    }

    pub fn default(&self, response: &mut Response, result: &ActionResult) -> Result<(), SerializeError> {
        let ActionResult::Value(value) = result else {
            return Err(SerializeError::Unserializable(
                "a complete response is not JSON data".to_string(),
            ));
        };

        *response.body_mut() = self.to_json(value)?.into();
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(())
    }

    /// Action table using [`Self::default`] for every action.
    pub fn actions(self) -> Serializer {
        Serializer::new().on(DEFAULT_ACTION, move |response, result| {
            self.default(response, result)
        })
    }
}
