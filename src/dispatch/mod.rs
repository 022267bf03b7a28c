//! Dispatch pipeline: deserialize → handle → serialize.
//!
//! # Design Decisions
//! - Action tables are built once when the application is wired up; lookup
//!   by name falls back to a `default` entry
//! - Every HTTP-level failure leaves the pipeline as an [`HttpError`]
//!   translated for the client

pub mod actions;
pub mod json;
pub mod resource;

pub use actions::{
    ActionArgs, ActionResult, Actions, Controller, Deserializer, DispatchError, SerializeError,
    Serializer, DEFAULT_ACTION,
};
pub use json::{JsonRequestDeserializer, JsonResponseSerializer};
pub use resource::{DispatchContext, Resource};
