//! Translation of error messages into the client's language.

use std::collections::HashMap;

use crate::http::error::HttpError;
use crate::http::request::Request;

/// Message catalog lookup.
pub trait Translator: Send + Sync {
    /// Locales this translator can produce, e.g. `["en_US", "fr"]`.
    fn available_languages(&self) -> Vec<String>;

    /// Translate `message` into `locale`, returning it unchanged when no
    /// translation exists.
    fn translate(&self, message: &str, locale: Option<&str>) -> String;
}

/// In-memory catalog keyed by locale, then by original message.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    messages: HashMap<String, HashMap<String, String>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_message(
        mut self,
        locale: impl Into<String>,
        message: impl Into<String>,
        translation: impl Into<String>,
    ) -> Self {
        self.messages
            .entry(locale.into())
            .or_default()
            .insert(message.into(), translation.into());
        self
    }
}

impl Translator for Catalog {
    fn available_languages(&self) -> Vec<String> {
        let mut locales: Vec<String> = self.messages.keys().cloned().collect();
        locales.sort();
        locales
    }

    fn translate(&self, message: &str, locale: Option<&str>) -> String {
        locale
            .and_then(|locale| self.messages.get(locale))
            .and_then(|catalog| catalog.get(message))
            .cloned()
            .unwrap_or_else(|| message.to_string())
    }
}

/// Translate the explanation and detail of `err` into the request's
/// best-matching language. Without a translator the error passes through.
pub fn translate_exception(
    request: &Request,
    translator: Option<&dyn Translator>,
    mut err: HttpError,
) -> HttpError {
    let Some(translator) = translator else {
        return err;
    };

    let locale = request.best_match_language(&translator.available_languages());
    let explanation = translator.translate(err.explanation(), locale.as_deref());
    let detail = err
        .detail()
        .map(|detail| translator.translate(detail, locale.as_deref()));

    err.set_explanation(explanation);
    err.set_detail(detail);
    err
}
