//! Media-type formatter registry.
//!
//! Formatters convert a result object into response content for one of the
//! media types they support. The registry picks a formatter by intersecting
//! the request's accepted media types with each registered formatter's
//! supported set, falling back to the registered default.

use crate::errors::{DispatchError, Result};
use hyper::body::Bytes;
use serde_json::Value;
use std::sync::Arc;

/// Converts result objects into response content for a set of media types.
pub trait MediaTypeFormatter: Send + Sync {
    /// The media types supported by this formatter. Must be non-empty.
    fn supported_media_types(&self) -> &[&'static str];

    fn format(
        &self,
        obj: &Value,
        media_type: &str,
    ) -> std::result::Result<Bytes, Box<dyn std::error::Error + Send + Sync>>;
}

#[derive(Clone, Default)]
pub struct FormatterRegistry {
    entries: Vec<Arc<dyn MediaTypeFormatter>>,
    default: Option<Arc<dyn MediaTypeFormatter>>,
}

impl FormatterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a formatter. If its supported set covers an existing
    /// entry's, the new formatter replaces that entry; otherwise it is
    /// appended.
    pub fn register(&mut self, formatter: Arc<dyn MediaTypeFormatter>, set_as_default: bool) {
        let new_types = supported_set(formatter.as_ref());

        let mut replaced = false;
        for index in (0..self.entries.len()).rev() {
            let existing = supported_set(self.entries[index].as_ref());
            if existing.iter().all(|mt| new_types.contains(mt)) {
                self.entries[index] = formatter.clone();
                replaced = true;
                break;
            }
        }
        if !replaced {
            self.entries.push(formatter.clone());
        }

        if set_as_default {
            self.default = Some(formatter);
        }
    }

    /// Picks the first registered formatter whose supported set intersects
    /// the accepted media types, or the default formatter with its first
    /// supported type.
    pub fn select(&self, accept: Option<&str>) -> Result<(Arc<dyn MediaTypeFormatter>, String)> {
        if let Some(accept) = accept {
            let requested = tokenize(accept);
            if !requested.is_empty() {
                for entry in &self.entries {
                    if let Some(chosen) = entry
                        .supported_media_types()
                        .iter()
                        .find(|mt| requested.contains(&mt.to_ascii_lowercase()))
                    {
                        return Ok((entry.clone(), chosen.to_string()));
                    }
                }
            }
        }

        let default = self
            .default
            .clone()
            .ok_or(DispatchError::FormatUnavailable)?;
        let media_type = default
            .supported_media_types()
            .first()
            .ok_or(DispatchError::FormatUnavailable)?
            .to_string();
        Ok((default, media_type))
    }

    /// Formats a result object for the accepted media types, returning the
    /// content and the chosen media type.
    pub fn respond_as(&self, obj: &Value, accept: Option<&str>) -> Result<(Bytes, String)> {
        let (formatter, media_type) = self.select(accept)?;
        let content = formatter
            .format(obj, &media_type)
            .map_err(|e| DispatchError::FormatFailed(e.to_string()))?;
        Ok((content, media_type))
    }
}

fn supported_set(formatter: &dyn MediaTypeFormatter) -> Vec<String> {
    formatter
        .supported_media_types()
        .iter()
        .map(|mt| mt.to_ascii_lowercase())
        .collect()
}

/// Splits an Accept header into lowercase media types, dropping media-range
/// parameters such as `;q=0.9`.
fn tokenize(media_types: &str) -> Vec<String> {
    media_types
        .split(',')
        .map(|token| {
            token
                .split(';')
                .next()
                .unwrap_or("")
                .trim()
                .to_ascii_lowercase()
        })
        .filter(|token| !token.is_empty())
        .collect()
}
