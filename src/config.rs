//! Feed configuration for the updater.
//!
//! The legacy surface accepted exactly two argument shapes: a bare feed URL
//! string, or an options object with a string `url` property. Both survive
//! here as [`InitOptions`] variants, and [`InitOptions::from_value`]
//! reproduces the dynamic dispatch for hosts that pass configuration
//! through as JSON.

use serde::Deserialize;
use serde_json::Value;

use crate::error::{Result, UpdaterError};

pub(crate) const ERR_MISSING_URL: &str =
    "Expected options object to contain a 'url' string property in initialize call";
pub(crate) const ERR_BAD_SHAPE: &str =
    "Expected an options object with a 'url' property to be provided";

/// The two documented `initialize` argument shapes.
#[derive(Debug, Clone)]
pub enum InitOptions {
    /// Legacy form: the string is the feed URL.
    Url(String),
    /// Options form: requires a string `url` (or legacy `updateURL`) field.
    Options(FeedOptions),
}

/// Options-object form of [`InitOptions`]. Unknown fields are tolerated and
/// ignored; `url` wins when both keys are present.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedOptions {
    pub url: Option<String>,
    #[serde(rename = "updateURL")]
    pub update_url: Option<String>,
}

impl InitOptions {
    /// Dispatch a dynamic JSON value the way the legacy API dispatched its
    /// argument: a string is the URL form, an object is the options form,
    /// anything else (null, absent, a number, ...) is a configuration
    /// error.
    pub fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::String(url) => Ok(InitOptions::Url(url.clone())),
            Value::Object(map) => {
                // Non-string url keys are dropped here and rejected with the
                // missing-url error at initialize time, as the old API did.
                let url = map.get("url").and_then(Value::as_str).map(str::to_string);
                let update_url = map
                    .get("updateURL")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                Ok(InitOptions::Options(FeedOptions { url, update_url }))
            }
            _ => Err(UpdaterError::Config(ERR_BAD_SHAPE.to_string())),
        }
    }

    /// The feed URL this shape carries. An empty string is accepted here
    /// and only rejected later, when a check is attempted.
    pub(crate) fn into_feed_url(self) -> Result<String> {
        match self {
            InitOptions::Url(url) => Ok(url),
            InitOptions::Options(options) => options
                .url
                .or(options.update_url)
                .ok_or_else(|| UpdaterError::Config(ERR_MISSING_URL.to_string())),
        }
    }
}

impl From<&str> for InitOptions {
    fn from(url: &str) -> Self {
        InitOptions::Url(url.to_string())
    }
}

impl From<String> for InitOptions {
    fn from(url: String) -> Self {
        InitOptions::Url(url)
    }
}

impl From<FeedOptions> for InitOptions {
    fn from(options: FeedOptions) -> Self {
        InitOptions::Options(options)
    }
}
