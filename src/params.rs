// ABOUTME: Keyword parameter binding for jobs and workflows
// ABOUTME: Checks declared required fields are supplied before deserializing a typed struct

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::engine::error::{EngineError, Result};

/// Keyword arguments supplied at construction.
pub type Kwargs = Map<String, Value>;

/// A parameter struct declaring which keyword names it requires.
///
/// ```
/// use serde::Deserialize;
/// use taskweave::params::Params;
///
/// #[derive(Deserialize)]
/// struct ExportParams {
///     bucket: String,
///     prefix: String,
/// }
///
/// impl Params for ExportParams {
///     const FIELDS: &'static [&'static str] = &["bucket", "prefix"];
/// }
/// ```
pub trait Params: DeserializeOwned {
    const FIELDS: &'static [&'static str];
}

/// Declared fields absent from `kwargs`, in declaration order.
pub fn missing<P: Params>(kwargs: &Kwargs) -> Vec<String> {
    P::FIELDS
        .iter()
        .filter(|field| !kwargs.contains_key(**field))
        .map(|field| field.to_string())
        .collect()
}

/// Validate and bind `kwargs` for `owner`.
///
/// Every missing field is reported in a single error.
pub fn bind<P: Params>(owner: &str, kwargs: &Kwargs) -> Result<P> {
    let missing = missing::<P>(kwargs);
    if !missing.is_empty() {
        return Err(EngineError::MissingParameters {
            owner: owner.to_string(),
            missing,
        });
    }

    serde_json::from_value(Value::Object(kwargs.clone())).map_err(|error| {
        EngineError::InvalidParameters {
            owner: owner.to_string(),
            message: error.to_string(),
        }
    })
}

/// Turn a JSON object into keyword arguments.
pub fn kwargs(owner: &str, value: Value) -> Result<Kwargs> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(EngineError::InvalidParameters {
            owner: owner.to_string(),
            message: format!("expected an object of keyword arguments, got {}", other),
        }),
    }
}
