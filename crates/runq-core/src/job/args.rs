use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, RunqError};

/// Positional and keyword arguments stored with a job.
///
/// Arguments are plain JSON so a job can be inspected and snapshotted without
/// knowing the handler's types. They are decoded when the job runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobArgs {
    /// Positional arguments.
    #[serde(default)]
    pub args: Vec<Value>,
    /// Keyword arguments.
    #[serde(default)]
    pub kwargs: Map<String, Value>,
}

impl JobArgs {
    /// Empty argument list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from positional values.
    pub fn positional<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            args: values.into_iter().map(Into::into).collect(),
            kwargs: Map::new(),
        }
    }

    /// Append a positional argument.
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    /// Set a keyword argument.
    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.insert(name.into(), value.into());
        self
    }

    /// Replace all keyword arguments.
    pub fn with_kwargs(mut self, kwargs: Map<String, Value>) -> Self {
        self.kwargs = kwargs;
        self
    }

    /// Encode a typed value as arguments, the inverse of [`decode`](Self::decode).
    ///
    /// Sequences become positional arguments, maps become keyword arguments,
    /// `null` is empty and any other value is a single positional argument.
    pub fn encode<T: Serialize>(value: &T) -> Result<Self> {
        let args = match serde_json::to_value(value)? {
            Value::Null => Self::new(),
            Value::Array(values) => Self {
                args: values,
                kwargs: Map::new(),
            },
            Value::Object(kwargs) => Self {
                args: Vec::new(),
                kwargs,
            },
            other => Self::new().arg(other),
        };
        Ok(args)
    }

    /// Number of positional arguments.
    pub fn len(&self) -> usize {
        self.args.len()
    }

    /// True when there are neither positional nor keyword arguments.
    pub fn is_empty(&self) -> bool {
        self.args.is_empty() && self.kwargs.is_empty()
    }

    /// Decode the positional argument at `index`.
    pub fn get<T: DeserializeOwned>(&self, index: usize) -> Result<T> {
        let value = self.args.get(index).ok_or_else(|| {
            RunqError::InvalidArgument(format!(
                "missing positional argument {} (got {})",
                index,
                self.args.len()
            ))
        })?;
        serde_json::from_value(value.clone()).map_err(|e| {
            RunqError::InvalidArgument(format!("positional argument {}: {}", index, e))
        })
    }

    /// Decode the keyword argument `name`, if present.
    pub fn get_kwarg<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        match self.kwargs.get(name) {
            None => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| RunqError::InvalidArgument(format!("keyword '{}': {}", name, e))),
        }
    }

    /// Decode the whole argument set into one typed value.
    ///
    /// Positional-only arguments decode as a JSON array (so tuples and `Vec`s work),
    /// keyword-only arguments decode as a JSON object (structs). Mixing both has no
    /// single shape; handlers that accept both should use [`get`](Self::get) and
    /// [`get_kwarg`](Self::get_kwarg).
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        let value = match (self.args.is_empty(), self.kwargs.is_empty()) {
            (_, true) => Value::Array(self.args.clone()),
            (true, false) => Value::Object(self.kwargs.clone()),
            (false, false) => {
                return Err(RunqError::InvalidArgument(
                    "cannot decode mixed positional and keyword arguments into one type"
                        .to_string(),
                ))
            }
        };
        serde_json::from_value(value)
            .map_err(|e| RunqError::InvalidArgument(format!("argument mismatch: {}", e)))
    }
}
