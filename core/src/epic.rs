//! Epics: the asynchronous half of an action.
//!
//! An epic receives the current state and the call arguments and produces
//! the action's update in one of three shapes:
//!
//! - [`Epic::Ready`]: a value (or error) that is already known
//! - [`Epic::Future`]: resolved when the future settles
//! - [`Epic::Stream`]: only the first emission counts; later items are ignored
//!
//! [`Epic::settle`] normalizes all three into a single result.

use crate::error::ResourceError;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::{Future, Stream, StreamExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Errors decoding call arguments.
#[derive(Error, Debug)]
pub enum ArgsError {
    /// No argument at the requested position.
    #[error("missing argument at position {0}")]
    Missing(usize),

    /// The argument did not deserialize into the requested type.
    #[error("invalid argument at position {index}: {source}")]
    Invalid {
        /// Position of the argument
        index: usize,
        /// Decoding error
        #[source]
        source: serde_json::Error,
    },
}

/// Positional arguments passed to an action call.
///
/// Arguments are stored as JSON values so that one resource can expose
/// actions with different signatures. Build them with the [`args!`](crate::args)
/// macro and decode them inside the epic with [`Args::get`].
///
/// # Example
///
/// ```
/// use composable_resource_core::args;
///
/// let args = args![5, "label"];
/// assert_eq!(args.get::<i64>(0).ok(), Some(5));
/// assert_eq!(args.get::<String>(1).ok(), Some("label".to_string()));
/// assert!(args.get::<i64>(2).is_err());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Args(Vec<Value>);

impl Args {
    /// No arguments.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Number of arguments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no arguments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Raw argument at `index`.
    #[must_use]
    pub fn value(&self, index: usize) -> Option<&Value> {
        self.0.get(index)
    }

    /// Decode the argument at `index`.
    ///
    /// # Errors
    ///
    /// [`ArgsError::Missing`] when there is no such argument,
    /// [`ArgsError::Invalid`] when it does not decode as `T`.
    pub fn get<T: DeserializeOwned>(&self, index: usize) -> Result<T, ArgsError> {
        let value = self.0.get(index).ok_or(ArgsError::Missing(index))?;
        T::deserialize(value).map_err(|source| ArgsError::Invalid { index, source })
    }

    /// Iterate over the raw arguments.
    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.0.iter()
    }

    /// Consume into the raw argument list.
    #[must_use]
    pub fn into_inner(self) -> Vec<Value> {
        self.0
    }
}

impl From<Vec<Value>> for Args {
    fn from(values: Vec<Value>) -> Self {
        Self(values)
    }
}

impl FromIterator<Value> for Args {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Args {
    type Item = &'a Value;
    type IntoIter = std::slice::Iter<'a, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Build [`Args`] from a list of JSON-convertible expressions.
///
/// ```
/// use composable_resource_core::args;
/// use serde_json::json;
///
/// assert!(args![].is_empty());
/// assert_eq!(args![-2, json!({"a": true})].len(), 2);
/// ```
#[macro_export]
macro_rules! args {
    () => {
        $crate::epic::Args::new()
    };
    ($($arg:expr),+ $(,)?) => {
        $crate::epic::Args::from(vec![$($crate::serde_json::json!($arg)),+])
    };
}

/// Output of an epic, before normalization.
pub enum Epic<D> {
    /// Already-known result.
    Ready(anyhow::Result<D>),
    /// Result delivered when the future settles.
    Future(BoxFuture<'static, anyhow::Result<D>>),
    /// First emission of the stream is the result.
    Stream(BoxStream<'static, anyhow::Result<D>>),
}

impl<D: Send + 'static> Epic<D> {
    /// Successful immediate result.
    pub const fn value(data: D) -> Self {
        Self::Ready(Ok(data))
    }

    /// Failed immediate result.
    pub fn fail(error: impl Into<anyhow::Error>) -> Self {
        Self::Ready(Err(error.into()))
    }

    /// Result of a future.
    pub fn future<F>(future: F) -> Self
    where
        F: Future<Output = anyhow::Result<D>> + Send + 'static,
    {
        Self::Future(Box::pin(future))
    }

    /// First emission of a stream.
    pub fn stream<St>(stream: St) -> Self
    where
        St: Stream<Item = anyhow::Result<D>> + Send + 'static,
    {
        Self::Stream(Box::pin(stream))
    }

    /// Short name of the shape, for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Ready(_) => "ready",
            Self::Future(_) => "future",
            Self::Stream(_) => "stream",
        }
    }

    /// Wait for the epic's result.
    ///
    /// A stream is polled for its first item only and then dropped.
    ///
    /// # Errors
    ///
    /// [`ResourceError::Epic`] with the epic's own error, or
    /// [`ResourceError::NoEmission`] when a stream ends without an item.
    pub async fn settle(self, action: &str) -> Result<D, ResourceError> {
        match self {
            Self::Ready(result) => result.map_err(ResourceError::Epic),
            Self::Future(future) => future.await.map_err(ResourceError::Epic),
            Self::Stream(mut stream) => match stream.next().await {
                Some(result) => result.map_err(ResourceError::Epic),
                None => Err(ResourceError::NoEmission {
                    action: action.to_string(),
                }),
            },
        }
    }
}

impl<D> From<anyhow::Result<D>> for Epic<D> {
    fn from(result: anyhow::Result<D>) -> Self {
        Self::Ready(result)
    }
}

impl<D: fmt::Debug> fmt::Debug for Epic<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready(result) => f.debug_tuple("Epic::Ready").field(result).finish(),
            Self::Future(_) => write!(f, "Epic::Future(<future>)"),
            Self::Stream(_) => write!(f, "Epic::Stream(<stream>)"),
        }
    }
}
