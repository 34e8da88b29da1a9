// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use futures::future::BoxFuture;
use futures::{FutureExt, Stream, StreamExt};
use serde::Serialize;
use serde_json::Value;

use crate::error::TaskError;

/// Result of advancing a [`Producer`] by one step.
#[derive(Debug)]
pub enum Step {
    Value(Value),
    /// Nothing ready yet, ask again next round.
    Pending,
    Exhausted,
    /// Ends the stream.
    Error(TaskError),
}

/// A lazily advanced sequence of values, driven by a streaming worker loop.
pub trait Producer: Send {
    fn advance_one(&mut self) -> Step;
}

/// Producer over a plain iterator.
pub struct IterProducer<I> {
    iter: I,
}

impl<I> IterProducer<I> {
    pub fn new(iter: I) -> Self {
        Self { iter }
    }
}

impl<I> Producer for IterProducer<I>
where
    I: Iterator<Item = Value> + Send,
{
    fn advance_one(&mut self) -> Step {
        match self.iter.next() {
            Some(value) => Step::Value(value),
            None => Step::Exhausted,
        }
    }
}

/// Producer over an iterator of results; the first error ends the stream.
pub struct TryIterProducer<I> {
    iter: I,
}

impl<I> TryIterProducer<I> {
    pub fn new(iter: I) -> Self {
        Self { iter }
    }
}

impl<I> Producer for TryIterProducer<I>
where
    I: Iterator<Item = anyhow::Result<Value>> + Send,
{
    fn advance_one(&mut self) -> Step {
        match self.iter.next() {
            Some(Ok(value)) => Step::Value(value),
            Some(Err(err)) => Step::Error(TaskError::Stream(format!("{err:#}"))),
            None => Step::Exhausted,
        }
    }
}

/// Producer over an async stream. Each step polls once and never blocks.
pub struct StreamProducer<S> {
    stream: S,
}

impl<S> StreamProducer<S> {
    pub fn new(stream: S) -> Self {
        Self { stream }
    }
}

impl<S> Producer for StreamProducer<S>
where
    S: Stream<Item = Value> + Unpin + Send,
{
    fn advance_one(&mut self) -> Step {
        match self.stream.next().now_or_never() {
            None => Step::Pending,
            Some(None) => Step::Exhausted,
            Some(Some(value)) => Step::Value(value),
        }
    }
}

/// What a task body hands back to the worker loop.
pub enum Outcome {
    Value(Value),
    /// Only advanced by a streaming loop; a plain loop reports `NotStreaming`.
    Stream(Box<dyn Producer>),
    /// Awaited on the worker before the result is emitted.
    Deferred(BoxFuture<'static, anyhow::Result<Value>>),
}

impl Outcome {
    pub fn none() -> Self {
        Outcome::Value(Value::Null)
    }

    pub fn value(value: impl Into<Value>) -> Self {
        Outcome::Value(value.into())
    }

    pub fn json<T: Serialize>(value: &T) -> anyhow::Result<Self> {
        Ok(Outcome::Value(serde_json::to_value(value)?))
    }

    pub fn iter<I>(iter: I) -> Self
    where
        I: IntoIterator,
        I::IntoIter: Send + 'static,
        I::Item: Into<Value> + 'static,
    {
        let values = iter.into_iter().map(|item| -> Value { item.into() });
        Outcome::Stream(Box::new(IterProducer::new(values)))
    }

    pub fn try_iter<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = anyhow::Result<Value>>,
        I::IntoIter: Send + 'static,
    {
        Outcome::Stream(Box::new(TryIterProducer::new(iter.into_iter())))
    }

    pub fn stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Value> + Send + 'static,
    {
        let stream: Pin<Box<dyn Stream<Item = Value> + Send>> = Box::pin(stream);
        Outcome::Stream(Box::new(StreamProducer::new(stream)))
    }

    pub fn producer(producer: impl Producer + 'static) -> Self {
        Outcome::Stream(Box::new(producer))
    }

    pub fn deferred<F>(future: F) -> Self
    where
        F: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Outcome::Deferred(future.boxed())
    }

    pub fn is_stream(&self) -> bool {
        matches!(self, Outcome::Stream(_))
    }
}

impl From<Value> for Outcome {
    fn from(value: Value) -> Self {
        Outcome::Value(value)
    }
}

impl fmt::Debug for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Outcome::Stream(_) => f.write_str("Stream(..)"),
            Outcome::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}
