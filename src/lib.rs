//! Pull-based reactive pipelines for Rust. Every stage owns a buffer, and a full buffer
//! pauses everything upstream of it.
//!
//! This crate offers a demand driven approach to rust async pipelining.
//!
//! Main features:
//!
//! - Stages pull from their upstream only while they have room, so memory use is bounded
//!   by the buffer sizes of the pipeline
//! - Fan-out with [`Producer::fork`]: every branch sees every item, at the pace of the
//!   slowest branch
//!   (on a `current_thread` runtime)
//! - Fan-in with [`zip`] and [`zip_each`]
//! - Errors flow down the pipe as data, and can be recovered anywhere with [`Producer::errors`]
//! - Builds on top of Rust async tools as tasks and [`tokio::sync::Notify`]
//! - For now only supports the Tokio async runtime
//!
//! Example:
//!
//! ```rust
//! use fittings::Producer;
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! # async fn get_json(url: String) -> String { url }
//! # async fn download_heavy_resource(json: String) -> String { json }
//! # async fn run_algorithm(json: String) -> Option<String> { Some(json) }
//! # async fn save_to_db(json: String) -> String { json }
//! # let urls: Vec<String> = Vec::new();
//! let saved = Producer::from_iter(urls)
//!     .map(get_json)
//!     .unwrap()
//!     .backpressure(100)
//!     .unwrap()
//!     .map(download_heavy_resource)
//!     .unwrap()
//!     .filter_map(run_algorithm)
//!     .unwrap()
//!     .map(save_to_db)
//!     .unwrap();
//!
//! for output in saved.to_array().unwrap().await.unwrap() {
//!     println!("{output}");
//! }
//! # });
//! ```
//!
//! ## Liquid
//!
//! Everything flowing through a pipe is a [`Liquid`]: a value, an error, or one of the
//! `End` and `Nil` markers. `End` terminates a stream and reaches every consumer exactly
//! once. `Nil` means a step produced nothing, it is never buffered.
//!
//! ## Producers
//!
//! A [`Producer`] is a buffer of liquid with a running flag and a registry of followers.
//! Stages are producers driven by a spawned task:
//!
//! - start stages pull from a funnel: a closure, an iterator, a stream or a generator
//! - middle stages pull from one upstream producer and run a [`Valve`]
//! - sinks pull from one upstream producer and run a [`Spout`]
//!
//! ```rust
//! use fittings::{Liquid, Producer};
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! // from a closure
//! let mut n = 0;
//! let counter = Producer::start(move || {
//!     n += 1;
//!     async move { (n <= 3).then_some(n) }
//! });
//!
//! // from a stream
//! let stream = futures::stream::iter(vec![1, 2, 3]);
//! let streamed = Producer::from_stream(stream);
//!
//! // from an IntoIterator
//! let iterated = Producer::from_iter(vec![1, 2, 3]);
//!
//! // pushed by hand
//! let manual = Producer::new(Default::default()).unwrap();
//! manual.push(Liquid::Value(1));
//! manual.push(Liquid::End);
//! # assert_eq!(counter.to_array().unwrap().await.unwrap(), vec![1, 2, 3]);
//! # assert_eq!(streamed.to_array().unwrap().await.unwrap(), vec![1, 2, 3]);
//! # assert_eq!(iterated.to_array().unwrap().await.unwrap(), vec![1, 2, 3]);
//! # assert_eq!(manual.to_array().unwrap().await.unwrap(), vec![1]);
//! # });
//! ```
//!
//! ### Backpressure
//!
//! Each stage stops producing once its buffer holds [`Options::buffer_size_max`] items,
//! and resumes once its consumers drained it below [`Options::drain_factor`] of that size.
//! A slow consumer therefore pauses the whole chain behind it instead of letting memory
//! grow. The `.backpressure(n)` operation inserts a stage whose only job is to hold up to
//! `n` items, so a fast upstream keeps working while a slow downstream catches up.
//!
//! ### Error handling
//!
//! A funnel, valve or spout that fails does not stop the pipeline: the failure becomes a
//! [`Liquid::Error`] and flows downstream like any other item. Valves do not see errors
//! unless they opt in with [`Options::process_error`], which is what
//! [`Producer::errors`] does.
//!
//! An error reaching a sink goes to its `catch` callback. Without one, the sink keeps
//! draining to the end and then resolves with [`FlowError::Unhandled`].
//!
//! ```rust
//! use fittings::{FlowError, Producer, StageError};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let sink = Producer::from_iter(vec![1, 2, 3])
//!     .valve(|liquid| async move {
//!         match liquid.value() {
//!             Some(2) => Err(StageError::msg("oh no")),
//!             Some(x) => Ok(Some(x)),
//!             None => Ok(None),
//!         }
//!     })
//!     .unwrap()
//!     .to_promise()
//!     .unwrap();
//!
//! assert!(matches!(sink.await, Err(FlowError::Unhandled { .. })));
//! # });
//! ```
//!
//! ### Panic handling
//! Each stage wraps a spawned task. A panicking stage pushes an error followed by `End`,
//! so its consumers still terminate. A panicking spout surfaces as [`FlowError::Join`].
//!
//! ### Custom Valves
//! Custom valves can be created by implementing the [`Valve`] trait, and using the
//! `.pipe()` method. For example:
//!
//! ```rust
//! use fittings::{Liquid, Pour, Producer, Valve};
//! use futures::{future::BoxFuture, FutureExt};
//!
//! pub struct Duplicate;
//! impl<In> Valve<In, In> for Duplicate
//! where
//!     In: Send + Clone + 'static,
//! {
//!     fn flow(&mut self, input: Liquid<In>) -> BoxFuture<'_, Pour<In>> {
//!         let output = match input {
//!             Liquid::Value(x) => Pour::Many(vec![Liquid::Value(x.clone()), Liquid::Value(x)]),
//!             other => Pour::One(other),
//!         };
//!         futures::future::ready(output).boxed()
//!     }
//! }
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let output = Producer::from_iter(vec![1, 2]).pipe(Duplicate).unwrap();
//!
//! assert_eq!(output.to_array().unwrap().await.unwrap(), vec![1, 1, 2, 2]);
//! # });
//! ```
mod error;
mod fitting;
mod liquid;
mod options;
mod pipeline;
mod producer;
mod stages;
mod valves;

#[cfg(test)]
mod test_utils;

pub use error::{FlowError, StageError};
pub use fitting::FittingId;
pub use liquid::{IntoPour, Liquid, Pour};
pub use options::Options;
pub use producer::{Follower, Producer};
pub use stages::middle::{FnValve, Valve};
pub use stages::sink::{FnSpout, Sink, SinkBuilder, Spout, SpoutOutput};
pub use stages::start::{FnFunnel, Funnel, Generate};
pub use stages::zip::Lanes;

/// Combine several producers into one stream of rows, one value from each source per row.
/// The stream ends with its shortest source.
///
/// ```rust
/// use fittings::{zip, Producer};
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let numbers = Producer::from_iter(vec![1, 2, 3]);
/// let tens = Producer::from_iter(vec![10, 20]);
///
/// let (rows, _lanes) = zip(&[numbers, tens]).unwrap();
/// assert_eq!(rows.to_array().unwrap().await.unwrap(), vec![vec![1, 10], vec![2, 20]]);
/// # });
/// ```
pub fn zip<T>(sources: &[Producer<T>]) -> Result<(Producer<Vec<T>>, Lanes<T>), FlowError>
where
    T: Clone + Send + 'static,
{
    stages::zip::spawn(sources, None, stages::zip::shortest)
}

/// Like [`zip`], but keeps going until every source ended. Sources that ended early are
/// padded with [`Liquid::End`].
pub fn zip_each<T>(
    sources: &[Producer<T>],
) -> Result<(Producer<Vec<Liquid<T>>>, Lanes<T>), FlowError>
where
    T: Clone + Send + 'static,
{
    stages::zip::spawn(sources, None, stages::zip::padded)
}
