use std::future::Future;

use futures::{future::BoxFuture, FutureExt, Stream, StreamExt};

use crate::{
    stages::{
        fork,
        middle::{self, FnValve, Valve},
        sink::{Collect, FnSpout, Ignore, Sink, SinkBuilder, Spout, SpoutOutput},
        start::{self, FnFunnel, Funnel, Generate, GeneratorFunnel, IterFunnel, StreamFunnel},
    },
    valves::{
        backpressure::PassThrough,
        batch::BatchValve,
        enumerate::EnumerateValve,
        errors::ErrorsValve,
        filter_map::{FilterMapValve, FilterValve},
        flatten_iter::FlattenIterValve,
        map::MapValve,
        map_err::MapErrValve,
        skip::SkipValve,
        take::TakeValve,
    },
    FlowError, IntoPour, Liquid, Options, Producer, StageError,
};

/// Start stages: producers that drive themselves.
///
/// Each constructor spawns one task that asks its source for more liquid for as long
/// as the producer has room in its buffer.
///
/// # Example
/// ```rust
/// use fittings::{Liquid, Producer};
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let mut n = 0;
/// let countdown = Producer::start(move || {
///     n += 1;
///     let next = if n > 3 { Liquid::End } else { Liquid::Value(4 - n) };
///     async move { next }
/// });
///
/// assert_eq!(countdown.to_array().unwrap().await.unwrap(), vec![3, 2, 1]);
/// # });
/// ```
impl<T> Producer<T>
where
    T: Send + 'static,
{
    /// Drive a producer with an async closure, called every time there is room for more.
    /// The closure may return a [`Liquid`], a batch of liquid, an `Option` (where `None`
    /// ends the stream) or a `Result` of any of those.
    pub fn start<F, Fut>(funnel: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: IntoPour<T>,
    {
        Self::funnel(FnFunnel(funnel))
    }

    pub fn start_with<F, Fut>(options: Options, funnel: F) -> Result<Self, FlowError>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: IntoPour<T>,
    {
        Self::funnel_with(options, FnFunnel(funnel))
    }

    /// Drive a producer with a custom [`Funnel`]
    pub fn funnel(funnel: impl Funnel<T>) -> Self {
        let output = Self::with_options(Options::default());
        start::spawn(output.clone(), funnel);
        output
    }

    pub fn funnel_with(options: Options, funnel: impl Funnel<T>) -> Result<Self, FlowError> {
        options.validate()?;

        let output = Self::with_options(options);
        start::spawn(output.clone(), funnel);
        Ok(output)
    }

    /// Drive a producer with a callback that fills a [`Generate`] handle.
    ///
    /// ```rust
    /// use fittings::{Liquid, Producer};
    ///
    /// # tokio::runtime::Runtime::new().unwrap().block_on(async {
    /// let mut rounds = 0;
    /// let pairs = Producer::<i32>::generator(move |mut generate| {
    ///     rounds += 1;
    ///     if rounds > 2 {
    ///         generate.push(Liquid::End);
    ///     } else {
    ///         generate.push(rounds);
    ///         generate.push(-rounds);
    ///     }
    /// });
    ///
    /// assert_eq!(pairs.to_array().unwrap().await.unwrap(), vec![1, -1, 2, -2]);
    /// # });
    /// ```
    pub fn generator<G>(generator: G) -> Self
    where
        G: FnMut(Generate<T>) + Send + 'static,
    {
        Self::funnel(GeneratorFunnel(generator))
    }

    pub fn generator_with<G>(options: Options, generator: G) -> Result<Self, FlowError>
    where
        G: FnMut(Generate<T>) + Send + 'static,
    {
        Self::funnel_with(options, GeneratorFunnel(generator))
    }

    /// Construct a producer from an [`IntoIterator`]. The stream ends with the iterator
    #[allow(clippy::should_implement_trait)] // Clippy suggests implementing `FromIterator` or choosing a less ambiguous method name
    pub fn from_iter<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
    {
        Self::funnel(IterFunnel(iter.into_iter()))
    }

    pub fn from_iter_with<I>(options: Options, iter: I) -> Result<Self, FlowError>
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
    {
        Self::funnel_with(options, IterFunnel(iter.into_iter()))
    }

    /// Construct a producer from a [futures::stream::Stream](https://docs.rs/futures/latest/futures/stream/index.html)
    pub fn from_stream(stream: impl Stream<Item = T> + Send + 'static) -> Self {
        Self::funnel(StreamFunnel(stream.boxed()))
    }
}

/// Consumers: valves, sinks and forks attached to a producer.
///
/// Unless the producer was forked, it accepts a single consumer. Attaching a second one
/// fails with [`FlowError::AlreadyConsumed`].
///
/// # Example
/// ```rust
/// use fittings::Producer;
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let output = Producer::from_iter(vec![1, 2, 3, 4, 5])
///     .filter_map(|x| async move { (x % 2 == 0).then_some(x) })
///     .unwrap()
///     .map(|x| async move { x * 2 })
///     .unwrap()
///     .backpressure(100)
///     .unwrap()
///     .map(|x| async move { x + 1 })
///     .unwrap();
///
/// assert_eq!(output.to_array().unwrap().await.unwrap(), vec![5, 9]);
/// # });
/// ```
impl<T> Producer<T>
where
    T: Clone + Send + 'static,
{
    /// Attach a middle stage running an async closure over every [`Liquid`] it pulls,
    /// `End` included. Errors bypass the closure unless the stage options set
    /// `process_error`.
    ///
    /// ```rust
    /// use fittings::{Liquid, Producer};
    ///
    /// # tokio::runtime::Runtime::new().unwrap().block_on(async {
    /// let mut sum = 0;
    /// let total = Producer::from_iter(vec![1, 2, 3])
    ///     .valve(move |liquid| {
    ///         let out = match liquid {
    ///             Liquid::Value(x) => {
    ///                 sum += x;
    ///                 Liquid::Nil
    ///             }
    ///             Liquid::End => Liquid::Value(sum),
    ///             other => other,
    ///         };
    ///         async move { out }
    ///     })
    ///     .unwrap();
    ///
    /// assert_eq!(total.to_array().unwrap().await.unwrap(), vec![6]);
    /// # });
    /// ```
    pub fn valve<U, F, Fut>(&self, valve: F) -> Result<Producer<U>, FlowError>
    where
        U: Send + 'static,
        F: FnMut(Liquid<T>) -> Fut + Send + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: IntoPour<U>,
    {
        self.pipe(FnValve(valve))
    }

    pub fn valve_with<U, F, Fut>(&self, options: Options, valve: F) -> Result<Producer<U>, FlowError>
    where
        U: Send + 'static,
        F: FnMut(Liquid<T>) -> Fut + Send + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: IntoPour<U>,
    {
        self.pipe_with(options, FnValve(valve))
    }

    /// Attach a custom [`Valve`]. The stage inherits this producer's options
    pub fn pipe<U: Send + 'static>(&self, valve: impl Valve<T, U>) -> Result<Producer<U>, FlowError> {
        self.pipe_with(self.options().inherited(), valve)
    }

    pub fn pipe_with<U: Send + 'static>(
        &self,
        options: Options,
        valve: impl Valve<T, U>,
    ) -> Result<Producer<U>, FlowError> {
        options.validate()?;

        let output = Producer::with_options(options);
        let input = self.attach(output.id())?;
        middle::spawn(input, output.clone(), valve);

        Ok(output)
    }

    /// Drain this producer into an async closure and start the sink right away
    pub fn spout<F, Fut>(&self, spout: F) -> Result<Sink<T>, FlowError>
    where
        F: FnMut(Liquid<T>) -> Fut + Send + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: SpoutOutput,
    {
        self.sink_fn(spout).spawn()
    }

    /// Prepare a sink around a custom [`Spout`]
    pub fn sink<S: Spout<T>>(&self, spout: S) -> SinkBuilder<T, S> {
        SinkBuilder::new(self.clone(), spout)
    }

    /// Prepare a sink around an async closure, to register `catch` and `done` callbacks
    /// before it starts
    pub fn sink_fn<F, Fut>(&self, spout: F) -> SinkBuilder<T, FnSpout<F>>
    where
        F: FnMut(Liquid<T>) -> Fut + Send + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: SpoutOutput,
    {
        self.sink(FnSpout(spout))
    }

    /// Collect every value. Resolves once the stream ended
    pub fn to_array(&self) -> Result<BoxFuture<'static, Result<Vec<T>, FlowError>>, FlowError> {
        let (collect, items) = Collect::new();
        let sink = self.sink(collect).spawn()?;

        Ok(async move {
            sink.await?;
            Ok::<_, FlowError>(items.await.unwrap_or_default())
        }
        .boxed())
    }

    /// Drain the stream, resolving with its last value
    pub fn to_promise(&self) -> Result<Sink<T>, FlowError> {
        self.sink(Ignore).spawn()
    }

    /// Create a branch that sees every item of this producer.
    ///
    /// All branches are served in lockstep: an item is released only after every branch
    /// pulled it, so the slowest branch sets the pace. Branches registered before the
    /// caller yields see the whole stream.
    ///
    /// Forking needs a `current_thread` runtime, such as `#[tokio::main(flavor =
    /// "current_thread")]` or `#[tokio::test]`. On any other runtime it fails with
    /// [`FlowError::Config`].
    ///
    /// ```rust
    /// use fittings::Producer;
    ///
    /// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
    /// let source = Producer::from_iter(vec![1, 2, 3]);
    /// let doubled = source.fork().unwrap().map(|x| async move { x * 2 }).unwrap();
    /// let squared = source.fork().unwrap().map(|x| async move { x * x }).unwrap();
    ///
    /// let (doubled, squared) = tokio::join!(doubled.to_array().unwrap(), squared.to_array().unwrap());
    /// assert_eq!(doubled.unwrap(), vec![2, 4, 6]);
    /// assert_eq!(squared.unwrap(), vec![1, 4, 9]);
    /// # });
    /// ```
    pub fn fork(&self) -> Result<Producer<T>, FlowError> {
        fork::fork(self, self.options().inherited())
    }

    pub fn fork_with(&self, options: Options) -> Result<Producer<T>, FlowError> {
        fork::fork(self, options)
    }

    /// Stop serving `branch`. The remaining branches no longer wait for it, and the branch
    /// ends once it drained what it already holds
    pub fn unfork<U>(&self, branch: &Producer<U>) -> Result<(), FlowError> {
        fork::unfork(self, branch)
    }

    /// Apply the provided async map function on each value
    ///
    /// # Example
    /// ```rust
    /// use fittings::Producer;
    ///
    /// # tokio::runtime::Runtime::new().unwrap().block_on(async {
    /// let output = Producer::from_iter(vec![1, 2, 3])
    ///     .map(|x| async move { x * 2 })
    ///     .unwrap();
    ///
    /// assert_eq!(output.to_array().unwrap().await.unwrap(), vec![2, 4, 6]);
    /// # });
    /// ```
    pub fn map<U, F, Fut>(&self, map_fn: F) -> Result<Producer<U>, FlowError>
    where
        F: FnMut(T) -> Fut + Send + 'static,
        Fut: Future<Output = U> + Send + 'static,
        U: Send + 'static,
    {
        self.pipe(MapValve { map_fn })
    }

    /// Apply the provided async filter map function on each value. Values mapped to `None`
    /// are removed from the stream.
    pub fn filter_map<U, F, Fut>(&self, map_fn: F) -> Result<Producer<U>, FlowError>
    where
        F: FnMut(T) -> Fut + Send + 'static,
        Fut: Future<Output = Option<U>> + Send + 'static,
        U: Send + 'static,
    {
        self.pipe(FilterMapValve { map_fn })
    }

    /// Keep the values matching `predicate`
    pub fn filter<P>(&self, predicate: P) -> Result<Producer<T>, FlowError>
    where
        P: FnMut(&T) -> bool + Send + 'static,
    {
        self.pipe(FilterValve { predicate })
    }

    /// Take the first `n` values, then end the stream and release this producer
    pub fn take(&self, n: usize) -> Result<Producer<T>, FlowError> {
        self.pipe(TakeValve { remaining: n })
    }

    /// Skip the first `n` values
    pub fn skip(&self, n: usize) -> Result<Producer<T>, FlowError> {
        self.pipe(SkipValve { remaining: n })
    }

    /// Batch values into vectors of `n`. The last batch of a finite stream may be partial.
    ///
    /// ```rust
    /// use fittings::Producer;
    ///
    /// # tokio::runtime::Runtime::new().unwrap().block_on(async {
    /// let output = Producer::from_iter(vec![1, 2, 3, 4, 5]).batch(2).unwrap();
    ///
    /// assert_eq!(
    ///     output.to_array().unwrap().await.unwrap(),
    ///     vec![vec![1, 2], vec![3, 4], vec![5]]
    /// );
    /// # });
    /// ```
    pub fn batch(&self, n: usize) -> Result<Producer<Vec<T>>, FlowError> {
        if n == 0 {
            return Err(FlowError::Config("batch size must be greater than 0".into()));
        }

        self.pipe(BatchValve::new(n))
    }

    /// Pair each value with its index according to the arrival order, starting at 0
    pub fn enumerate(&self) -> Result<Producer<(usize, T)>, FlowError> {
        self.pipe(EnumerateValve { i: 0 })
    }

    /// Handle errors flowing down the stream. `handler` receives each error and returns
    /// its replacement: a value to recover, `Liquid::Nil` to drop it, or an error to
    /// rethrow. Values pass through untouched.
    ///
    /// ```rust
    /// use fittings::{Liquid, Producer, StageError};
    ///
    /// # tokio::runtime::Runtime::new().unwrap().block_on(async {
    /// let mut calls = 0;
    /// let source = Producer::start(move || {
    ///     calls += 1;
    ///     let n = calls;
    ///     async move {
    ///         match n {
    ///             2 => Err(StageError::msg("flaky")),
    ///             5 => Ok(Liquid::End),
    ///             n => Ok(Liquid::Value(n)),
    ///         }
    ///     }
    /// });
    ///
    /// let recovered = source.errors(|_e| async { Liquid::Nil }).unwrap();
    /// assert_eq!(recovered.to_array().unwrap().await.unwrap(), vec![1, 3, 4]);
    /// # });
    /// ```
    pub fn errors<F, Fut>(&self, handler: F) -> Result<Producer<T>, FlowError>
    where
        F: FnMut(StageError) -> Fut + Send + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: IntoPour<T>,
    {
        self.pipe_with(
            self.options().inherited().process_error(true),
            ErrorsValve { handler },
        )
    }

    /// Rewrite every error flowing down the stream
    pub fn map_err<F, Fut>(&self, map_fn: F) -> Result<Producer<T>, FlowError>
    where
        F: FnMut(StageError) -> Fut + Send + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: Into<StageError>,
    {
        self.pipe_with(
            self.options().inherited().process_error(true),
            MapErrValve { map_fn },
        )
    }

    /// Buffer up to `n` items between this producer and the next stage.
    /// When a downstream stage slows down, backpressure lets items accumulate instead of
    /// pausing the upstream right away.
    ///
    /// # Example
    /// ```rust
    /// use fittings::Producer;
    ///
    /// # async fn mostly_fast_fn(x: i32) -> i32 {
    /// #   x
    /// # }
    /// #
    /// # async fn sometimes_slow_fn(x: i32) -> i32 {
    /// #    x
    /// # }
    ///
    /// # tokio::runtime::Runtime::new().unwrap().block_on(async {
    /// let output = Producer::from_iter(vec![1, 2, 3])
    ///     .map(mostly_fast_fn)
    ///     .unwrap()
    ///     // This will allow up to 32 `mostly_fast_fn` results to accumulate while `sometimes_slow_fn` slows down
    ///     .backpressure(32)
    ///     .unwrap()
    ///     .map(sometimes_slow_fn)
    ///     .unwrap();
    /// # });
    /// ```
    pub fn backpressure(&self, n: usize) -> Result<Producer<T>, FlowError> {
        self.pipe_with(self.options().inherited().buffer_size_max(n), PassThrough)
    }
}

impl<T> Producer<T>
where
    T: IntoIterator + Clone + Send + 'static,
    T::Item: Send + 'static,
{
    /// Pour every element of each incoming collection, one by one
    pub fn flatten_iter(&self) -> Result<Producer<T::Item>, FlowError> {
        self.pipe(FlattenIterValve::new())
    }
}
