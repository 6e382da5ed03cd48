use std::future::{Future, IntoFuture};

use futures::{future::BoxFuture, FutureExt};
use tokio::{sync::oneshot, task::JoinHandle};
use tracing::{error, warn};

use crate::{
    producer::{Follower, Producer},
    FittingId, FlowError, Liquid, Options, StageError,
};

/// Side-effecting consumer run by a sink for every value and for the final `End`
pub trait Spout<T>: Send + 'static {
    fn drink(&mut self, input: Liquid<T>) -> BoxFuture<'_, Result<(), StageError>>;
}

/// What a spout closure may return: nothing, or a `Result`
pub trait SpoutOutput {
    fn into_result(self) -> Result<(), StageError>;
}

impl SpoutOutput for () {
    fn into_result(self) -> Result<(), StageError> {
        Ok(())
    }
}

impl<E: Into<StageError>> SpoutOutput for Result<(), E> {
    fn into_result(self) -> Result<(), StageError> {
        self.map_err(Into::into)
    }
}

/// Adapts an async closure over liquid into a [`Spout`]
pub struct FnSpout<F>(pub(crate) F);

impl<T, F, Fut> Spout<T> for FnSpout<F>
where
    F: FnMut(Liquid<T>) -> Fut + Send + 'static,
    Fut: Future + Send + 'static,
    Fut::Output: SpoutOutput,
{
    fn drink(&mut self, input: Liquid<T>) -> BoxFuture<'_, Result<(), StageError>> {
        (self.0)(input).map(SpoutOutput::into_result).boxed()
    }
}

/// Collects every value, handing them over once `End` arrives
pub(crate) struct Collect<T> {
    items: Vec<T>,
    done: Option<oneshot::Sender<Vec<T>>>,
}

impl<T> Collect<T> {
    pub(crate) fn new() -> (Self, oneshot::Receiver<Vec<T>>) {
        let (done, items) = oneshot::channel();
        (
            Self {
                items: Vec::new(),
                done: Some(done),
            },
            items,
        )
    }
}

impl<T: Send + 'static> Spout<T> for Collect<T> {
    fn drink(&mut self, input: Liquid<T>) -> BoxFuture<'_, Result<(), StageError>> {
        match input {
            Liquid::Value(v) => self.items.push(v),
            Liquid::End => {
                if let Some(done) = self.done.take() {
                    let _ = done.send(std::mem::take(&mut self.items));
                }
            }
            Liquid::Nil | Liquid::Error(_) => {}
        }

        futures::future::ready(Ok(())).boxed()
    }
}

pub(crate) struct Ignore;

impl<T: Send + 'static> Spout<T> for Ignore {
    fn drink(&mut self, _input: Liquid<T>) -> BoxFuture<'_, Result<(), StageError>> {
        futures::future::ready(Ok(())).boxed()
    }
}

type Catch = Box<dyn FnMut(StageError) + Send>;
type Done = Box<dyn FnOnce() + Send>;

/// Builder for a terminal stage, returned by [`Producer::sink`]
///
/// ```rust
/// use fittings::{Liquid, Producer};
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let sink = Producer::from_iter(vec![1, 2, 3])
///     .sink_fn(|liquid: Liquid<i32>| async move {
///         if let Liquid::Value(v) = liquid {
///             println!("{v}");
///         }
///     })
///     .catch(|e| eprintln!("failed: {e}"))
///     .done(|| println!("done"))
///     .spawn()
///     .unwrap();
///
/// assert_eq!(sink.await.unwrap(), Liquid::Value(3));
/// # });
/// ```
pub struct SinkBuilder<T, S> {
    upstream: Producer<T>,
    spout: S,
    options: Options,
    catch: Option<Catch>,
    done: Option<Done>,
}

impl<T, S> SinkBuilder<T, S>
where
    T: Clone + Send + 'static,
    S: Spout<T>,
{
    pub(crate) fn new(upstream: Producer<T>, spout: S) -> Self {
        let options = upstream.options().inherited();
        Self {
            upstream,
            spout,
            options,
            catch: None,
            done: None,
        }
    }

    pub fn options(self, options: Options) -> Self {
        Self { options, ..self }
    }

    /// Route failures to `catch` instead of treating them as unhandled
    pub fn catch(self, catch: impl FnMut(StageError) + Send + 'static) -> Self {
        Self {
            catch: Some(Box::new(catch)),
            ..self
        }
    }

    /// Called exactly once, after the spout drank `End`
    pub fn done(self, done: impl FnOnce() + Send + 'static) -> Self {
        Self {
            done: Some(Box::new(done)),
            ..self
        }
    }

    /// Attach to the upstream producer and start draining it
    pub fn spawn(self) -> Result<Sink<T>, FlowError> {
        self.options.validate()?;

        let id = FittingId::next();
        let input = self.upstream.attach(id)?;

        let drain = Drain {
            id,
            spout: self.spout,
            options: self.options,
            catch: self.catch,
            unhandled: None,
        };

        Ok(Sink {
            id,
            handle: tokio::spawn(drain.run(input, self.done)),
        })
    }
}

struct Drain<S> {
    id: FittingId,
    spout: S,
    options: Options,
    catch: Option<Catch>,
    unhandled: Option<StageError>,
}

impl<S> Drain<S> {
    async fn run<T>(mut self, input: Follower<T>, done: Option<Done>) -> Result<Liquid<T>, FlowError>
    where
        T: Clone + Send + 'static,
        S: Spout<T>,
    {
        let mut last = Liquid::Nil;

        while let Some(liquid) = input.draw().await {
            let ended = liquid.is_end();

            let drunk = match liquid {
                Liquid::Value(v) => {
                    last = Liquid::Value(v.clone());
                    self.spout.drink(Liquid::Value(v)).await
                }
                Liquid::End => self.spout.drink(Liquid::End).await,
                Liquid::Error(e) => Err(e),
                Liquid::Nil => Ok(()),
            };

            if let Err(e) = drunk {
                self.fail(e);
            }

            if ended {
                break;
            }

            tokio::task::yield_now().await;
        }

        drop(input);

        if let Some(done) = done {
            done();
        }

        match self.unhandled {
            Some(error) => Err(FlowError::Unhandled {
                fitting: self.id,
                error,
            }),
            None => Ok(last),
        }
    }

    fn fail(&mut self, e: StageError) {
        if let Some(catch) = self.catch.as_mut() {
            catch(e);
        } else if self.options.reject_unhandled {
            error!(fitting = %self.id, error = %e, "unhandled error reached spout");
            if self.unhandled.is_none() {
                self.unhandled = Some(e);
            }
        } else {
            warn!(fitting = %self.id, error = %e, "ignoring unhandled error");
        }
    }
}

/// Handle to a running terminal stage.
///
/// Awaiting it (or [`Sink::to_promise`]) yields the last value the spout saw, or
/// `Liquid::Nil` for an empty stream.
pub struct Sink<T> {
    id: FittingId,
    handle: JoinHandle<Result<Liquid<T>, FlowError>>,
}

impl<T: Send + 'static> Sink<T> {
    pub fn id(&self) -> FittingId {
        self.id
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stop draining. The upstream is released, the sink resolves with `FlowError::Join`
    pub fn abort(&self) {
        self.handle.abort();
    }

    pub async fn to_promise(self) -> Result<Liquid<T>, FlowError> {
        self.handle.await?
    }
}

impl<T: Send + 'static> IntoFuture for Sink<T> {
    type Output = Result<Liquid<T>, FlowError>;
    type IntoFuture = BoxFuture<'static, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        self.to_promise().boxed()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    };

    use crate::{FlowError, Liquid, Options, Producer, StageError};

    #[tokio::test]
    async fn sink_resolves_with_last_value() {
        let sink = Producer::from_iter(vec![1, 2, 3]).to_promise().unwrap();
        assert_eq!(sink.await.unwrap(), Liquid::Value(3));
    }

    #[tokio::test]
    async fn empty_stream_resolves_with_nil() {
        let sink = Producer::from_iter(Vec::<i32>::new()).to_promise().unwrap();
        assert_eq!(sink.await.unwrap(), Liquid::Nil);
    }

    #[tokio::test]
    async fn spout_sees_values_then_end() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();

        let sink = Producer::from_iter(vec![1, 2])
            .spout(move |liquid: Liquid<i32>| {
                log.lock().unwrap().push(liquid);
                async {}
            })
            .unwrap();
        sink.await.unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![Liquid::Value(1), Liquid::Value(2), Liquid::End]
        );
    }

    #[tokio::test]
    async fn errors_go_to_catch_and_done_runs_once() {
        let caught = Arc::new(AtomicUsize::new(0));
        let done = Arc::new(AtomicUsize::new(0));
        let (c, d) = (caught.clone(), done.clone());

        let source = Producer::new(Options::default()).unwrap();
        let sink = source
            .sink_fn(|_liquid: Liquid<i32>| async {})
            .catch(move |_e| {
                c.fetch_add(1, Ordering::SeqCst);
            })
            .done(move || {
                d.fetch_add(1, Ordering::SeqCst);
            })
            .spawn()
            .unwrap();

        source.push(Liquid::Value(1));
        source.push(Liquid::Error(StageError::msg("a")));
        source.push(Liquid::Error(StageError::msg("b")));
        source.push(Liquid::End);

        assert_eq!(sink.await.unwrap(), Liquid::Value(1));
        assert_eq!(caught.load(Ordering::SeqCst), 2);
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unhandled_errors_reject_the_sink_after_draining() {
        let err = StageError::msg("lost");
        let source = Producer::new(Options::default()).unwrap();
        let sink = source.spout(|_liquid: Liquid<i32>| async {}).unwrap();

        source.push(Liquid::Error(err.clone()));
        source.push(Liquid::Value(2));
        source.push(Liquid::End);

        match sink.await {
            Err(FlowError::Unhandled { error, .. }) => assert_eq!(error, err),
            other => panic!("unexpected {other:?}"),
        }
        assert!(source.is_empty());
    }

    #[tokio::test]
    async fn unhandled_errors_can_be_swallowed() {
        let source = Producer::new(Options::default().reject_unhandled(false)).unwrap();
        let sink = source.spout(|_liquid: Liquid<i32>| async {}).unwrap();

        source.push(Liquid::Error(StageError::msg("ignored")));
        source.push(Liquid::Value(5));
        source.push(Liquid::End);

        assert_eq!(sink.await.unwrap(), Liquid::Value(5));
    }

    #[tokio::test]
    async fn failing_spout_is_caught() {
        let caught = Arc::new(Mutex::new(Vec::new()));
        let log = caught.clone();

        let sink = Producer::from_iter(vec![1, 2, 3])
            .sink_fn(|liquid: Liquid<i32>| async move {
                match liquid {
                    Liquid::Value(2) => Err(StageError::msg("cannot drink 2")),
                    _ => Ok(()),
                }
            })
            .catch(move |e| log.lock().unwrap().push(e.to_string()))
            .spawn()
            .unwrap();

        assert_eq!(sink.await.unwrap(), Liquid::Value(3));
        assert_eq!(*caught.lock().unwrap(), vec!["cannot drink 2".to_string()]);
    }

    #[tokio::test]
    #[allow(dependency_on_unit_never_type_fallback)]
    async fn panicking_spout_surfaces_as_join_error() {
        let sink = Producer::from_iter(vec![1])
            .spout(|_liquid: Liquid<i32>| async {
                panic!("spout exploded");
            })
            .unwrap();

        assert!(matches!(sink.await, Err(FlowError::Join(_))));
    }
}
