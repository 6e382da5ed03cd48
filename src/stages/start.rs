use std::future::Future;

use futures::{
    future::{self, BoxFuture},
    stream::BoxStream,
    FutureExt, StreamExt,
};
use tokio::sync::oneshot;

use crate::{
    producer::{EndGuard, Producer},
    IntoPour, Liquid, Pour,
};

/// Source of liquid for a start stage.
///
/// `draw` is called again every time the stage has room in its buffer, until it
/// pours an `End`. Errors do not stop the stage.
pub trait Funnel<T>: Send + 'static {
    fn draw(&mut self) -> BoxFuture<'_, Pour<T>>;
}

/// Adapts an async closure into a [`Funnel`]
pub struct FnFunnel<F>(pub(crate) F);

impl<T, F, Fut> Funnel<T> for FnFunnel<F>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future + Send + 'static,
    Fut::Output: IntoPour<T>,
{
    fn draw(&mut self) -> BoxFuture<'_, Pour<T>> {
        (self.0)().map(|output| output.into_pour()).boxed()
    }
}

pub(crate) struct IterFunnel<I>(pub(crate) I);

impl<T, I> Funnel<T> for IterFunnel<I>
where
    I: Iterator<Item = T> + Send + 'static,
    T: Send + 'static,
{
    fn draw(&mut self) -> BoxFuture<'_, Pour<T>> {
        future::ready(self.0.next().into_pour()).boxed()
    }
}

pub(crate) struct StreamFunnel<T>(pub(crate) BoxStream<'static, T>);

impl<T: Send + 'static> Funnel<T> for StreamFunnel<T> {
    fn draw(&mut self) -> BoxFuture<'_, Pour<T>> {
        self.0.next().map(|output| output.into_pour()).boxed()
    }
}

/// Handle given to a generator for one production step.
///
/// Liquid pushed through the handle is poured once the step ends, either by calling
/// [`Generate::next`] or by dropping the handle. The handle may be moved into another
/// task to finish the step later.
pub struct Generate<T> {
    batch: Vec<Liquid<T>>,
    done: Option<oneshot::Sender<Vec<Liquid<T>>>>,
}

impl<T> Generate<T> {
    pub fn push(&mut self, liquid: impl Into<Liquid<T>>) {
        self.batch.push(liquid.into());
    }

    pub fn push_many(&mut self, batch: impl IntoIterator<Item = Liquid<T>>) {
        self.batch.extend(batch);
    }

    /// End this step and let the stage ask for the next one
    pub fn next(mut self) {
        self.flush();
    }

    fn flush(&mut self) {
        if let Some(done) = self.done.take() {
            let _ = done.send(std::mem::take(&mut self.batch));
        }
    }
}

impl<T> Drop for Generate<T> {
    fn drop(&mut self) {
        self.flush();
    }
}

/// Adapts a callback style generator into a [`Funnel`]
pub(crate) struct GeneratorFunnel<G>(pub(crate) G);

impl<T, G> Funnel<T> for GeneratorFunnel<G>
where
    G: FnMut(Generate<T>) + Send + 'static,
    T: Send + 'static,
{
    fn draw(&mut self) -> BoxFuture<'_, Pour<T>> {
        let (done, batch) = oneshot::channel();

        (self.0)(Generate {
            batch: Vec::new(),
            done: Some(done),
        });

        batch
            .map(|batch| match batch {
                Ok(batch) => Pour::Many(batch),
                Err(_) => Pour::One(Liquid::Nil),
            })
            .boxed()
    }
}

pub(crate) fn spawn<T, F>(output: Producer<T>, mut funnel: F)
where
    T: Send + 'static,
    F: Funnel<T>,
{
    tokio::spawn(async move {
        let output = EndGuard(output);

        loop {
            output.wait_ready().await;

            let pour = funnel.draw().await;
            if output.pour(pour, false).await {
                break;
            }

            tokio::task::yield_now().await;
        }
    });
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        time::Duration,
    };

    use crate::{test_utils::wait_for_len, Liquid, Options, Producer, StageError};

    #[tokio::test]
    async fn start_pauses_on_full_buffer() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let source = Producer::start_with(Options::default().buffer_size_max(3), move || {
            let n = counter.fetch_add(1, Ordering::SeqCst) as i32;
            async move { Liquid::Value(n) }
        })
        .unwrap();

        assert_eq!(wait_for_len(&source).await, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(!source.is_running());

        let follower = source.follow().unwrap();
        assert_eq!(follower.pull(), Some(Liquid::Value(0)));
        assert_eq!(follower.pull(), Some(Liquid::Value(1)));
        assert_eq!(follower.pull(), Some(Liquid::Value(2)));

        // drained below the threshold, production resumed
        assert_eq!(wait_for_len(&source).await, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn start_continues_after_errors() {
        let mut n = 0;
        let source = Producer::start(move || {
            n += 1;
            let i = n;
            async move {
                match i {
                    2 => Err(StageError::msg("second call failed")),
                    5 => Ok(Liquid::End),
                    _ => Ok(Liquid::Value(i)),
                }
            }
        });

        let follower = source.follow().unwrap();
        let mut drawn = Vec::new();
        while let Some(liquid) = follower.draw().await {
            let end = liquid.is_end();
            drawn.push(liquid);
            if end {
                break;
            }
        }

        assert_eq!(drawn.len(), 5);
        assert_eq!(drawn[0], Liquid::Value(1));
        assert!(drawn[1].is_error());
        assert_eq!(drawn[2], Liquid::Value(3));
        assert_eq!(drawn[3], Liquid::Value(4));
        assert!(drawn[4].is_end());
    }

    #[tokio::test]
    async fn one_to_many_end_is_not_doubled() {
        let mut rounds = 0;
        let source = Producer::start(move || {
            rounds += 1;
            let last = rounds == 2;
            async move {
                if last {
                    vec![Liquid::Value(3), Liquid::End]
                } else {
                    vec![Liquid::Value(1), Liquid::Nil, Liquid::Value(2)]
                }
            }
        });

        let values = source.to_array().unwrap().await.unwrap();
        assert_eq!(values, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn large_batch_respects_the_buffer() {
        let mut calls = 0;
        let source = Producer::start_with(Options::default().buffer_size_max(3), move || {
            calls += 1;
            let first = calls == 1;
            async move {
                if first {
                    (0..20).map(Liquid::Value).collect::<Vec<_>>()
                } else {
                    vec![Liquid::End]
                }
            }
        })
        .unwrap();

        assert_eq!(wait_for_len(&source).await, 3);
        assert!(!source.is_running());

        assert_eq!(
            source.to_array().unwrap().await.unwrap(),
            (0..20).collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn generator_steps() {
        let mut round = 0;
        let source = Producer::<i32>::generator(move |mut generate| {
            round += 1;
            match round {
                1 => {
                    generate.push(1);
                    generate.push(2);
                    generate.next();
                }
                2 => {
                    // finish the step from another task
                    tokio::spawn(async move {
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        generate.push(3);
                        generate.next();
                    });
                }
                _ => generate.push(Liquid::End),
            }
        });

        assert_eq!(source.to_array().unwrap().await.unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn from_stream_ends_with_stream() {
        let stream = futures::stream::iter(vec![1, 2, 3]);

        let values = Producer::from_stream(stream).to_array().unwrap().await.unwrap();
        assert_eq!(values, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn from_iter_empty() {
        let values = Producer::from_iter(Vec::<i32>::new())
            .to_array()
            .unwrap()
            .await
            .unwrap();

        assert!(values.is_empty());
    }
}
