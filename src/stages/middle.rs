use std::future::Future;

use futures::{future::BoxFuture, FutureExt};
use tracing::debug;

use crate::{
    producer::{EndGuard, Follower, Producer},
    IntoPour, Liquid, Pour,
};

/// Transformation applied by a middle stage to every item it pulls.
///
/// The valve sees `End` too, so it can emit a final value before the stream
/// terminates. It only sees error liquid when the stage was built with
/// `process_error`; otherwise errors pass by untouched.
pub trait Valve<In, Out>: Send + 'static {
    fn flow(&mut self, input: Liquid<In>) -> BoxFuture<'_, Pour<Out>>;
}

/// Adapts an async closure over liquid into a [`Valve`]
pub struct FnValve<F>(pub(crate) F);

impl<In, Out, F, Fut> Valve<In, Out> for FnValve<F>
where
    F: FnMut(Liquid<In>) -> Fut + Send + 'static,
    Fut: Future + Send + 'static,
    Fut::Output: IntoPour<Out>,
{
    fn flow(&mut self, input: Liquid<In>) -> BoxFuture<'_, Pour<Out>> {
        (self.0)(input).map(|output| output.into_pour()).boxed()
    }
}

pub(crate) fn spawn<In, Out, V>(
    input: Follower<In>,
    output: Producer<Out>,
    mut valve: V,
)
where
    In: Clone + Send + 'static,
    Out: Send + 'static,
    V: Valve<In, Out>,
{
    tokio::spawn(async move {
        let output = EndGuard(output);
        let process_error = output.options().process_error;

        loop {
            output.wait_ready().await;

            let Some(liquid) = input.draw().await else {
                // unforked from upstream
                output.push(Liquid::End);
                break;
            };

            let input_ended = liquid.is_end();
            let pour = match liquid {
                Liquid::Error(e) if !process_error => Pour::One(Liquid::Error(e)),
                liquid => valve.flow(liquid).await,
            };

            if output.pour(pour, input_ended).await {
                if !input_ended {
                    debug!(
                        fitting = %output.id(),
                        upstream = %input.producer().id(),
                        "valve ended before its upstream"
                    );
                }
                break;
            }

            tokio::task::yield_now().await;
        }

        // unregister, the upstream stops waiting for this stage
        drop(input);
    });
}

#[cfg(test)]
mod tests {
    use crate::{test_utils::wait_for_len, FlowError, Liquid, Options, Producer, StageError};

    #[tokio::test]
    async fn valve_sees_end_and_may_emit_a_final_value() {
        let source = Producer::from_iter(vec![1, 2, 3]);

        let mut sum = 0;
        let totals = source
            .valve(move |liquid| {
                let out = match liquid {
                    Liquid::Value(v) => {
                        sum += v;
                        Liquid::Nil
                    }
                    Liquid::End => Liquid::Value(sum),
                    other => other,
                };
                async move { out }
            })
            .unwrap();

        assert_eq!(totals.to_array().unwrap().await.unwrap(), vec![6]);
    }

    #[tokio::test]
    async fn errors_bypass_plain_valves() {
        let source = Producer::new(Options::default()).unwrap();
        let err = StageError::msg("boom");

        let seen = source
            .valve(|liquid: Liquid<i32>| async move {
                match liquid {
                    Liquid::Value(v) => Liquid::Value(v * 10),
                    other => other,
                }
            })
            .unwrap();
        let follower = seen.follow().unwrap();

        source.push(Liquid::Value(1));
        source.push(Liquid::Error(err.clone()));
        source.push(Liquid::Value(2));
        source.push(Liquid::End);

        assert_eq!(follower.draw().await, Some(Liquid::Value(10)));
        assert_eq!(follower.draw().await, Some(Liquid::Error(err)));
        assert_eq!(follower.draw().await, Some(Liquid::Value(20)));
        assert_eq!(follower.draw().await, Some(Liquid::End));
    }

    #[tokio::test]
    async fn failed_valve_pushes_error_and_keeps_going() {
        let source = Producer::from_iter(vec![1, 2, 3]);

        let out = source
            .valve(|liquid: Liquid<i32>| async move {
                match liquid {
                    Liquid::Value(2) => Err(StageError::msg("two")),
                    other => Ok(other),
                }
            })
            .unwrap();
        let follower = out.follow().unwrap();

        assert_eq!(follower.draw().await, Some(Liquid::Value(1)));
        assert!(follower.draw().await.unwrap().is_error());
        assert_eq!(follower.draw().await, Some(Liquid::Value(3)));
        assert_eq!(follower.draw().await, Some(Liquid::End));
    }

    #[tokio::test]
    async fn swallowed_end_is_restored() {
        let out = Producer::from_iter(vec![1])
            .valve(|_liquid: Liquid<i32>| async move { Liquid::<i32>::Nil })
            .unwrap();

        assert_eq!(out.to_array().unwrap().await.unwrap(), Vec::<i32>::new());
    }

    #[tokio::test]
    async fn valve_stops_pulling_when_its_buffer_is_full() {
        let source = Producer::from_iter(0..100);
        let out = source
            .valve_with(
                Options::default().buffer_size_max(2),
                |liquid: Liquid<i32>| async move { liquid },
            )
            .unwrap();

        assert_eq!(wait_for_len(&out).await, 2);
        // the source filled its own buffer and paused as well
        assert_eq!(source.len(), 10);
        assert!(!source.is_running());
    }

    #[tokio::test]
    async fn second_valve_without_fork_is_rejected() {
        let source = Producer::from_iter(vec![1, 2, 3]);
        let _first = source.valve(|l: Liquid<i32>| async move { l }).unwrap();

        let second = source.valve(|l: Liquid<i32>| async move { l });
        assert!(matches!(second, Err(FlowError::AlreadyConsumed(_))));
    }

    #[tokio::test]
    async fn panicking_valve_still_ends_the_stream() {
        let out = Producer::from_iter(vec![1, 2])
            .valve(|liquid: Liquid<i32>| async move {
                if liquid == Liquid::Value(2) {
                    panic!("valve exploded");
                }
                liquid
            })
            .unwrap();
        let follower = out.follow().unwrap();

        assert_eq!(follower.draw().await, Some(Liquid::Value(1)));
        assert!(follower.draw().await.unwrap().is_error());
        assert_eq!(follower.draw().await, Some(Liquid::End));
    }
}
