use fittings::{Liquid, Pour, Producer, Valve};
use futures::{future::BoxFuture, FutureExt};
use std::future::Future;

/// Emits every intermediate state of a state machine fed by the upstream
pub struct StateValve<Out, F> {
    state: Out,
    transition_fn: F,
}

impl<In, Out, F, Fut> Valve<In, Out> for StateValve<Out, F>
where
    F: FnMut(In, Out) -> Fut + Send + 'static,
    Fut: Future<Output = Out> + Send,
    In: Send + 'static,
    Out: Send + Clone + 'static,
{
    fn flow(&mut self, input: Liquid<In>) -> BoxFuture<'_, Pour<Out>> {
        async move {
            match input {
                Liquid::Value(x) => {
                    let next = (self.transition_fn)(x, self.state.clone()).await;
                    self.state = next.clone();
                    Pour::One(Liquid::Value(next))
                }
                Liquid::End => Pour::One(Liquid::End),
                Liquid::Nil => Pour::One(Liquid::Nil),
                Liquid::Error(e) => Pour::One(Liquid::Error(e)),
            }
        }
        .boxed()
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), fittings::FlowError> {
    tracing_subscriber::fmt::init();

    let maze = "-----------------------";

    let positions = Producer::from_iter(1..=20)
        // Move 1 step to the right if the number is odd
        .map(|x| async move { x % 2 })?
        .pipe(StateValve {
            state: 0,
            // Move forward by the number of steps
            transition_fn: |step: i32, position: i32| async move { step + position },
        })?;

    let sink = positions.spout(move |liquid: Liquid<i32>| async move {
        if let Liquid::Value(position) = liquid {
            // Mark the current position in the maze as "*"
            let row = maze
                .chars()
                .enumerate()
                .map(|(i, c)| if i == position as usize { '*' } else { c })
                .collect::<String>();

            println!("{row}");
        }
    })?;

    sink.await?;
    Ok(())
}
