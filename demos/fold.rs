use fittings::{Liquid, Pour, Producer, Valve};
use futures::{future::BoxFuture, FutureExt};
use std::future::Future;

/// Emits the accumulated value once, when the upstream ends
pub struct FoldValve<Out, F> {
    acc: Option<Out>,
    fold_fn: F,
}

impl<In, Out, F, Fut> Valve<In, Out> for FoldValve<Out, F>
where
    F: FnMut(In, Out) -> Fut + Send + 'static,
    Fut: Future<Output = Out> + Send,
    In: Send + 'static,
    Out: Send + 'static,
{
    fn flow(&mut self, input: Liquid<In>) -> BoxFuture<'_, Pour<Out>> {
        async move {
            match input {
                Liquid::Value(x) => {
                    if let Some(acc) = self.acc.take() {
                        self.acc = Some((self.fold_fn)(x, acc).await);
                    }
                    Pour::One(Liquid::Nil)
                }
                Liquid::End => match self.acc.take() {
                    Some(acc) => Pour::Many(vec![Liquid::Value(acc), Liquid::End]),
                    None => Pour::One(Liquid::End),
                },
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

    let sum = Producer::from_iter(1..=10)
        .map(|x| async move { x - 1 })?
        .pipe(FoldValve {
            acc: Some(0),
            fold_fn: |x: i32, acc: i32| async move { acc + x },
        })?;

    let total = sum.to_promise()?.await?;
    if let Some(total) = total.value() {
        println!("{total}");
    }

    Ok(())
}
