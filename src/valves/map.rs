use std::future::Future;

use futures::{future, future::BoxFuture, FutureExt};

use crate::{stages::middle::Valve, Liquid, Pour};

pub(crate) struct MapValve<F> {
    pub(crate) map_fn: F,
}

impl<In, Out, F, Fut> Valve<In, Out> for MapValve<F>
where
    F: FnMut(In) -> Fut + Send + 'static,
    Fut: Future<Output = Out> + Send + 'static,
    In: Send + 'static,
    Out: Send + 'static,
{
    fn flow(&mut self, input: Liquid<In>) -> BoxFuture<'_, Pour<Out>> {
        match input {
            Liquid::Value(v) => (self.map_fn)(v)
                .map(|output| Pour::One(Liquid::Value(output)))
                .boxed(),
            other => future::ready(Pour::One(other.retype())).boxed(),
        }
    }
}
