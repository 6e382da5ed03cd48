use std::future::Future;

use futures::{future, future::BoxFuture, FutureExt};

use crate::{stages::middle::Valve, Liquid, Pour};

pub(crate) struct FilterMapValve<F> {
    pub(crate) map_fn: F,
}

impl<In, Out, F, Fut> Valve<In, Out> for FilterMapValve<F>
where
    F: FnMut(In) -> Fut + Send + 'static,
    Fut: Future<Output = Option<Out>> + Send + 'static,
    In: Send + 'static,
    Out: Send + 'static,
{
    fn flow(&mut self, input: Liquid<In>) -> BoxFuture<'_, Pour<Out>> {
        match input {
            Liquid::Value(v) => (self.map_fn)(v)
                .map(|output| match output {
                    Some(output) => Pour::One(Liquid::Value(output)),
                    None => Pour::One(Liquid::Nil),
                })
                .boxed(),
            other => future::ready(Pour::One(other.retype())).boxed(),
        }
    }
}

pub(crate) struct FilterValve<P> {
    pub(crate) predicate: P,
}

impl<T, P> Valve<T, T> for FilterValve<P>
where
    P: FnMut(&T) -> bool + Send + 'static,
    T: Send + 'static,
{
    fn flow(&mut self, input: Liquid<T>) -> BoxFuture<'_, Pour<T>> {
        let output = match input {
            Liquid::Value(v) if !(self.predicate)(&v) => Liquid::Nil,
            other => other,
        };

        future::ready(Pour::One(output)).boxed()
    }
}
