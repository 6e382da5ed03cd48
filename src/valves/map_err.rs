use std::future::Future;

use futures::{future, future::BoxFuture, FutureExt};

use crate::{stages::middle::Valve, Liquid, Pour, StageError};

pub(crate) struct MapErrValve<F> {
    pub(crate) map_fn: F,
}

impl<T, F, Fut> Valve<T, T> for MapErrValve<F>
where
    F: FnMut(StageError) -> Fut + Send + 'static,
    Fut: Future + Send + 'static,
    Fut::Output: Into<StageError>,
    T: Send + 'static,
{
    fn flow(&mut self, input: Liquid<T>) -> BoxFuture<'_, Pour<T>> {
        match input {
            Liquid::Error(e) => (self.map_fn)(e)
                .map(|e| Pour::One(Liquid::Error(e.into())))
                .boxed(),
            other => future::ready(Pour::One(other)).boxed(),
        }
    }
}
