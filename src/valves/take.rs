use futures::{future, future::BoxFuture, FutureExt};

use crate::{stages::middle::Valve, Liquid, Pour};

/// Ends the stream after `remaining` values
pub(crate) struct TakeValve {
    pub(crate) remaining: usize,
}

impl<T: Send + 'static> Valve<T, T> for TakeValve {
    fn flow(&mut self, input: Liquid<T>) -> BoxFuture<'_, Pour<T>> {
        let pour = match input {
            Liquid::Value(_) if self.remaining == 0 => Pour::One(Liquid::End),
            Liquid::Value(v) => {
                self.remaining -= 1;
                if self.remaining == 0 {
                    Pour::Many(vec![Liquid::Value(v), Liquid::End])
                } else {
                    Pour::One(Liquid::Value(v))
                }
            }
            other => Pour::One(other),
        };

        future::ready(pour).boxed()
    }
}
