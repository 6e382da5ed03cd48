use futures::{future, future::BoxFuture, FutureExt};

use crate::{stages::middle::Valve, Liquid, Pour};

pub(crate) struct BatchValve<T> {
    pub(crate) n: usize,
    pub(crate) batch: Vec<T>,
}

impl<T> BatchValve<T> {
    pub(crate) fn new(n: usize) -> Self {
        Self {
            n,
            batch: Vec::with_capacity(n),
        }
    }
}

impl<T: Send + 'static> Valve<T, Vec<T>> for BatchValve<T> {
    fn flow(&mut self, input: Liquid<T>) -> BoxFuture<'_, Pour<Vec<T>>> {
        let pour = match input {
            Liquid::Value(v) => {
                self.batch.push(v);
                if self.batch.len() == self.n {
                    let batch = std::mem::replace(&mut self.batch, Vec::with_capacity(self.n));
                    Pour::One(Liquid::Value(batch))
                } else {
                    Pour::One(Liquid::Nil)
                }
            }
            // flush the partial batch before ending
            Liquid::End if !self.batch.is_empty() => Pour::Many(vec![
                Liquid::Value(std::mem::take(&mut self.batch)),
                Liquid::End,
            ]),
            other => Pour::One(other.retype()),
        };

        future::ready(pour).boxed()
    }
}
