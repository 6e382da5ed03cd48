use futures::{future, future::BoxFuture, FutureExt};

use crate::{stages::middle::Valve, Liquid, Pour};

pub(crate) struct SkipValve {
    pub(crate) remaining: usize,
}

impl<T: Send + 'static> Valve<T, T> for SkipValve {
    fn flow(&mut self, input: Liquid<T>) -> BoxFuture<'_, Pour<T>> {
        let output = match input {
            Liquid::Value(_) if self.remaining > 0 => {
                self.remaining -= 1;
                Liquid::Nil
            }
            other => other,
        };

        future::ready(Pour::One(output)).boxed()
    }
}

#[cfg(test)]
mod tests {
    use crate::Producer;

    #[tokio::test]
    async fn skip_works() {
        let rest = Producer::from_iter(vec![1, 2, 3]).skip(2).unwrap();
        assert_eq!(rest.to_array().unwrap().await.unwrap(), vec![3]);
    }

    #[tokio::test]
    async fn skip_everything() {
        let rest = Producer::from_iter(vec![1, 2, 3]).skip(10).unwrap();
        assert!(rest.to_array().unwrap().await.unwrap().is_empty());
    }
}
