use futures::{future, future::BoxFuture, FutureExt};

use crate::{stages::middle::Valve, Liquid, Pour};

pub(crate) struct EnumerateValve {
    pub(crate) i: usize,
}

impl<T: Send + 'static> Valve<T, (usize, T)> for EnumerateValve {
    fn flow(&mut self, input: Liquid<T>) -> BoxFuture<'_, Pour<(usize, T)>> {
        let output = match input {
            Liquid::Value(v) => {
                let i = self.i;
                self.i += 1;
                Liquid::Value((i, v))
            }
            other => other.retype(),
        };

        future::ready(Pour::One(output)).boxed()
    }
}

#[cfg(test)]
mod tests {
    use crate::Producer;

    #[tokio::test]
    async fn enumerate_works() {
        let indexed = Producer::from_iter(vec![1, 2, 3]).enumerate().unwrap();

        assert_eq!(
            indexed.to_array().unwrap().await.unwrap(),
            vec![(0, 1), (1, 2), (2, 3)]
        );
    }

    #[tokio::test]
    async fn enumerate_counts_arrivals_after_filtering() {
        let indexed = Producer::from_iter(1..=6)
            .filter(|x| x % 3 == 0)
            .unwrap()
            .enumerate()
            .unwrap();

        assert_eq!(indexed.to_array().unwrap().await.unwrap(), vec![(0, 3), (1, 6)]);
    }
}
