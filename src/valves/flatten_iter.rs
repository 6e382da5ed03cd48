use std::marker::PhantomData;

use futures::{future, future::BoxFuture, FutureExt};

use crate::{stages::middle::Valve, Liquid, Pour};

/// One-to-many valve, pouring every element of each incoming collection
pub(crate) struct FlattenIterValve<Out>(PhantomData<fn() -> Out>);

impl<Out> FlattenIterValve<Out> {
    pub(crate) fn new() -> Self {
        Self(PhantomData)
    }
}

impl<In, Out> Valve<In, Out> for FlattenIterValve<Out>
where
    In: IntoIterator<Item = Out> + Send + 'static,
    Out: Send + 'static,
{
    fn flow(&mut self, input: Liquid<In>) -> BoxFuture<'_, Pour<Out>> {
        let pour = match input {
            Liquid::Value(items) => Pour::Many(items.into_iter().map(Liquid::Value).collect()),
            other => Pour::One(other.retype()),
        };

        future::ready(pour).boxed()
    }
}

#[cfg(test)]
mod tests {
    use crate::{test_utils::wait_for_len, Liquid, Options, Producer};

    #[tokio::test]
    async fn flatten_iter_works() {
        let source = Producer::new(Options::default()).unwrap();
        let flat = source.flatten_iter().unwrap();

        source.push(Liquid::Value(vec![1, 2, 3]));
        source.push(Liquid::Value(vec![4, 5]));
        source.push(Liquid::Value(vec![]));
        source.push(Liquid::Value(vec![6]));
        source.push(Liquid::End);

        assert_eq!(flat.to_array().unwrap().await.unwrap(), vec![1, 2, 3, 4, 5, 6]);
    }

    #[tokio::test]
    async fn flatten_iter_pours_large_collections() {
        let flat = Producer::from_iter(vec![(0..25).collect::<Vec<_>>()])
            .flatten_iter()
            .unwrap();

        assert_eq!(flat.to_array().unwrap().await.unwrap(), (0..25).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn flatten_iter_fills_only_its_buffer() {
        let batches = vec![(0..25).collect::<Vec<_>>()];
        let source = Producer::from_iter_with(Options::default().buffer_size_max(4), batches).unwrap();
        let flat = source.flatten_iter().unwrap();

        assert_eq!(wait_for_len(&flat).await, 4);
        assert_eq!(flat.to_array().unwrap().await.unwrap(), (0..25).collect::<Vec<_>>());
    }
}
