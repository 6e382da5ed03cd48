use futures::{future, future::BoxFuture, FutureExt};

use crate::{stages::middle::Valve, Liquid, Pour};

/// Identity valve. Used for fork branches and for stages that only add a buffer
pub(crate) struct PassThrough;

impl<T: Send + 'static> Valve<T, T> for PassThrough {
    fn flow(&mut self, input: Liquid<T>) -> BoxFuture<'_, Pour<T>> {
        future::ready(Pour::One(input)).boxed()
    }
}

#[cfg(test)]
mod tests {
    use crate::{test_utils::wait_for_len, FlowError, Liquid, Options, Producer};

    #[tokio::test]
    async fn backpressure_passes_items_through() {
        let source = Producer::new(Options::default()).unwrap();
        let buffered = source.backpressure(3).unwrap();
        let follower = buffered.follow().unwrap();

        source.push(Liquid::Value(1));
        assert_eq!(follower.draw().await, Some(Liquid::Value(1)));

        source.push(Liquid::Value(2));
        assert_eq!(follower.draw().await, Some(Liquid::Value(2)));

        source.push(Liquid::End);
        assert_eq!(follower.draw().await, Some(Liquid::End));
    }

    #[tokio::test]
    async fn backpressure_buffers_up_to_n_items() {
        let source = Producer::from_iter(0..100);
        let buffered = source.backpressure(30).unwrap();

        assert_eq!(buffered.options().buffer_size_max, 30);
        assert_eq!(wait_for_len(&buffered).await, 30);
        assert!(!buffered.is_running());
    }

    #[tokio::test]
    async fn backpressure_of_zero_is_rejected() {
        let source = Producer::from_iter(0..3);
        assert!(matches!(source.backpressure(0), Err(FlowError::Config(_))));
    }
}
