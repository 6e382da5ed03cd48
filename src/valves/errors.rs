use std::future::Future;

use futures::{future, future::BoxFuture, FutureExt};

use crate::{stages::middle::Valve, IntoPour, Liquid, Pour, StageError};

/// Error handling valve. Values and `End` pass through, every error goes to `handler`,
/// which may recover it into a value, drop it with `Nil`, or rethrow it.
pub(crate) struct ErrorsValve<F> {
    pub(crate) handler: F,
}

impl<T, F, Fut> Valve<T, T> for ErrorsValve<F>
where
    F: FnMut(StageError) -> Fut + Send + 'static,
    Fut: Future + Send + 'static,
    Fut::Output: IntoPour<T>,
    T: Send + 'static,
{
    fn flow(&mut self, input: Liquid<T>) -> BoxFuture<'_, Pour<T>> {
        match input {
            Liquid::Error(e) => (self.handler)(e).map(IntoPour::into_pour).boxed(),
            other => future::ready(Pour::One(other)).boxed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    };

    use crate::{FlowError, Liquid, Producer, StageError};

    #[tokio::test]
    async fn recovered_errors_never_reach_the_sink() {
        let mut calls = 0;
        let source = Producer::start(move || {
            calls += 1;
            let n = calls;
            async move {
                match n {
                    2 => Err(StageError::msg("second call")),
                    5 => Ok(Liquid::End),
                    _ => Ok(Liquid::Value(n)),
                }
            }
        });

        let observed = Arc::new(AtomicUsize::new(0));
        let counter = observed.clone();
        let survivors = source
            .errors(move |_e| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Liquid::Nil }
            })
            .unwrap();

        assert_eq!(survivors.to_array().unwrap().await.unwrap(), vec![1, 3, 4]);
        assert_eq!(observed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn errors_may_be_replaced_by_values() {
        let parsed = Producer::from_iter(vec!["1", "x", "3"])
            .valve(|liquid: Liquid<&str>| async move {
                match liquid {
                    Liquid::Value(s) => s.parse::<i32>().map(Liquid::Value),
                    other => Ok(other.map(|_| 0)),
                }
            })
            .unwrap()
            .errors(|_e| async { Liquid::Value(-1) })
            .unwrap();

        assert_eq!(parsed.to_array().unwrap().await.unwrap(), vec![1, -1, 3]);
    }

    #[tokio::test]
    async fn rethrown_errors_stay_unhandled() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();

        let source = Producer::start({
            let mut n = 0;
            move || {
                n += 1;
                let i = n;
                async move {
                    match i {
                        1 => Err(StageError::msg("first")),
                        _ => Ok(Liquid::<i32>::End),
                    }
                }
            }
        });
        let sink = source
            .errors(move |e| {
                log.lock().unwrap().push(e.to_string());
                async move { Liquid::<i32>::Error(StageError::msg(format!("rethrown: {e}"))) }
            })
            .unwrap()
            .to_promise()
            .unwrap();

        match sink.await {
            Err(FlowError::Unhandled { error, .. }) => {
                assert_eq!(error.to_string(), "rethrown: first")
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(*seen.lock().unwrap(), vec!["first".to_string()]);
    }

    #[tokio::test]
    async fn process_error_is_not_inherited() {
        let handled = Producer::from_iter(vec![1])
            .errors(|_e| async { Liquid::<i32>::Nil })
            .unwrap();
        assert!(handled.options().process_error);

        let downstream = handled.map(|x| async move { x }).unwrap();
        assert!(!downstream.options().process_error);
    }
}
