use tokio::runtime::{Handle, RuntimeFlavor};

use crate::{stages::middle, valves::backpressure::PassThrough, FlowError, Options, Producer};

/// Register a pass-through branch on `upstream`, switching it to multi-consumer mode.
///
/// Every branch sees every item of the upstream, and the upstream head only advances
/// once all branches pulled it.
pub(crate) fn fork<T>(upstream: &Producer<T>, options: Options) -> Result<Producer<T>, FlowError>
where
    T: Clone + Send + 'static,
{
    options.validate()?;
    current_thread()?;
    upstream.share()?;

    let branch = Producer::with_options(options);
    let input = upstream.attach(branch.id())?;
    middle::spawn(input, branch.clone(), PassThrough);

    Ok(branch)
}

/// Branches start pulling as soon as they are spawned. Only a current thread runtime
/// keeps them idle until the caller yields, which is when the set of branches is final.
fn current_thread() -> Result<(), FlowError> {
    let flavor = Handle::try_current()
        .map_err(|e| FlowError::Config(format!("fork needs a tokio runtime: {e}")))?
        .runtime_flavor();

    if flavor == RuntimeFlavor::CurrentThread {
        Ok(())
    } else {
        Err(FlowError::Config(format!(
            "fork needs a current_thread runtime, found {flavor:?}"
        )))
    }
}

/// Stop tracking `branch` as a follower of `upstream`. The branch ends once it drained
/// what it already pulled.
pub(crate) fn unfork<T, U>(upstream: &Producer<T>, branch: &Producer<U>) -> Result<(), FlowError> {
    if upstream.detach(branch.id()) {
        Ok(())
    } else {
        Err(FlowError::NotFollowing {
            producer: upstream.id(),
            follower: branch.id(),
        })
    }
}
