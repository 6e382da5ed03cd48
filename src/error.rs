use std::{error::Error as StdError, fmt, sync::Arc};

use crate::FittingId;

/// Errors raised by the engine itself, as opposed to errors flowing through a pipe
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    /// A second exclusive consumer was attached to a producer that was never forked
    #[error("fitting {0} already has a consumer, fork it to attach another")]
    AlreadyConsumed(FittingId),

    /// The given fitting is not registered as a follower of this producer
    #[error("fitting {follower} is not following {producer}")]
    NotFollowing {
        producer: FittingId,
        follower: FittingId,
    },

    /// Invalid stage options
    #[error("invalid stage configuration: {0}")]
    Config(String),

    /// An error liquid reached a spout that had no catch handler
    #[error("unhandled error at spout {fitting}: {error}")]
    Unhandled {
        fitting: FittingId,
        error: StageError,
    },

    /// A stage task panicked or was aborted
    #[error("stage task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// A failure produced by a user supplied funnel, valve or spout.
///
/// `StageError` travels downstream inside [`Liquid::Error`](crate::Liquid), so it
/// is cheap to clone. Any `std::error::Error` converts into it with `?` or
/// `.into()`. Equality is identity: two clones of the same failure are equal,
/// two failures with the same message are not.
#[derive(Clone)]
pub struct StageError(Arc<dyn StdError + Send + Sync + 'static>);

impl StageError {
    /// Build an error out of a plain message
    pub fn msg(message: impl fmt::Display) -> Self {
        Self(Arc::new(Message(message.to_string())))
    }

    pub fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
        &*self.0
    }

    /// Try to view the underlying error as a concrete type
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.0.downcast_ref::<E>()
    }
}

impl<E> From<E> for StageError
where
    E: StdError + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        Self(Arc::new(error))
    }
}

impl fmt::Debug for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl PartialEq for StageError {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

#[derive(Debug)]
struct Message(String);

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl StdError for Message {}
