use std::{
    collections::{BTreeMap, HashSet, VecDeque},
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::{FittingId, FlowError, Liquid, Options, Pour, StageError};

/// A buffered source of liquid, shared by every stage that follows it.
///
/// A `Producer` is a cheap handle: clones refer to the same buffer. It holds an
/// ordered buffer of pending liquid, a running flag driving backpressure, and a
/// registry of followers.
///
/// With a single follower every pull removes the buffer head. Once the producer is
/// forked, the head only advances after every registered follower pulled it, so the
/// slowest follower sets the pace for all of them.
pub struct Producer<T> {
    shared: Arc<Shared<T>>,
}

struct Shared<T> {
    id: FittingId,
    options: Options,
    state: Mutex<State<T>>,
    resume: Notify,
}

struct State<T> {
    buffer: VecDeque<Liquid<T>>,
    running: bool,
    paused: bool,
    ended: bool,
    forked: bool,
    pulled: HashSet<FittingId>,
    followers: BTreeMap<FittingId, Arc<Notify>>,
}

impl<T> State<T> {
    fn wake_followers(&self) {
        for wake in self.followers.values() {
            wake.notify_one();
        }
    }

    fn all_pulled(&self) -> bool {
        !self.followers.is_empty() && self.followers.keys().all(|id| self.pulled.contains(id))
    }
}

/// Outcome of a follower trying to take the next liquid
pub(crate) enum Draw<T> {
    Ready(Liquid<T>),
    Wait,
    Detached,
}

impl<T> Clone for Producer<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> fmt::Debug for Producer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("Producer")
            .field("id", &self.shared.id)
            .field("len", &state.buffer.len())
            .field("running", &state.running)
            .field("paused", &state.paused)
            .field("followers", &state.followers.len())
            .finish()
    }
}

impl<T> Producer<T> {
    /// Create a producer without any self-drive. Liquid enters it only through [`Producer::push`]
    pub fn new(options: Options) -> Result<Self, FlowError> {
        options.validate()?;
        Ok(Self::with_options(options))
    }

    pub(crate) fn with_options(options: Options) -> Self {
        Self {
            shared: Arc::new(Shared {
                id: FittingId::next(),
                options,
                state: Mutex::new(State {
                    buffer: VecDeque::new(),
                    running: true,
                    paused: false,
                    ended: false,
                    forked: false,
                    pulled: HashSet::new(),
                    followers: BTreeMap::new(),
                }),
                resume: Notify::new(),
            }),
        }
    }

    pub fn id(&self) -> FittingId {
        self.shared.id
    }

    /// Effective options, inherited by stages built on top of this producer
    pub fn options(&self) -> Options {
        self.shared.options
    }

    /// Number of buffered, not yet fully consumed items
    pub fn len(&self) -> usize {
        self.lock().buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().buffer.is_empty()
    }

    /// Whether the stage feeding this producer may keep producing
    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    /// Whether a follower is waiting for its siblings to catch up with the current head
    pub fn is_paused(&self) -> bool {
        self.lock().paused
    }

    pub fn is_ended(&self) -> bool {
        self.lock().ended
    }

    pub fn follower_count(&self) -> usize {
        self.lock().followers.len()
    }

    /// Append liquid to the buffer and wake the followers.
    ///
    /// `Nil` is never buffered. Anything pushed after `End` is dropped.
    pub fn push(&self, liquid: Liquid<T>) {
        if liquid.is_nil() {
            return;
        }

        let mut state = self.lock();

        if state.ended {
            warn!(fitting = %self.id(), "dropping liquid pushed after end");
            return;
        }

        state.ended = liquid.is_end();
        state.buffer.push_back(liquid);

        if state.running && self.shared.options.is_full(state.buffer.len()) {
            state.running = false;
            self.trace("full", state.buffer.len());
        }

        if !state.paused {
            state.wake_followers();
        }
    }

    /// Wait until the producer has room for more liquid. Every waiter is woken on resume
    pub(crate) async fn wait_ready(&self) {
        loop {
            let resumed = self.shared.resume.notified();
            let running = self.lock().running;
            if running {
                return;
            }

            resumed.await;
        }
    }

    /// Push every liquid of a step's output, waiting for room before each of them.
    ///
    /// An `End` inside a batch stops the stage and drops the rest of the batch. When
    /// the input of the step was `End` and the output did not end the stream, a
    /// synthetic `End` is appended. Returns whether the stream is now ended.
    pub(crate) async fn pour(&self, pour: Pour<T>, input_ended: bool) -> bool {
        let batch = match pour {
            Pour::One(liquid) => vec![liquid],
            Pour::Many(batch) => batch,
        };

        for liquid in batch {
            if liquid.is_nil() {
                continue;
            }

            self.wait_ready().await;
            if self.fill(liquid) {
                return true;
            }
        }

        if input_ended {
            self.push(Liquid::End);
        }

        input_ended
    }

    fn fill(&self, liquid: Liquid<T>) -> bool {
        let end = liquid.is_end();
        self.push(liquid);
        end
    }

    /// Register a follower. Only one follower is allowed unless the producer was forked
    pub(crate) fn attach(&self, follower: FittingId) -> Result<Follower<T>, FlowError> {
        let mut state = self.lock();

        if state.followers.contains_key(&follower) || (!state.followers.is_empty() && !state.forked)
        {
            return Err(FlowError::AlreadyConsumed(self.id()));
        }

        let wake = Arc::new(Notify::new());
        state.followers.insert(follower, Arc::clone(&wake));
        self.trace("attach", state.followers.len());

        Ok(Follower {
            producer: self.clone(),
            id: follower,
            wake,
        })
    }

    /// Switch to multi-consumer semantics. Fails if an exclusive consumer is already attached
    pub(crate) fn share(&self) -> Result<(), FlowError> {
        let mut state = self.lock();

        if !state.forked && !state.followers.is_empty() {
            return Err(FlowError::AlreadyConsumed(self.id()));
        }

        state.forked = true;
        Ok(())
    }

    /// Remove a follower and recompute the set the head is waiting on
    pub(crate) fn detach(&self, follower: FittingId) -> bool {
        let mut state = self.lock();

        let Some(wake) = state.followers.remove(&follower) else {
            return false;
        };
        state.pulled.remove(&follower);
        wake.notify_one();
        self.trace("detach", state.followers.len());

        if !state.buffer.is_empty() && state.all_pulled() {
            self.advance(&mut state);
        } else {
            state.paused = false;
            if !state.buffer.is_empty() {
                state.wake_followers();
            }
        }

        true
    }

    pub(crate) fn is_following(&self, follower: FittingId) -> bool {
        self.lock().followers.contains_key(&follower)
    }

    fn advance(&self, state: &mut State<T>) -> Option<Liquid<T>> {
        let head = state.buffer.pop_front();
        state.pulled.clear();
        self.drained(state);

        if state.paused {
            state.paused = false;
            self.trace("unpause", state.buffer.len());
        }

        if !state.buffer.is_empty() {
            state.wake_followers();
        }

        head
    }

    fn drained(&self, state: &mut State<T>) {
        if !state.running && self.shared.options.is_drained(state.buffer.len()) {
            state.running = true;
            self.shared.resume.notify_waiters();
            self.trace("resume", state.buffer.len());
        }
    }

    fn trace(&self, event: &'static str, n: usize) {
        if self.shared.options.debug {
            debug!(fitting = %self.id(), n, "{event}");
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Clone> Producer<T> {
    /// Take the next liquid on behalf of `follower`.
    ///
    /// With a single follower the head is removed. With several, the head is handed out
    /// once per follower and only removed when the last of them pulled it. A follower
    /// pulling again before the others caught up gets `None` and pauses the producer.
    /// Unregistered followers always get `None`.
    pub fn pull(&self, follower: FittingId) -> Option<Liquid<T>> {
        match self.draw(follower) {
            Draw::Ready(liquid) => Some(liquid),
            Draw::Wait | Draw::Detached => None,
        }
    }

    pub(crate) fn draw(&self, follower: FittingId) -> Draw<T> {
        let mut state = self.lock();

        if !state.followers.contains_key(&follower) {
            return Draw::Detached;
        }

        if state.followers.len() == 1 {
            return match state.buffer.pop_front() {
                Some(liquid) => {
                    self.drained(&mut state);
                    Draw::Ready(liquid)
                }
                None => Draw::Wait,
            };
        }

        if state.buffer.is_empty() {
            return Draw::Wait;
        }

        if !state.pulled.insert(follower) {
            if !state.paused {
                state.paused = true;
                self.trace("pause", state.buffer.len());
            }
            return Draw::Wait;
        }

        if state.all_pulled() {
            match self.advance(&mut state) {
                Some(head) => Draw::Ready(head),
                None => Draw::Wait,
            }
        } else {
            match state.buffer.front() {
                Some(head) => Draw::Ready(head.clone()),
                None => Draw::Wait,
            }
        }
    }

    /// Register an external consumer. Like any other consumer, it is exclusive unless
    /// the producer was forked
    pub fn follow(&self) -> Result<Follower<T>, FlowError> {
        self.attach(FittingId::next())
    }
}

/// A registered follower of a [`Producer`].
///
/// Dropping the follower unregisters it, so a finished or failed consumer never holds
/// back its siblings.
pub struct Follower<T> {
    producer: Producer<T>,
    id: FittingId,
    wake: Arc<Notify>,
}

impl<T> Follower<T> {
    pub fn id(&self) -> FittingId {
        self.id
    }

    pub fn producer(&self) -> &Producer<T> {
        &self.producer
    }

    pub fn is_attached(&self) -> bool {
        self.producer.is_following(self.id)
    }
}

impl<T: Clone> Follower<T> {
    pub fn pull(&self) -> Option<Liquid<T>> {
        self.producer.pull(self.id)
    }

    /// Wait for the next liquid. Returns `None` once the follower has been unregistered
    pub async fn draw(&self) -> Option<Liquid<T>> {
        loop {
            let woken = self.wake.notified();

            match self.producer.draw(self.id) {
                Draw::Ready(liquid) => return Some(liquid),
                Draw::Detached => return None,
                Draw::Wait => woken.await,
            }
        }
    }
}

impl<T> Drop for Follower<T> {
    fn drop(&mut self) {
        self.producer.detach(self.id);
    }
}

/// Owns the output of a running stage and makes sure it ends, even if the stage panics
pub(crate) struct EndGuard<T>(pub(crate) Producer<T>);

impl<T> std::ops::Deref for EndGuard<T> {
    type Target = Producer<T>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T> Drop for EndGuard<T> {
    fn drop(&mut self) {
        if self.0.is_ended() {
            return;
        }

        if std::thread::panicking() {
            self.0.push(Liquid::Error(StageError::msg(format!(
                "stage {} panicked",
                self.0.id()
            ))));
        }
        self.0.push(Liquid::End);
    }
}
