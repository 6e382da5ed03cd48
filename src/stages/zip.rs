use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::join_all;

use crate::{
    producer::{EndGuard, Follower},
    FittingId, FlowError, Liquid, Options, Producer,
};

type Pending<T> = Arc<Mutex<Vec<Option<Follower<T>>>>>;

/// The source list of a running zip.
///
/// A replacement registered for a lane is picked up the moment that lane's current
/// source ends, so a stream can be switched to a new source without restarting the zip.
pub struct Lanes<T> {
    zip: FittingId,
    pending: Pending<T>,
}

impl<T> Lanes<T> {
    pub fn len(&self) -> usize {
        lock(&self.pending).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Queue `source` as the next source of `lane`. A previously queued replacement is
    /// released. A replacement queued after the zip ended stays registered on `source`
    /// until this handle is dropped.
    pub fn replace(&self, lane: usize, source: &Producer<T>) -> Result<(), FlowError> {
        let mut pending = lock(&self.pending);

        let Some(slot) = pending.get_mut(lane) else {
            return Err(FlowError::Config(format!("zip {} has no lane {lane}", self.zip)));
        };

        *slot = Some(source.attach(self.zip)?);
        Ok(())
    }
}

fn lock<T>(pending: &Pending<T>) -> MutexGuard<'_, Vec<Option<Follower<T>>>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

fn take_replacement<T>(pending: &Pending<T>, lane: usize) -> Option<Follower<T>> {
    lock(pending).get_mut(lane).and_then(Option::take)
}

/// Attach to every source and start combining them into `output`
pub(crate) fn spawn<T, U, F>(
    sources: &[Producer<T>],
    options: Option<Options>,
    assemble: F,
) -> Result<(Producer<U>, Lanes<T>), FlowError>
where
    T: Clone + Send + 'static,
    U: Send + 'static,
    F: Fn(Vec<Option<T>>) -> Liquid<U> + Send + 'static,
{
    let options = match options {
        Some(options) => options,
        None => sources
            .first()
            .map(|source| source.options().inherited())
            .unwrap_or_default(),
    };
    options.validate()?;

    let output = Producer::with_options(options);
    let live = sources
        .iter()
        .map(|source| source.attach(output.id()).map(Some))
        .collect::<Result<Vec<_>, _>>()?;

    let pending: Pending<T> = Arc::new(Mutex::new((0..live.len()).map(|_| None).collect()));
    let lanes = Lanes {
        zip: output.id(),
        pending: Arc::clone(&pending),
    };

    tokio::spawn(run(live, pending, output.clone(), assemble));

    Ok((output, lanes))
}

async fn run<T, U, F>(
    mut live: Vec<Option<Follower<T>>>,
    pending: Pending<T>,
    output: Producer<U>,
    assemble: F,
) where
    T: Clone + Send + 'static,
    U: Send + 'static,
    F: Fn(Vec<Option<T>>) -> Liquid<U>,
{
    let output = EndGuard(output);

    loop {
        output.wait_ready().await;

        let mut row = join_all(live.iter().map(|lane| draw_lane(lane.as_ref(), &output))).await;

        for (index, slot) in row.iter_mut().enumerate() {
            while slot.is_none() {
                let Some(replacement) = take_replacement(&pending, index) else {
                    live[index] = None;
                    break;
                };

                live[index] = Some(replacement);
                *slot = draw_lane(live[index].as_ref(), &output).await;
            }
        }

        let liquid = assemble(row);
        let ended = liquid.is_end();
        // forwarded errors may have filled the buffer meanwhile
        output.wait_ready().await;
        output.push(liquid);

        if ended {
            break;
        }

        tokio::task::yield_now().await;
    }

    // release replacements that were never picked up
    for slot in lock(&pending).iter_mut() {
        *slot = None;
    }
}

/// Next value of a lane, or `None` once it ended. Errors are forwarded downstream, once
/// the output has room, and the lane is pulled again.
async fn draw_lane<T: Clone, U>(lane: Option<&Follower<T>>, output: &Producer<U>) -> Option<T> {
    let lane = lane?;

    loop {
        match lane.draw().await? {
            Liquid::Value(v) => return Some(v),
            Liquid::Error(e) => {
                output.wait_ready().await;
                output.push(Liquid::Error(e));
            }
            Liquid::End => return None,
            Liquid::Nil => {}
        }
    }
}

/// One tuple per round, ending with the shortest source
pub(crate) fn shortest<T>(row: Vec<Option<T>>) -> Liquid<Vec<T>> {
    if row.is_empty() {
        return Liquid::End;
    }

    match row.into_iter().collect::<Option<Vec<_>>>() {
        Some(values) => Liquid::Value(values),
        None => Liquid::End,
    }
}

/// One tuple per round, padding ended sources with `End` until every source ended
pub(crate) fn padded<T>(row: Vec<Option<T>>) -> Liquid<Vec<Liquid<T>>> {
    if row.iter().all(Option::is_none) {
        return Liquid::End;
    }

    Liquid::Value(
        row.into_iter()
            .map(|slot| match slot {
                Some(v) => Liquid::Value(v),
                None => Liquid::End,
            })
            .collect(),
    )
}
