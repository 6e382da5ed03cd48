use crate::FlowError;

/// Controls buffering and error characteristics of a stage
///
/// There is no one-to-many switch: a funnel or valve pours several items by returning
/// a `Vec<Liquid<T>>` or a [`Pour::Many`](crate::Pour::Many).
///
/// Example:
///
/// ```rust
/// use fittings::Options;
///
/// // buffer up to 100 items, resume production once less than 25 are left
/// let options = Options::default().buffer_size_max(100).drain_factor(0.25);
/// assert!(options.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Options {
    /// How many items a stage may hold before it stops producing.
    /// Production pauses as soon as the buffer reaches this size
    pub buffer_size_max: usize,
    /// Occupancy fraction under which a paused stage resumes production.
    /// An empty buffer always resumes production
    pub drain_factor: f64,
    /// Log every push, pull and resume of the stage at debug level
    pub debug: bool,
    /// Whether an error reaching a spout without a catch handler fails the spout.
    /// When false the error is logged and swallowed
    pub reject_unhandled: bool,
    /// Whether a valve receives error liquid instead of letting it pass through untouched
    pub process_error: bool,
}

impl Options {
    pub fn buffer_size_max(self, buffer_size_max: usize) -> Self {
        Self {
            buffer_size_max,
            ..self
        }
    }

    pub fn drain_factor(self, drain_factor: f64) -> Self {
        Self {
            drain_factor,
            ..self
        }
    }

    pub fn debug(self, debug: bool) -> Self {
        Self { debug, ..self }
    }

    pub fn reject_unhandled(self, reject_unhandled: bool) -> Self {
        Self {
            reject_unhandled,
            ..self
        }
    }

    pub fn process_error(self, process_error: bool) -> Self {
        Self {
            process_error,
            ..self
        }
    }

    pub fn validate(&self) -> Result<(), FlowError> {
        if self.buffer_size_max == 0 {
            return Err(FlowError::Config(
                "buffer_size_max must be greater than 0".into(),
            ));
        }

        if !(0.0..=1.0).contains(&self.drain_factor) {
            return Err(FlowError::Config(format!(
                "drain_factor must be within [0, 1], got {}",
                self.drain_factor
            )));
        }

        Ok(())
    }

    /// Options a downstream stage starts from. Error processing is a per-stage opt-in
    pub(crate) fn inherited(self) -> Self {
        Self {
            process_error: false,
            ..self
        }
    }

    pub(crate) fn is_full(&self, len: usize) -> bool {
        len >= self.buffer_size_max
    }

    pub(crate) fn is_drained(&self, len: usize) -> bool {
        len == 0 || (len as f64) < self.drain_factor * self.buffer_size_max as f64
    }
}

impl Default for Options {
    fn default() -> Self {
        Self {
            buffer_size_max: 10,
            drain_factor: 0.7,
            debug: false,
            reject_unhandled: true,
            process_error: false,
        }
    }
}
