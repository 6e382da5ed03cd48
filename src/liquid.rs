use crate::StageError;

/// A single unit flowing through a pipe.
///
/// `End` and `Nil` are markers, not data: `End` terminates a stream and reaches
/// every consumer exactly once, `Nil` means "nothing this step" and is never
/// buffered or forwarded.
#[derive(Debug, Clone, PartialEq)]
pub enum Liquid<T> {
    Value(T),
    End,
    Nil,
    Error(StageError),
}

impl<T> Liquid<T> {
    pub fn is_end(&self) -> bool {
        matches!(self, Liquid::End)
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Liquid::Nil)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Liquid::Error(_))
    }

    pub fn value(self) -> Option<T> {
        match self {
            Liquid::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_value(&self) -> Option<&T> {
        match self {
            Liquid::Value(v) => Some(v),
            _ => None,
        }
    }

    /// Transform the carried value, keeping markers and errors as they are
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Liquid<U> {
        match self {
            Liquid::Value(v) => Liquid::Value(f(v)),
            Liquid::End => Liquid::End,
            Liquid::Nil => Liquid::Nil,
            Liquid::Error(e) => Liquid::Error(e),
        }
    }

    /// Re-type a marker or error for a stage with a different output type. A value
    /// has no counterpart and becomes `Nil`.
    pub(crate) fn retype<U>(self) -> Liquid<U> {
        match self {
            Liquid::End => Liquid::End,
            Liquid::Error(e) => Liquid::Error(e),
            Liquid::Value(_) | Liquid::Nil => Liquid::Nil,
        }
    }
}

impl<T> From<T> for Liquid<T> {
    fn from(value: T) -> Self {
        Liquid::Value(value)
    }
}

/// Output of one funnel or valve step: a single liquid or a batch to be
/// pushed element by element (one-to-many).
#[derive(Debug, Clone, PartialEq)]
pub enum Pour<T> {
    One(Liquid<T>),
    Many(Vec<Liquid<T>>),
}

/// Conversion of whatever a user function returns into a [`Pour`]
pub trait IntoPour<T> {
    fn into_pour(self) -> Pour<T>;
}

impl<T> IntoPour<T> for Pour<T> {
    fn into_pour(self) -> Pour<T> {
        self
    }
}

impl<T> IntoPour<T> for Liquid<T> {
    fn into_pour(self) -> Pour<T> {
        Pour::One(self)
    }
}

impl<T> IntoPour<T> for Vec<Liquid<T>> {
    fn into_pour(self) -> Pour<T> {
        Pour::Many(self)
    }
}

/// `None` ends the stream, the way an exhausted iterator does
impl<T> IntoPour<T> for Option<T> {
    fn into_pour(self) -> Pour<T> {
        match self {
            Some(v) => Pour::One(Liquid::Value(v)),
            None => Pour::One(Liquid::End),
        }
    }
}

impl<T, R, E> IntoPour<T> for Result<R, E>
where
    R: IntoPour<T>,
    E: Into<StageError>,
{
    fn into_pour(self) -> Pour<T> {
        match self {
            Ok(r) => r.into_pour(),
            Err(e) => Pour::One(Liquid::Error(e.into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn results_become_error_liquid() {
        let err = StageError::msg("nope");
        let res: Result<Liquid<i32>, StageError> = Err(err.clone());

        assert_eq!(res.into_pour(), Pour::One(Liquid::Error(err)));
    }

    #[test]
    fn option_none_is_end() {
        assert_eq!(None::<i32>.into_pour(), Pour::One(Liquid::End));
        assert_eq!(Some(3).into_pour(), Pour::One(Liquid::Value(3)));
    }

    #[test]
    fn map_keeps_markers() {
        assert_eq!(Liquid::Value(2).map(|x| x * 2), Liquid::Value(4));
        assert_eq!(Liquid::<i32>::End.map(|x| x * 2), Liquid::End);
        assert!(Liquid::<i32>::Nil.map(|x| x * 2).is_nil());
    }
}
