/// Result of one exchange accessor call.
///
/// Keeps "the exchange answered with nothing" apart from the two ways a call
/// can fail, so callers can tell an empty order book from an outage.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiOutcome<T> {
    Success(T),
    Empty,
    /// Network trouble that outlived the retry budget or deadline
    TransientError(String),
    /// The exchange answered but refused or garbled the request
    PermanentError {
        status: Option<u16>,
        message: String,
    },
}

impl<T> ApiOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, ApiOutcome::Success(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(
            self,
            ApiOutcome::TransientError(_) | ApiOutcome::PermanentError { .. }
        )
    }

    pub fn success(self) -> Option<T> {
        match self {
            ApiOutcome::Success(value) => Some(value),
            _ => None,
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> ApiOutcome<U> {
        match self {
            ApiOutcome::Success(value) => ApiOutcome::Success(f(value)),
            ApiOutcome::Empty => ApiOutcome::Empty,
            ApiOutcome::TransientError(message) => ApiOutcome::TransientError(message),
            ApiOutcome::PermanentError { status, message } => {
                ApiOutcome::PermanentError { status, message }
            }
        }
    }

    /// Short label for log fields
    pub fn kind(&self) -> &'static str {
        match self {
            ApiOutcome::Success(_) => "success",
            ApiOutcome::Empty => "empty",
            ApiOutcome::TransientError(_) => "transient_error",
            ApiOutcome::PermanentError { .. } => "permanent_error",
        }
    }
}

impl<T: Default> ApiOutcome<T> {
    /// Collapse to a value, treating every non-success as the default.
    pub fn unwrap_or_default(self) -> T {
        self.success().unwrap_or_default()
    }
}

impl<T> ApiOutcome<Vec<T>> {
    /// `Empty` for an empty list, `Success` otherwise.
    pub fn from_list(items: Vec<T>) -> Self {
        if items.is_empty() {
            ApiOutcome::Empty
        } else {
            ApiOutcome::Success(items)
        }
    }

    /// Demote a successful but empty list to `Empty`.
    pub fn non_empty(self) -> Self {
        match self {
            ApiOutcome::Success(items) => ApiOutcome::from_list(items),
            other => other,
        }
    }
}
