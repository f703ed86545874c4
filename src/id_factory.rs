//! Issuer of unique job identifiers.
//!
//! Identifiers are short hexadecimal tokens, unique among currently live
//! jobs. The counter cycles through a bounded space so identifiers stay
//! short and the identifier map cannot be grown without bound by a
//! malicious upstream.

/// Number of identifiers issued before the counter wraps back to `1`.
///
/// Live jobs are bounded by the slot view plus the superseded retention
/// cap, both far below this boundary, so two simultaneously valid jobs
/// never share an identifier.
pub const JOB_ID_WRAP: u32 = 0xffff;

/// Generator of unique identifiers for jobs.
///
/// It keeps an internal counter, which is incremented every time a new
/// identifier is requested. Callers must serialize access (the manager
/// keeps it behind a mutex).
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct JobIdFactory {
    state: u32,
}

impl JobIdFactory {
    /// Creates a new factory with the counter initialized to `0`.
    ///
    /// `0` itself is never issued: it is reserved to mean "no job".
    pub fn new() -> Self {
        Self { state: 0 }
    }

    /// Increments the counter and returns the new identifier as a
    /// lowercase hex token.
    ///
    /// Once the counter reaches [`JOB_ID_WRAP`] it restarts at `1`.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> String {
        self.state += 1;
        if self.state % JOB_ID_WRAP == 0 {
            self.state = 1;
        }
        self.current()
    }

    /// Returns the most recently issued identifier without advancing.
    pub fn current(&self) -> String {
        format!("{:x}", self.state)
    }
}

impl Default for JobIdFactory {
    fn default() -> Self {
        Self::new()
    }
}
