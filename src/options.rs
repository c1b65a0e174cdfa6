use crate::Interrupt;

/// Construction options shared by every accessor variant.
///
/// ### Example:
/// ```
/// use fd_accessor::{Interrupt, Options};
///
/// let interrupt = Interrupt::new();
/// let options = Options::new()
///     .track_last_modified(true)
///     .interrupt(interrupt.clone());
/// assert!(options.is_tracking_last_modified());
/// ```
#[derive(Debug, Clone)]
pub struct Options {
    track_last_modified: bool,
    interrupt: Interrupt,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables the modification-time high-water mark. An accessor built with tracking must be
    /// used from a single thread.
    pub fn track_last_modified(mut self, track: bool) -> Self {
        self.track_last_modified = track;
        self
    }

    /// Sets the token polled between read chunks and directory entries.
    pub fn interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn is_tracking_last_modified(&self) -> bool {
        self.track_last_modified
    }

    pub fn interrupt_token(&self) -> &Interrupt {
        &self.interrupt
    }
}

impl Default for Options {
    fn default() -> Self {
        Self {
            track_last_modified: false,
            interrupt: Interrupt::global(),
        }
    }
}
