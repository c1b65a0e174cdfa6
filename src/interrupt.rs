use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use once_cell::sync::Lazy;

use crate::core::Result;
use crate::error::Error;

static GLOBAL: Lazy<Interrupt> = Lazy::new(Interrupt::new);

/// A cancellation token polled by long-running reads and directory scans.
///
/// Clones share the same flag. Triggering it makes the next poll fail with
/// [`Error::Interrupted`]; the flag stays set until [`Interrupt::reset`].
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    flag: Arc<AtomicBool>,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide token, used by the shared whole-filesystem accessor and by
    /// `Options::default()`.
    pub fn global() -> Interrupt {
        GLOBAL.clone()
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Fails with [`Error::Interrupted`] naming `what` if the token was triggered.
    pub fn check(&self, what: &str) -> Result<()> {
        if self.is_triggered() {
            return Err(Error::Interrupted(what.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_the_flag() {
        let token = Interrupt::new();
        let clone = token.clone();
        assert!(token.check("/x").is_ok());

        clone.trigger();
        assert!(token.is_triggered());
        assert!(matches!(token.check("/x"), Err(Error::Interrupted(p)) if p == "/x"));

        token.reset();
        assert!(!clone.is_triggered());
    }

    #[test]
    fn test_global_is_shared() {
        let a = Interrupt::global();
        let b = Interrupt::global();
        assert!(Arc::ptr_eq(&a.flag, &b.flag));
    }
}
