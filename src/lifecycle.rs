/// Lifecycle of a host whose initialisation is asynchronous.
///
/// `init` may be called again, and `dispose` may run, while assets are still
/// loading. Hosts call [`Lifecycle::begin_init`] before the first await and
/// [`Lifecycle::finish_init`] after the last one, and install their callbacks
/// only when the latter succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lifecycle {
    #[default]
    Idle,
    Loading,
    Ready,
    Disposed,
}

impl Lifecycle {
    /// Claims the right to initialise. False while another init is loading,
    /// once initialised, and after dispose.
    pub fn begin_init(&mut self) -> bool {
        if *self != Lifecycle::Idle {
            return false;
        }
        *self = Lifecycle::Loading;
        true
    }

    /// Completes a claimed init. False when dispose ran in the meantime;
    /// the caller must then drop what it built.
    pub fn finish_init(&mut self) -> bool {
        if *self != Lifecycle::Loading {
            return false;
        }
        *self = Lifecycle::Ready;
        true
    }

    /// Releases a claimed init that failed so it can be retried.
    pub fn abort_init(&mut self) {
        if *self == Lifecycle::Loading {
            *self = Lifecycle::Idle;
        }
    }

    pub fn dispose(&mut self) {
        *self = Lifecycle::Disposed;
    }

    pub fn is_ready(&self) -> bool {
        *self == Lifecycle::Ready
    }

    pub fn is_disposed(&self) -> bool {
        *self == Lifecycle::Disposed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlapping_init_is_refused() {
        let mut lifecycle = Lifecycle::default();
        assert!(lifecycle.begin_init());
        assert!(!lifecycle.begin_init());
        assert!(lifecycle.finish_init());
        assert!(lifecycle.is_ready());
        assert!(!lifecycle.begin_init());
        assert!(!lifecycle.finish_init());
    }

    #[test]
    fn dispose_while_loading_discards_the_init() {
        let mut lifecycle = Lifecycle::default();
        assert!(lifecycle.begin_init());
        lifecycle.dispose();
        assert!(!lifecycle.finish_init());
        assert!(lifecycle.is_disposed());
        assert!(!lifecycle.begin_init());
    }

    #[test]
    fn failed_init_can_be_retried() {
        let mut lifecycle = Lifecycle::default();
        assert!(lifecycle.begin_init());
        lifecycle.abort_init();
        assert_eq!(lifecycle, Lifecycle::Idle);
        assert!(lifecycle.begin_init());
    }

    #[test]
    fn abort_after_dispose_stays_disposed() {
        let mut lifecycle = Lifecycle::default();
        assert!(lifecycle.begin_init());
        lifecycle.dispose();
        lifecycle.abort_init();
        assert!(lifecycle.is_disposed());
    }
}
