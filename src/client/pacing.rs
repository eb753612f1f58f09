use std::time::Duration;

/// Decides how long a batch run waits after each item, bounding the request
/// rate seen by the gateway.
pub trait Pacing: Send + Sync {
    /// Called once after every item, whether or not it succeeded.
    fn after_item(&mut self) -> Duration;
}

/// The same pause after every item.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FixedDelay(pub Duration);

impl Default for FixedDelay {
    fn default() -> Self {
        Self(Duration::from_millis(500))
    }
}

impl Pacing for FixedDelay {
    fn after_item(&mut self) -> Duration {
        self.0
    }
}

/// No pause at all.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoPacing;

impl Pacing for NoPacing {
    fn after_item(&mut self) -> Duration {
        Duration::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_delay_defaults_to_half_a_second() {
        let mut pacing = FixedDelay::default();
        assert_eq!(pacing.after_item(), Duration::from_millis(500));
        assert_eq!(pacing.after_item(), Duration::from_millis(500));
    }

    #[test]
    fn no_pacing_never_waits() {
        assert_eq!(NoPacing.after_item(), Duration::ZERO);
    }
}
