use std::num::NonZeroU32;

/// Iteration floor recommended by RFC5802 section 5.1 and RFC7677 section 4.
pub const DEFAULT_MIN_ITERATIONS: u32 = 4096;

/// Server side settings shared by all exchanges of a listener.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScramConfig {
    min_iterations: NonZeroU32,
    advertise_plus: bool,
}

impl Default for ScramConfig {
    fn default() -> Self {
        ScramConfig {
            min_iterations: NonZeroU32::new(DEFAULT_MIN_ITERATIONS).unwrap_or(NonZeroU32::MIN),
            advertise_plus: false,
        }
    }
}

impl ScramConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Credentials hashed with fewer iterations are refused.
    pub fn with_min_iterations(mut self, min_iterations: NonZeroU32) -> Self {
        self.min_iterations = min_iterations;
        self
    }

    /// Declares whether a `-PLUS` mechanism is offered on the connection. When it is, a client
    /// sending the `y` flag is treated as a downgrade attempt.
    pub fn with_advertise_plus(mut self, advertise_plus: bool) -> Self {
        self.advertise_plus = advertise_plus;
        self
    }

    /// The minimal accepted iteration count.
    pub fn min_iterations(&self) -> NonZeroU32 {
        self.min_iterations
    }

    /// Whether a `-PLUS` mechanism is offered.
    pub fn advertise_plus(&self) -> bool {
        self.advertise_plus
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ScramConfig::default();
        assert_eq!(config.min_iterations().get(), 4096);
        assert!(!config.advertise_plus());
    }

    #[test]
    fn builder() {
        let config = ScramConfig::new()
            .with_min_iterations(NonZeroU32::new(1).unwrap())
            .with_advertise_plus(true);
        assert_eq!(config.min_iterations().get(), 1);
        assert!(config.advertise_plus());
    }
}
