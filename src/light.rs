//! Light backend abstraction.

use async_trait::async_trait;

/// Result of a connection attempt together with a human-readable reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOutcome {
    pub ok: bool,
    pub message: String,
}

impl ConnectOutcome {
    pub fn connected(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
        }
    }
}

/// Common interface over the ways of driving a status light.
///
/// Hardware is expected to disappear at any time, so nothing here returns an
/// error. Failures are reported as `false` and the backend is left in a state
/// where `connect` can be called again.
///
/// # Example
///
/// ```no_run
/// use blyncd::light::{ConnectOutcome, LightBackend};
///
/// #[derive(Debug)]
/// struct Console;
///
/// #[async_trait::async_trait]
/// impl LightBackend for Console {
///     fn name(&self) -> &'static str { "console" }
///     async fn connect(&mut self) -> ConnectOutcome { ConnectOutcome::connected("Console ready") }
///     async fn disconnect(&mut self) {}
///     async fn is_alive(&mut self) -> bool { true }
///     async fn set_color(&mut self, red: u8, green: u8, blue: u8) -> bool {
///         println!("rgb({red},{green},{blue})");
///         true
///     }
///     async fn turn_off(&mut self) -> bool { true }
/// }
/// ```
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LightBackend: Send + std::fmt::Debug {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// Tries to claim the device.
    async fn connect(&mut self) -> ConnectOutcome;

    /// Releases the device. Safe to call when not connected.
    async fn disconnect(&mut self);

    /// Checks that the device is still present.
    async fn is_alive(&mut self) -> bool;

    /// Shows a color, channels in 0..=255.
    async fn set_color(&mut self, red: u8, green: u8, blue: u8) -> bool;

    /// Switches the light off.
    async fn turn_off(&mut self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_constructors() {
        let ok = ConnectOutcome::connected("ready");
        assert!(ok.ok);
        assert_eq!(ok.message, "ready");

        let failed = ConnectOutcome::failed("gone");
        assert!(!failed.ok);
        assert_eq!(failed.message, "gone");
    }

    #[tokio::test]
    async fn mock_backend_is_usable_as_trait_object() {
        let mut mock = MockLightBackend::new();
        mock.expect_name().return_const("mock");
        mock.expect_set_color()
            .withf(|r, g, b| (*r, *g, *b) == (1, 2, 3))
            .times(1)
            .return_const(true);

        let mut backend: Box<dyn LightBackend> = Box::new(mock);
        assert_eq!(backend.name(), "mock");
        assert!(backend.set_color(1, 2, 3).await);
    }
}
