//! Builder pattern for `DeviceSession`.

use std::sync::Arc;

use crate::device::AudioBackend;
use crate::params::{DeviceIndices, Parameters};
use crate::{
    event_callback, DeviceConfig, DeviceSession, EventCallback, SessionConfig, SessionEvent,
    VirtualMicError,
};

/// Builder for configuring a [`DeviceSession`].
///
/// Use [`DeviceSession::builder()`] to create one.
///
/// # Example
///
/// ```
/// use virtual_mic::device::{MockBackend, MockSource};
/// use virtual_mic::{DeviceConfig, DeviceSession, SessionConfig};
/// use std::time::Duration;
///
/// let session = DeviceSession::builder()
///     .device_config(DeviceConfig {
///         capture_index: 1,
///         output_1_index: 2,
///         sample_rate: 8000,
///         ..Default::default()
///     })
///     .with_config(SessionConfig {
///         io_timeout: Duration::from_millis(500),
///         ..Default::default()
///     })
///     .backend(MockBackend::new(MockSource::new(8000)))
///     .on_event(|event| tracing::info!(?event, "session event"))
///     .build()?;
///
/// assert_eq!(session.parameters().devices.capture, 1);
/// # Ok::<(), virtual_mic::VirtualMicError>(())
/// ```
#[must_use]
pub struct DeviceSessionBuilder {
    device_config: DeviceConfig,
    config: SessionConfig,
    parameters: Parameters,
    backend: Option<Arc<dyn AudioBackend>>,
    event_callback: Option<EventCallback>,
}

impl Default for DeviceSessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceSessionBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            device_config: DeviceConfig::default(),
            config: SessionConfig::default(),
            parameters: Parameters::default(),
            backend: None,
            event_callback: None,
        }
    }

    /// Sets the initial device indices and the sample rate.
    pub fn device_config(mut self, device_config: DeviceConfig) -> Self {
        self.device_config = device_config;
        self
    }

    /// Sets the sample rate, keeping the configured device indices.
    ///
    /// Default: 44100 Hz
    pub fn sample_rate(mut self, sample_rate: u32) -> Self {
        self.device_config.sample_rate = sample_rate;
        self
    }

    /// Sets the initial runtime parameters.
    ///
    /// The device indices in `parameters` are ignored; they come from the
    /// [`DeviceConfig`].
    pub fn parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }

    /// Sets custom loop configuration.
    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the backend devices are opened through.
    ///
    /// Default: [`CpalBackend`](crate::device::CpalBackend) when the `cpal-backend` feature is
    /// enabled.
    pub fn backend<B: AudioBackend + 'static>(mut self, backend: B) -> Self {
        self.backend = Some(Arc::new(backend));
        self
    }

    /// Sets a backend that is shared with other owners.
    pub fn shared_backend(mut self, backend: Arc<dyn AudioBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Sets a callback to receive runtime events.
    ///
    /// The callback runs on the worker thread.
    pub fn on_event<F>(mut self, callback: F) -> Self
    where
        F: Fn(SessionEvent) + Send + Sync + 'static,
    {
        self.event_callback = Some(event_callback(callback));
        self
    }

    /// Validates the builder configuration.
    fn validate(&self) -> Result<(), VirtualMicError> {
        self.device_config.validate()?;

        if self.config.io_timeout.is_zero() {
            return Err(VirtualMicError::InvalidConfig(
                "io_timeout must be greater than zero".to_string(),
            ));
        }
        if self.config.capture_read_attempts == 0 {
            return Err(VirtualMicError::InvalidConfig(
                "capture_read_attempts must be at least 1".to_string(),
            ));
        }
        if self.config.ring_buffer_chunks == 0 {
            return Err(VirtualMicError::InvalidConfig(
                "ring_buffer_chunks must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    fn resolve_backend(&mut self) -> Result<Arc<dyn AudioBackend>, VirtualMicError> {
        if let Some(backend) = self.backend.take() {
            return Ok(backend);
        }

        #[cfg(feature = "cpal-backend")]
        {
            Ok(Arc::new(crate::device::CpalBackend::new()))
        }
        #[cfg(not(feature = "cpal-backend"))]
        {
            Err(VirtualMicError::InvalidConfig(
                "no audio backend configured".to_string(),
            ))
        }
    }

    /// Builds an idle session.
    ///
    /// # Errors
    ///
    /// Returns [`VirtualMicError::InvalidConfig`] for a zero sample rate, a zero I/O timeout,
    /// zero capture attempts or zero ring buffer chunks, or when no backend is available.
    pub fn build(mut self) -> Result<DeviceSession, VirtualMicError> {
        self.validate()?;
        let backend = self.resolve_backend()?;

        let mut parameters = self.parameters.clamped();
        parameters.devices = DeviceIndices {
            capture: self.device_config.capture_index,
            output_1: self.device_config.output_1_index,
            output_2: self.device_config.output_2_index,
        };

        tracing::debug!(
            backend = backend.name(),
            sample_rate = self.device_config.sample_rate,
            "session built"
        );

        Ok(DeviceSession::new(
            self.device_config,
            self.config,
            parameters,
            backend,
            self.event_callback,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{MockBackend, MockSource};
    use crate::params::OutputPath;
    use std::time::Duration;

    fn mock() -> MockBackend {
        MockBackend::new(MockSource::new(44100))
    }

    #[test]
    fn test_builder_default() {
        let builder = DeviceSessionBuilder::new();
        assert_eq!(builder.device_config, DeviceConfig::default());
        assert!(builder.backend.is_none());
        assert!(builder.event_callback.is_none());
    }

    #[test]
    fn test_builder_rejects_zero_sample_rate() {
        let result = DeviceSession::builder().sample_rate(0).backend(mock()).build();
        assert!(matches!(result, Err(VirtualMicError::InvalidConfig(_))));
    }

    #[test]
    fn test_builder_rejects_zero_attempts() {
        let result = DeviceSession::builder()
            .with_config(SessionConfig {
                capture_read_attempts: 0,
                ..Default::default()
            })
            .backend(mock())
            .build();
        assert!(matches!(result, Err(VirtualMicError::InvalidConfig(_))));
    }

    #[test]
    fn test_builder_rejects_zero_timeout() {
        let result = DeviceSession::builder()
            .with_config(SessionConfig {
                io_timeout: Duration::ZERO,
                ..Default::default()
            })
            .backend(mock())
            .build();
        assert!(matches!(result, Err(VirtualMicError::InvalidConfig(_))));
    }

    #[test]
    fn test_device_indices_come_from_device_config() {
        let mut initial = Parameters::default();
        initial.devices.capture = 9;
        initial.second_output_enabled = true;

        let session = DeviceSession::builder()
            .device_config(DeviceConfig {
                capture_index: 2,
                output_2_index: 3,
                ..Default::default()
            })
            .parameters(initial)
            .backend(mock())
            .build()
            .unwrap();

        let params = session.parameters();
        assert_eq!(params.devices.capture, 2);
        assert_eq!(params.devices.output(OutputPath::Second), 3);
        assert!(params.second_output_enabled);
    }

    #[test]
    fn test_initial_parameters_out_of_range_are_clamped() {
        let mut initial = Parameters::default();
        initial.effects.noise_threshold = 50_000.0;
        initial.effects.room_size = 7.0;
        initial.background_volume = 42.0;

        let session = DeviceSession::builder()
            .parameters(initial)
            .backend(mock())
            .build()
            .unwrap();

        let params = session.parameters();
        assert_eq!(params.effects.noise_threshold, 3000.0);
        assert_eq!(params.effects.room_size, 1.0);
        assert_eq!(params.background_volume, 3.0);
    }

    #[test]
    fn test_builder_shared_backend() {
        let backend: Arc<dyn AudioBackend> = Arc::new(mock());
        let session = DeviceSession::builder()
            .shared_backend(Arc::clone(&backend))
            .build()
            .unwrap();
        assert_eq!(session.backend_name(), "mock");
    }
}
