//! Microphone access probe.
//!
//! cpal has no permission API. Where the OS gates microphone access (macOS
//! TCC, Windows privacy settings, sandboxed Linux), a denied process sees no
//! usable input device or fails to query its configuration, so that is what
//! this checks.

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::DefaultStreamConfigError;

use hubby_audio_core::{Capability, CaptureError, PermissionChecker};

/// Check if the default microphone is accessible.
pub fn check_microphone_permission() -> Result<bool, CaptureError> {
    let host = cpal::default_host();
    let Some(device) = host.default_input_device() else {
        return Ok(false);
    };

    match device.default_input_config() {
        Ok(_) => Ok(true),
        Err(DefaultStreamConfigError::DeviceNotAvailable) => Ok(false),
        Err(DefaultStreamConfigError::StreamTypeNotSupported) => Ok(false),
        Err(e) => {
            // Other error: assume available but report
            log::warn!("Unexpected error checking mic permission: {}", e);
            Ok(true)
        }
    }
}

/// [`PermissionChecker`] backed by [`check_microphone_permission`].
#[derive(Debug, Clone, Copy, Default)]
pub struct MicrophoneAccess;

impl PermissionChecker for MicrophoneAccess {
    fn is_granted(&self, required: &[Capability]) -> bool {
        required.iter().all(|capability| match capability {
            Capability::RecordAudio => check_microphone_permission().unwrap_or_else(|e| {
                log::warn!("{}", e);
                false
            }),
        })
    }
}
