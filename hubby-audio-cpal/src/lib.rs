//! # hubby-audio-cpal
//!
//! cpal backend for hubby-audio.
//!
//! Provides:
//! - `CpalCaptureFactory`: Microphone capture from the host's default input device
//! - `CpalOutputFactory`: Playback on the host's default output device
//! - `permissions`: Microphone access probe
//!
//! ## Usage
//! ```ignore
//! use std::sync::Arc;
//! use hubby_audio_core::{AudioController, RecorderConfig};
//! use hubby_audio_cpal::{CpalCaptureFactory, CpalOutputFactory, MicrophoneAccess};
//!
//! let controller = AudioController::new(
//!     RecorderConfig::default(),
//!     Arc::new(CpalCaptureFactory::new()),
//!     Arc::new(CpalOutputFactory::new()),
//!     Arc::new(MicrophoneAccess),
//! );
//! controller.start_record()?;
//! ```

pub mod cpal_input;
pub mod cpal_output;
pub mod pcm;
pub mod permissions;
pub mod stream_config;
mod stream_holder;

pub use cpal_input::{CpalCaptureDevice, CpalCaptureFactory};
pub use cpal_output::{CpalOutputDevice, CpalOutputFactory};
pub use permissions::MicrophoneAccess;
