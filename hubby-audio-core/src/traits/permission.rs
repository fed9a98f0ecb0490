use crate::models::audio_models::Capability;

/// Answers whether the process currently holds the given capabilities.
///
/// The caller owns the OS permission prompt; the engine only asks.
pub trait PermissionChecker: Send + Sync {
    fn is_granted(&self, required: &[Capability]) -> bool;
}

impl<F> PermissionChecker for F
where
    F: Fn(&[Capability]) -> bool + Send + Sync,
{
    fn is_granted(&self, required: &[Capability]) -> bool {
        self(required)
    }
}

/// A checker for platforms without a capture permission model.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysGranted;

impl PermissionChecker for AlwaysGranted {
    fn is_granted(&self, _required: &[Capability]) -> bool {
        true
    }
}
