//! Caller-visible copy of the session settings.

use std::sync::{Arc, PoisonError, RwLock};

use trellis_core::{ServerSettingsSnapshot, SettingsChange};

/// Settings copy written optimistically by callers and overwritten by the
/// worker whenever authoritative settings arrive.
#[derive(Clone, Default)]
pub struct SettingsShadow {
    inner: Arc<RwLock<ServerSettingsSnapshot>>,
}

impl SettingsShadow {
    /// Current copy of the settings.
    #[must_use]
    pub fn snapshot(&self) -> ServerSettingsSnapshot {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Apply a change to the shadow.
    pub fn apply(&self, change: &SettingsChange) {
        let mut settings = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        change.apply_to(&mut settings);
    }

    /// Replace the shadow with authoritative settings.
    pub fn replace(&self, settings: ServerSettingsSnapshot) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = settings;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_is_visible_to_clones() {
        let shadow = SettingsShadow::default();
        let reader = shadow.clone();
        shadow.apply(&SettingsChange::UploadSpeedLimit(42));
        assert_eq!(reader.snapshot().upload_speed_limit, 42);

        shadow.replace(ServerSettingsSnapshot::default());
        assert_eq!(reader.snapshot(), ServerSettingsSnapshot::default());
    }
}
