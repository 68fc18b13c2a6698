//! Process-wide model/temperature selection.

use ryubot_common::config::{ModePreset, ModesConfig};
use std::sync::atomic::{AtomicUsize, Ordering};

/// The active completion settings.
pub type Mode = ModePreset;

/// Toggle between exactly two presets.
///
/// The active preset is an atomic index, so a toggle is a single
/// read-modify-write that concurrent handlers observe consistently. Handlers
/// snapshot the mode when a request starts; a toggle never changes a request
/// already in flight.
#[derive(Debug)]
pub struct ModeSelector {
    presets: [Mode; 2],
    active: AtomicUsize,
}

impl ModeSelector {
    pub fn new(primary: Mode, alternate: Mode) -> Self {
        Self {
            presets: [primary, alternate],
            active: AtomicUsize::new(0),
        }
    }

    pub fn from_config(config: &ModesConfig) -> Self {
        Self::new(config.primary.clone(), config.alternate.clone())
    }

    /// The active preset.
    pub fn current(&self) -> Mode {
        self.presets[self.active.load(Ordering::Acquire)].clone()
    }

    /// Switch to the other preset and return it.
    pub fn toggle(&self) -> Mode {
        let previous = self.active.fetch_xor(1, Ordering::AcqRel);
        let mode = self.presets[previous ^ 1].clone();
        tracing::info!(
            model = %mode.model,
            temperature = mode.temperature,
            "Conversation mode switched"
        );
        mode
    }

    /// Both presets, active first.
    pub fn presets(&self) -> [&Mode; 2] {
        let active = self.active.load(Ordering::Acquire);
        [&self.presets[active], &self.presets[active ^ 1]]
    }
}
