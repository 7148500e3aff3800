//! Keyboard state tracking and USB HID boot report encoding.
//!
//! # What is a HID boot report? (for beginners)
//!
//! The USB HID keyboard *boot protocol* fixes the shape of every report a
//! keyboard sends to its host at exactly 8 bytes:
//!
//! | Byte  | Meaning                                      |
//! |-------|----------------------------------------------|
//! | 0     | Modifier bitmask (one bit per Ctrl/Shift/…)  |
//! | 1     | Reserved, always 0                           |
//! | 2..7  | Up to six held keycodes, 0 = empty slot      |
//!
//! The host-side kernel driver consumes this layout directly, so the encoder
//! in this module must reproduce it bit-exact. A keyboard that holds more
//! than six non-modifier keys cannot express the seventh key at all; this is
//! the boot protocol's "6-key rollover" limit, not a HIDPilot restriction.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Size in bytes of a boot-protocol keyboard report.
pub const REPORT_LEN: usize = 8;

/// Maximum number of simultaneously held non-modifier keys (6-key rollover).
pub const MAX_ACTIVE_KEYS: usize = 6;

/// A fully encoded boot-protocol report, ready to be written to the gadget.
pub type HidReport = [u8; REPORT_LEN];

// ── Modifier bitmask ──────────────────────────────────────────────────────────

/// The 8-bit modifier field of a boot report, one bit per modifier key.
///
/// Serializes as a plain integer (the `control_keys` field of a recording).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modifiers(pub u8);

impl Modifiers {
    pub const LEFT_CTRL: u8 = 0x01;
    pub const LEFT_SHIFT: u8 = 0x02;
    pub const LEFT_ALT: u8 = 0x04;
    pub const LEFT_META: u8 = 0x08;
    pub const RIGHT_CTRL: u8 = 0x10;
    pub const RIGHT_SHIFT: u8 = 0x20;
    pub const RIGHT_ALT: u8 = 0x40;
    pub const RIGHT_META: u8 = 0x80;

    /// No modifier held.
    pub const NONE: Modifiers = Modifiers(0);

    /// Returns the raw bitmask.
    pub fn bits(self) -> u8 {
        self.0
    }

    /// Returns `true` when no modifier bit is set.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Merges `other` into this mask (bitwise OR).
    pub fn merge(&mut self, other: Modifiers) {
        self.0 |= other.0;
    }

    /// Clears the bits of `other` from this mask (bitwise AND-NOT).
    pub fn clear(&mut self, other: Modifiers) {
        self.0 &= !other.0;
    }
}

// ── Keyboard state ────────────────────────────────────────────────────────────

/// The current keyboard picture: held modifiers plus up to six held keycodes,
/// in insertion order.
///
/// # Modifier merge policy
///
/// `press` merges modifier bits additively (OR) and `release` clears them
/// (AND-NOT). An event that carries only some of the currently held modifiers
/// therefore never drops the others, which keeps multi-modifier combinations
/// (e.g. Ctrl+Shift held across several keystrokes) in sync with what the
/// operator is physically holding.
///
/// # Rollover limit
///
/// A seventh simultaneous keycode is dropped, not queued: the boot report has
/// no slot to carry it. The drop is logged at debug level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyboardState {
    modifiers: Modifiers,
    active: Vec<u8>,
}

impl Default for KeyboardState {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyboardState {
    /// Creates an all-released keyboard state.
    pub fn new() -> Self {
        Self {
            modifiers: Modifiers::NONE,
            active: Vec::with_capacity(MAX_ACTIVE_KEYS),
        }
    }

    /// Registers a key press: merges `modifiers` into the mask and appends
    /// `keycode` to the held list if it is not already held and a slot is free.
    ///
    /// Keycode 0 is the HID "no key" sentinel and is never tracked; pressing
    /// an already-held keycode is idempotent.
    pub fn press(&mut self, modifiers: Modifiers, keycode: Option<u8>) {
        self.modifiers.merge(modifiers);

        if let Some(code) = keycode.filter(|&c| c != 0) {
            if self.active.contains(&code) {
                return;
            }
            if self.active.len() < MAX_ACTIVE_KEYS {
                self.active.push(code);
            } else {
                debug!(keycode = code, "rollover limit reached, key dropped");
            }
        }
    }

    /// Registers a key release: clears `modifiers` from the mask and removes
    /// `keycode` from the held list. Releasing a keycode that is not held is
    /// a no-op.
    pub fn release(&mut self, modifiers: Modifiers, keycode: Option<u8>) {
        self.modifiers.clear(modifiers);

        if let Some(code) = keycode {
            self.active.retain(|&held| held != code);
        }
    }

    /// Unconditionally clears the modifier mask and every held keycode.
    pub fn release_all(&mut self) {
        self.modifiers = Modifiers::NONE;
        self.active.clear();
    }

    /// Encodes the current state into an 8-byte boot report.
    ///
    /// Byte 0 is the modifier mask, byte 1 is reserved (0), bytes 2..7 carry
    /// the held keycodes in insertion order, zero-padded.
    pub fn encode(&self) -> HidReport {
        let mut report = [0u8; REPORT_LEN];
        report[0] = self.modifiers.bits();
        for (slot, code) in self.active.iter().enumerate() {
            report[2 + slot] = *code;
        }
        report
    }

    /// Returns the currently held modifiers.
    pub fn modifiers(&self) -> Modifiers {
        self.modifiers
    }

    /// Returns the currently held keycodes in insertion order.
    pub fn active_keycodes(&self) -> &[u8] {
        &self.active
    }

    /// Returns `true` when no modifier and no keycode is held.
    pub fn is_idle(&self) -> bool {
        self.modifiers.is_empty() && self.active.is_empty()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
