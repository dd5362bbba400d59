//! Input Edge Detection
//!
//! Turns raw per-tick device state into semantic intents: single presses
//! (edges), held buttons and double taps. Ability activation depends on
//! the double-tap contract:
//!
//! - two presses of the same control within the window (500 ms default)
//! - a release between them
//! - then a cooldown (1 s default) before another double tap registers
//!
//! All timing is in ticks of the controller's own counter, so replaying
//! the same device states reproduces the same intents.

use serde::{Serialize, Deserialize};

use crate::core::fixed::{ms_to_ticks, Fixed, FIXED_ONE};
use crate::game::level::GameConfig;

// =============================================================================
// ANALOG AXIS
// =============================================================================

/// Lookup table for converting an i8 stick axis to Fixed.
///
/// `(value * 65536) / 127` with floor division, precomputed for all 256
/// values. Index 128 (-128 as i8) is "stick released" and maps to 0.
pub static AXIS_LUT: [Fixed; 256] = {
    let mut lut = [0i32; 256];
    let mut i = 0i32;
    while i < 256 {
        let signed = if i < 128 { i } else { i - 256 };
        lut[i as usize] = if signed == -128 { 0 } else { (signed * 65536) / 127 };
        i += 1;
    }
    lut
};

/// Convert an i8 stick axis to Fixed in `[-1, 1]`.
#[inline]
pub fn axis_to_fixed(input: i8) -> Fixed {
    AXIS_LUT[(input as u8) as usize]
}

// =============================================================================
// DEVICE STATE
// =============================================================================

/// Raw device state sampled once per tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceState {
    /// Stick X: -127 (left) to +127 (right), -128 = released
    pub axis_x: i8,
    /// Held buttons (`BUTTON_*` bits)
    pub buttons: u8,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceState {
    /// Stick released
    pub const NO_AXIS: i8 = -128;

    pub const BUTTON_JUMP: u8 = 0x01;
    pub const BUTTON_ABILITY: u8 = 0x02;
    pub const BUTTON_LEFT: u8 = 0x04;
    pub const BUTTON_RIGHT: u8 = 0x08;
    pub const BUTTON_PAUSE: u8 = 0x10;
    pub const BUTTON_MAP: u8 = 0x20;
    pub const BUTTON_RESET: u8 = 0x40;
    pub const BUTTON_DEBUG: u8 = 0x80;

    /// Nothing held.
    pub const fn new() -> Self {
        Self { axis_x: Self::NO_AXIS, buttons: 0 }
    }

    /// Only the given buttons held.
    pub const fn with_buttons(buttons: u8) -> Self {
        Self { axis_x: Self::NO_AXIS, buttons }
    }

    #[inline]
    pub fn held(&self, button: u8) -> bool {
        self.buttons & button != 0
    }

    /// Horizontal axis in `[-1, 1]`. The stick wins over the d-pad.
    pub fn horizontal(&self) -> Fixed {
        if self.axis_x != Self::NO_AXIS {
            return axis_to_fixed(self.axis_x);
        }
        let mut x = 0;
        if self.held(Self::BUTTON_RIGHT) {
            x += FIXED_ONE;
        }
        if self.held(Self::BUTTON_LEFT) {
            x -= FIXED_ONE;
        }
        x
    }
}

// =============================================================================
// INTENTS
// =============================================================================

/// Horizontal direction of a dash.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Left,
    Right,
}

impl Direction {
    /// -1 or +1 in fixed-point.
    #[inline]
    pub fn sign(self) -> Fixed {
        match self {
            Direction::Left => -FIXED_ONE,
            Direction::Right => FIXED_ONE,
        }
    }
}

/// Semantic input for one tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Intents {
    /// Run axis in `[-1, 1]`
    pub horizontal: Fixed,
    /// Jump pressed this tick
    pub jump: bool,
    /// Jump held
    pub jump_held: bool,
    /// Ability button pressed this tick
    pub use_ability: bool,
    /// Direction double-tapped this tick
    pub dash: Option<Direction>,
    /// Jump double-tapped this tick
    pub flight: bool,
    pub pause: bool,
    pub map: bool,
    pub reset: bool,
    pub debug_toggle: bool,
}

// =============================================================================
// DOUBLE TAP
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TapPhase<K> {
    Idle,
    Pressed { key: K, since: u32 },
    Released { key: K, since: u32 },
    Cooldown { until: u32 },
}

/// Double-tap state machine over keys of type `K`.
///
/// Pressing a different key restarts the sequence with that key.
#[derive(Clone, Copy, Debug)]
pub struct DoubleTap<K> {
    phase: TapPhase<K>,
    window: u32,
    cooldown: u32,
}

impl<K: Copy + Eq> DoubleTap<K> {
    /// Create a detector with window and cooldown in ticks.
    pub fn new(window: u32, cooldown: u32) -> Self {
        Self { phase: TapPhase::Idle, window, cooldown }
    }

    /// Forget any partial sequence and cooldown.
    pub fn reset(&mut self) {
        self.phase = TapPhase::Idle;
    }

    /// Whether a cooldown is running.
    pub fn cooling_down(&self) -> bool {
        matches!(self.phase, TapPhase::Cooldown { .. })
    }

    /// Feed one key's state for tick `now`. Returns the key on a double tap.
    pub fn update(&mut self, now: u32, key: K, down: bool, was_down: bool) -> Option<K> {
        self.expire(now);

        let pressed = down && !was_down;
        let released = !down && was_down;

        match self.phase {
            TapPhase::Cooldown { .. } => None,
            TapPhase::Idle if pressed => {
                self.phase = TapPhase::Pressed { key, since: now };
                None
            }
            TapPhase::Pressed { key: k, since } if k == key && released => {
                self.phase = TapPhase::Released { key: k, since };
                None
            }
            TapPhase::Pressed { key: k, .. } | TapPhase::Released { key: k, .. } if k != key && pressed => {
                self.phase = TapPhase::Pressed { key, since: now };
                None
            }
            TapPhase::Released { key: k, .. } if k == key && pressed => {
                self.phase = TapPhase::Cooldown { until: now + self.cooldown };
                Some(key)
            }
            _ => None,
        }
    }

    fn expire(&mut self, now: u32) {
        self.phase = match self.phase {
            TapPhase::Cooldown { until } if now >= until => TapPhase::Idle,
            TapPhase::Pressed { since, .. } | TapPhase::Released { since, .. }
                if now.saturating_sub(since) > self.window =>
            {
                TapPhase::Idle
            }
            phase => phase,
        };
    }
}

// =============================================================================
// CONTROLLER
// =============================================================================

/// Owns the previous device state and the double-tap detectors.
#[derive(Clone, Debug)]
pub struct InputController {
    previous: DeviceState,
    now: u32,
    dash_tap: DoubleTap<Direction>,
    jump_tap: DoubleTap<()>,
}

impl InputController {
    /// Create a controller using the configured double-tap timing.
    pub fn new(config: &GameConfig) -> Self {
        let window = ms_to_ticks(config.double_tap_window_ms);
        let cooldown = ms_to_ticks(config.double_tap_cooldown_ms);
        Self {
            previous: DeviceState::new(),
            now: 0,
            dash_tap: DoubleTap::new(window, cooldown),
            jump_tap: DoubleTap::new(window, cooldown),
        }
    }

    /// Sample one tick of device state.
    pub fn update(&mut self, state: DeviceState) -> Intents {
        self.now += 1;
        let prev = self.previous;
        let edge = |button: u8| state.held(button) && !prev.held(button);

        let mut dash = self.dash_tap.update(
            self.now,
            Direction::Left,
            state.held(DeviceState::BUTTON_LEFT),
            prev.held(DeviceState::BUTTON_LEFT),
        );
        if dash.is_none() {
            dash = self.dash_tap.update(
                self.now,
                Direction::Right,
                state.held(DeviceState::BUTTON_RIGHT),
                prev.held(DeviceState::BUTTON_RIGHT),
            );
        }

        let flight = self
            .jump_tap
            .update(
                self.now,
                (),
                state.held(DeviceState::BUTTON_JUMP),
                prev.held(DeviceState::BUTTON_JUMP),
            )
            .is_some();

        let intents = Intents {
            horizontal: state.horizontal(),
            jump: edge(DeviceState::BUTTON_JUMP),
            jump_held: state.held(DeviceState::BUTTON_JUMP),
            use_ability: edge(DeviceState::BUTTON_ABILITY),
            dash,
            flight,
            pause: edge(DeviceState::BUTTON_PAUSE),
            map: edge(DeviceState::BUTTON_MAP),
            reset: edge(DeviceState::BUTTON_RESET),
            debug_toggle: edge(DeviceState::BUTTON_DEBUG),
        };

        self.previous = state;
        intents
    }

    /// Clear detectors and cooldowns.
    ///
    /// The held state survives so a button still down after a reset does
    /// not register a fresh press.
    pub fn reset(&mut self) {
        self.dash_tap.reset();
        self.jump_tap.reset();
    }
}

// =============================================================================
// RECORDING
// =============================================================================

/// Device state that began at `tick`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputChange {
    pub tick: u32,
    pub state: DeviceState,
}

/// Delta-compressed input recording for replays and determinism checks.
///
/// Only stores ticks where the device state changed.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct InputRecording {
    changes: Vec<InputChange>,
    /// Last recorded tick
    pub end_tick: u32,
}

impl InputRecording {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the state for `tick`. Ticks must be non-decreasing.
    pub fn record(&mut self, tick: u32, state: DeviceState) {
        self.end_tick = tick;
        let last = self.changes.last().map_or(DeviceState::new(), |c| c.state);
        if state != last {
            self.changes.push(InputChange { tick, state });
        }
    }

    /// State in effect at `tick`.
    pub fn state_at(&self, tick: u32) -> DeviceState {
        let idx = self.changes.partition_point(|c| c.tick <= tick);
        if idx == 0 {
            DeviceState::new()
        } else {
            self.changes[idx - 1].state
        }
    }

    /// Number of stored changes.
    pub fn change_count(&self) -> usize {
        self.changes.len()
    }

    /// Every tick from 0 to `end_tick` with its state.
    pub fn replay(&self) -> impl Iterator<Item = (u32, DeviceState)> + '_ {
        (0..=self.end_tick).map(move |tick| (tick, self.state_at(tick)))
    }
}

// =============================================================================
// TESTS
// =============================================================================
