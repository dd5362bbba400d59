//! Ability Lifecycle
//!
//! Abilities collected from fountains wait in a FIFO queue. Using one
//! pops the head and starts its countdown; only one runs at a time, and
//! starting another finalizes the running one first. Every activation is
//! finalized exactly once, either on expiry or on pre-emption, and the
//! session turns each [`FinishedAbility`] into its side effects (flags
//! cleared, fountain available again).

use std::collections::VecDeque;

use serde::{Serialize, Deserialize};
use tracing::{debug, trace};

use crate::core::fixed::ms_to_ticks;
use crate::game::entity::{Ability, EntityId, Fountain};

/// Ticks between HUD countdown updates (10 Hz at 60 Hz).
pub const DISPLAY_TICKS: u32 = crate::TICK_RATE / 10;

// =============================================================================
// QUEUE
// =============================================================================

/// Queued ability with the fountain it came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedAbility {
    /// Source fountain
    pub fountain: EntityId,
    /// Ability type (never Restore)
    pub ability: Ability,
}

/// FIFO of pending abilities.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AbilityQueue {
    entries: VecDeque<QueuedAbility>,
}

impl AbilityQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry. Restore is rejected.
    pub fn push(&mut self, fountain: EntityId, ability: Ability) -> bool {
        if !ability.is_timed() {
            return false;
        }
        self.entries.push_back(QueuedAbility { fountain, ability });
        true
    }

    /// Head of the queue.
    #[inline]
    pub fn peek(&self) -> Option<&QueuedAbility> {
        self.entries.front()
    }

    /// Remove and return the head.
    #[inline]
    pub fn pop(&mut self) -> Option<QueuedAbility> {
        self.entries.pop_front()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Entries in dequeue order.
    pub fn iter(&self) -> impl Iterator<Item = &QueuedAbility> {
        self.entries.iter()
    }

    /// Fountain ids in dequeue order (snapshot / save format).
    pub fn fountain_ids(&self) -> Vec<EntityId> {
        self.entries.iter().map(|e| e.fountain).collect()
    }
}

// =============================================================================
// CONTROLLER
// =============================================================================

/// Why an activation ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FinishReason {
    /// Countdown reached zero
    Expired,
    /// Replaced by a newer activation
    Preempted,
}

/// Finalization record, one per activation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FinishedAbility {
    pub fountain: EntityId,
    pub ability: Ability,
    pub reason: FinishReason,
}

/// Currently running ability.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ActiveAbility {
    /// Source fountain
    pub fountain: EntityId,
    /// Ability type
    pub ability: Ability,
    /// Hard expiry countdown
    pub remaining_ticks: u32,
    /// HUD countdown in tenths of a second
    pub display_tenths: u32,
    display_phase: u32,
}

/// Owns the queue and the single active ability.
#[derive(Clone, Debug, Default)]
pub struct AbilityController {
    queue: AbilityQueue,
    active: Option<ActiveAbility>,
    finished: Vec<FinishedAbility>,
}

impl AbilityController {
    /// Create an idle controller.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the ability granted by `fountain`. Checkpoints are ignored.
    pub fn add_ability(&mut self, fountain: &Fountain) -> &AbilityQueue {
        self.enqueue(fountain.id, fountain.ability);
        &self.queue
    }

    /// Queue by id and type (respawn and save restore path).
    pub fn enqueue(&mut self, fountain: EntityId, ability: Ability) -> bool {
        let accepted = self.queue.push(fountain, ability);
        if accepted {
            trace!("Queued {:?} from fountain {} ({} pending)", ability, fountain, self.queue.len());
        }
        accepted
    }

    /// Type of the ability that `use_ability` would start.
    pub fn peek_next_ability(&self) -> Option<Ability> {
        self.queue.peek().map(|e| e.ability)
    }

    /// Start the head of the queue for `duration_ms`.
    ///
    /// Any running ability is finalized as pre-empted first. Returns the
    /// started ability, or `None` when the queue is empty.
    pub fn use_ability(&mut self, duration_ms: u32) -> Option<Ability> {
        let next = self.queue.pop()?;

        self.finish(FinishReason::Preempted);

        let display_tenths = duration_ms.div_ceil(100);
        self.active = Some(ActiveAbility {
            fountain: next.fountain,
            ability: next.ability,
            remaining_ticks: ms_to_ticks(duration_ms),
            display_tenths,
            display_phase: 0,
        });

        debug!("Started {:?} from fountain {} for {}ms", next.ability, next.fountain, duration_ms);
        Some(next.ability)
    }

    /// Whether `ability` is the one currently running.
    #[inline]
    pub fn is_ability_active(&self, ability: Ability) -> bool {
        self.active.is_some_and(|a| a.ability == ability)
    }

    /// Whether any ability is running.
    #[inline]
    pub fn is_using_ability(&self) -> bool {
        self.active.is_some()
    }

    /// Running ability, if any.
    #[inline]
    pub fn active(&self) -> Option<&ActiveAbility> {
        self.active.as_ref()
    }

    /// Pending queue.
    #[inline]
    pub fn queue(&self) -> &AbilityQueue {
        &self.queue
    }

    /// HUD countdown in seconds, 0.1 s resolution.
    pub fn time_left_secs(&self) -> f32 {
        self.active.map_or(0.0, |a| a.display_tenths as f32 / 10.0)
    }

    /// Advance the countdowns by one tick.
    pub fn tick(&mut self) {
        let Some(active) = self.active.as_mut() else {
            return;
        };

        active.remaining_ticks = active.remaining_ticks.saturating_sub(1);

        active.display_phase += 1;
        if active.display_phase >= DISPLAY_TICKS {
            active.display_phase = 0;
            active.display_tenths = active.display_tenths.saturating_sub(1);
        }

        if active.remaining_ticks == 0 {
            self.finish(FinishReason::Expired);
        }
    }

    /// Drain finalization records produced since the last call.
    pub fn take_finished(&mut self) -> Vec<FinishedAbility> {
        std::mem::take(&mut self.finished)
    }

    /// Drop everything without producing finalization records.
    pub fn reset(&mut self) {
        self.queue.clear();
        self.active = None;
        self.finished.clear();
    }

    fn finish(&mut self, reason: FinishReason) {
        if let Some(done) = self.active.take() {
            debug!("{:?} from fountain {} finished: {:?}", done.ability, done.fountain, reason);
            self.finished.push(FinishedAbility {
                fountain: done.fountain,
                ability: done.ability,
                reason,
            });
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::vec2::FixedVec2;
    use proptest::prelude::*;

    fn fountain(id: EntityId, ability: Ability) -> Fountain {
        Fountain::new(id, FixedVec2::ZERO, ability)
    }

    fn controller_with(abilities: &[(EntityId, Ability)]) -> AbilityController {
        let mut c = AbilityController::new();
        for &(id, ability) in abilities {
            c.add_ability(&fountain(id, ability));
        }
        c
    }

    #[test]
    fn test_restore_never_queued() {
        let mut c = AbilityController::new();
        let queue = c.add_ability(&fountain(1, Ability::Restore));
        assert!(queue.is_empty());
        assert_eq!(c.peek_next_ability(), None);
    }

    #[test]
    fn test_use_empty_queue_is_noop() {
        let mut c = AbilityController::new();
        assert_eq!(c.use_ability(3000), None);
        assert!(!c.is_using_ability());
        assert!(c.take_finished().is_empty());
        assert_eq!(c.time_left_secs(), 0.0);
    }

    #[test]
    fn test_countdown_display_and_expiry() {
        let mut c = controller_with(&[(1, Ability::Dash)]);
        assert_eq!(c.use_ability(3000), Some(Ability::Dash));
        assert!(c.is_ability_active(Ability::Dash));
        assert_eq!(c.time_left_secs(), 3.0);

        for _ in 0..DISPLAY_TICKS {
            c.tick();
        }
        assert!((c.time_left_secs() - 2.9).abs() < 1e-6);
        assert_eq!(c.active().map(|a| a.remaining_ticks), Some(180 - DISPLAY_TICKS));

        for _ in DISPLAY_TICKS..179 {
            c.tick();
        }
        assert!(c.is_using_ability(), "one tick left");
        assert!(c.take_finished().is_empty());

        c.tick();
        assert!(!c.is_using_ability());
        assert_eq!(c.time_left_secs(), 0.0);
        assert_eq!(
            c.take_finished(),
            vec![FinishedAbility { fountain: 1, ability: Ability::Dash, reason: FinishReason::Expired }]
        );
    }

    #[test]
    fn test_preemption_finalizes_once() {
        // Flight active at 2.1s, Transparency waiting behind it
        let mut c = controller_with(&[(1, Ability::Flight), (2, Ability::Transparency)]);
        c.use_ability(3000);
        for _ in 0..54 {
            c.tick();
        }
        assert!((c.time_left_secs() - 2.1).abs() < 1e-6);

        assert_eq!(c.use_ability(5000), Some(Ability::Transparency));
        assert!(c.is_ability_active(Ability::Transparency));
        assert!(!c.is_ability_active(Ability::Flight));
        assert_eq!(c.time_left_secs(), 5.0);

        let finished = c.take_finished();
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].fountain, 1);
        assert_eq!(finished[0].reason, FinishReason::Preempted);

        // The pre-empted timer never fires later
        for _ in 0..300 {
            c.tick();
        }
        let finished = c.take_finished();
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].fountain, 2);
        assert_eq!(finished[0].reason, FinishReason::Expired);
    }

    #[test]
    fn test_zero_duration_expires_next_tick() {
        let mut c = controller_with(&[(1, Ability::Dash)]);
        c.use_ability(0);
        assert!(c.is_using_ability());
        c.tick();
        assert!(!c.is_using_ability());
        assert_eq!(c.take_finished().len(), 1);
    }

    #[test]
    fn test_reset_discards_without_records() {
        let mut c = controller_with(&[(1, Ability::Dash), (2, Ability::Flight)]);
        c.use_ability(3000);
        c.reset();
        assert!(!c.is_using_ability());
        assert!(c.queue().is_empty());
        assert!(c.take_finished().is_empty());
    }

    #[test]
    fn test_fountain_ids_order() {
        let c = controller_with(&[(7, Ability::Flight), (3, Ability::Dash), (9, Ability::Restore)]);
        assert_eq!(c.queue().fountain_ids(), vec![7, 3]);
    }

    fn any_ability() -> impl Strategy<Value = Ability> {
        (0u8..4).prop_map(|i| Ability::from_index(i).unwrap_or(Ability::Restore))
    }

    proptest! {
        #[test]
        fn prop_queue_is_fifo_without_restore(
            adds in proptest::collection::vec((0u32..1000, any_ability()), 0..40)
        ) {
            let mut c = AbilityController::new();
            for &(id, ability) in &adds {
                c.add_ability(&fountain(id, ability));
            }

            let expected: Vec<QueuedAbility> = adds
                .iter()
                .filter(|(_, a)| *a != Ability::Restore)
                .map(|&(fountain, ability)| QueuedAbility { fountain, ability })
                .collect();

            prop_assert!(c.queue().iter().all(|e| e.ability != Ability::Restore));

            let mut started = Vec::new();
            while let Some(next) = c.queue().peek().copied() {
                prop_assert_eq!(c.use_ability(1000), Some(next.ability));
                started.push(next);
            }
            prop_assert_eq!(started, expected);
        }

        #[test]
        fn prop_one_record_per_activation(uses in 1usize..10, ticks in 0u32..400) {
            let mut c = AbilityController::new();
            for id in 0..uses as u32 {
                c.add_ability(&fountain(id, Ability::Dash));
            }
            let mut records = 0;
            for _ in 0..uses {
                c.use_ability(1000);
                for _ in 0..ticks {
                    c.tick();
                }
                records += c.take_finished().len();
            }
            for _ in 0..60 {
                c.tick();
            }
            records += c.take_finished().len();
            prop_assert_eq!(records, uses);
        }
    }
}
