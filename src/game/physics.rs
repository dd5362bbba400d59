//! Physics Seam
//!
//! The physics engine is a black box behind [`PhysicsWorld`]. The core
//! tags fixtures with a [`FixtureTag`], receives contact callbacks through
//! [`ContactListener`] during `step`, and mutates the world only through
//! [`WorldCommand`]s applied after the step returns.
//!
//! [`ScriptedWorld`] is a deterministic stand-in engine: bodies move by
//! their velocity and contact callbacks are replayed from a script, one
//! batch per step.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde::{Serialize, Deserialize};
use tracing::trace;

use crate::core::fixed::{fixed_mul, Fixed};
use crate::core::vec2::FixedVec2;
use crate::game::entity::EntityId;

// =============================================================================
// FIXTURE TAGS
// =============================================================================

/// Which level entity a body belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityRef {
    Player,
    Obstacle(EntityId),
    Fountain(EntityId),
    Shard(EntityId),
    Rock(EntityId),
    Enemy(EntityId),
    Goal,
}

/// Role of a fixture on its body.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FixtureRole {
    /// Solid collision shape
    Body,
    /// The player's foot sensor
    FootSensor,
    /// Trigger volume (pickups, goal)
    Sensor,
}

/// User data attached to every fixture the core cares about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FixtureTag {
    pub entity: EntityRef,
    pub role: FixtureRole,
    /// Distinguishes several fixtures of one body
    pub index: u8,
}

impl FixtureTag {
    pub const fn new(entity: EntityRef, role: FixtureRole) -> Self {
        Self { entity, role, index: 0 }
    }

    /// The player's solid body.
    pub const fn player_body() -> Self {
        Self::new(EntityRef::Player, FixtureRole::Body)
    }

    /// The player's foot sensor.
    pub const fn player_feet() -> Self {
        Self::new(EntityRef::Player, FixtureRole::FootSensor)
    }

    /// Solid shape of `entity`.
    pub const fn body(entity: EntityRef) -> Self {
        Self::new(entity, FixtureRole::Body)
    }

    /// Trigger volume of `entity`.
    pub const fn sensor(entity: EntityRef) -> Self {
        Self::new(entity, FixtureRole::Sensor)
    }

    pub const fn with_index(mut self, index: u8) -> Self {
        self.index = index;
        self
    }
}

// =============================================================================
// CONTACTS
// =============================================================================

/// One side of a contact as the engine reports it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Fixture {
    /// `None` when the engine fixture carries no user data
    pub tag: Option<FixtureTag>,
    /// Owning body centre
    pub position: FixedVec2,
    /// Owning body velocity
    pub velocity: FixedVec2,
}

impl Fixture {
    pub fn new(tag: Option<FixtureTag>) -> Self {
        Self { tag, position: FixedVec2::ZERO, velocity: FixedVec2::ZERO }
    }
}

/// A touching fixture pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Contact {
    pub a: Fixture,
    pub b: Fixture,
    enabled: bool,
}

impl Contact {
    /// Contact between two tagged fixtures.
    pub fn between(a: FixtureTag, b: FixtureTag) -> Self {
        Self::untagged(Some(a), Some(b))
    }

    /// Contact where either side may lack user data.
    pub fn untagged(a: Option<FixtureTag>, b: Option<FixtureTag>) -> Self {
        Self { a: Fixture::new(a), b: Fixture::new(b), enabled: true }
    }

    /// Skip the collision response for this step.
    #[inline]
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether either side belongs to `entity`.
    pub fn involves(&self, entity: EntityRef) -> bool {
        [self.a.tag, self.b.tag].iter().flatten().any(|t| t.entity == entity)
    }
}

/// Receives contact callbacks synchronously from inside `PhysicsWorld::step`.
pub trait ContactListener {
    /// Two fixtures started touching.
    fn begin_contact(&mut self, contact: &Contact);
    /// Called before the solver runs on a touching pair; may disable it.
    fn pre_solve(&mut self, contact: &mut Contact);
    /// Two fixtures stopped touching.
    fn end_contact(&mut self, contact: &Contact);
}

// =============================================================================
// WORLD
// =============================================================================

/// Mutation requested by the core, applied outside the step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorldCommand {
    /// Overwrite the player's velocity
    SetPlayerVelocity(FixedVec2),
    /// Add an impulse to the player (unit mass)
    ApplyPlayerImpulse(FixedVec2),
    /// Shift the player without touching velocity
    TranslatePlayer(FixedVec2),
    /// Place the player and zero its velocity
    TeleportPlayer(FixedVec2),
    /// Move a kinematic body
    MoveBody { entity: EntityRef, position: FixedVec2 },
    /// Take a body out of the world
    RemoveBody(EntityRef),
    /// Put a removed body back
    RestoreBody(EntityRef),
    /// Return a rock to its spawn
    ResetRock { id: EntityId, position: FixedVec2, velocity: FixedVec2 },
}

/// Position and velocity of a body.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BodyState {
    pub position: FixedVec2,
    pub velocity: FixedVec2,
}

/// The physics engine as the core sees it.
pub trait PhysicsWorld {
    /// Advance by `dt`, invoking `listener` for every contact event.
    fn step(&mut self, dt: Fixed, listener: &mut dyn ContactListener);

    /// Current state of a body still in the world.
    fn body(&self, entity: EntityRef) -> Option<BodyState>;

    /// Apply a post-step mutation.
    fn apply(&mut self, command: &WorldCommand);

    /// Player body state.
    fn player_body(&self) -> BodyState {
        self.body(EntityRef::Player).unwrap_or_default()
    }
}

// =============================================================================
// SCRIPTED WORLD
// =============================================================================

/// Callback kind in a scripted step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContactPhase {
    Begin,
    PreSolve,
    End,
}

/// One scripted callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScriptedEvent {
    pub phase: ContactPhase,
    pub contact: Contact,
}

impl ScriptedEvent {
    pub fn begin(a: FixtureTag, b: FixtureTag) -> Self {
        Self { phase: ContactPhase::Begin, contact: Contact::between(a, b) }
    }

    pub fn pre_solve(a: FixtureTag, b: FixtureTag) -> Self {
        Self { phase: ContactPhase::PreSolve, contact: Contact::between(a, b) }
    }

    pub fn end(a: FixtureTag, b: FixtureTag) -> Self {
        Self { phase: ContactPhase::End, contact: Contact::between(a, b) }
    }
}

/// Deterministic stand-in engine driven by a contact script.
#[derive(Clone, Debug, Default)]
pub struct ScriptedWorld {
    bodies: BTreeMap<EntityRef, BodyState>,
    removed: BTreeSet<EntityRef>,
    script: VecDeque<Vec<ScriptedEvent>>,
    gravity: Fixed,
    disabled: Vec<Contact>,
    applied: Vec<WorldCommand>,
    steps: u32,
}

impl ScriptedWorld {
    /// Empty world without gravity.
    pub fn new() -> Self {
        Self::default()
    }

    /// Downward acceleration applied to the player and rocks.
    pub fn with_gravity(mut self, gravity: Fixed) -> Self {
        self.gravity = gravity;
        self
    }

    /// Add or replace a body.
    pub fn set_body(&mut self, entity: EntityRef, position: FixedVec2, velocity: FixedVec2) {
        self.bodies.insert(entity, BodyState { position, velocity });
    }

    /// Queue the callbacks for the next unscripted step.
    pub fn queue_step(&mut self, events: Vec<ScriptedEvent>) {
        self.script.push_back(events);
    }

    /// Queue `count` steps without callbacks.
    pub fn queue_idle(&mut self, count: usize) {
        for _ in 0..count {
            self.script.push_back(Vec::new());
        }
    }

    /// Steps taken so far.
    pub fn steps(&self) -> u32 {
        self.steps
    }

    /// Whether `entity` was removed.
    pub fn is_removed(&self, entity: EntityRef) -> bool {
        self.removed.contains(&entity)
    }

    /// Commands applied so far, in order.
    pub fn applied(&self) -> &[WorldCommand] {
        &self.applied
    }

    /// Contacts the listener disabled in `pre_solve`.
    pub fn take_disabled(&mut self) -> Vec<Contact> {
        std::mem::take(&mut self.disabled)
    }

    fn refresh(&self, fixture: &mut Fixture) {
        if let Some(body) = fixture.tag.and_then(|t| self.bodies.get(&t.entity)) {
            fixture.position = body.position;
            fixture.velocity = body.velocity;
        }
    }

    fn integrate(&mut self, dt: Fixed) {
        for (entity, body) in self.bodies.iter_mut() {
            if self.removed.contains(entity) {
                continue;
            }
            if matches!(entity, EntityRef::Player | EntityRef::Rock(_)) {
                body.velocity.y = body.velocity.y.wrapping_sub(fixed_mul(self.gravity, dt));
            }
            body.position = body.position + body.velocity.scale(dt);
        }
    }
}

impl PhysicsWorld for ScriptedWorld {
    fn step(&mut self, dt: Fixed, listener: &mut dyn ContactListener) {
        self.steps += 1;
        self.integrate(dt);

        let events = self.script.pop_front().unwrap_or_default();
        for event in events {
            let mut contact = event.contact;
            if self.removed.iter().any(|&e| contact.involves(e)) {
                trace!("Dropping scripted contact with removed body");
                continue;
            }
            self.refresh(&mut contact.a);
            self.refresh(&mut contact.b);

            match event.phase {
                ContactPhase::Begin => listener.begin_contact(&contact),
                ContactPhase::PreSolve => {
                    listener.pre_solve(&mut contact);
                    if !contact.is_enabled() {
                        self.disabled.push(contact);
                    }
                }
                ContactPhase::End => listener.end_contact(&contact),
            }
        }
    }

    fn body(&self, entity: EntityRef) -> Option<BodyState> {
        if self.removed.contains(&entity) {
            return None;
        }
        self.bodies.get(&entity).copied()
    }

    fn apply(&mut self, command: &WorldCommand) {
        self.applied.push(*command);

        match *command {
            WorldCommand::SetPlayerVelocity(v) => {
                self.bodies.entry(EntityRef::Player).or_default().velocity = v;
            }
            WorldCommand::ApplyPlayerImpulse(impulse) => {
                let body = self.bodies.entry(EntityRef::Player).or_default();
                body.velocity = body.velocity + impulse;
            }
            WorldCommand::TranslatePlayer(delta) => {
                let body = self.bodies.entry(EntityRef::Player).or_default();
                body.position = body.position + delta;
            }
            WorldCommand::TeleportPlayer(position) => {
                self.bodies.insert(EntityRef::Player, BodyState { position, velocity: FixedVec2::ZERO });
            }
            WorldCommand::MoveBody { entity, position } => {
                self.bodies.entry(entity).or_default().position = position;
            }
            WorldCommand::RemoveBody(entity) => {
                self.removed.insert(entity);
            }
            WorldCommand::RestoreBody(entity) => {
                self.removed.remove(&entity);
            }
            WorldCommand::ResetRock { id, position, velocity } => {
                self.bodies.insert(EntityRef::Rock(id), BodyState { position, velocity });
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fixed::{to_fixed, FIXED_ONE, TICK_DURATION};

    #[derive(Default)]
    struct Recorder {
        log: Vec<(ContactPhase, Contact)>,
        disable_all: bool,
    }

    impl ContactListener for Recorder {
        fn begin_contact(&mut self, contact: &Contact) {
            self.log.push((ContactPhase::Begin, *contact));
        }
        fn pre_solve(&mut self, contact: &mut Contact) {
            if self.disable_all {
                contact.set_enabled(false);
            }
            self.log.push((ContactPhase::PreSolve, *contact));
        }
        fn end_contact(&mut self, contact: &Contact) {
            self.log.push((ContactPhase::End, *contact));
        }
    }

    const PLATFORM: EntityRef = EntityRef::Obstacle(3);

    #[test]
    fn test_script_replayed_in_order() {
        let mut world = ScriptedWorld::new();
        world.set_body(EntityRef::Player, FixedVec2::from_ints(1, 2), FixedVec2::ZERO);
        world.queue_step(vec![
            ScriptedEvent::begin(FixtureTag::player_feet(), FixtureTag::body(PLATFORM)),
            ScriptedEvent::pre_solve(FixtureTag::player_body(), FixtureTag::body(PLATFORM)),
        ]);
        world.queue_step(vec![ScriptedEvent::end(FixtureTag::player_feet(), FixtureTag::body(PLATFORM))]);

        let mut rec = Recorder::default();
        world.step(TICK_DURATION, &mut rec);
        world.step(TICK_DURATION, &mut rec);
        world.step(TICK_DURATION, &mut rec);

        let phases: Vec<ContactPhase> = rec.log.iter().map(|(p, _)| *p).collect();
        assert_eq!(phases, vec![ContactPhase::Begin, ContactPhase::PreSolve, ContactPhase::End]);
        assert_eq!(rec.log[0].1.a.position, FixedVec2::from_ints(1, 2), "live body position filled in");
        assert_eq!(world.steps(), 3);
    }

    #[test]
    fn test_disabled_contacts_recorded() {
        let mut world = ScriptedWorld::new();
        world.queue_step(vec![ScriptedEvent::pre_solve(FixtureTag::player_body(), FixtureTag::body(PLATFORM))]);

        let mut rec = Recorder { disable_all: true, ..Default::default() };
        world.step(TICK_DURATION, &mut rec);
        assert_eq!(world.take_disabled().len(), 1);
        assert!(world.take_disabled().is_empty());
    }

    #[test]
    fn test_removed_bodies_drop_contacts() {
        let mut world = ScriptedWorld::new();
        world.set_body(PLATFORM, FixedVec2::ZERO, FixedVec2::ZERO);
        world.apply(&WorldCommand::RemoveBody(PLATFORM));
        world.queue_step(vec![ScriptedEvent::begin(FixtureTag::player_feet(), FixtureTag::body(PLATFORM))]);

        let mut rec = Recorder::default();
        world.step(TICK_DURATION, &mut rec);
        assert!(rec.log.is_empty());
        assert!(world.body(PLATFORM).is_none());

        world.apply(&WorldCommand::RestoreBody(PLATFORM));
        assert!(world.body(PLATFORM).is_some());
    }

    #[test]
    fn test_player_commands() {
        let mut world = ScriptedWorld::new();
        world.apply(&WorldCommand::TeleportPlayer(FixedVec2::from_ints(4, 4)));
        world.apply(&WorldCommand::SetPlayerVelocity(FixedVec2::from_ints(1, 0)));
        world.apply(&WorldCommand::ApplyPlayerImpulse(FixedVec2::from_ints(0, 2)));
        world.apply(&WorldCommand::TranslatePlayer(FixedVec2::from_ints(1, 0)));

        let body = world.player_body();
        assert_eq!(body.position, FixedVec2::from_ints(5, 4));
        assert_eq!(body.velocity, FixedVec2::from_ints(1, 2));
        assert_eq!(world.applied().len(), 4);
    }

    #[test]
    fn test_integration_and_gravity() {
        let mut world = ScriptedWorld::new().with_gravity(to_fixed(60.0));
        world.set_body(EntityRef::Player, FixedVec2::ZERO, FixedVec2::ZERO);
        world.set_body(PLATFORM, FixedVec2::ZERO, FixedVec2::new(FIXED_ONE * 60, 0));

        let mut rec = Recorder::default();
        world.step(TICK_DURATION, &mut rec);

        assert!(world.player_body().velocity.y < 0, "player falls");
        let platform = world.body(PLATFORM).unwrap();
        assert_eq!(platform.velocity.y, 0, "platforms ignore gravity");
        assert!(platform.position.x > 0);
    }

    #[test]
    fn test_contact_involves() {
        let c = Contact::untagged(Some(FixtureTag::player_body()), None);
        assert!(c.involves(EntityRef::Player));
        assert!(!c.involves(EntityRef::Goal));
    }
}
