//! Room lifecycle and the per-room tick state machine.
//!
//! A room is an independent ticked world: it seeds a population of moving
//! entities, advances them at 1 Hz, keeps the population inside its bounds,
//! and reports every visible change as a [`RoomEvent`] that the server
//! translates into push messages. Rooms shard by capacity: entering players
//! land in the first non-full room of the requested kind, and a new shard is
//! created when every existing one is full.
//!
//! All mutable room state lives behind one async mutex. Wager processing
//! holds that lock for the entire resolver call, so bets within a room are
//! serialized while bets across rooms run in parallel.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::Instant;
use uuid::Uuid;

use crate::game::animal::generator::{Generator, SpawnPlan};
use crate::game::animal::paths::{path_table, Path};
use crate::game::animal::types::AnimalKind;
use crate::proto;

/// Population floor that forces immediate refills.
pub const POPULATION_MIN: usize = 18;
/// Population level below which slow probabilistic spawning applies.
pub const POPULATION_SOFT: usize = 20;
/// Population ceiling; the oldest entity is evicted above it.
pub const POPULATION_MAX: usize = 22;
/// Probability of a slow spawn per tick when below the soft level.
const SLOW_SPAWN_PROB: f64 = 0.10;
/// Cooldown between slow spawns.
const SLOW_SPAWN_COOLDOWN: Duration = Duration::from_secs(2);
/// A room with no members for this long is destroyed.
const ROOM_IDLE_TTL: Duration = Duration::from_secs(60);

/// The room kinds a client can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoomKind {
    Free,
    Civilian,
    Petty,
    Rich,
    Gold,
    Diamond,
    Single,
}

impl RoomKind {
    pub fn from_wire(value: i32) -> Option<Self> {
        match value {
            0 => Some(RoomKind::Free),
            1 => Some(RoomKind::Civilian),
            2 => Some(RoomKind::Petty),
            3 => Some(RoomKind::Rich),
            4 => Some(RoomKind::Gold),
            5 => Some(RoomKind::Diamond),
            6 => Some(RoomKind::Single),
            _ => None,
        }
    }

    pub fn to_wire(self) -> i32 {
        match self {
            RoomKind::Free => 0,
            RoomKind::Civilian => 1,
            RoomKind::Petty => 2,
            RoomKind::Rich => 3,
            RoomKind::Gold => 4,
            RoomKind::Diamond => 5,
            RoomKind::Single => 6,
        }
    }

    pub const ALL: [RoomKind; 7] = [
        RoomKind::Free,
        RoomKind::Civilian,
        RoomKind::Petty,
        RoomKind::Rich,
        RoomKind::Gold,
        RoomKind::Diamond,
        RoomKind::Single,
    ];

    /// Bet tiers offered in rooms of this kind.
    pub fn bet_values(self) -> &'static [i64] {
        match self {
            RoomKind::Free => &[0, 10, 20, 50],
            RoomKind::Civilian => &[100, 200, 500, 1000],
            RoomKind::Petty => &[1000, 2000, 5000],
            RoomKind::Rich => &[5000, 10_000, 20_000],
            RoomKind::Gold => &[10_000, 20_000, 50_000],
            RoomKind::Diamond => &[50_000, 100_000, 200_000],
            RoomKind::Single => &[100, 500, 1000],
        }
    }

    pub fn min_vip(self) -> u8 {
        match self {
            RoomKind::Free | RoomKind::Civilian | RoomKind::Single => 0,
            RoomKind::Petty => 1,
            RoomKind::Rich => 2,
            RoomKind::Gold => 3,
            RoomKind::Diamond => 5,
        }
    }

    /// Member capacity per shard. Isolated-match kinds stay tiny.
    pub fn capacity(self) -> usize {
        match self {
            RoomKind::Free => 100,
            RoomKind::Civilian | RoomKind::Petty => 50,
            RoomKind::Rich | RoomKind::Gold | RoomKind::Diamond => 20,
            RoomKind::Single => 4,
        }
    }
}

/// Whether an entity currently moves and can be frozen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityState {
    Normal,
    Frozen,
}

/// One moving target.
#[derive(Debug, Clone)]
pub struct Entity {
    pub id: u32,
    pub kind: AnimalKind,
    pub path_id: u32,
    /// Canonical position along the path, in [0, 1].
    pub progress: f64,
    /// Progress advanced per second.
    pub progress_rate: f64,
    pub state: EntityState,
    pub freeze_until: Option<Instant>,
    /// Player holding an aim lock on this entity.
    pub lock_holder: Option<u64>,
    pub hp: i32,
    /// Multiplier applied on top of the sampled odds.
    pub odds_boost: f64,
    pub has_red_bag: bool,
    pub spawned_at: Instant,
}

impl Entity {
    pub fn to_wire(&self, paths: &[Path]) -> proto::AnimalInfo {
        let path = &paths[(self.path_id - 1) as usize];
        let stats = self.kind.stats();
        proto::AnimalInfo {
            id: self.id,
            kind: self.kind as i32,
            path_id: self.path_id,
            point: path.point_index(self.progress),
            state: match self.state {
                EntityState::Normal => 0,
                EntityState::Frozen => 1,
            },
            red_bag: self.has_red_bag,
            odds: stats.max_odds,
        }
    }

    /// Facing angle in radians from the path tangent.
    pub fn facing(&self, paths: &[Path]) -> f64 {
        paths[(self.path_id - 1) as usize].facing_at(self.progress)
    }
}

/// A spawn waiting out its pre-announce countdown.
#[derive(Debug, Clone)]
struct PendingSpawn {
    plan: SpawnPlan,
    due: Instant,
}

/// Visible changes produced by a tick or a member operation. The server
/// translates these into push messages for the room's members.
#[derive(Debug, Clone)]
pub enum RoomEvent {
    EntityEntered(proto::AnimalInfo),
    EntityLeft(u32),
    EntityComing { kind: AnimalKind, countdown_secs: u32 },
}

/// Mutable state of one room, guarded by the room's mutex.
pub struct RoomState {
    pub entities: HashMap<u32, Entity>,
    next_entity_id: u32,
    pub members: HashSet<Uuid>,
    pending: Vec<PendingSpawn>,
    last_slow_spawn: Option<Instant>,
    /// Total wagered in this room (P).
    pub total_wagered: i64,
    /// Total paid out in this room (W).
    pub total_paid: i64,
    /// Players whose next bet is forced to hit.
    pub one_blow: HashSet<u64>,
    /// Room-wide freeze expiry from an ice skill.
    pub frozen_until: Option<Instant>,
    pub red_bag_active: bool,
    pub last_activity: Instant,
    pub rng: StdRng,
    generator: Generator,
}

impl RoomState {
    fn new(generator: Generator, red_bag_active: bool, rng: StdRng) -> Self {
        Self {
            entities: HashMap::new(),
            next_entity_id: 0,
            members: HashSet::new(),
            pending: Vec::new(),
            last_slow_spawn: None,
            total_wagered: 0,
            total_paid: 0,
            one_blow: HashSet::new(),
            frozen_until: None,
            red_bag_active,
            last_activity: Instant::now(),
            rng,
            generator,
        }
    }

    /// Bare state for unit tests in sibling modules.
    #[doc(hidden)]
    pub fn for_tests(generator: Generator, rng: StdRng) -> Self {
        Self::new(generator, false, rng)
    }

    fn next_id(&mut self) -> u32 {
        self.next_entity_id += 1;
        self.next_entity_id
    }

    /// Net payout imbalance used by profit control: W - P.
    pub fn profit_imbalance(&self) -> i64 {
        self.total_paid - self.total_wagered
    }

    /// Seconds left on the room-wide freeze, for the enter response.
    pub fn freeze_remaining_secs(&self, now: Instant) -> u32 {
        match self.frozen_until {
            Some(until) if until > now => (until - now).as_secs() as u32,
            _ => 0,
        }
    }

    fn population(&self) -> usize {
        self.entities.len() + self.pending.len()
    }

    fn materialize(&mut self, plan: SpawnPlan, paths: &[Path], now: Instant) -> proto::AnimalInfo {
        let path = &paths[(plan.path_id - 1) as usize];
        let length = path.length();
        let id = self.next_id();
        let entity = Entity {
            id,
            kind: plan.kind,
            path_id: plan.path_id,
            progress: 0.0,
            progress_rate: if length > 0.0 { plan.speed / length } else { 0.0 },
            state: if self
                .frozen_until
                .map(|until| until > now)
                .unwrap_or(false)
            {
                EntityState::Frozen
            } else {
                EntityState::Normal
            },
            freeze_until: self.frozen_until,
            lock_holder: None,
            hp: plan.hp,
            odds_boost: 1.0,
            has_red_bag: plan.has_red_bag,
            spawned_at: now,
        };
        let info = entity.to_wire(paths);
        self.entities.insert(id, entity);
        info
    }

    /// Queue one sampled spawn, honoring per-kind pre-announce delays.
    fn spawn_one(&mut self, paths: &[Path], now: Instant, events: &mut Vec<RoomEvent>) {
        let present: Vec<AnimalKind> = self.entities.values().map(|e| e.kind).collect();
        let kind = self.generator.select_excluding(&mut self.rng, &present);
        self.spawn_kind(kind, paths, now, events);
    }

    fn spawn_kind(
        &mut self,
        kind: AnimalKind,
        paths: &[Path],
        now: Instant,
        events: &mut Vec<RoomEvent>,
    ) {
        let plan = self.generator.plan(&mut self.rng, kind);
        let delay = kind.spawn_delay_secs();
        if delay > 0 {
            events.push(RoomEvent::EntityComing {
                kind,
                countdown_secs: delay as u32,
            });
            self.pending.push(PendingSpawn {
                plan,
                due: now + Duration::from_secs(delay),
            });
        } else {
            let info = self.materialize(plan, paths, now);
            events.push(RoomEvent::EntityEntered(info));
        }
    }

    /// Replacement spawn of the same kind after a kill, per population rule.
    pub fn respawn_kind(
        &mut self,
        kind: AnimalKind,
        paths: &[Path],
        now: Instant,
    ) -> Vec<RoomEvent> {
        let mut events = Vec::new();
        if self.population() < POPULATION_MAX {
            self.spawn_kind(kind, paths, now, &mut events);
        }
        events
    }

    /// One tick: advance motion, expire leavers, release due pending spawns,
    /// and maintain the population bounds.
    pub fn tick(&mut self, dt: f64, paths: &[Path], now: Instant) -> Vec<RoomEvent> {
        let mut events = Vec::new();

        // Thaw entities whose freeze has lapsed.
        if let Some(until) = self.frozen_until {
            if until <= now {
                self.frozen_until = None;
            }
        }
        for entity in self.entities.values_mut() {
            if entity.state == EntityState::Frozen {
                match entity.freeze_until {
                    Some(until) if until > now => {}
                    _ => {
                        entity.state = EntityState::Normal;
                        entity.freeze_until = None;
                    }
                }
            }
        }

        // Advance progress; frozen entities skip.
        for entity in self.entities.values_mut() {
            if entity.state == EntityState::Normal {
                entity.progress += entity.progress_rate * dt;
            }
        }

        // Entities that completed their path leave the scene.
        let finished: Vec<u32> = self
            .entities
            .values()
            .filter(|e| e.progress >= 1.0)
            .map(|e| e.id)
            .collect();
        for id in finished {
            self.entities.remove(&id);
            events.push(RoomEvent::EntityLeft(id));
        }

        // Release pending spawns whose countdown elapsed.
        let due: Vec<SpawnPlan> = {
            let mut due = Vec::new();
            self.pending.retain(|p| {
                if p.due <= now {
                    due.push(p.plan.clone());
                    false
                } else {
                    true
                }
            });
            due
        };
        for plan in due {
            let info = self.materialize(plan, paths, now);
            events.push(RoomEvent::EntityEntered(info));
        }

        self.maintain_population(paths, now, &mut events);
        events
    }

    fn maintain_population(
        &mut self,
        paths: &[Path],
        now: Instant,
        events: &mut Vec<RoomEvent>,
    ) {
        if self.population() < POPULATION_MIN {
            while self.population() < POPULATION_MIN {
                self.spawn_one(paths, now, events);
            }
        } else if self.population() < POPULATION_SOFT {
            let cooled = self
                .last_slow_spawn
                .map(|at| now - at >= SLOW_SPAWN_COOLDOWN)
                .unwrap_or(true);
            if cooled && self.rng.gen::<f64>() < SLOW_SPAWN_PROB {
                self.spawn_one(paths, now, events);
                self.last_slow_spawn = Some(now);
            }
        }
        while self.population() > POPULATION_MAX {
            let oldest = self
                .entities
                .values()
                .min_by_key(|e| e.spawned_at)
                .map(|e| e.id);
            match oldest {
                Some(id) => {
                    self.entities.remove(&id);
                    events.push(RoomEvent::EntityLeft(id));
                }
                None => break,
            }
        }
    }

    /// Freeze every entity for `secs`. Returns the new expiry.
    pub fn freeze_all(&mut self, secs: u64, now: Instant) -> Instant {
        let until = now + Duration::from_secs(secs);
        self.frozen_until = Some(until);
        for entity in self.entities.values_mut() {
            entity.state = EntityState::Frozen;
            entity.freeze_until = Some(until);
        }
        until
    }

    /// Wire snapshots of all live entities, for the enter response.
    pub fn entities_wire(&self, paths: &[Path]) -> Vec<proto::AnimalInfo> {
        let mut list: Vec<proto::AnimalInfo> =
            self.entities.values().map(|e| e.to_wire(paths)).collect();
        list.sort_by_key(|a| a.id);
        list
    }
}

/// One live room shard.
pub struct Room {
    pub id: u32,
    pub kind: RoomKind,
    pub state: Mutex<RoomState>,
    shutdown: watch::Sender<bool>,
}

impl Room {
    /// Stop the tick task. Pending spawn timers die with the state.
    pub fn shut_down(&self) {
        let _ = self.shutdown.send(true);
    }
}

/// Capacity-sharded registry of live rooms, and owner of their tick tasks.
pub struct RoomManager {
    rooms: Mutex<HashMap<u32, Arc<Room>>>,
    next_room_id: AtomicU32,
    paths: Arc<Vec<Path>>,
    red_bag_enabled: bool,
    events_tx: mpsc::UnboundedSender<(u32, RoomEvent)>,
    shutdown: watch::Receiver<bool>,
}

impl RoomManager {
    pub fn new(
        red_bag_enabled: bool,
        events_tx: mpsc::UnboundedSender<(u32, RoomEvent)>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
            next_room_id: AtomicU32::new(1),
            paths: Arc::new(path_table()),
            red_bag_enabled,
            events_tx,
            shutdown,
        }
    }

    pub fn paths(&self) -> Arc<Vec<Path>> {
        self.paths.clone()
    }

    pub async fn get(&self, room_id: u32) -> Option<Arc<Room>> {
        self.rooms.lock().await.get(&room_id).cloned()
    }

    pub async fn room_ids(&self) -> Vec<u32> {
        self.rooms.lock().await.keys().copied().collect()
    }

    /// Occupancy per kind for the room catalog.
    pub async fn occupancy(&self) -> HashMap<RoomKind, usize> {
        let rooms = self.rooms.lock().await;
        let mut out = HashMap::new();
        for room in rooms.values() {
            let members = room.state.lock().await.members.len();
            *out.entry(room.kind).or_insert(0) += members;
        }
        out
    }

    /// Return the first non-full room of `kind`, creating a new shard when
    /// every existing one is full.
    pub async fn find_or_create(&self, kind: RoomKind) -> Arc<Room> {
        let mut rooms = self.rooms.lock().await;
        for room in rooms.values() {
            if room.kind == kind {
                let state = room.state.lock().await;
                if state.members.len() < kind.capacity() {
                    return room.clone();
                }
            }
        }

        let id = self.next_room_id.fetch_add(1, Ordering::Relaxed);
        let (room_shutdown_tx, room_shutdown_rx) = watch::channel(false);
        let mut state = RoomState::new(
            Generator::new(self.red_bag_enabled),
            self.red_bag_enabled,
            StdRng::from_entropy(),
        );
        // Seed the starting population before the first tick.
        let now = Instant::now();
        let mut seed_events = Vec::new();
        while state.population() < POPULATION_SOFT {
            state.spawn_one(&self.paths, now, &mut seed_events);
        }
        let room = Arc::new(Room {
            id,
            kind,
            state: Mutex::new(state),
            shutdown: room_shutdown_tx,
        });
        rooms.insert(id, room.clone());
        info!("created room {} ({:?})", id, kind);

        self.spawn_tick_task(room.clone(), room_shutdown_rx);
        room
    }

    fn spawn_tick_task(&self, room: Arc<Room>, mut room_shutdown: watch::Receiver<bool>) {
        let paths = self.paths.clone();
        let events_tx = self.events_tx.clone();
        let mut server_shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(1));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            let mut last = Instant::now();
            loop {
                tokio::select! {
                    tick_at = ticker.tick() => {
                        let dt = (tick_at - last).as_secs_f64();
                        last = tick_at;
                        let events = {
                            let mut state = room.state.lock().await;
                            state.tick(dt, &paths, tick_at)
                        };
                        for event in events {
                            if events_tx.send((room.id, event)).is_err() {
                                return;
                            }
                        }
                    }
                    changed = room_shutdown.changed() => {
                        if changed.is_err() || *room_shutdown.borrow() {
                            debug!("room {} tick task stopped", room.id);
                            return;
                        }
                    }
                    changed = server_shutdown.changed() => {
                        if changed.is_err() || *server_shutdown.borrow() {
                            return;
                        }
                    }
                }
            }
        });
    }

    /// Drop rooms that have sat empty past their idle TTL. Called from the
    /// server's periodic sweep.
    pub async fn sweep_idle(&self) {
        let now = Instant::now();
        let mut rooms = self.rooms.lock().await;
        let mut dead = Vec::new();
        for (id, room) in rooms.iter() {
            let state = room.state.lock().await;
            if state.members.is_empty() && now - state.last_activity >= ROOM_IDLE_TTL {
                dead.push(*id);
            }
        }
        for id in dead {
            if let Some(room) = rooms.remove(&id) {
                room.shut_down();
                info!("destroyed idle room {}", id);
            }
        }
    }

    /// Stop every room's tick task, for server shutdown.
    pub async fn shutdown_all(&self) {
        let rooms = self.rooms.lock().await;
        for room in rooms.values() {
            room.shut_down();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_state(seed: u64) -> (RoomState, Vec<Path>) {
        let state = RoomState::new(Generator::new(false), false, StdRng::seed_from_u64(seed));
        (state, path_table())
    }

    fn seed_population(state: &mut RoomState, paths: &[Path], now: Instant) {
        let mut events = Vec::new();
        while state.population() < POPULATION_SOFT {
            state.spawn_one(paths, now, &mut events);
        }
    }

    #[test]
    fn seeding_reaches_twenty() {
        let (mut state, paths) = test_state(1);
        let now = Instant::now();
        seed_population(&mut state, &paths, now);
        assert_eq!(state.population(), POPULATION_SOFT);
    }

    #[test]
    fn population_bounds_hold_over_many_ticks() {
        let (mut state, paths) = test_state(2);
        let mut now = Instant::now();
        seed_population(&mut state, &paths, now);
        for _ in 0..300 {
            now += Duration::from_secs(1);
            state.tick(1.0, &paths, now);
            let n = state.population();
            assert!(
                (POPULATION_MIN..=POPULATION_MAX).contains(&n),
                "population {} out of bounds",
                n
            );
        }
    }

    #[test]
    fn entity_ids_are_unique_and_stable() {
        let (mut state, paths) = test_state(3);
        let mut now = Instant::now();
        seed_population(&mut state, &paths, now);
        for _ in 0..100 {
            now += Duration::from_secs(1);
            state.tick(1.0, &paths, now);
            for (id, entity) in &state.entities {
                assert_eq!(*id, entity.id);
            }
        }
    }

    #[test]
    fn frozen_entities_do_not_advance() {
        let (mut state, paths) = test_state(4);
        let now = Instant::now();
        seed_population(&mut state, &paths, now);
        state.freeze_all(10, now);
        let before: HashMap<u32, f64> = state
            .entities
            .iter()
            .map(|(id, e)| (*id, e.progress))
            .collect();
        state.tick(1.0, &paths, now + Duration::from_secs(1));
        for (id, entity) in &state.entities {
            if let Some(prev) = before.get(id) {
                assert_eq!(entity.progress, *prev, "frozen entity {} moved", id);
            }
        }
    }

    #[test]
    fn freeze_expires_and_motion_resumes() {
        let (mut state, paths) = test_state(5);
        let now = Instant::now();
        seed_population(&mut state, &paths, now);
        state.freeze_all(2, now);
        let later = now + Duration::from_secs(3);
        state.tick(1.0, &paths, later);
        assert!(state
            .entities
            .values()
            .all(|e| e.state == EntityState::Normal));
        assert_eq!(state.freeze_remaining_secs(later), 0);
    }

    #[test]
    fn finished_entities_leave() {
        let (mut state, paths) = test_state(6);
        let now = Instant::now();
        seed_population(&mut state, &paths, now);
        // Push one entity to the end of its path by hand.
        let id = *state.entities.keys().next().unwrap();
        state.entities.get_mut(&id).unwrap().progress = 1.5;
        let events = state.tick(0.0, &paths, now);
        assert!(events
            .iter()
            .any(|e| matches!(e, RoomEvent::EntityLeft(left) if *left == id)));
        assert!(!state.entities.contains_key(&id));
    }

    #[test]
    fn delayed_kind_is_preannounced_then_spawned() {
        let (mut state, paths) = test_state(7);
        let now = Instant::now();
        let mut events = Vec::new();
        state.spawn_kind(AnimalKind::Elephant, &paths, now, &mut events);
        assert!(matches!(
            events[0],
            RoomEvent::EntityComing {
                kind: AnimalKind::Elephant,
                countdown_secs: 5
            }
        ));
        assert!(state.entities.is_empty());
        assert_eq!(state.pending.len(), 1);

        let events = state.tick(1.0, &paths, now + Duration::from_secs(6));
        assert!(events.iter().any(|e| matches!(
            e,
            RoomEvent::EntityEntered(info) if info.kind == AnimalKind::Elephant as i32
        )));
        assert!(state
            .entities
            .values()
            .any(|e| e.kind == AnimalKind::Elephant));
    }

    #[test]
    fn respawn_matches_killed_kind() {
        let (mut state, paths) = test_state(8);
        let now = Instant::now();
        seed_population(&mut state, &paths, now);
        let id = *state.entities.keys().next().unwrap();
        let kind = state.entities[&id].kind;
        state.entities.remove(&id);
        let events = state.respawn_kind(kind, &paths, now);
        if kind.spawn_delay_secs() == 0 {
            assert!(events.iter().any(|e| matches!(
                e,
                RoomEvent::EntityEntered(info) if info.kind == kind as i32
            )));
        } else {
            assert!(matches!(events[0], RoomEvent::EntityComing { .. }));
        }
    }

    #[tokio::test]
    async fn find_or_create_shards_by_capacity() {
        let (events_tx, _events_rx) = mpsc::unbounded_channel();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let manager = RoomManager::new(false, events_tx, shutdown_rx);

        let first = manager.find_or_create(RoomKind::Single).await;
        // Fill the single-kind shard to its capacity of 4.
        {
            let mut state = first.state.lock().await;
            for _ in 0..RoomKind::Single.capacity() {
                state.members.insert(Uuid::new_v4());
            }
        }
        let second = manager.find_or_create(RoomKind::Single).await;
        assert_ne!(first.id, second.id);

        // A different kind gets its own room even while others exist.
        let free = manager.find_or_create(RoomKind::Free).await;
        assert_ne!(free.id, second.id);
        assert_eq!(free.kind, RoomKind::Free);
    }

    #[tokio::test]
    async fn vacant_room_is_reused() {
        let (events_tx, _events_rx) = mpsc::unbounded_channel();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let manager = RoomManager::new(false, events_tx, shutdown_rx);

        let first = manager.find_or_create(RoomKind::Free).await;
        let again = manager.find_or_create(RoomKind::Free).await;
        assert_eq!(first.id, again.id);
    }
}
