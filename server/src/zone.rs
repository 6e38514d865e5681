//! Map partition simulation
//!
//! A zone owns one bounded region of the world and everything inside it:
//! - The players currently standing in the region
//! - Monsters, ground items and projectiles
//! - Static portals and NPCs from the zone configuration
//!
//! Each zone has its own exclusive lock and its tick runs the sub-steps
//! in a fixed order: projectile advance, ground-item expiry, monster AI,
//! auto-shoot, collision and loot resolution, item pickup, portal check,
//! snapshot broadcast. Portal crossings are never applied here: the tick
//! returns them as requests and the registry applies them after the zone
//! lock is released, so no path ever holds two locks at once.

use crate::entity::{dist_sq, separate_monsters, GroundItem, Monster, Projectile};
use crate::game::IdGen;
use crate::loot::{random_element, roll_loot};
use crate::player::Player;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::protocol::{
    MonsterView, PlayerView, PortalData, PortalView, ProjectileView, ServerMessage,
};
use shared::{
    ItemKind, BASE_ATTACK, GOLD_PICKUP_VALUE, ITEM_TTL_SECS, MAP_HEIGHT, MAP_WIDTH, MONSTER_CAP,
    MONSTER_SPAWN_MARGIN, MONSTER_SPEED, PICKUP_RANGE, PROJECTILE_HIT_RANGE_SQ, PROJECTILE_MARGIN,
    PROJECTILE_SPEED,
};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Static gateway to another zone. Portals hold the target zone's key,
/// not a reference; the registry resolves it when the crossing happens.
#[derive(Debug, Clone)]
pub struct Portal {
    pub id: u32,
    pub x: f32,
    pub y: f32,
    pub radius: f32,
    pub target_zone: String,
    pub target_x: f32,
    pub target_y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NpcKind {
    Shop,
}

/// Static NPC placed by zone configuration.
#[derive(Debug, Clone)]
pub struct Npc {
    pub id: u32,
    pub x: f32,
    pub y: f32,
    pub kind: NpcKind,
}

/// Everything needed to construct a zone, consumed once at startup.
#[derive(Debug, Clone)]
pub struct ZoneConfig {
    pub id: String,
    pub width: f32,
    pub height: f32,
    /// Safe zones never spawn monsters
    pub safe: bool,
    pub portals: Vec<Portal>,
    pub npcs: Vec<Npc>,
}

impl ZoneConfig {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            width: MAP_WIDTH,
            height: MAP_HEIGHT,
            safe: false,
            portals: Vec::new(),
            npcs: Vec::new(),
        }
    }
}

/// A portal crossing detected during a tick. The registry applies it
/// once the detecting zone's lock has been released.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionRequest {
    pub player: u32,
    pub target_zone: String,
    pub x: f32,
    pub y: f32,
}

/// One independently locked region of the world
pub struct Zone {
    pub id: String,
    pub width: f32,
    pub height: f32,
    pub safe: bool,
    pub portals: Vec<Portal>,
    pub npcs: Vec<Npc>,
    ids: Arc<IdGen>,
    state: Mutex<ZoneState>,
}

/// The mutable half of a zone, guarded by the zone lock
pub struct ZoneState {
    pub players: BTreeMap<u32, Player>,
    pub monsters: BTreeMap<u32, Monster>,
    pub items: BTreeMap<u32, GroundItem>,
    pub projectiles: BTreeMap<u32, Projectile>,
    rng: StdRng,
}

impl Zone {
    pub fn new(config: ZoneConfig, ids: Arc<IdGen>) -> Self {
        Self {
            id: config.id,
            width: config.width,
            height: config.height,
            safe: config.safe,
            portals: config.portals,
            npcs: config.npcs,
            ids,
            state: Mutex::new(ZoneState {
                players: BTreeMap::new(),
                monsters: BTreeMap::new(),
                items: BTreeMap::new(),
                projectiles: BTreeMap::new(),
                rng: StdRng::from_entropy(),
            }),
        }
    }

    /// Locks and returns the zone's mutable state.
    pub fn state(&self) -> MutexGuard<'_, ZoneState> {
        self.state.lock().expect("zone state lock poisoned")
    }

    /// Reseeds the zone's RNG for reproducible spawn and loot rolls.
    /// Intended for tests and diagnostics.
    pub fn seed_rng(&self, seed: u64) {
        self.state().rng = StdRng::seed_from_u64(seed);
    }

    /// Runs one simulation step and broadcasts the resulting snapshot
    /// to every occupant. Returns the portal crossings detected this
    /// tick; the caller applies them after this method returns.
    ///
    /// An empty zone still simulates (projectiles keep flying, items
    /// keep aging) but skips the snapshot.
    pub fn tick(&self, now: Instant) -> Vec<TransitionRequest> {
        let mut state = self.state();

        state.advance_projectiles(self.width, self.height);
        state.expire_items(now);
        state.drive_monsters(self.width, self.height);
        state.auto_shoot(now, &self.ids);
        state.resolve_collisions(now, &self.ids);
        state.collect_items();
        let transitions = state.check_portals(now, &self.portals);

        if !state.players.is_empty() {
            let snapshot = state.snapshot(&self.portals);
            broadcast(&state.players, &snapshot);
        }

        transitions
    }

    /// Places one monster at a random in-bounds position, up to the
    /// per-zone cap. Safe zones never spawn.
    pub fn spawn_monster(&self) {
        if self.safe {
            return;
        }

        let mut state = self.state();
        if state.monsters.len() >= MONSTER_CAP {
            return;
        }

        let x = MONSTER_SPAWN_MARGIN
            + state.rng.gen::<f32>() * (self.width - 2.0 * MONSTER_SPAWN_MARGIN);
        let y = MONSTER_SPAWN_MARGIN
            + state.rng.gen::<f32>() * (self.height - 2.0 * MONSTER_SPAWN_MARGIN);
        let element = random_element(&mut state.rng);

        let id = self.ids.next_monster();
        state.monsters.insert(id, Monster::new(id, x, y, element));
    }

    /// Attaches a player; the newcomer is sent the zone's current
    /// ground item layout.
    pub fn add_player(&self, player: Player) {
        let mut state = self.state();
        for ground in state.items.values() {
            player.outbox.send(ServerMessage::ItemSpawn {
                id: ground.item.id,
                item_type: ground.item.kind.code(),
                x: ground.x,
                y: ground.y,
            });
        }
        state.players.insert(player.id, player);
    }

    /// Detaches and returns a player; remaining occupants are told.
    /// Unknown ids return `None` without side effects.
    pub fn remove_player(&self, id: u32) -> Option<Player> {
        let mut state = self.state();
        let player = state.players.remove(&id)?;
        broadcast(&state.players, &ServerMessage::Leave { id });
        Some(player)
    }

    /// Portal layout as sent with a map switch.
    pub fn portal_data(&self) -> Vec<PortalData> {
        self.portals
            .iter()
            .map(|portal| PortalData {
                x: portal.x,
                y: portal.y,
                radius: portal.radius,
                target: portal.target_zone.clone(),
            })
            .collect()
    }
}

impl ZoneState {
    fn advance_projectiles(&mut self, width: f32, height: f32) {
        self.projectiles.retain(|_, proj| {
            proj.x += proj.vx * PROJECTILE_SPEED;
            proj.y += proj.vy * PROJECTILE_SPEED;

            proj.x >= -PROJECTILE_MARGIN
                && proj.x <= width + PROJECTILE_MARGIN
                && proj.y >= -PROJECTILE_MARGIN
                && proj.y <= height + PROJECTILE_MARGIN
        });
    }

    fn expire_items(&mut self, now: Instant) {
        let ttl = Duration::from_secs(ITEM_TTL_SECS);
        let expired: Vec<u32> = self
            .items
            .iter()
            .filter(|(_, ground)| now.duration_since(ground.spawned_at) > ttl)
            .map(|(id, _)| *id)
            .collect();

        for id in expired {
            self.items.remove(&id);
            broadcast(&self.players, &ServerMessage::ItemRemove { id });
        }
    }

    fn drive_monsters(&mut self, width: f32, height: f32) {
        // Monsters idle while the zone has no occupants
        if self.players.is_empty() {
            return;
        }

        for monster in self.monsters.values_mut() {
            let mut nearest: Option<(f32, f32, f32)> = None;
            for player in self.players.values() {
                let d = dist_sq(monster.x, monster.y, player.x, player.y);
                let closer = match nearest {
                    Some((best, _, _)) => d < best,
                    None => true,
                };
                if closer {
                    nearest = Some((d, player.x, player.y));
                }
            }

            if let Some((d, px, py)) = nearest {
                let distance = d.sqrt();
                if distance > f32::EPSILON {
                    // Step toward the target without overshooting it
                    let step = MONSTER_SPEED.min(distance);
                    monster.x += (px - monster.x) / distance * step;
                    monster.y += (py - monster.y) / distance * step;
                }
            }
        }

        // Pairwise separation so monsters do not stack on one spot
        let ids: Vec<u32> = self.monsters.keys().cloned().collect();
        for i in 0..ids.len() {
            for j in (i + 1)..ids.len() {
                if let (Some(a), Some(b)) = (
                    self.monsters.get(&ids[i]).cloned(),
                    self.monsters.get(&ids[j]).cloned(),
                ) {
                    let mut a = a;
                    let mut b = b;
                    separate_monsters(&mut a, &mut b);
                    self.monsters.insert(ids[i], a);
                    self.monsters.insert(ids[j], b);
                }
            }
        }

        for monster in self.monsters.values_mut() {
            monster.x = monster.x.clamp(0.0, width);
            monster.y = monster.y.clamp(0.0, height);
        }
    }

    fn auto_shoot(&mut self, now: Instant, ids: &IdGen) {
        let ZoneState {
            players,
            monsters,
            projectiles,
            ..
        } = self;

        for player in players.values_mut() {
            if !player.can_shoot(now) {
                continue;
            }

            // Nearest live monster; exact ties go to the lowest id
            // because the map iterates in id order and the comparison
            // is strict
            let mut nearest: Option<(f32, f32, f32)> = None;
            for monster in monsters.values() {
                let d = dist_sq(player.x, player.y, monster.x, monster.y);
                let closer = match nearest {
                    Some((best, _, _)) => d < best,
                    None => true,
                };
                if closer {
                    nearest = Some((d, monster.x, monster.y));
                }
            }

            // No target, no shot; the cooldown is not consumed
            let (d, target_x, target_y) = match nearest {
                Some(target) => target,
                None => continue,
            };

            let distance = d.sqrt();
            let (vx, vy) = if distance > f32::EPSILON {
                ((target_x - player.x) / distance, (target_y - player.y) / distance)
            } else {
                // Standing on the target: fire along the facing
                let len = (player.dir_x * player.dir_x + player.dir_y * player.dir_y).sqrt();
                if len > f32::EPSILON {
                    (player.dir_x / len, player.dir_y / len)
                } else {
                    (0.0, 1.0)
                }
            };

            player.last_shot = Some(now);
            let id = ids.next_projectile();
            projectiles.insert(
                id,
                Projectile {
                    id,
                    owner: player.id,
                    x: player.x,
                    y: player.y,
                    vx,
                    vy,
                    element: player.projectile_element(),
                },
            );
        }
    }

    fn resolve_collisions(&mut self, now: Instant, ids: &IdGen) {
        let ZoneState {
            players,
            monsters,
            items,
            projectiles,
            rng,
        } = self;

        let mut spent: Vec<u32> = Vec::new();
        let mut killed: Vec<u32> = Vec::new();

        for proj in projectiles.values() {
            for monster in monsters.values_mut() {
                // A monster that died earlier in this pass is no
                // longer a target
                if killed.contains(&monster.id) {
                    continue;
                }
                if dist_sq(proj.x, proj.y, monster.x, monster.y) >= PROJECTILE_HIT_RANGE_SQ {
                    continue;
                }

                // Owner's current attack, or the base value if the
                // owner has left the zone
                let damage = players.get(&proj.owner).map_or(BASE_ATTACK, |p| p.attack);
                monster.hp -= damage;
                spent.push(proj.id);

                if monster.hp <= 0 {
                    killed.push(monster.id);

                    let item_id = ids.next_item();
                    let item = roll_loot(item_id, rng);
                    broadcast(
                        players,
                        &ServerMessage::ItemSpawn {
                            id: item.id,
                            item_type: item.kind.code(),
                            x: monster.x,
                            y: monster.y,
                        },
                    );
                    items.insert(
                        item_id,
                        GroundItem {
                            item,
                            x: monster.x,
                            y: monster.y,
                            spawned_at: now,
                        },
                    );
                }

                // One hit per projectile per pass
                break;
            }
        }

        for id in spent {
            projectiles.remove(&id);
        }
        for id in killed {
            monsters.remove(&id);
        }
    }

    fn collect_items(&mut self) {
        let mut pickups: Vec<(u32, u32)> = Vec::new();
        for player in self.players.values() {
            for ground in self.items.values() {
                if dist_sq(player.x, player.y, ground.x, ground.y) < PICKUP_RANGE * PICKUP_RANGE {
                    pickups.push((player.id, ground.item.id));
                }
            }
        }

        for (player_id, item_id) in pickups {
            // When two players reach the same item, the lower id wins
            let ground = match self.items.remove(&item_id) {
                Some(ground) => ground,
                None => continue,
            };

            if let Some(player) = self.players.get_mut(&player_id) {
                match ground.item.kind {
                    ItemKind::Gold => {
                        player.gold += GOLD_PICKUP_VALUE;
                        player
                            .outbox
                            .send(ServerMessage::GoldUpdate { amount: player.gold });
                    }
                    _ => {
                        player.inventory.push(ground.item);
                        player.send_inventory();
                    }
                }
            }

            broadcast(&self.players, &ServerMessage::ItemRemove { id: item_id });
        }
    }

    fn check_portals(&mut self, now: Instant, portals: &[Portal]) -> Vec<TransitionRequest> {
        let mut transitions = Vec::new();

        for player in self.players.values_mut() {
            if !player.can_use_portal(now) {
                continue;
            }
            for portal in portals {
                if dist_sq(player.x, player.y, portal.x, portal.y) < portal.radius * portal.radius
                {
                    // Stamp the cooldown immediately so the crossing
                    // cannot be re-issued while the request is queued
                    player.last_portal = Some(now);
                    transitions.push(TransitionRequest {
                        player: player.id,
                        target_zone: portal.target_zone.clone(),
                        x: portal.target_x,
                        y: portal.target_y,
                    });
                    // One crossing per player per tick
                    break;
                }
            }
        }

        transitions
    }

    fn snapshot(&self, portals: &[Portal]) -> ServerMessage {
        ServerMessage::Snap {
            players: self
                .players
                .values()
                .map(|p| PlayerView {
                    id: p.id,
                    x: p.x,
                    y: p.y,
                })
                .collect(),
            monsters: self
                .monsters
                .values()
                .map(|m| MonsterView {
                    id: m.id,
                    x: m.x,
                    y: m.y,
                    element: m.element.code(),
                    hp: m.hp,
                    max_hp: m.max_hp,
                })
                .collect(),
            projectiles: self
                .projectiles
                .values()
                .map(|p| ProjectileView {
                    id: p.id,
                    x: p.x,
                    y: p.y,
                    element: p.element.code(),
                })
                .collect(),
            portals: portals
                .iter()
                .map(|portal| PortalView {
                    id: portal.id,
                    x: portal.x,
                    y: portal.y,
                    target_map: portal.target_zone.clone(),
                })
                .collect(),
        }
    }
}

fn broadcast(players: &BTreeMap<u32, Player>, message: &ServerMessage) {
    for player in players.values() {
        player.outbox.send(message.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::Outbox;
    use assert_approx_eq::assert_approx_eq;
    use shared::{Element, Item};
    use tokio::sync::mpsc;

    fn test_zone() -> Zone {
        Zone::new(ZoneConfig::new("plains"), Arc::new(IdGen::default()))
    }

    fn add_test_player(zone: &Zone, id: u32, x: f32, y: f32) {
        let mut player = Player::new(id, Outbox::closed());
        player.x = x;
        player.y = y;
        zone.add_player(player);
    }

    fn test_projectile(id: u32, owner: u32, x: f32, y: f32, vx: f32, vy: f32) -> Projectile {
        Projectile {
            id,
            owner,
            x,
            y,
            vx,
            vy,
            element: Element::Water,
        }
    }

    fn gold_item(id: u32) -> Item {
        Item {
            id,
            kind: ItemKind::Gold,
            name: "Gold Pile".to_string(),
            attack: 0,
            defense: 0,
            speed: 0.0,
            element: None,
        }
    }

    fn weapon_item(id: u32) -> Item {
        Item {
            id,
            kind: ItemKind::Weapon,
            name: "Tide Blade".to_string(),
            attack: 3,
            defense: 0,
            speed: 0.0,
            element: Some(Element::Water),
        }
    }

    #[test]
    fn test_tick_advances_projectiles_without_players() {
        let zone = test_zone();
        zone.state()
            .projectiles
            .insert(1, test_projectile(1, 99, 100.0, 100.0, 1.0, 0.0));

        zone.tick(Instant::now());

        let state = zone.state();
        let proj = &state.projectiles[&1];
        assert_eq!(proj.x, 110.0);
        assert_eq!(proj.y, 100.0);
    }

    #[test]
    fn test_projectile_despawns_out_of_bounds() {
        let zone = test_zone();
        zone.state()
            .projectiles
            .insert(1, test_projectile(1, 99, MAP_WIDTH + 45.0, 100.0, 1.0, 0.0));

        zone.tick(Instant::now());

        assert!(zone.state().projectiles.is_empty());
    }

    #[test]
    fn test_monster_seeks_nearest_player() {
        let zone = test_zone();
        add_test_player(&zone, 1, 400.0, 300.0);
        zone.state()
            .monsters
            .insert(10, Monster::new(10, 400.0, 200.0, Element::Fire));

        zone.tick(Instant::now());

        let state = zone.state();
        let monster = &state.monsters[&10];
        assert_eq!(monster.x, 400.0);
        assert_approx_eq!(monster.y, 202.0, 0.001);
    }

    #[test]
    fn test_monster_does_not_overshoot() {
        let zone = test_zone();
        add_test_player(&zone, 1, 400.0, 300.0);
        zone.state()
            .monsters
            .insert(10, Monster::new(10, 400.0, 299.0, Element::Fire));

        zone.tick(Instant::now());

        let state = zone.state();
        let monster = &state.monsters[&10];
        assert_approx_eq!(monster.y, 300.0, 0.001);
    }

    #[test]
    fn test_monsters_idle_without_players() {
        let zone = test_zone();
        zone.state()
            .monsters
            .insert(10, Monster::new(10, 100.0, 100.0, Element::Fire));

        zone.tick(Instant::now());

        let state = zone.state();
        assert_eq!((state.monsters[&10].x, state.monsters[&10].y), (100.0, 100.0));
    }

    #[test]
    fn test_spawner_respects_cap() {
        let zone = test_zone();
        for _ in 0..MONSTER_CAP + 5 {
            zone.spawn_monster();
        }

        let state = zone.state();
        assert_eq!(state.monsters.len(), MONSTER_CAP);
        for monster in state.monsters.values() {
            assert!(monster.x >= MONSTER_SPAWN_MARGIN);
            assert!(monster.x <= MAP_WIDTH - MONSTER_SPAWN_MARGIN);
            assert!(monster.y >= MONSTER_SPAWN_MARGIN);
            assert!(monster.y <= MAP_HEIGHT - MONSTER_SPAWN_MARGIN);
        }
    }

    #[test]
    fn test_safe_zone_never_spawns() {
        let mut config = ZoneConfig::new("town");
        config.safe = true;
        let zone = Zone::new(config, Arc::new(IdGen::default()));

        zone.spawn_monster();

        assert!(zone.state().monsters.is_empty());
    }

    #[test]
    fn test_auto_shoot_targets_lowest_id_on_tie() {
        let zone = test_zone();
        add_test_player(&zone, 1, 400.0, 300.0);
        {
            let mut state = zone.state();
            state
                .monsters
                .insert(5, Monster::new(5, 400.0, 200.0, Element::Fire));
            state
                .monsters
                .insert(9, Monster::new(9, 400.0, 400.0, Element::Grass));
        }

        zone.tick(Instant::now());

        let state = zone.state();
        assert_eq!(state.projectiles.len(), 1);
        let proj = state.projectiles.values().next().unwrap();
        assert_eq!(proj.owner, 1);
        assert_eq!(proj.element, Element::Water);
        // Monster 5 sits above the player, so the shot flies up
        assert_eq!(proj.vx, 0.0);
        assert_eq!(proj.vy, -1.0);
        assert!(state.players[&1].last_shot.is_some());
    }

    #[test]
    fn test_auto_shoot_holds_fire_without_target() {
        let zone = test_zone();
        add_test_player(&zone, 1, 400.0, 300.0);

        zone.tick(Instant::now());

        let state = zone.state();
        assert!(state.projectiles.is_empty());
        assert!(state.players[&1].last_shot.is_none());
    }

    #[test]
    fn test_auto_shoot_respects_cooldown() {
        let zone = test_zone();
        add_test_player(&zone, 1, 400.0, 300.0);
        zone.state()
            .monsters
            .insert(5, Monster::new(5, 400.0, 100.0, Element::Fire));

        let now = Instant::now();
        zone.tick(now);
        zone.tick(now + Duration::from_millis(100));

        assert_eq!(zone.state().projectiles.len(), 1);
    }

    #[test]
    fn test_killing_blow_drops_exactly_one_loot() {
        let zone = test_zone();
        add_test_player(&zone, 1, 400.0, 300.0);

        let now = Instant::now();
        {
            let mut state = zone.state();
            let mut monster = Monster::new(10, 500.0, 300.0, Element::Fire);
            monster.hp = 10;
            state.monsters.insert(10, monster);
            state
                .projectiles
                .insert(50, test_projectile(50, 1, 490.0, 300.0, 1.0, 0.0));
            // Park the shooter's cooldown so only the seeded
            // projectile is in flight
            state.players.get_mut(&1).unwrap().last_shot = Some(now);
        }

        zone.tick(now);

        let state = zone.state();
        assert!(state.monsters.is_empty());
        assert!(state.projectiles.is_empty());
        assert_eq!(state.items.len(), 1);

        let ground = state.items.values().next().unwrap();
        assert_approx_eq!(ground.x, 498.0, 0.001);
        assert_eq!(ground.y, 300.0);
    }

    #[test]
    fn test_dead_monster_cannot_be_hit_again_same_pass() {
        let zone = test_zone();
        add_test_player(&zone, 1, 400.0, 300.0);

        let now = Instant::now();
        {
            let mut state = zone.state();
            let mut monster = Monster::new(10, 500.0, 300.0, Element::Fire);
            monster.hp = 10;
            state.monsters.insert(10, monster);
            state
                .projectiles
                .insert(50, test_projectile(50, 1, 490.0, 300.0, 1.0, 0.0));
            state
                .projectiles
                .insert(51, test_projectile(51, 1, 491.0, 300.0, 1.0, 0.0));
            state.players.get_mut(&1).unwrap().last_shot = Some(now);
        }

        zone.tick(now);

        let state = zone.state();
        assert!(state.monsters.is_empty());
        // The second projectile passed through the corpse unspent
        assert_eq!(state.projectiles.len(), 1);
        assert!(state.projectiles.contains_key(&51));
        assert_eq!(state.items.len(), 1);
    }

    #[test]
    fn test_one_hit_per_projectile() {
        let zone = test_zone();
        add_test_player(&zone, 1, 100.0, 100.0);

        let now = Instant::now();
        {
            let mut state = zone.state();
            state
                .monsters
                .insert(10, Monster::new(10, 505.0, 300.0, Element::Fire));
            state
                .monsters
                .insert(11, Monster::new(11, 510.0, 300.0, Element::Grass));
            state
                .projectiles
                .insert(50, test_projectile(50, 99, 490.0, 300.0, 1.0, 0.0));
            state.players.get_mut(&1).unwrap().last_shot = Some(now);
        }

        zone.tick(now);

        let state = zone.state();
        // Owner 99 is not in the zone, so the hit fell back to base
        // damage on the first monster only
        let hit: Vec<i32> = state.monsters.values().map(|m| m.hp).collect();
        assert_eq!(hit.iter().filter(|hp| **hp < 50).count(), 1);
        assert!(state.projectiles.is_empty());
    }

    #[test]
    fn test_pickup_gold_and_gear() {
        let zone = test_zone();
        add_test_player(&zone, 1, 400.0, 300.0);

        let now = Instant::now();
        {
            let mut state = zone.state();
            state.items.insert(
                70,
                GroundItem {
                    item: gold_item(70),
                    x: 405.0,
                    y: 300.0,
                    spawned_at: now,
                },
            );
            state.items.insert(
                71,
                GroundItem {
                    item: weapon_item(71),
                    x: 410.0,
                    y: 300.0,
                    spawned_at: now,
                },
            );
        }

        zone.tick(now);

        let state = zone.state();
        assert!(state.items.is_empty());
        let player = &state.players[&1];
        assert_eq!(player.gold, GOLD_PICKUP_VALUE);
        assert_eq!(player.inventory.len(), 1);
        assert_eq!(player.inventory[0].id, 71);
    }

    #[test]
    fn test_ground_item_expires() {
        let zone = test_zone();
        let now = Instant::now();
        zone.state().items.insert(
            70,
            GroundItem {
                item: weapon_item(70),
                x: 100.0,
                y: 100.0,
                spawned_at: now,
            },
        );

        zone.tick(now + Duration::from_secs(ITEM_TTL_SECS) + Duration::from_secs(1));

        assert!(zone.state().items.is_empty());
    }

    #[test]
    fn test_portal_crossing_debounces() {
        let mut config = ZoneConfig::new("town");
        config.portals.push(Portal {
            id: 1,
            x: 750.0,
            y: 300.0,
            radius: 30.0,
            target_zone: "forest".to_string(),
            target_x: 100.0,
            target_y: 300.0,
        });
        let zone = Zone::new(config, Arc::new(IdGen::default()));
        add_test_player(&zone, 1, 740.0, 300.0);

        let now = Instant::now();
        let transitions = zone.tick(now);
        assert_eq!(
            transitions,
            vec![TransitionRequest {
                player: 1,
                target_zone: "forest".to_string(),
                x: 100.0,
                y: 300.0,
            }]
        );

        // Still standing in the portal: the cooldown mutes the repeat
        let transitions = zone.tick(now + Duration::from_millis(100));
        assert!(transitions.is_empty());

        // After the cooldown the crossing fires again
        let transitions = zone.tick(now + Duration::from_millis(2100));
        assert_eq!(transitions.len(), 1);
    }

    #[test]
    fn test_add_player_sends_ground_items() {
        let zone = test_zone();
        zone.state().items.insert(
            70,
            GroundItem {
                item: weapon_item(70),
                x: 100.0,
                y: 100.0,
                spawned_at: Instant::now(),
            },
        );

        let (tx, mut rx) = mpsc::unbounded_channel();
        zone.add_player(Player::new(1, Outbox::new(tx)));

        match rx.try_recv().unwrap() {
            ServerMessage::ItemSpawn { id, item_type, x, y } => {
                assert_eq!(id, 70);
                assert_eq!(item_type, ItemKind::Weapon.code());
                assert_eq!((x, y), (100.0, 100.0));
            }
            other => panic!("Expected item spawn, got {:?}", other),
        }
    }

    #[test]
    fn test_remove_player_broadcasts_leave() {
        let zone = test_zone();
        let (tx, mut rx) = mpsc::unbounded_channel();
        zone.add_player(Player::new(1, Outbox::new(tx)));
        add_test_player(&zone, 2, 100.0, 100.0);

        let removed = zone.remove_player(2);
        assert_eq!(removed.map(|p| p.id), Some(2));
        assert!(zone.remove_player(2).is_none());

        match rx.try_recv().unwrap() {
            ServerMessage::Leave { id } => assert_eq!(id, 2),
            other => panic!("Expected leave, got {:?}", other),
        }
    }

    #[test]
    fn test_snapshot_reaches_occupants() {
        let zone = test_zone();
        let (tx, mut rx) = mpsc::unbounded_channel();
        zone.add_player(Player::new(1, Outbox::new(tx)));
        zone.state()
            .monsters
            .insert(10, Monster::new(10, 200.0, 200.0, Element::Grass));

        zone.tick(Instant::now());

        let mut snap = None;
        while let Ok(message) = rx.try_recv() {
            if let ServerMessage::Snap { .. } = message {
                snap = Some(message);
            }
        }

        match snap {
            Some(ServerMessage::Snap {
                players, monsters, ..
            }) => {
                assert_eq!(players.len(), 1);
                assert_eq!(monsters.len(), 1);
                assert_eq!(monsters[0].element, Element::Grass.code());
            }
            _ => panic!("No snapshot received"),
        }
    }
}
