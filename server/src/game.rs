//! World registry and tick scheduler
//!
//! The `Game` owns everything above the zone level: the zone table, the
//! player directory, global id issuance, the market ledger and the
//! fixed-rate scheduler. It is constructed once at startup and handed
//! around as `Arc<Game>`; there are no ambient singletons.
//!
//! Lock order is fixed: directory, then market, then at most one zone
//! lock at a time. Zone locks are leaves. The tick path only ever takes
//! zone locks and reports portal crossings back to the scheduler, which
//! applies them after every zone lock is released. That is what keeps
//! the tick and the transition paths from deadlocking against each
//! other.

use crate::entity::dist_sq;
use crate::market::Market;
use crate::player::{Outbox, Player};
use crate::zone::{Npc, NpcKind, Portal, Zone, ZoneConfig};
use log::{info, warn};
use shared::protocol::ServerMessage;
use shared::{SHOP_RANGE, SPAWN_INTERVAL_MS, SPAWN_ZONE};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

/// Global monotonic id issuance, shared by every zone
///
/// One counter per entity class. Counters are lock-free, strictly
/// increasing and never reused within a process lifetime. Projectile
/// and monster ids are global rather than per-zone so they never
/// collide across partitions.
#[derive(Debug, Default)]
pub struct IdGen {
    player: AtomicU32,
    item: AtomicU32,
    monster: AtomicU32,
    projectile: AtomicU32,
    listing: AtomicU32,
}

impl IdGen {
    pub fn next_player(&self) -> u32 {
        self.player.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn next_item(&self) -> u32 {
        self.item.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn next_monster(&self) -> u32 {
        self.monster.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn next_projectile(&self) -> u32 {
        self.projectile.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn next_listing(&self) -> u32 {
        self.listing.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Directory entry: which zone currently hosts a player and how to
/// reach its connection.
#[derive(Debug)]
pub(crate) struct PlayerRoute {
    pub zone: String,
    pub outbox: Outbox,
}

/// Top-level owner of the world
pub struct Game {
    zones: HashMap<String, Arc<Zone>>,
    directory: Mutex<BTreeMap<u32, PlayerRoute>>,
    market: Mutex<Market>,
    pub ids: Arc<IdGen>,
}

impl Game {
    /// Builds a world from zone configurations. The zone table is
    /// immutable after this point; zones never appear or disappear at
    /// runtime.
    pub fn new(configs: Vec<ZoneConfig>) -> Self {
        let ids = Arc::new(IdGen::default());
        let zones: HashMap<String, Arc<Zone>> = configs
            .into_iter()
            .map(|config| {
                let zone = Zone::new(config, Arc::clone(&ids));
                (zone.id.clone(), Arc::new(zone))
            })
            .collect();
        assert!(
            zones.contains_key(SPAWN_ZONE),
            "world has no spawn zone {:?}",
            SPAWN_ZONE
        );

        Self {
            zones,
            directory: Mutex::new(BTreeMap::new()),
            market: Mutex::new(Market::default()),
            ids,
        }
    }

    /// The stock world: a safe town with a shop, and two wilderness
    /// zones chained behind it by portals.
    pub fn default_world() -> Self {
        let mut town = ZoneConfig::new("town");
        town.safe = true;
        town.npcs.push(Npc {
            id: 1,
            x: 350.0,
            y: 250.0,
            kind: NpcKind::Shop,
        });
        town.portals.push(Portal {
            id: 1,
            x: 750.0,
            y: 300.0,
            radius: 30.0,
            target_zone: "forest".to_string(),
            target_x: 100.0,
            target_y: 300.0,
        });

        let mut forest = ZoneConfig::new("forest");
        forest.portals.push(Portal {
            id: 1,
            x: 50.0,
            y: 300.0,
            radius: 30.0,
            target_zone: "town".to_string(),
            target_x: 700.0,
            target_y: 300.0,
        });
        forest.portals.push(Portal {
            id: 2,
            x: 750.0,
            y: 300.0,
            radius: 30.0,
            target_zone: "cave".to_string(),
            target_x: 100.0,
            target_y: 300.0,
        });

        let mut cave = ZoneConfig::new("cave");
        cave.portals.push(Portal {
            id: 1,
            x: 50.0,
            y: 300.0,
            radius: 30.0,
            target_zone: "forest".to_string(),
            target_x: 700.0,
            target_y: 300.0,
        });

        Game::new(vec![town, forest, cave])
    }

    pub fn zone(&self, id: &str) -> Option<&Arc<Zone>> {
        self.zones.get(id)
    }

    pub(crate) fn directory(&self) -> MutexGuard<'_, BTreeMap<u32, PlayerRoute>> {
        self.directory.lock().expect("player directory lock poisoned")
    }

    /// Locks and returns the market ledger. The guard must be dropped
    /// before calling `market_list` or `market_buy`, which take this
    /// lock themselves.
    pub fn market(&self) -> MutexGuard<'_, Market> {
        self.market.lock().expect("market lock poisoned")
    }

    pub fn player_count(&self) -> usize {
        self.directory().len()
    }

    /// Registers a new player and sends its full initial state: the
    /// welcome stat block, the spawn zone's portal layout, an empty
    /// inventory, the current market and the zone's ground items.
    /// Never fails; a closed outbox simply swallows the sends.
    pub fn add_player(&self, outbox: Outbox) -> u32 {
        let id = self.ids.next_player();
        let player = Player::new(id, outbox.clone());

        outbox.send(ServerMessage::Welcome {
            id,
            hp: player.hp,
            max_hp: player.max_hp,
            attack: player.attack,
            defense: player.defense,
            speed: player.speed,
            gold: player.gold,
        });

        let spawn = self.zones.get(SPAWN_ZONE).expect("spawn zone missing");
        outbox.send(ServerMessage::MapSwitch {
            map: spawn.id.clone(),
            x: player.x,
            y: player.y,
            portals: spawn.portal_data(),
        });
        outbox.send(ServerMessage::Inventory { items: Vec::new() });
        self.send_market(&outbox);

        self.directory().insert(
            id,
            PlayerRoute {
                zone: spawn.id.clone(),
                outbox,
            },
        );
        spawn.add_player(player);

        info!("Player {} joined", id);
        id
    }

    /// Deregisters a player and tells the rest of its zone. Removing
    /// an unknown id is a no-op, so a read-error path and a shutdown
    /// path may both call this for the same connection.
    pub fn remove_player(&self, id: u32) {
        let route = match self.directory().remove(&id) {
            Some(route) => route,
            None => return,
        };
        if let Some(zone) = self.zones.get(&route.zone) {
            zone.remove_player(id);
        }
        info!("Player {} left", id);
    }

    /// Moves a player between zones: detach from the source, attach to
    /// the target at the given position, and tell that player (and only
    /// that player) about its new surroundings. No-op when the player
    /// already stands in the target zone; a portal wired to an unknown
    /// zone is a configuration bug and is logged instead of vanishing
    /// silently.
    ///
    /// Holds the directory lock for the duration; the two zone locks
    /// are taken one at a time, never together. Must not be called
    /// while any zone lock is held.
    pub fn switch_zone(&self, id: u32, target: &str, x: f32, y: f32) {
        let mut directory = self.directory();
        let route = match directory.get_mut(&id) {
            Some(route) => route,
            None => return,
        };
        if route.zone == target {
            return;
        }

        let destination = match self.zones.get(target) {
            Some(zone) => zone,
            None => {
                warn!("Player {} hit a portal to unknown zone {:?}", id, target);
                return;
            }
        };
        let source = match self.zones.get(&route.zone) {
            Some(zone) => zone,
            None => return,
        };

        let mut player = match source.remove_player(id) {
            Some(player) => player,
            None => return,
        };
        player.x = x;
        player.y = y;
        route.zone = destination.id.clone();

        route.outbox.send(ServerMessage::MapSwitch {
            map: destination.id.clone(),
            x,
            y,
            portals: destination.portal_data(),
        });
        destination.add_player(player);

        info!("Player {} crossed into {}", id, target);
    }

    /// Applies a movement command, clamped to the hosting zone's
    /// bounds.
    pub fn move_player(&self, id: u32, x: f32, y: f32) {
        let zone = match self.zone_of(id) {
            Some(zone) => zone,
            None => return,
        };
        let mut state = zone.state();
        if let Some(player) = state.players.get_mut(&id) {
            player.apply_move(x.clamp(0.0, zone.width), y.clamp(0.0, zone.height));
        }
    }

    pub fn equip(&self, id: u32, item_id: u32, slot: usize) {
        let zone = match self.zone_of(id) {
            Some(zone) => zone,
            None => return,
        };
        let mut state = zone.state();
        if let Some(player) = state.players.get_mut(&id) {
            player.equip(item_id, slot);
        }
    }

    pub fn unequip(&self, id: u32, slot: usize) {
        let zone = match self.zone_of(id) {
            Some(zone) => zone,
            None => return,
        };
        let mut state = zone.state();
        if let Some(player) = state.players.get_mut(&id) {
            player.unequip(slot);
        }
    }

    /// Sells an inventory item, but only while the player stands near a
    /// shop in its current zone.
    pub fn sell(&self, id: u32, item_id: u32) {
        let zone = match self.zone_of(id) {
            Some(zone) => zone,
            None => return,
        };
        let mut state = zone.state();
        let player = match state.players.get_mut(&id) {
            Some(player) => player,
            None => return,
        };

        let near_shop = zone.npcs.iter().any(|npc| {
            npc.kind == NpcKind::Shop
                && dist_sq(player.x, player.y, npc.x, npc.y) < SHOP_RANGE * SHOP_RANGE
        });
        if !near_shop {
            return;
        }

        player.sell(item_id);
    }

    /// Runs one full-world tick: every zone simulates under its own
    /// lock, then the portal crossings they reported are applied with
    /// no zone lock held.
    pub fn tick_world(&self, now: Instant) {
        let mut transitions = Vec::new();
        for zone in self.zones.values() {
            transitions.extend(zone.tick(now));
        }
        for request in transitions {
            self.switch_zone(request.player, &request.target_zone, request.x, request.y);
        }
    }

    /// One spawner pass across every zone. Safe zones skip themselves.
    pub fn spawn_wave(&self) {
        for zone in self.zones.values() {
            zone.spawn_monster();
        }
    }

    /// Drives the simulation until shutdown: a fast timer for the
    /// world tick and a slow one for monster spawning.
    pub async fn run(&self, tick: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut spawner = interval(Duration::from_millis(SPAWN_INTERVAL_MS));
        spawner.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // Both timers fire immediately once; skip those
        ticker.tick().await;
        spawner.tick().await;

        info!("Simulation running, one tick every {:?}", tick);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.tick_world(Instant::now()),
                _ = spawner.tick() => self.spawn_wave(),
                _ = shutdown.changed() => {
                    info!("Simulation stopped");
                    break;
                }
            }
        }
    }

    fn zone_of(&self, id: u32) -> Option<Arc<Zone>> {
        let directory = self.directory();
        let route = directory.get(&id)?;
        self.zones.get(&route.zone).cloned()
    }
}
