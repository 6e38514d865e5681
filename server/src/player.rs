//! Player session state and the actions that mutate it
//!
//! This module owns the per-connection player record, including:
//! - Position, facing and action cooldowns
//! - Base and equipment-derived combat stats
//! - Inventory, equipment slots and gold
//! - The outbound message sink for that connection
//!
//! A player record lives inside the zone that currently hosts it and is
//! only ever mutated by a caller holding that zone's lock (or, for
//! registry-level operations, the directory lock that routed here). The
//! record itself has no lock of its own.

use shared::protocol::{ItemView, ServerMessage};
use shared::{
    Element, Item, ItemKind, BASE_ATTACK, BASE_DEFENSE, BASE_HP, BASE_SPEED, EQUIPMENT_SLOTS,
    PORTAL_COOLDOWN_MS, SHOOT_COOLDOWN_MS, SPAWN_X, SPAWN_Y,
};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Fire-and-forget message sink for one connection
///
/// Wraps the sender half of the connection's outbound channel. Sends
/// never block and never fail: a dropped receiver behaves exactly like
/// a closed outbox, which is also what tests use to drive players
/// without a live connection.
#[derive(Debug, Clone)]
pub struct Outbox {
    tx: Option<mpsc::UnboundedSender<ServerMessage>>,
}

impl Outbox {
    pub fn new(tx: mpsc::UnboundedSender<ServerMessage>) -> Self {
        Self { tx: Some(tx) }
    }

    /// An outbox that silently drops everything sent to it.
    pub fn closed() -> Self {
        Self { tx: None }
    }

    /// Queues a message for delivery to this connection. Messages to
    /// one player arrive in the order they were sent.
    pub fn send(&self, message: ServerMessage) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(message);
        }
    }
}

/// A connected player's full session state
#[derive(Debug)]
pub struct Player {
    /// Unique id assigned by the registry, never reused
    pub id: u32,
    pub x: f32,
    pub y: f32,
    /// Facing, kept as the last nonzero movement delta
    pub dir_x: f32,
    pub dir_y: f32,
    /// When this player last fired, `None` before the first shot
    pub last_shot: Option<Instant>,
    /// When this player last crossed a portal
    pub last_portal: Option<Instant>,
    pub hp: i32,
    pub max_hp: i32,
    /// Derived stats: base values plus equipped item modifiers
    pub attack: i32,
    pub defense: i32,
    pub speed: f32,
    pub gold: u32,
    pub inventory: Vec<Item>,
    /// Fixed slots, each holding at most one item
    pub equipment: [Option<Item>; EQUIPMENT_SLOTS],
    pub outbox: Outbox,
}

impl Player {
    /// Creates a player at the default spawn point with base stats,
    /// an empty inventory and every cooldown ready.
    pub fn new(id: u32, outbox: Outbox) -> Self {
        Self {
            id,
            x: SPAWN_X,
            y: SPAWN_Y,
            dir_x: 0.0,
            dir_y: 1.0,
            last_shot: None,
            last_portal: None,
            hp: BASE_HP,
            max_hp: BASE_HP,
            attack: BASE_ATTACK,
            defense: BASE_DEFENSE,
            speed: BASE_SPEED,
            gold: 0,
            inventory: Vec::new(),
            equipment: Default::default(),
            outbox,
        }
    }

    /// Applies a movement command. The facing vector tracks the raw
    /// movement delta and keeps its old value on a zero-length move.
    pub fn apply_move(&mut self, x: f32, y: f32) {
        let dx = x - self.x;
        let dy = y - self.y;
        if dx != 0.0 || dy != 0.0 {
            self.dir_x = dx;
            self.dir_y = dy;
        }
        self.x = x;
        self.y = y;
    }

    /// True once the shot cooldown has elapsed since the last shot.
    pub fn can_shoot(&self, now: Instant) -> bool {
        match self.last_shot {
            Some(at) => now.duration_since(at) > Duration::from_millis(SHOOT_COOLDOWN_MS),
            None => true,
        }
    }

    /// True once the portal cooldown has elapsed since the last
    /// crossing. The cooldown stops a player who arrives on top of a
    /// destination portal from bouncing straight back.
    pub fn can_use_portal(&self, now: Instant) -> bool {
        match self.last_portal {
            Some(at) => now.duration_since(at) > Duration::from_millis(PORTAL_COOLDOWN_MS),
            None => true,
        }
    }

    /// Removes and returns an inventory item by id, or `None` if the
    /// player does not hold it.
    pub fn take_item(&mut self, item_id: u32) -> Option<Item> {
        let idx = self.inventory.iter().position(|item| item.id == item_id)?;
        Some(self.inventory.remove(idx))
    }

    /// Moves an inventory item into an equipment slot
    ///
    /// An out-of-range slot or an item the player does not hold leaves
    /// all state untouched. An occupied slot is unequipped first, so
    /// the displaced item lands back in the inventory. On success the
    /// stats are recalculated and both snapshots are resent.
    pub fn equip(&mut self, item_id: u32, slot: usize) {
        if slot >= EQUIPMENT_SLOTS {
            return;
        }
        let idx = match self.inventory.iter().position(|item| item.id == item_id) {
            Some(idx) => idx,
            None => return,
        };
        if self.equipment[slot].is_some() {
            // unequip only appends to the inventory, so idx stays valid
            self.unequip(slot);
        }
        let item = self.inventory.remove(idx);
        self.equipment[slot] = Some(item);
        self.recalculate_stats();
        self.send_inventory();
        self.send_equipment();
    }

    /// Moves the item in a slot back to the inventory. No-op on an
    /// empty or out-of-range slot.
    pub fn unequip(&mut self, slot: usize) {
        if slot >= EQUIPMENT_SLOTS {
            return;
        }
        let item = match self.equipment[slot].take() {
            Some(item) => item,
            None => return,
        };
        self.inventory.push(item);
        self.recalculate_stats();
        self.send_inventory();
        self.send_equipment();
    }

    /// Resets attack, defense and speed to their bases, then folds in
    /// every equipped item's modifiers. Speed modifiers only count
    /// when positive. Pushes the refreshed stat block to the player.
    pub fn recalculate_stats(&mut self) {
        self.attack = BASE_ATTACK;
        self.defense = BASE_DEFENSE;
        self.speed = BASE_SPEED;
        for item in self.equipment.iter().flatten() {
            self.attack += item.attack;
            self.defense += item.defense;
            if item.speed > 0.0 {
                self.speed += item.speed;
            }
        }
        self.send_stats();
    }

    /// Sells an inventory item for its shop value. Proximity to a shop
    /// is checked by the zone-level caller; an item the player does not
    /// hold is a silent no-op.
    pub fn sell(&mut self, item_id: u32) {
        let item = match self.take_item(item_id) {
            Some(item) => item,
            None => return,
        };
        self.gold += item.sell_value();
        self.send_inventory();
        self.outbox.send(ServerMessage::GoldUpdate { amount: self.gold });
    }

    /// Element carried by this player's shots: the first equipped
    /// weapon's element, water when unarmed.
    pub fn projectile_element(&self) -> Element {
        self.equipment
            .iter()
            .flatten()
            .find(|item| item.kind == ItemKind::Weapon)
            .and_then(|item| item.element)
            .unwrap_or(Element::Water)
    }

    /// Pushes the current stat block to this player.
    pub fn send_stats(&self) {
        self.outbox.send(ServerMessage::Stats {
            id: self.id,
            hp: self.hp,
            max_hp: self.max_hp,
            attack: self.attack,
            defense: self.defense,
            speed: self.speed,
            gold: self.gold,
        });
    }

    /// Pushes a full inventory snapshot to this player.
    pub fn send_inventory(&self) {
        let items = self.inventory.iter().map(ItemView::from).collect();
        self.outbox.send(ServerMessage::Inventory { items });
    }

    /// Pushes the current slot-to-item mapping to this player.
    pub fn send_equipment(&self) {
        let items = self
            .equipment
            .iter()
            .enumerate()
            .filter_map(|(slot, item)| {
                item.as_ref()
                    .map(|item| (slot.to_string(), ItemView::from(item)))
            })
            .collect();
        self.outbox.send(ServerMessage::Equipment { items });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_player() -> Player {
        Player::new(1, Outbox::closed())
    }

    fn test_weapon(id: u32, attack: i32) -> Item {
        Item {
            id,
            kind: ItemKind::Weapon,
            name: "Ember Blade".to_string(),
            attack,
            defense: 0,
            speed: 0.0,
            element: Some(Element::Fire),
        }
    }

    fn test_armor(id: u32, defense: i32, speed: f32) -> Item {
        Item {
            id,
            kind: ItemKind::Armor,
            name: "Iron Plate".to_string(),
            attack: 0,
            defense,
            speed,
            element: None,
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ServerMessage>) -> Vec<ServerMessage> {
        let mut messages = Vec::new();
        while let Ok(message) = rx.try_recv() {
            messages.push(message);
        }
        messages
    }

    #[test]
    fn test_player_spawn_defaults() {
        let player = test_player();

        assert_eq!(player.id, 1);
        assert_eq!(player.x, SPAWN_X);
        assert_eq!(player.y, SPAWN_Y);
        assert_eq!((player.dir_x, player.dir_y), (0.0, 1.0));
        assert_eq!(player.hp, BASE_HP);
        assert_eq!(player.attack, BASE_ATTACK);
        assert_eq!(player.defense, BASE_DEFENSE);
        assert_eq!(player.speed, BASE_SPEED);
        assert_eq!(player.gold, 0);
        assert!(player.inventory.is_empty());
        assert!(player.equipment.iter().all(|slot| slot.is_none()));
    }

    #[test]
    fn test_apply_move_updates_facing() {
        let mut player = test_player();

        player.apply_move(10.5, 20.0);
        assert_eq!(player.x, 10.5);
        assert_eq!(player.y, 20.0);
        assert_eq!(player.dir_x, 10.5 - SPAWN_X);
        assert_eq!(player.dir_y, 20.0 - SPAWN_Y);

        // A zero-length move keeps the old facing
        let (dir_x, dir_y) = (player.dir_x, player.dir_y);
        player.apply_move(10.5, 20.0);
        assert_eq!((player.dir_x, player.dir_y), (dir_x, dir_y));
    }

    #[test]
    fn test_shoot_cooldown() {
        let mut player = test_player();
        let now = Instant::now();

        assert!(player.can_shoot(now));

        player.last_shot = Some(now);
        assert!(!player.can_shoot(now));
        assert!(!player.can_shoot(now + Duration::from_millis(SHOOT_COOLDOWN_MS)));
        assert!(player.can_shoot(now + Duration::from_millis(SHOOT_COOLDOWN_MS + 1)));
    }

    #[test]
    fn test_portal_cooldown() {
        let mut player = test_player();
        let now = Instant::now();

        assert!(player.can_use_portal(now));

        player.last_portal = Some(now);
        assert!(!player.can_use_portal(now));
        assert!(player.can_use_portal(now + Duration::from_millis(PORTAL_COOLDOWN_MS + 1)));
    }

    #[test]
    fn test_take_item_removes_exactly_one() {
        let mut player = test_player();
        player.inventory.push(test_weapon(10, 3));
        player.inventory.push(test_weapon(11, 5));

        let taken = player.take_item(10).unwrap();
        assert_eq!(taken.id, 10);
        assert_eq!(player.inventory.len(), 1);
        assert_eq!(player.inventory[0].id, 11);

        assert!(player.take_item(10).is_none());
    }

    #[test]
    fn test_equip_and_unequip_round_trip() {
        let mut player = test_player();
        player.inventory.push(test_weapon(10, 7));
        player.inventory.push(test_armor(11, 4, 1.5));

        player.equip(10, 0);
        player.equip(11, 1);
        assert_eq!(player.attack, BASE_ATTACK + 7);
        assert_eq!(player.defense, BASE_DEFENSE + 4);
        assert_eq!(player.speed, BASE_SPEED + 1.5);
        assert!(player.inventory.is_empty());

        player.unequip(0);
        player.unequip(1);
        assert_eq!(player.attack, BASE_ATTACK);
        assert_eq!(player.defense, BASE_DEFENSE);
        assert_eq!(player.speed, BASE_SPEED);
        assert_eq!(player.inventory.len(), 2);
        assert!(player.equipment.iter().all(|slot| slot.is_none()));
    }

    #[test]
    fn test_equip_rejects_bad_slot_and_unknown_item() {
        let mut player = test_player();
        player.inventory.push(test_weapon(10, 7));

        player.equip(10, EQUIPMENT_SLOTS);
        assert_eq!(player.inventory.len(), 1);
        assert_eq!(player.attack, BASE_ATTACK);

        player.equip(99, 0);
        assert_eq!(player.inventory.len(), 1);
        assert!(player.equipment[0].is_none());
    }

    #[test]
    fn test_equip_displaces_occupant() {
        let mut player = test_player();
        player.inventory.push(test_weapon(10, 3));
        player.inventory.push(test_weapon(11, 8));

        player.equip(10, 0);
        player.equip(11, 0);

        assert_eq!(player.equipment[0].as_ref().map(|item| item.id), Some(11));
        assert_eq!(player.inventory.len(), 1);
        assert_eq!(player.inventory[0].id, 10);
        assert_eq!(player.attack, BASE_ATTACK + 8);
    }

    #[test]
    fn test_unequip_empty_slot_is_noop() {
        let mut player = test_player();
        player.unequip(0);
        player.unequip(EQUIPMENT_SLOTS);
        assert!(player.inventory.is_empty());
    }

    #[test]
    fn test_recalculate_ignores_negative_speed() {
        let mut player = test_player();
        player.inventory.push(test_armor(10, 2, -3.0));

        player.equip(10, 0);
        assert_eq!(player.defense, BASE_DEFENSE + 2);
        assert_eq!(player.speed, BASE_SPEED);
    }

    #[test]
    fn test_sell_credits_gold() {
        let mut player = test_player();
        player.inventory.push(test_weapon(10, 4));

        player.sell(10);
        assert_eq!(player.gold, 30);
        assert!(player.inventory.is_empty());

        // Unknown item leaves gold untouched
        player.sell(10);
        assert_eq!(player.gold, 30);
    }

    #[test]
    fn test_projectile_element() {
        let mut player = test_player();
        assert_eq!(player.projectile_element(), Element::Water);

        player.inventory.push(test_armor(10, 2, 0.0));
        player.inventory.push(test_weapon(11, 4));
        player.equip(10, 0);
        player.equip(11, 1);

        assert_eq!(player.projectile_element(), Element::Fire);
    }

    #[test]
    fn test_equip_sends_stats_inventory_equipment() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut player = Player::new(1, Outbox::new(tx));
        player.inventory.push(test_weapon(10, 4));

        player.equip(10, 0);

        let messages = drain(&mut rx);
        assert_eq!(messages.len(), 3);
        assert!(matches!(messages[0], ServerMessage::Stats { attack: 14, .. }));
        assert!(matches!(&messages[1], ServerMessage::Inventory { items } if items.is_empty()));
        assert!(matches!(&messages[2], ServerMessage::Equipment { items } if items.len() == 1));
    }

    #[test]
    fn test_sell_sends_inventory_then_gold() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut player = Player::new(1, Outbox::new(tx));
        player.inventory.push(test_weapon(10, 4));

        player.sell(10);

        let messages = drain(&mut rx);
        assert_eq!(messages.len(), 2);
        assert!(matches!(&messages[0], ServerMessage::Inventory { items } if items.is_empty()));
        assert!(matches!(messages[1], ServerMessage::GoldUpdate { amount: 30 }));
    }

    #[test]
    fn test_closed_outbox_swallows_sends() {
        let player = test_player();
        player.send_stats();
        player.send_inventory();
        player.send_equipment();
    }
}
