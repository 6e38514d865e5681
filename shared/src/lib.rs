pub mod protocol;

// Simulation timing
pub const TICK_INTERVAL_MS: u64 = 33;
pub const SPAWN_INTERVAL_MS: u64 = 1000;

// Zone dimensions
pub const MAP_WIDTH: f32 = 800.0;
pub const MAP_HEIGHT: f32 = 600.0;

// Player base stats
pub const BASE_HP: i32 = 100;
pub const BASE_ATTACK: i32 = 10;
pub const BASE_DEFENSE: i32 = 0;
pub const BASE_SPEED: f32 = 5.0;
pub const SPAWN_ZONE: &str = "town";
pub const SPAWN_X: f32 = 400.0;
pub const SPAWN_Y: f32 = 300.0;

// Combat
pub const PROJECTILE_SPEED: f32 = 10.0;
pub const PROJECTILE_HIT_RANGE_SQ: f32 = 400.0;
pub const PROJECTILE_MARGIN: f32 = 50.0;
pub const SHOOT_COOLDOWN_MS: u64 = 500;

// Monsters
pub const MONSTER_CAP: usize = 10;
pub const MONSTER_HP: i32 = 50;
pub const MONSTER_SPEED: f32 = 2.0;
pub const MONSTER_SEPARATION_RADIUS: f32 = 40.0;
pub const MONSTER_SPAWN_MARGIN: f32 = 50.0;

// Items and economy
pub const PICKUP_RANGE: f32 = 15.0;
pub const GOLD_PICKUP_VALUE: u32 = 100;
pub const ITEM_TTL_SECS: u64 = 120;
pub const SHOP_RANGE: f32 = 100.0;
pub const EQUIPMENT_SLOTS: usize = 5;
pub const SELL_BASE_PRICE: i32 = 10;

// Portals
pub const PORTAL_COOLDOWN_MS: u64 = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Element {
    Water,
    Fire,
    Grass,
}

impl Element {
    // Numeric code used on the wire
    pub fn code(self) -> u8 {
        match self {
            Element::Water => 0,
            Element::Fire => 1,
            Element::Grass => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Gold,
    Weapon,
    Armor,
}

impl ItemKind {
    pub fn code(self) -> u8 {
        match self {
            ItemKind::Gold => 0,
            ItemKind::Weapon => 1,
            ItemKind::Armor => 2,
        }
    }
}

// Not Clone: an item exists in exactly one place (ground, inventory,
// equipment slot or market listing) and moves between them by value.
#[derive(Debug, PartialEq)]
pub struct Item {
    pub id: u32,
    pub kind: ItemKind,
    pub name: String,
    pub attack: i32,
    pub defense: i32,
    pub speed: f32,
    pub element: Option<Element>,
}

impl Item {
    // Shop price, derived from the item's combat modifiers
    pub fn sell_value(&self) -> u32 {
        let bonus = self.attack + self.defense + self.speed as i32;
        (SELL_BASE_PRICE + 5 * bonus).max(0) as u32
    }
}
