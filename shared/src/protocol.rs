//! Wire protocol spoken between the server and its clients
//!
//! Every frame is one JSON object on one line, tagged by a `type` field.

use crate::{Element, Item};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Commands a client may send. Anything that does not decode into one
/// of these variants is dropped at the transport boundary.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientCommand {
    Move { x: f32, y: f32 },
    Equip { item_id: u32, slot: usize },
    Unequip { slot: usize },
    Sell { item_id: u32 },
    MarketList { item_id: u32, price: u32 },
    MarketBuy { listing_id: u32 },
}

/// Messages the server pushes to clients.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMessage {
    Welcome {
        id: u32,
        hp: i32,
        max_hp: i32,
        attack: i32,
        defense: i32,
        speed: f32,
        gold: u32,
    },
    Stats {
        id: u32,
        hp: i32,
        max_hp: i32,
        attack: i32,
        defense: i32,
        speed: f32,
        gold: u32,
    },
    Snap {
        players: Vec<PlayerView>,
        monsters: Vec<MonsterView>,
        projectiles: Vec<ProjectileView>,
        portals: Vec<PortalView>,
    },
    ItemSpawn {
        id: u32,
        item_type: u8,
        x: f32,
        y: f32,
    },
    ItemRemove {
        id: u32,
    },
    GoldUpdate {
        amount: u32,
    },
    Leave {
        id: u32,
    },
    MapSwitch {
        map: String,
        x: f32,
        y: f32,
        portals: Vec<PortalData>,
    },
    Inventory {
        items: Vec<ItemView>,
    },
    Equipment {
        // Slot indices keyed as strings; JSON object keys are strings
        // and tagged-enum decoding will not coerce them back to ints
        items: BTreeMap<String, ItemView>,
    },
    MarketUpdate {
        items: Vec<ListingView>,
    },
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PlayerView {
    pub id: u32,
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct MonsterView {
    pub id: u32,
    pub x: f32,
    pub y: f32,
    #[serde(rename = "type")]
    pub element: u8,
    pub hp: i32,
    pub max_hp: i32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ProjectileView {
    pub id: u32,
    pub x: f32,
    pub y: f32,
    #[serde(rename = "type")]
    pub element: u8,
}

/// Portal as seen inside a snapshot.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PortalView {
    pub id: u32,
    pub x: f32,
    pub y: f32,
    pub target_map: String,
}

/// Portal layout entry sent with a map switch.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PortalData {
    pub x: f32,
    pub y: f32,
    pub radius: f32,
    pub target: String,
}

/// Wire shape of an item in inventory, equipment and market frames.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ItemView {
    pub id: u32,
    pub item_type: u8,
    pub name: String,
    pub attack: i32,
    pub defense: i32,
    pub speed: f32,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub element: Option<u8>,
}

impl From<&Item> for ItemView {
    fn from(item: &Item) -> Self {
        ItemView {
            id: item.id,
            item_type: item.kind.code(),
            name: item.name.clone(),
            attack: item.attack,
            defense: item.defense,
            speed: item.speed,
            element: item.element.map(Element::code),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ListingView {
    pub id: u32,
    pub seller_id: u32,
    pub seller_name: String,
    pub item: ItemView,
    pub price: u32,
}
