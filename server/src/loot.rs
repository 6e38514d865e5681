//! Loot rolls for monster deaths

use rand::rngs::StdRng;
use rand::Rng;
use shared::{Element, Item, ItemKind};

const ARMOR_NAMES: [&str; 3] = ["Leather Vest", "Chain Mail", "Iron Plate"];

// 50% gold, 25% weapon, 25% armor
pub fn roll_loot(id: u32, rng: &mut StdRng) -> Item {
    let roll = rng.gen_range(0..100);

    if roll < 50 {
        Item {
            id,
            kind: ItemKind::Gold,
            name: "Gold Pile".to_string(),
            attack: 0,
            defense: 0,
            speed: 0.0,
            element: None,
        }
    } else if roll < 75 {
        let element = random_element(rng);
        Item {
            id,
            kind: ItemKind::Weapon,
            name: weapon_name(element).to_string(),
            attack: rng.gen_range(1..=10),
            defense: 0,
            speed: 0.0,
            element: Some(element),
        }
    } else {
        Item {
            id,
            kind: ItemKind::Armor,
            name: ARMOR_NAMES[rng.gen_range(0..ARMOR_NAMES.len())].to_string(),
            attack: 0,
            defense: rng.gen_range(1..=10),
            speed: 0.0,
            element: None,
        }
    }
}

pub fn random_element(rng: &mut StdRng) -> Element {
    match rng.gen_range(0..3) {
        0 => Element::Water,
        1 => Element::Fire,
        _ => Element::Grass,
    }
}

fn weapon_name(element: Element) -> &'static str {
    match element {
        Element::Water => "Tide Blade",
        Element::Fire => "Ember Blade",
        Element::Grass => "Thorn Blade",
    }
}
