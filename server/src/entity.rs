use shared::{Element, Item, MONSTER_HP, MONSTER_SEPARATION_RADIUS};
use std::time::Instant;

// Monster owned by exactly one zone, removed only on death
#[derive(Debug, Clone)]
pub struct Monster {
    pub id: u32,
    pub x: f32,
    pub y: f32,
    pub element: Element,
    pub hp: i32,
    pub max_hp: i32,
}

impl Monster {
    pub fn new(id: u32, x: f32, y: f32, element: Element) -> Self {
        Monster {
            id,
            x,
            y,
            element,
            hp: MONSTER_HP,
            max_hp: MONSTER_HP,
        }
    }
}

// Projectile fired by a player's auto-attack
#[derive(Debug, Clone)]
pub struct Projectile {
    pub id: u32,
    pub owner: u32,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub element: Element,
}

// World-placed item waiting to be collected or to expire
#[derive(Debug)]
pub struct GroundItem {
    pub item: Item,
    pub x: f32,
    pub y: f32,
    pub spawned_at: Instant,
}

pub fn dist_sq(ax: f32, ay: f32, bx: f32, by: f32) -> f32 {
    let dx = bx - ax;
    let dy = by - ay;
    dx * dx + dy * dy
}

// Push two monsters apart along their center line, half the overlap
// each. Pairs at identical positions are left alone.
pub fn separate_monsters(a: &mut Monster, b: &mut Monster) {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let distance = (dx * dx + dy * dy).sqrt();

    if distance >= MONSTER_SEPARATION_RADIUS || distance < f32::EPSILON {
        return;
    }

    let nx = dx / distance;
    let ny = dy / distance;
    let push = (MONSTER_SEPARATION_RADIUS - distance) / 2.0;

    a.x -= nx * push;
    a.y -= ny * push;
    b.x += nx * push;
    b.y += ny * push;
}
