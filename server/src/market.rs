//! Player-to-player market ledger
//!
//! Listings live at the registry level, not in any zone: an item on the
//! market is owned by the ledger itself, neither by the seller nor by
//! the world. Every mutation ends with a full market broadcast to all
//! connected players.
//!
//! The operations here follow the registry's lock order (directory,
//! then market, then one zone lock at a time) and reject failed
//! preconditions silently, like every other player action.

use crate::game::{Game, PlayerRoute};
use crate::player::Outbox;
use shared::protocol::{ItemView, ListingView, ServerMessage};
use shared::Item;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

/// An item held for sale
#[derive(Debug)]
pub struct Listing {
    pub id: u32,
    pub seller: u32,
    pub seller_name: String,
    pub item: Item,
    pub price: u32,
    pub created_at: Instant,
}

/// Registry-level store of open listings
#[derive(Debug, Default)]
pub struct Market {
    listings: BTreeMap<u32, Listing>,
}

impl Market {
    pub fn len(&self) -> usize {
        self.listings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listings.is_empty()
    }

    pub fn get(&self, id: u32) -> Option<&Listing> {
        self.listings.get(&id)
    }

    pub fn ids(&self) -> Vec<u32> {
        self.listings.keys().copied().collect()
    }

    fn views(&self) -> Vec<ListingView> {
        self.listings
            .values()
            .map(|listing| ListingView {
                id: listing.id,
                seller_id: listing.seller,
                seller_name: listing.seller_name.clone(),
                item: ItemView::from(&listing.item),
                price: listing.price,
            })
            .collect()
    }
}

impl Game {
    /// Moves an item from the seller's inventory into a fresh listing
    /// and broadcasts the updated market. A zero price or an item the
    /// seller does not hold leaves everything untouched. (A negative
    /// price never gets this far; it fails to decode at the wire.)
    pub fn market_list(&self, seller: u32, item_id: u32, price: u32) {
        if price == 0 {
            return;
        }

        let directory = self.directory();
        let zone = match directory
            .get(&seller)
            .and_then(|route| self.zone(&route.zone))
        {
            Some(zone) => Arc::clone(zone),
            None => return,
        };

        // The item comes out under the zone lock, then moves into the
        // ledger; it is never in both places
        let item = {
            let mut state = zone.state();
            let player = match state.players.get_mut(&seller) {
                Some(player) => player,
                None => return,
            };
            let item = match player.take_item(item_id) {
                Some(item) => item,
                None => return,
            };
            player.send_inventory();
            item
        };

        let views = {
            let mut market = self.market();
            let id = self.ids.next_listing();
            market.listings.insert(
                id,
                Listing {
                    id,
                    seller,
                    seller_name: format!("Player {}", seller),
                    item,
                    price,
                    created_at: Instant::now(),
                },
            );
            market.views()
        };

        broadcast_market(&directory, views);
    }

    /// Buys a listing. A self-buy is a cancel: the item comes home and
    /// no gold moves. Otherwise the buyer pays the asking price, the
    /// seller is credited if still connected, and the item lands in the
    /// buyer's inventory. Unknown listings and insufficient gold are
    /// silent no-ops.
    pub fn market_buy(&self, buyer: u32, listing_id: u32) {
        let directory = self.directory();
        let buyer_zone = match directory
            .get(&buyer)
            .and_then(|route| self.zone(&route.zone))
        {
            Some(zone) => Arc::clone(zone),
            None => return,
        };

        let mut market = self.market();
        let (price, seller) = match market.listings.get(&listing_id) {
            Some(listing) => (listing.price, listing.seller),
            None => return,
        };

        {
            let mut state = buyer_zone.state();
            let player = match state.players.get_mut(&buyer) {
                Some(player) => player,
                None => return,
            };

            if seller != buyer {
                if player.gold < price {
                    return;
                }
                player.gold -= price;
                player
                    .outbox
                    .send(ServerMessage::GoldUpdate { amount: player.gold });
            }

            // Existence was checked above and the ledger lock is still
            // held, so the listing is still there
            if let Some(listing) = market.listings.remove(&listing_id) {
                player.inventory.push(listing.item);
                player.send_inventory();
            }
        }

        if seller != buyer {
            if let Some(route) = directory.get(&seller) {
                if let Some(zone) = self.zone(&route.zone) {
                    let mut state = zone.state();
                    if let Some(player) = state.players.get_mut(&seller) {
                        player.gold += price;
                        player
                            .outbox
                            .send(ServerMessage::GoldUpdate { amount: player.gold });
                    }
                }
            }
        }

        let views = market.views();
        drop(market);
        broadcast_market(&directory, views);
    }

    /// Pushes the current listing set to one player, used on join.
    pub(crate) fn send_market(&self, outbox: &Outbox) {
        let items = self.market().views();
        outbox.send(ServerMessage::MarketUpdate { items });
    }
}

fn broadcast_market(directory: &BTreeMap<u32, PlayerRoute>, views: Vec<ListingView>) {
    let message = ServerMessage::MarketUpdate { items: views };
    for route in directory.values() {
        route.outbox.send(message.clone());
    }
}
