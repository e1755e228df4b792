//! Battle loot: the pool filled by wiped groups, destroyed structures and
//! forfeiting losers, and its distribution at battle end.
//!
//! A decisive winner with surviving groups gets everything, delivered to
//! one randomly chosen surviving group. Otherwise the loot is left on the
//! tile as unowned treasure.

use std::collections::BTreeMap;

use rand::Rng;

use warband_store::{UpdateBatch, layout};
use warband_types::{BattleSide, Group, GroupId, Item, ItemId, Tile};

use crate::error::BattleError;

/// One pooled item and the side it was taken from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LootItem {
    /// The item.
    pub item: Item,
    /// The side that lost it.
    pub source: BattleSide,
}

/// Items collected during a battle tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LootPool {
    items: Vec<LootItem>,
}

impl LootPool {
    /// An empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add every item in `items`, tagged with the side that lost them.
    pub fn collect(&mut self, items: impl IntoIterator<Item = Item>, source: BattleSide) {
        self.items
            .extend(items.into_iter().map(|item| LootItem { item, source }));
    }

    /// Number of pooled item stacks.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Pooled entries.
    pub fn items(&self) -> &[LootItem] {
        &self.items
    }

    /// Number of stacks taken from `side`.
    pub fn from_side(&self, side: BattleSide) -> usize {
        self.items.iter().filter(|l| l.source == side).count()
    }

    fn into_items(self) -> Vec<Item> {
        self.items.into_iter().map(|l| l.item).collect()
    }
}

/// Where a pool ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LootDestination {
    /// Delivered to a surviving winning group.
    Group(GroupId),
    /// Left on the tile.
    Tile,
}

/// Result of distributing a pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LootDrop {
    /// Where the loot went.
    pub destination: LootDestination,
    /// Number of item stacks delivered.
    pub count: usize,
}

/// Insert `items` into `container`, re-keying any id that is already taken.
pub fn merge_items(container: &mut BTreeMap<ItemId, Item>, items: Vec<Item>) {
    for mut item in items {
        if item.id.is_empty() || container.contains_key(&item.id) {
            item.id = ItemId::new();
        }
        container.insert(item.id.clone(), item);
    }
}

/// Pick the group that receives the loot, if any survived.
pub fn choose_recipient<'a>(survivors: &'a [GroupId], rng: &mut impl Rng) -> Option<&'a GroupId> {
    if survivors.is_empty() {
        return None;
    }
    survivors.get(rng.random_range(0..survivors.len()))
}

/// Move the pool into `group`'s items and record the container write.
pub fn deliver_to_group(
    pool: LootPool,
    group: &mut Group,
    tile: &Tile,
    batch: &mut UpdateBatch,
) -> Result<LootDrop, BattleError> {
    let count = pool.len();
    merge_items(&mut group.items, pool.into_items());
    batch.set(layout::group_items(tile, &group.id), &group.items)?;
    Ok(LootDrop {
        destination: LootDestination::Group(group.id.clone()),
        count,
    })
}

/// Drop the pool on the tile as unowned treasure.
pub fn deliver_to_tile(
    pool: LootPool,
    tile: &Tile,
    batch: &mut UpdateBatch,
) -> Result<LootDrop, BattleError> {
    let count = pool.len();
    let mut treasure = tile.items.clone();
    merge_items(&mut treasure, pool.into_items());
    batch.set(layout::tile_items(tile), &treasure)?;
    Ok(LootDrop {
        destination: LootDestination::Tile,
        count,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::SmallRng;
    use serde_json::json;
    use warband_store::Op;
    use warband_types::Location;

    use super::*;

    fn item(id: &str) -> Item {
        serde_json::from_value(json!({"id": id, "type": "gold", "quantity": 3})).unwrap()
    }

    #[test]
    fn colliding_ids_are_rekeyed() {
        let mut container = BTreeMap::from([(ItemId::from("i1"), item("i1"))]);
        merge_items(&mut container, vec![item("i1"), item("i2")]);
        assert_eq!(container.len(), 3);
        assert!(container.contains_key(&ItemId::from("i2")));
    }

    #[test]
    fn five_items_land_on_tile() {
        let mut tile = Tile::empty(Location::new(2, 2));
        tile.items.insert(ItemId::from("old"), item("old"));
        let mut pool = LootPool::new();
        pool.collect((1..=5).map(|i| item(&format!("loot{i}"))), BattleSide::Side1);

        let mut batch = UpdateBatch::new();
        let delivered = deliver_to_tile(pool, &tile, &mut batch).unwrap();
        assert_eq!(delivered, LootDrop { destination: LootDestination::Tile, count: 5 });

        let Some(Op::Set(written)) = batch.get(&layout::tile_items(&tile)) else {
            panic!("tile items not written");
        };
        assert_eq!(written.as_object().unwrap().len(), 6);
    }

    #[test]
    fn recipient_is_a_survivor() {
        let mut rng = SmallRng::seed_from_u64(5);
        let survivors = vec![GroupId::from("a"), GroupId::from("b")];
        let pick = choose_recipient(&survivors, &mut rng).unwrap();
        assert!(survivors.contains(pick));
        assert!(choose_recipient(&[], &mut rng).is_none());
    }
}
