use std::collections::BTreeMap;

use tracing::debug;

use crate::item::{Item, ItemId, ListId, Service};

/// Items of one panel, in display order.
#[derive(Debug, Clone)]
pub struct ItemList {
    pub service: Service,
    pub items: Vec<Item>,
    /// Bumped on every replacement from the remote source.
    pub generation: u64,
}

impl ItemList {
    pub fn position(&self, id: &ItemId) -> Option<usize> {
        self.items.iter().position(|item| &item.id == id)
    }

    pub fn order(&self) -> Vec<ItemId> {
        self.items.iter().map(|item| item.id.clone()).collect()
    }
}

/// All local state the dashboard renders. Only the coordinator writes to it.
#[derive(Debug, Default)]
pub struct Board {
    lists: BTreeMap<ListId, ItemList>,
}

impl Board {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs or replaces a list with fresh remote contents.
    #[tracing::instrument(skip(self, items), fields(list = %list, count = items.len()))]
    pub fn replace_list(&mut self, list: ListId, service: Service, items: Vec<Item>) -> u64 {
        let generation = self
            .lists
            .get(&list)
            .map(|existing| existing.generation + 1)
            .unwrap_or(0);
        debug!(generation, "replacing list contents");
        self.lists.insert(
            list,
            ItemList {
                service,
                items,
                generation,
            },
        );
        generation
    }

    pub fn list(&self, list: &ListId) -> Option<&ItemList> {
        self.lists.get(list)
    }

    pub fn lists(&self) -> impl Iterator<Item = (&ListId, &ItemList)> {
        self.lists.iter()
    }

    pub fn locate(&self, id: &ItemId) -> Option<(ListId, usize)> {
        self.lists.iter().find_map(|(list_id, list)| {
            list.position(id).map(|idx| (list_id.clone(), idx))
        })
    }

    pub fn item(&self, id: &ItemId) -> Option<&Item> {
        self.lists
            .values()
            .find_map(|list| list.items.iter().find(|item| &item.id == id))
    }

    pub fn item_mut(&mut self, id: &ItemId) -> Option<&mut Item> {
        self.lists
            .values_mut()
            .find_map(|list| list.items.iter_mut().find(|item| &item.id == id))
    }

    pub fn contains(&self, id: &ItemId) -> bool {
        self.item(id).is_some()
    }

    pub fn order(&self, list: &ListId) -> Option<Vec<ItemId>> {
        self.lists.get(list).map(ItemList::order)
    }

    pub fn insert_item(&mut self, list: &ListId, index: usize, item: Item) -> bool {
        let Some(target) = self.lists.get_mut(list) else {
            return false;
        };
        let index = index.min(target.items.len());
        target.items.insert(index, item);
        true
    }

    pub fn remove_item(&mut self, id: &ItemId) -> Option<(ListId, usize, Item)> {
        let (list_id, idx) = self.locate(id)?;
        let list = self.lists.get_mut(&list_id)?;
        let item = list.items.remove(idx);
        Some((list_id, idx, item))
    }

    /// Moves one item to `new_position` inside its list.
    pub fn move_item(&mut self, list: &ListId, id: &ItemId, new_position: usize) -> bool {
        let Some(target) = self.lists.get_mut(list) else {
            return false;
        };
        let Some(current) = target.position(id) else {
            return false;
        };
        if new_position >= target.items.len() {
            return false;
        }
        let item = target.items.remove(current);
        target.items.insert(new_position, item);
        true
    }

    /// Rearranges a list to follow `order`. Items missing from `order` keep
    /// their relative order after the named ones; unknown ids are ignored.
    pub fn apply_order(&mut self, list: &ListId, order: &[ItemId]) -> bool {
        let Some(target) = self.lists.get_mut(list) else {
            return false;
        };

        let mut remaining = std::mem::take(&mut target.items);
        let mut arranged = Vec::with_capacity(remaining.len());
        for id in order {
            if let Some(idx) = remaining.iter().position(|item| &item.id == id) {
                arranged.push(remaining.remove(idx));
            }
        }
        arranged.extend(remaining);
        target.items = arranged;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::Board;
    use crate::item::{Item, ItemId, ListId, Service};

    fn seeded() -> (Board, ListId) {
        let list = ListId::new("todoist");
        let mut board = Board::new();
        board.replace_list(
            list.clone(),
            Service::Todoist,
            vec![
                Item::new(Service::Todoist, "a", "A"),
                Item::new(Service::Todoist, "b", "B"),
                Item::new(Service::Todoist, "c", "C"),
            ],
        );
        (board, list)
    }

    fn keys(board: &Board, list: &ListId) -> Vec<String> {
        board
            .order(list)
            .expect("list exists")
            .into_iter()
            .map(|id| id.key)
            .collect()
    }

    #[test]
    fn replacing_a_list_bumps_generation() {
        let (mut board, list) = seeded();
        assert_eq!(board.list(&list).expect("list").generation, 0);
        let next = board.replace_list(list.clone(), Service::Todoist, vec![]);
        assert_eq!(next, 1);
    }

    #[test]
    fn apply_order_keeps_unlisted_items_at_the_end() {
        let (mut board, list) = seeded();
        let order = vec![
            ItemId::new(Service::Todoist, "c"),
            ItemId::new(Service::Todoist, "ghost"),
            ItemId::new(Service::Todoist, "a"),
        ];
        assert!(board.apply_order(&list, &order));
        assert_eq!(keys(&board, &list), ["c", "a", "b"]);
    }

    #[test]
    fn move_item_rejects_out_of_range_positions() {
        let (mut board, list) = seeded();
        let a = ItemId::new(Service::Todoist, "a");
        assert!(!board.move_item(&list, &a, 3));
        assert!(board.move_item(&list, &a, 2));
        assert_eq!(keys(&board, &list), ["b", "c", "a"]);
    }

    #[test]
    fn remove_and_reinsert_roundtrip_position() {
        let (mut board, list) = seeded();
        let b = ItemId::new(Service::Todoist, "b");
        let (from, idx, item) = board.remove_item(&b).expect("removed");
        assert_eq!((from.as_str(), idx), ("todoist", 1));
        assert!(!board.contains(&b));
        assert!(board.insert_item(&list, idx, item));
        assert_eq!(keys(&board, &list), ["a", "b", "c"]);
    }
}
