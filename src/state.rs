//! Observable editor state shared with the UI layer.
//!
//! The editor owns one [`ObservableState`] and hands it to each component explicitly. UI code
//! subscribes to the keys it renders and never writes back; every write goes through a setter that
//! notifies subscribers only when the value actually changes.

use crate::catalog::CatalogEntry;
use crate::scene::ItemId;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedItemSummary {
    pub id: ItemId,
    pub name: String,
    pub catalog_id: Option<String>,
}

/// Informational signal for transient on-screen notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    NoActiveItem,
    OutsideRoom,
    PlacementBusy,
    NothingSelected,
    ItemPlaced { name: String },
    ItemDeleted { name: String },
    LayoutReset { removed: usize },
    Saved { items: usize },
    SaveFailed { reason: String },
    Loaded { items: usize },
    NoSavedLayout,
    LoadFailed { reason: String },
    Cleared,
    ClearFailed { reason: String },
}

impl Notice {
    pub fn is_error(&self) -> bool {
        matches!(self, Notice::SaveFailed { .. } | Notice::LoadFailed { .. } | Notice::ClearFailed { .. })
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::NoActiveItem => write!(f, "Select an item from the catalog first"),
            Notice::OutsideRoom => write!(f, "Cannot place items outside the room"),
            Notice::PlacementBusy => write!(f, "Still placing the previous item"),
            Notice::NothingSelected => write!(f, "No item selected"),
            Notice::ItemPlaced { name } => write!(f, "Placed {name}"),
            Notice::ItemDeleted { name } => write!(f, "Deleted {name}"),
            Notice::LayoutReset { removed } => write!(f, "Layout reset ({removed} items removed)"),
            Notice::Saved { items } => write!(f, "Layout saved ({items} items)"),
            Notice::SaveFailed { reason } => write!(f, "Failed to save layout: {reason}"),
            Notice::Loaded { items } => write!(f, "Layout loaded ({items} items)"),
            Notice::NoSavedLayout => write!(f, "No saved layout found"),
            Notice::LoadFailed { reason } => write!(f, "Failed to load layout: {reason}"),
            Notice::Cleared => write!(f, "Saved layout cleared"),
            Notice::ClearFailed { reason } => write!(f, "Failed to clear saved layout: {reason}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateKey {
    SelectedItem,
    ActiveItem,
    PlacedItems,
    Loading,
    Notice,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StateChange {
    SelectedItem(Option<ItemId>),
    ActiveItem(Option<CatalogEntry>),
    PlacedItems(Vec<PlacedItemSummary>),
    Loading(bool),
    Notice(Notice),
}

impl StateChange {
    pub fn key(&self) -> StateKey {
        match self {
            StateChange::SelectedItem(_) => StateKey::SelectedItem,
            StateChange::ActiveItem(_) => StateKey::ActiveItem,
            StateChange::PlacedItems(_) => StateKey::PlacedItems,
            StateChange::Loading(_) => StateKey::Loading,
            StateChange::Notice(_) => StateKey::Notice,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback = Box<dyn FnMut(&StateChange)>;

struct Subscriber {
    id: SubscriptionId,
    key: Option<StateKey>,
    callback: Callback,
}

#[derive(Default)]
pub struct ObservableState {
    selected: Option<ItemId>,
    active_item: Option<CatalogEntry>,
    placed_items: Vec<PlacedItemSummary>,
    loading: bool,
    last_notice: Option<Notice>,
    subscribers: Vec<Subscriber>,
    next_subscription: u64,
}

impl ObservableState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback` for changes of `key`.
    pub fn subscribe(&mut self, key: StateKey, callback: impl FnMut(&StateChange) + 'static) -> SubscriptionId {
        self.add_subscriber(Some(key), Box::new(callback))
    }

    /// Registers `callback` for every change.
    pub fn subscribe_all(&mut self, callback: impl FnMut(&StateChange) + 'static) -> SubscriptionId {
        self.add_subscriber(None, Box::new(callback))
    }

    fn add_subscriber(&mut self, key: Option<StateKey>, callback: Callback) -> SubscriptionId {
        self.next_subscription += 1;
        let id = SubscriptionId(self.next_subscription);
        self.subscribers.push(Subscriber { id, key, callback });
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|subscriber| subscriber.id != id);
        self.subscribers.len() != before
    }

    fn notify(&mut self, change: StateChange) {
        let key = change.key();
        for subscriber in &mut self.subscribers {
            if subscriber.key.map_or(true, |k| k == key) {
                (subscriber.callback)(&change);
            }
        }
    }

    pub fn selected(&self) -> Option<ItemId> {
        self.selected
    }

    pub fn active_item(&self) -> Option<&CatalogEntry> {
        self.active_item.as_ref()
    }

    pub fn placed_items(&self) -> &[PlacedItemSummary] {
        &self.placed_items
    }

    pub fn loading(&self) -> bool {
        self.loading
    }

    pub fn last_notice(&self) -> Option<&Notice> {
        self.last_notice.as_ref()
    }

    /// Only the selection engine calls this.
    pub(crate) fn set_selected(&mut self, selected: Option<ItemId>) {
        if self.selected != selected {
            self.selected = selected;
            self.notify(StateChange::SelectedItem(selected));
        }
    }

    pub fn set_active_item(&mut self, entry: Option<CatalogEntry>) {
        if self.active_item != entry {
            self.active_item = entry.clone();
            self.notify(StateChange::ActiveItem(entry));
        }
    }

    pub(crate) fn set_placed_items(&mut self, items: Vec<PlacedItemSummary>) {
        if self.placed_items != items {
            self.placed_items = items.clone();
            self.notify(StateChange::PlacedItems(items));
        }
    }

    pub(crate) fn set_loading(&mut self, loading: bool) {
        if self.loading != loading {
            self.loading = loading;
            self.notify(StateChange::Loading(loading));
        }
    }

    pub fn notice(&mut self, notice: Notice) {
        if notice.is_error() {
            tracing::warn!(%notice, "editor notice");
        } else {
            tracing::info!(%notice, "editor notice");
        }
        self.last_notice = Some(notice.clone());
        self.notify(StateChange::Notice(notice));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn subscribers_receive_only_their_key() {
        let mut state = ObservableState::new();
        let loading_events = Rc::new(RefCell::new(Vec::new()));
        let all_events = Rc::new(RefCell::new(0usize));
        let sink = loading_events.clone();
        state.subscribe(StateKey::Loading, move |change| sink.borrow_mut().push(change.clone()));
        let counter = all_events.clone();
        state.subscribe_all(move |_| *counter.borrow_mut() += 1);

        state.set_loading(true);
        state.set_loading(true);
        state.notice(Notice::NothingSelected);
        state.set_loading(false);

        assert_eq!(*loading_events.borrow(), vec![StateChange::Loading(true), StateChange::Loading(false)]);
        assert_eq!(*all_events.borrow(), 3);
        assert_eq!(state.last_notice(), Some(&Notice::NothingSelected));
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let mut state = ObservableState::new();
        let count = Rc::new(RefCell::new(0usize));
        let counter = count.clone();
        let id = state.subscribe_all(move |_| *counter.borrow_mut() += 1);
        state.notice(Notice::Cleared);
        assert!(state.unsubscribe(id));
        assert!(!state.unsubscribe(id));
        state.notice(Notice::Cleared);
        assert_eq!(*count.borrow(), 1);
    }
}
