use std::collections::HashSet;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::types::Identified;

/// Up is toward older history, down toward the latest items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    Up,
    #[default]
    Down,
}

/// One bounded batch returned by the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct ListPage<T> {
    pub items: Vec<T>,
    pub page_index: u32,
    pub has_more: bool,
}

impl<T> ListPage<T> {
    /// A full batch means the server may have more behind it.
    pub fn from_batch(items: Vec<T>, page_index: u32, limit: u32) -> Self {
        let has_more = limit > 0 && items.len() as u32 >= limit;
        Self {
            items,
            page_index,
            has_more,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ListState<T> {
    pub items: Vec<T>,
    /// Highest page merged so far, 0 before the first load.
    pub page: u32,
    pub direction: Direction,
    pub loading_older: bool,
    pub loading_newer: bool,
    /// False once continuation pages stop yielding anything new.
    pub has_more: bool,
}

impl<T> Default for ListState<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            page: 0,
            direction: Direction::Down,
            loading_older: false,
            loading_newer: false,
            has_more: true,
        }
    }
}

/// An in-flight page fetch handed out by [`ListController::begin`].
#[derive(Debug, Clone)]
pub struct PageRequest {
    pub load_id: u64,
    pub direction: Direction,
    pub page: u32,
    pub cancel: CancellationToken,
}

/// Page 1 downward reloads the list; everything else continues it.
fn is_continuation(direction: Direction, page: u32) -> bool {
    direction == Direction::Up || page > 1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Merge {
    Applied { added: usize },
    /// The list changed identity while the page was in flight.
    Stale,
}

/// Anything that can produce pages for a list.
#[async_trait]
pub trait PageSource<T>: Send + Sync {
    async fn fetch(&self, page: u32, cancel: CancellationToken) -> Result<ListPage<T>>;
}

/// Fetch-and-merge engine for one scrollable list.
///
/// Merges are keyed by id, so replaying or reordering page responses never
/// duplicates an item. A failed fetch leaves the state untouched.
#[derive(Debug)]
pub struct ListController<T> {
    state: ListState<T>,
    load_id: u64,
    cancel: CancellationToken,
}

impl<T> Default for ListController<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ListController<T> {
    pub fn new() -> Self {
        Self {
            state: ListState::default(),
            load_id: 0,
            cancel: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> &ListState<T> {
        &self.state
    }

    pub fn items(&self) -> &[T] {
        &self.state.items
    }

    pub fn next_page(&self) -> u32 {
        self.state.page + 1
    }

    /// Drop everything for a new list identity and cancel in-flight fetches.
    pub fn reset(&mut self) {
        self.cancel.cancel();
        self.cancel = CancellationToken::new();
        self.load_id += 1;
        self.state = ListState::default();
    }

    /// Reserve a fetch, or `None` if one is already running in that
    /// direction or the list is exhausted for continuation pages.
    pub fn begin(&mut self, direction: Direction, page: u32) -> Option<PageRequest> {
        let in_flight = match direction {
            Direction::Up => self.state.loading_older,
            Direction::Down => self.state.loading_newer,
        };
        if in_flight {
            tracing::debug!("{:?} page {} suppressed, fetch in flight", direction, page);
            return None;
        }
        if is_continuation(direction, page) && !self.state.has_more {
            tracing::debug!("{:?} page {} suppressed, list exhausted", direction, page);
            return None;
        }
        match direction {
            Direction::Up => self.state.loading_older = true,
            Direction::Down => self.state.loading_newer = true,
        }

        Some(PageRequest {
            load_id: self.load_id,
            direction,
            page,
            cancel: self.cancel.child_token(),
        })
    }
}

impl<T: Identified> ListController<T> {
    /// Merge the outcome of a fetch started with [`begin`](Self::begin).
    pub fn finish(&mut self, request: &PageRequest, result: Result<ListPage<T>>) -> Result<Merge> {
        if request.load_id != self.load_id {
            tracing::debug!(
                "dropping stale page {} (load {} != {})",
                request.page,
                request.load_id,
                self.load_id
            );
            return Ok(Merge::Stale);
        }

        match request.direction {
            Direction::Up => self.state.loading_older = false,
            Direction::Down => self.state.loading_newer = false,
        }

        let page = result?;
        let added = self.merge(request.direction, request.page, page);
        Ok(Merge::Applied { added })
    }

    /// `begin`, fetch from `source`, `finish` in one go.
    pub async fn load_page(
        &mut self,
        source: &dyn PageSource<T>,
        direction: Direction,
        page: u32,
    ) -> Result<Option<Merge>> {
        let Some(request) = self.begin(direction, page) else {
            return Ok(None);
        };
        let result = source.fetch(page, request.cancel.clone()).await;
        self.finish(&request, result).map(Some)
    }

    fn merge(&mut self, direction: Direction, page_no: u32, page: ListPage<T>) -> usize {
        let has_more = page.has_more;

        if direction == Direction::Down && page_no <= 1 {
            let mut seen = HashSet::new();
            let items: Vec<T> = page
                .items
                .into_iter()
                .filter(|item| seen.insert(item.id().to_string()))
                .collect();
            let added = items.len();
            self.state.items = items;
            self.state.page = 1;
            self.state.direction = Direction::Down;
            self.state.has_more = has_more;
            return added;
        }

        let mut seen: HashSet<String> =
            self.state.items.iter().map(|item| item.id().to_string()).collect();
        let fresh: Vec<T> = page
            .items
            .into_iter()
            .filter(|item| seen.insert(item.id().to_string()))
            .collect();
        let added = fresh.len();

        match direction {
            Direction::Up => {
                let tail = std::mem::take(&mut self.state.items);
                self.state.items = fresh;
                self.state.items.extend(tail);
            }
            Direction::Down => self.state.items.extend(fresh),
        }

        self.state.direction = direction;
        self.state.page = self.state.page.max(page_no);
        if added == 0 || !has_more {
            self.state.has_more = false;
        }
        added
    }

    /// Optimistic insertion at the end. An item with a known id is replaced
    /// in place instead.
    pub fn append_local(&mut self, item: T) {
        if let Some(existing) = self.state.items.iter_mut().find(|i| i.id() == item.id()) {
            *existing = item;
        } else {
            self.state.items.push(item);
        }
        self.state.direction = Direction::Down;
    }

    /// Newest-first feeds put locally created items on top.
    pub fn prepend_local(&mut self, item: T) {
        if !self.contains(item.id()) {
            self.state.items.insert(0, item);
        }
    }

    pub fn update(&mut self, id: &str, apply: impl FnOnce(&mut T)) -> bool {
        match self.state.items.iter_mut().find(|i| i.id() == id) {
            Some(item) => {
                apply(item);
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<T> {
        let index = self.state.items.iter().position(|i| i.id() == id)?;
        Some(self.state.items.remove(index))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.state.items.iter().any(|i| i.id() == id)
    }

    /// Swap the whole list at once, keeping paging bookkeeping.
    pub fn replace_items(&mut self, items: Vec<T>) {
        self.state.items = items;
    }
}
