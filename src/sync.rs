use std::sync::OnceLock;

use regex::Regex;

use crate::paging::ListController;
use crate::types::SessionSummary;

/// Longest derived sidebar title, in characters.
pub const TITLE_MAX_CHARS: usize = 50;

fn markdown_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[*#]|(\[\d+\])+").expect("static markdown regex"))
}

/// Sidebar title from message text: markdown markers and citation
/// brackets stripped, whitespace collapsed, truncated.
pub fn derive_title(text: &str) -> String {
    let plain = markdown_re().replace_all(text, "");
    let collapsed = plain.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(TITLE_MAX_CHARS).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    Created,
    MovedToFront,
    AlreadyFirst,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Removal {
    pub removed: bool,
    /// The removed session was open; the primary view must leave it.
    pub navigate_away: bool,
}

/// Mirrors primary-view changes into the sidebar session list without a
/// second round-trip. Every change swaps the whole list in one step.
#[derive(Debug, Default)]
pub struct SessionListSync {
    open_session: Option<String>,
}

impl SessionListSync {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_session(&self) -> Option<&str> {
        self.open_session.as_deref()
    }

    pub fn set_open(&mut self, id: Option<String>) {
        self.open_session = id;
    }

    /// New activity in `session_id`: create its entry if missing, otherwise
    /// move it to the front keeping everyone else's order.
    pub fn record_activity(
        &self,
        list: &mut ListController<SessionSummary>,
        session_id: &str,
        latest_text: &str,
    ) -> Activity {
        let current = list.items();
        let (activity, next) = match current.iter().position(|s| s.id == session_id) {
            Some(0) => return Activity::AlreadyFirst,
            Some(index) => {
                let mut next = Vec::with_capacity(current.len());
                next.push(current[index].clone());
                next.extend(
                    current
                        .iter()
                        .enumerate()
                        .filter(|(i, _)| *i != index)
                        .map(|(_, s)| s.clone()),
                );
                (Activity::MovedToFront, next)
            }
            None => {
                let mut next = Vec::with_capacity(current.len() + 1);
                next.push(SessionSummary {
                    id: session_id.to_string(),
                    title: derive_title(latest_text),
                });
                next.extend(current.iter().cloned());
                (Activity::Created, next)
            }
        };

        tracing::debug!("sidebar {:?} for {}", activity, session_id);
        list.replace_items(next);
        activity
    }

    /// Apply a confirmed deletion from either view.
    pub fn remove(&mut self, list: &mut ListController<SessionSummary>, session_id: &str) -> Removal {
        let next: Vec<SessionSummary> = list
            .items()
            .iter()
            .filter(|s| s.id != session_id)
            .cloned()
            .collect();
        let removed = next.len() != list.items().len();
        list.replace_items(next);

        let navigate_away = self.open_session.as_deref() == Some(session_id);
        if navigate_away {
            self.open_session = None;
        }
        Removal {
            removed,
            navigate_away,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paging::{Direction, ListPage};

    fn sidebar(ids: &[&str]) -> ListController<SessionSummary> {
        let mut list = ListController::new();
        let req = list.begin(Direction::Down, 1).unwrap();
        let items = ids
            .iter()
            .map(|id| SessionSummary {
                id: id.to_string(),
                title: id.to_uppercase(),
            })
            .collect();
        list.finish(&req, Ok(ListPage { items, page_index: 1, has_more: false }))
            .unwrap();
        list
    }

    fn ids(list: &ListController<SessionSummary>) -> Vec<&str> {
        list.items().iter().map(|s| s.id.as_str()).collect()
    }

    #[test]
    fn activity_moves_session_to_front() {
        let mut list = sidebar(&["a", "b", "c"]);
        let sync = SessionListSync::new();
        assert_eq!(sync.record_activity(&mut list, "b", "hi"), Activity::MovedToFront);
        assert_eq!(ids(&list), vec!["b", "a", "c"]);
        assert_eq!(list.items()[0].title, "B");
    }

    #[test]
    fn activity_on_first_is_noop() {
        let mut list = sidebar(&["a", "b"]);
        let sync = SessionListSync::new();
        assert_eq!(sync.record_activity(&mut list, "a", "hi"), Activity::AlreadyFirst);
        assert_eq!(ids(&list), vec!["a", "b"]);
    }

    #[test]
    fn first_message_creates_entry() {
        let mut list = sidebar(&[]);
        let sync = SessionListSync::new();
        let prompt = "Rewrite this paragraph so that it sounds friendlier and a lot less formal";
        assert_eq!(sync.record_activity(&mut list, "s1", prompt), Activity::Created);
        assert_eq!(list.items().len(), 1);
        assert_eq!(list.items()[0].id, "s1");
        assert_eq!(list.items()[0].title, prompt.chars().take(50).collect::<String>());
    }

    #[test]
    fn created_entry_goes_first() {
        let mut list = sidebar(&["a"]);
        SessionListSync::new().record_activity(&mut list, "new", "x");
        assert_eq!(ids(&list), vec!["new", "a"]);
    }

    #[test]
    fn title_strips_markdown() {
        assert_eq!(derive_title("## **Bold** claim [1][2]\n\nmore"), "Bold claim more");
        assert_eq!(derive_title(&"é".repeat(80)).chars().count(), TITLE_MAX_CHARS);
    }

    #[test]
    fn deleting_open_session_navigates_away() {
        let mut list = sidebar(&["a", "b"]);
        let mut sync = SessionListSync::new();
        sync.set_open(Some("b".into()));

        let removal = sync.remove(&mut list, "b");
        assert_eq!(removal, Removal { removed: true, navigate_away: true });
        assert_eq!(ids(&list), vec!["a"]);
        assert_eq!(sync.open_session(), None);
    }

    #[test]
    fn deleting_other_session_stays() {
        let mut list = sidebar(&["a", "b"]);
        let mut sync = SessionListSync::new();
        sync.set_open(Some("a".into()));

        let removal = sync.remove(&mut list, "b");
        assert!(removal.removed);
        assert!(!removal.navigate_away);
        assert_eq!(sync.open_session(), Some("a"));
    }
}
