use std::time::{Duration, Instant};

use crate::config::ScrollConfig;
use crate::paging::Direction;

/// Collapses bursts of calls to at most one per window.
///
/// The first call of a burst passes straight through; later calls inside
/// the window are held (latest wins) and released by [`flush`](Self::flush)
/// once the window has passed.
#[derive(Debug)]
pub struct Throttle<T> {
    window: Duration,
    last_fire: Option<Instant>,
    pending: Option<T>,
}

impl<T> Throttle<T> {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_fire: None,
            pending: None,
        }
    }

    pub fn call(&mut self, now: Instant, value: T) -> Option<T> {
        match self.last_fire {
            Some(last) if now.saturating_duration_since(last) < self.window => {
                self.pending = Some(value);
                None
            }
            _ => {
                self.last_fire = Some(now);
                self.pending = None;
                Some(value)
            }
        }
    }

    pub fn flush(&mut self, now: Instant) -> Option<T> {
        let last = self.last_fire?;
        if self.pending.is_some() && now.saturating_duration_since(last) >= self.window {
            self.last_fire = Some(now);
            return self.pending.take();
        }
        None
    }

    /// Forget a held call without reopening the window.
    pub fn discard_pending(&mut self) {
        self.pending = None;
    }

    pub fn reset(&mut self) {
        self.last_fire = None;
        self.pending = None;
    }
}

/// Where the rendering layer's viewport currently is.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollMetrics {
    /// Distance scrolled from the top.
    pub offset_top: f64,
    /// Distance left until the true bottom.
    pub offset_bottom: f64,
    /// Total scrollable content height.
    pub content_extent: f64,
}

/// Content height captured right before an upward fetch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollAnchor {
    pub previous_content_extent: f64,
}

/// Which end of the list asks for more when reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaginationEdge {
    /// Chat style: reaching the top loads older pages.
    Top,
    /// Feed style: reaching the bottom loads the next page.
    Bottom,
}

/// What the rendering layer should do with its viewport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScrollCommand {
    None,
    ScrollTo { offset: f64 },
    ScrollToBottom { smooth: bool },
}

#[derive(Debug)]
pub struct ScrollCoordinator {
    edge: PaginationEdge,
    top_threshold: f64,
    bottom_threshold: f64,
    affordance_threshold: f64,
    throttle: Throttle<ScrollMetrics>,
    anchor: Option<ScrollAnchor>,
    pinned_to_bottom: bool,
    affordance_visible: bool,
}

impl ScrollCoordinator {
    pub fn new(edge: PaginationEdge, config: &ScrollConfig) -> Self {
        Self {
            edge,
            top_threshold: config.top_threshold,
            bottom_threshold: config.bottom_threshold,
            affordance_threshold: config.affordance_threshold.max(config.bottom_threshold),
            throttle: Throttle::new(config.throttle()),
            anchor: None,
            pinned_to_bottom: true,
            affordance_visible: false,
        }
    }

    pub fn is_scroll_affordance_visible(&self) -> bool {
        self.affordance_visible
    }

    #[cfg(test)]
    pub fn anchor(&self) -> Option<ScrollAnchor> {
        self.anchor
    }

    /// Feed a scroll event. Returns the direction to paginate in, if any.
    pub fn on_scroll_metrics(&mut self, metrics: ScrollMetrics, now: Instant) -> Option<Direction> {
        if metrics.offset_bottom <= self.bottom_threshold {
            self.pinned_to_bottom = true;
            self.affordance_visible = false;
        } else {
            self.pinned_to_bottom = false;
            if metrics.offset_bottom > self.affordance_threshold {
                self.affordance_visible = true;
            }
        }

        let metrics = self.throttle.call(now, metrics)?;
        self.trigger(metrics)
    }

    /// Trailing edge of the throttle. Call on a timer tick.
    pub fn poll(&mut self, now: Instant) -> Option<(Direction, ScrollMetrics)> {
        let metrics = self.throttle.flush(now)?;
        self.trigger(metrics).map(|dir| (dir, metrics))
    }

    fn trigger(&self, metrics: ScrollMetrics) -> Option<Direction> {
        match self.edge {
            PaginationEdge::Top if metrics.offset_top <= self.top_threshold => Some(Direction::Up),
            PaginationEdge::Bottom if metrics.offset_bottom <= self.bottom_threshold => {
                Some(Direction::Down)
            }
            _ => None,
        }
    }

    /// Remember the content height before an upward fetch goes out.
    pub fn capture_anchor(&mut self, content_extent: f64) {
        self.anchor = Some(ScrollAnchor {
            previous_content_extent: content_extent,
        });
    }

    pub fn discard_anchor(&mut self) {
        self.anchor = None;
    }

    /// Called once the merged list has been laid out. Any scroll position
    /// held by the throttle predates the command returned here and is
    /// dropped when the viewport is moved.
    pub fn after_render(
        &mut self,
        direction: Direction,
        content_extent: f64,
        scroll_offset: f64,
    ) -> ScrollCommand {
        match direction {
            Direction::Up => match self.anchor.take() {
                Some(anchor) => {
                    let delta = content_extent - anchor.previous_content_extent;
                    self.throttle.discard_pending();
                    ScrollCommand::ScrollTo {
                        offset: scroll_offset + delta,
                    }
                }
                None => ScrollCommand::None,
            },
            Direction::Down => {
                self.anchor = None;
                if self.pinned_to_bottom {
                    self.throttle.discard_pending();
                    ScrollCommand::ScrollToBottom { smooth: true }
                } else {
                    self.affordance_visible = true;
                    ScrollCommand::None
                }
            }
        }
    }

    /// The viewer asked to jump to the newest content.
    pub fn jump_to_bottom(&mut self) -> ScrollCommand {
        self.throttle.discard_pending();
        self.pinned_to_bottom = true;
        self.affordance_visible = false;
        ScrollCommand::ScrollToBottom { smooth: true }
    }

    pub fn reset(&mut self) {
        self.throttle.reset();
        self.anchor = None;
        self.pinned_to_bottom = true;
        self.affordance_visible = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(top: f64, bottom: f64) -> ScrollMetrics {
        ScrollMetrics {
            offset_top: top,
            offset_bottom: bottom,
            content_extent: top + bottom + 500.0,
        }
    }

    fn coordinator(edge: PaginationEdge) -> ScrollCoordinator {
        ScrollCoordinator::new(edge, &ScrollConfig::default())
    }

    #[test]
    fn throttle_fires_leading_then_trailing() {
        let t0 = Instant::now();
        let mut throttle = Throttle::new(Duration::from_millis(300));
        assert_eq!(throttle.call(t0, 1), Some(1));
        assert_eq!(throttle.call(t0 + Duration::from_millis(50), 2), None);
        assert_eq!(throttle.call(t0 + Duration::from_millis(100), 3), None);
        assert_eq!(throttle.flush(t0 + Duration::from_millis(200)), None);
        assert_eq!(throttle.flush(t0 + Duration::from_millis(300)), Some(3));
        assert_eq!(throttle.flush(t0 + Duration::from_millis(900)), None);
    }

    #[test]
    fn burst_at_top_triggers_once() {
        let t0 = Instant::now();
        let mut c = coordinator(PaginationEdge::Top);
        let fired: Vec<_> = (0..10)
            .filter_map(|i| c.on_scroll_metrics(metrics(0.0, 800.0), t0 + Duration::from_millis(i * 20)))
            .collect();
        assert_eq!(fired, vec![Direction::Up]);
    }

    #[test]
    fn top_edge_ignores_middle_of_list() {
        let mut c = coordinator(PaginationEdge::Top);
        assert_eq!(c.on_scroll_metrics(metrics(120.0, 300.0), Instant::now()), None);
    }

    #[test]
    fn trailing_call_rechecks_position() {
        let t0 = Instant::now();
        let mut c = coordinator(PaginationEdge::Top);
        assert_eq!(c.on_scroll_metrics(metrics(40.0, 800.0), t0), None);
        assert_eq!(
            c.on_scroll_metrics(metrics(0.0, 840.0), t0 + Duration::from_millis(10)),
            None
        );
        let (dir, m) = c.poll(t0 + Duration::from_millis(310)).unwrap();
        assert_eq!(dir, Direction::Up);
        assert_eq!(m.offset_top, 0.0);
    }

    #[test]
    fn bottom_edge_requests_next_page() {
        let mut c = coordinator(PaginationEdge::Bottom);
        assert_eq!(
            c.on_scroll_metrics(metrics(900.0, 30.0), Instant::now()),
            Some(Direction::Down)
        );
    }

    #[test]
    fn prepend_keeps_visible_item_in_place() {
        let mut c = coordinator(PaginationEdge::Top);
        c.capture_anchor(1000.0);
        // three items, 120 high each, landed above the viewport
        let cmd = c.after_render(Direction::Up, 1360.0, 0.0);
        assert_eq!(cmd, ScrollCommand::ScrollTo { offset: 360.0 });
        assert!(c.anchor().is_none());
    }

    #[test]
    fn anchor_correction_drops_held_scroll() {
        let t0 = Instant::now();
        let mut c = coordinator(PaginationEdge::Top);
        assert_eq!(c.on_scroll_metrics(metrics(0.0, 1500.0), t0), Some(Direction::Up));
        assert_eq!(
            c.on_scroll_metrics(metrics(0.0, 1500.0), t0 + Duration::from_millis(40)),
            None
        );
        c.capture_anchor(2000.0);

        let cmd = c.after_render(Direction::Up, 3800.0, 0.0);
        assert_eq!(cmd, ScrollCommand::ScrollTo { offset: 1800.0 });
        assert_eq!(c.poll(t0 + Duration::from_millis(400)), None);
    }

    #[test]
    fn prepend_without_anchor_does_nothing() {
        let mut c = coordinator(PaginationEdge::Top);
        assert_eq!(c.after_render(Direction::Up, 1360.0, 12.0), ScrollCommand::None);
    }

    #[test]
    fn growth_follows_bottom_when_pinned() {
        let mut c = coordinator(PaginationEdge::Top);
        assert_eq!(
            c.after_render(Direction::Down, 900.0, 0.0),
            ScrollCommand::ScrollToBottom { smooth: true }
        );
        assert!(!c.is_scroll_affordance_visible());
    }

    #[test]
    fn growth_while_reading_history_shows_affordance() {
        let mut c = coordinator(PaginationEdge::Top);
        c.on_scroll_metrics(metrics(200.0, 70.0), Instant::now());
        assert!(!c.is_scroll_affordance_visible());

        assert_eq!(c.after_render(Direction::Down, 1200.0, 200.0), ScrollCommand::None);
        assert!(c.is_scroll_affordance_visible());

        // back within the bottom threshold clears it
        c.on_scroll_metrics(metrics(600.0, 20.0), Instant::now());
        assert!(!c.is_scroll_affordance_visible());
    }

    #[test]
    fn scrolling_far_up_shows_affordance() {
        let mut c = coordinator(PaginationEdge::Top);
        c.on_scroll_metrics(metrics(10.0, 400.0), Instant::now());
        assert!(c.is_scroll_affordance_visible());
        assert_eq!(c.jump_to_bottom(), ScrollCommand::ScrollToBottom { smooth: true });
        assert!(!c.is_scroll_affordance_visible());
    }
}
