/// Distance from the tail at which the viewport counts as detached.
pub const DETACH_THRESHOLD: f64 = 100.0;

/// Raw viewport geometry reported by the host, in the viewport's own units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollMetrics {
    pub scroll_height: f64,
    pub scroll_top: f64,
    pub client_height: f64,
}

impl ScrollMetrics {
    pub const fn new(scroll_height: f64, scroll_top: f64, client_height: f64) -> Self {
        Self {
            scroll_height,
            scroll_top,
            client_height,
        }
    }

    pub fn distance_from_tail(&self) -> f64 {
        self.scroll_height - self.scroll_top - self.client_height
    }
}

/// Command for the host to move its viewport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollCommand {
    ScrollToTail,
}

/// Tracks whether the user has scrolled away from the live edge.
///
/// Follow mode is implied by `!detached`: new messages pull the viewport to the tail
/// only while the user has not scrolled away.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollTracker {
    threshold: f64,
    detached: bool,
}

impl ScrollTracker {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            detached: false,
        }
    }

    pub fn is_detached(&self) -> bool {
        self.detached
    }

    /// Recomputes the detached flag from a scroll notification.
    pub fn observe(&mut self, metrics: ScrollMetrics) -> bool {
        let detached = metrics.distance_from_tail() >= self.threshold;
        if detached != self.detached {
            tracing::debug!(
                detached,
                distance = metrics.distance_from_tail(),
                "scroll detachment changed"
            );
        }

        self.detached = detached;
        detached
    }

    /// Called after a message lands in the log. Follows the tail only if the user was
    /// at the live edge beforehand.
    pub fn on_message_appended(&mut self, metrics: Option<ScrollMetrics>) -> Option<ScrollCommand> {
        let was_detached = self.detached;
        if let Some(metrics) = metrics {
            self.observe(metrics);
        }

        if was_detached {
            None
        } else {
            Some(ScrollCommand::ScrollToTail)
        }
    }

    /// Explicit return to the tail. The flag is left alone until the next scroll
    /// notification recomputes it.
    pub fn jump_to_latest(&self) -> ScrollCommand {
        ScrollCommand::ScrollToTail
    }
}

impl Default for ScrollTracker {
    fn default() -> Self {
        Self::new(DETACH_THRESHOLD)
    }
}
