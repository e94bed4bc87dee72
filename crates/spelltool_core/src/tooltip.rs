//! Viewport geometry for ability and keybind tooltips.
//!
//! Everything here is a pure function of the trigger's bounding box, the
//! measured tooltip size and the viewport, all in CSS pixels with the origin
//! at the viewport's top-left corner.

/// Minimum distance kept between a tooltip and the viewport edge.
pub const VIEWPORT_MARGIN: f64 = 10.0;
/// Distance between a tooltip and its trigger.
pub const TRIGGER_GAP: f64 = 8.0;
/// Trigger distance used by the keyboard-view tooltips.
pub const KEY_GAP: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    fn center_x(&self) -> f64 {
        self.left + self.width / 2.0
    }

    fn center_y(&self) -> f64 {
        self.top + self.height / 2.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

/// Which edge the vertical offset is measured from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Vertical {
    /// Distance from the viewport top to the tooltip top.
    Top(f64),
    /// Distance from the viewport bottom to the tooltip bottom.
    Bottom(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Above,
    Below,
    Right,
    Left,
    Over,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub left: f64,
    pub vertical: Vertical,
    pub side: Side,
}

/// Ability cell: centered on the trigger, above it unless there is clearly
/// more room below.
pub fn position_ability_tooltip(trigger: Rect, tooltip: Size, viewport: Viewport) -> Placement {
    let space_above = trigger.top;
    let space_below = viewport.height - trigger.bottom();
    let show_above = space_above >= tooltip.height || space_below < space_above;

    let mut left = trigger.center_x() - tooltip.width / 2.0;
    if left + tooltip.width > viewport.width - VIEWPORT_MARGIN {
        left = viewport.width - tooltip.width - VIEWPORT_MARGIN;
    }
    if left < VIEWPORT_MARGIN {
        left = VIEWPORT_MARGIN;
    }

    if show_above {
        Placement {
            left,
            vertical: Vertical::Bottom(viewport.height - trigger.top + TRIGGER_GAP),
            side: Side::Above,
        }
    } else {
        Placement {
            left,
            vertical: Vertical::Top(trigger.bottom() + TRIGGER_GAP),
            side: Side::Below,
        }
    }
}

/// Keybind cell: beside the trigger, preferring the right-hand side, and
/// vertically centered on it.
pub fn position_keybind_tooltip(trigger: Rect, tooltip: Size, viewport: Viewport) -> Placement {
    let right_limit = viewport.width - VIEWPORT_MARGIN;
    let mut side = Side::Right;
    let mut left = trigger.right() + TRIGGER_GAP;

    if left + tooltip.width > right_limit {
        side = Side::Left;
        left = trigger.left - tooltip.width - TRIGGER_GAP;
        if left < VIEWPORT_MARGIN {
            side = Side::Over;
            left = trigger.center_x() - tooltip.width / 2.0;
        }
    }

    if left < VIEWPORT_MARGIN {
        left = VIEWPORT_MARGIN;
    }
    if left + tooltip.width > right_limit {
        left = right_limit - tooltip.width;
    }

    let mut top = trigger.center_y() - tooltip.height / 2.0;
    if top < VIEWPORT_MARGIN {
        top = VIEWPORT_MARGIN;
    }
    if top + tooltip.height > viewport.height - VIEWPORT_MARGIN {
        top = viewport.height - tooltip.height - VIEWPORT_MARGIN;
    }

    Placement {
        left,
        vertical: Vertical::Top(top),
        side,
    }
}

/// Keyboard view: centered above the key, dropping below it when the top
/// edge would leave the viewport.
pub fn position_key_tooltip(trigger: Rect, tooltip: Size, viewport: Viewport) -> Placement {
    let mut left = trigger.center_x() - tooltip.width / 2.0;
    if left + tooltip.width > viewport.width - VIEWPORT_MARGIN {
        left = viewport.width - tooltip.width - VIEWPORT_MARGIN;
    }
    if left < VIEWPORT_MARGIN {
        left = VIEWPORT_MARGIN;
    }

    let top = trigger.top - tooltip.height - KEY_GAP;
    if top < VIEWPORT_MARGIN {
        Placement {
            left,
            vertical: Vertical::Top(trigger.bottom() + KEY_GAP),
            side: Side::Below,
        }
    } else {
        Placement {
            left,
            vertical: Vertical::Top(top),
            side: Side::Above,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TooltipEvent {
    HoverEnter,
    HoverLeave,
    Scroll,
    Resize,
}

/// Show/hide bookkeeping for one tooltip. Scroll and resize only move a
/// tooltip that is already showing.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TooltipVisibility {
    placement: Option<Placement>,
}

impl TooltipVisibility {
    pub fn is_visible(&self) -> bool {
        self.placement.is_some()
    }

    pub fn placement(&self) -> Option<Placement> {
        self.placement
    }

    /// Apply `event`, calling `compute` when a fresh placement is needed.
    /// Returns the placement after the event, if the tooltip is showing.
    pub fn handle<F>(&mut self, event: TooltipEvent, compute: F) -> Option<Placement>
    where
        F: FnOnce() -> Placement,
    {
        match event {
            TooltipEvent::HoverEnter => self.placement = Some(compute()),
            TooltipEvent::Scroll | TooltipEvent::Resize => {
                if self.placement.is_some() {
                    self.placement = Some(compute());
                }
            }
            TooltipEvent::HoverLeave => self.placement = None,
        }
        self.placement
    }
}
