// Nested list counters.
//
// One frame per open list, at most three. Deeper lists reuse the third
// frame. Frames of levels 2 and 3 are remembered when they close so that a
// sibling list at the same level keeps counting.

use tracing::debug;

pub const MAX_DEPTH: usize = 3;

const BULLETS: [&str; MAX_DEPTH] = ["\u{2022}", "\u{25E6}", "\u{25AA}"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    Ordered,
    Unordered,
}

/// When nested counters start over.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ListContinuation {
    /// Nested counters run on across level-1 items and reset with a new
    /// level-1 list or an explicit `start`.
    #[default]
    AcrossItems,
    /// Nested counters also reset at every level-1 item.
    PerItem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListFrame {
    pub kind: ListKind,
    /// Number of the last item, meaningless until `items > 0`.
    pub counter: u32,
    pub start: u32,
    items: u32,
}

impl ListFrame {
    fn new(kind: ListKind, start: u32) -> Self {
        Self {
            kind,
            counter: start,
            start,
            items: 0,
        }
    }

    fn next_number(&mut self) -> u32 {
        self.counter = if self.items == 0 {
            self.start
        } else {
            self.counter.saturating_add(1)
        };
        self.items += 1;
        self.counter
    }
}

/// Numbering of one `<li>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListItem {
    /// 1-based, clamped to [`MAX_DEPTH`].
    pub level: usize,
    pub kind: ListKind,
    /// Set for ordered lists.
    pub number: Option<u32>,
    /// True for the first item of a list whose numbering does not carry on
    /// from an earlier list.
    pub restart: bool,
}

impl ListItem {
    pub fn glyph(&self) -> &'static str {
        BULLETS[self.level.clamp(1, MAX_DEPTH) - 1]
    }

    /// Word's built-in list paragraph style for this item.
    pub fn style_name(&self) -> String {
        let base = match self.kind {
            ListKind::Ordered => "List Number",
            ListKind::Unordered => "List Bullet",
        };
        match self.level {
            0 | 1 => base.to_string(),
            n => format!("{base} {n}"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ListContext {
    policy: ListContinuation,
    frames: Vec<ListFrame>,
    /// Lists opened beyond [`MAX_DEPTH`] that have not closed yet.
    overflow: usize,
    /// Last closed frame of levels 2 and 3.
    saved: [Option<ListFrame>; MAX_DEPTH],
    /// Whether the top frame continues a saved one.
    continued: Vec<bool>,
}

impl ListContext {
    pub fn new(policy: ListContinuation) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    /// Nesting depth including lists past the clamp.
    pub fn depth(&self) -> usize {
        self.frames.len() + self.overflow
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn enter_list(&mut self, kind: ListKind, start: Option<u32>) {
        if self.frames.len() == MAX_DEPTH {
            self.overflow += 1;
            debug!(depth = self.depth(), "list nested past the maximum, reusing the last level");
            return;
        }
        let level = self.frames.len() + 1;
        if level == 1 {
            self.saved = [None; MAX_DEPTH];
        }
        let resumed = match (start, self.saved[level - 1]) {
            (None, Some(prev)) if prev.kind == kind => Some(prev),
            _ => None,
        };
        self.continued.push(resumed.is_some());
        self.frames.push(resumed.unwrap_or_else(|| ListFrame::new(kind, start.unwrap_or(1))));
    }

    pub fn exit_list(&mut self) {
        if self.overflow > 0 {
            self.overflow -= 1;
            return;
        }
        let level = self.frames.len();
        let Some(frame) = self.frames.pop() else {
            debug!("list closed with no open list");
            return;
        };
        self.continued.pop();
        if level > 1 {
            self.saved[level - 1] = Some(frame);
        }
    }

    /// Number the next item of the innermost list. `None` outside any list.
    pub fn enter_item(&mut self) -> Option<ListItem> {
        let level = self.frames.len();
        if level == 1 && self.policy == ListContinuation::PerItem {
            self.saved = [None; MAX_DEPTH];
        }
        let continued = self.continued.last().copied().unwrap_or(false);
        let frame = self.frames.last_mut()?;
        let first = frame.items == 0;
        let number = match frame.kind {
            ListKind::Ordered => Some(frame.next_number()),
            ListKind::Unordered => {
                frame.items += 1;
                None
            }
        };
        Some(ListItem {
            level,
            kind: frame.kind,
            number,
            restart: first && !continued,
        })
    }

    /// Open a level-1 bulleted list for an `<li>` found outside any list.
    /// The caller closes it with [`ListContext::exit_list`].
    pub fn synthesize_item(&mut self) -> ListItem {
        self.enter_list(ListKind::Unordered, None);
        ListItem {
            level: self.frames.len(),
            kind: ListKind::Unordered,
            number: None,
            restart: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbers(ctx: &mut ListContext, n: usize) -> Vec<u32> {
        (0..n).filter_map(|_| ctx.enter_item().and_then(|i| i.number)).collect()
    }

    #[test]
    fn ordered_list_counts_from_one() {
        let mut ctx = ListContext::default();
        ctx.enter_list(ListKind::Ordered, None);
        assert_eq!(numbers(&mut ctx, 2), vec![1, 2]);
        ctx.exit_list();

        ctx.enter_list(ListKind::Ordered, None);
        assert_eq!(numbers(&mut ctx, 1), vec![1]);
        ctx.exit_list();
        assert!(ctx.is_empty());
    }

    #[test]
    fn start_attribute() {
        let mut ctx = ListContext::default();
        ctx.enter_list(ListKind::Ordered, Some(5));
        assert_eq!(numbers(&mut ctx, 3), vec![5, 6, 7]);

        let mut zero = ListContext::default();
        zero.enter_list(ListKind::Ordered, Some(0));
        assert_eq!(numbers(&mut zero, 2), vec![0, 1]);
    }

    fn nested_run(policy: ListContinuation, second_start: Option<u32>) -> Vec<u32> {
        let mut ctx = ListContext::new(policy);
        let mut out = Vec::new();
        ctx.enter_list(ListKind::Ordered, None);
        for start in [None, second_start] {
            ctx.enter_item();
            ctx.enter_list(ListKind::Ordered, start);
            out.extend(numbers(&mut ctx, 2));
            ctx.exit_list();
        }
        ctx.exit_list();
        out
    }

    #[test]
    fn nested_counter_continues_across_level_one_items() {
        assert_eq!(nested_run(ListContinuation::AcrossItems, None), vec![1, 2, 3, 4]);
    }

    #[test]
    fn explicit_start_resets_nested_counter() {
        assert_eq!(nested_run(ListContinuation::AcrossItems, Some(1)), vec![1, 2, 1, 2]);
    }

    #[test]
    fn per_item_policy_resets_nested_counter() {
        assert_eq!(nested_run(ListContinuation::PerItem, None), vec![1, 2, 1, 2]);
    }

    #[test]
    fn new_level_one_list_forgets_nested_counters() {
        let mut ctx = ListContext::default();
        for _ in 0..2 {
            ctx.enter_list(ListKind::Ordered, None);
            ctx.enter_item();
            ctx.enter_list(ListKind::Ordered, None);
            assert_eq!(numbers(&mut ctx, 1), vec![1]);
            ctx.exit_list();
            ctx.exit_list();
        }
    }

    #[test]
    fn nested_list_of_other_kind_does_not_continue() {
        let mut ctx = ListContext::default();
        ctx.enter_list(ListKind::Unordered, None);
        ctx.enter_item();
        ctx.enter_list(ListKind::Ordered, None);
        numbers(&mut ctx, 2);
        ctx.exit_list();
        ctx.enter_list(ListKind::Unordered, None);
        ctx.exit_list();
        ctx.enter_list(ListKind::Ordered, None);
        assert_eq!(numbers(&mut ctx, 1), vec![1]);
    }

    #[test]
    fn fourth_level_reuses_third() {
        let mut ctx = ListContext::default();
        for _ in 0..3 {
            ctx.enter_list(ListKind::Ordered, None);
            ctx.enter_item();
        }
        let third = ctx.enter_item().unwrap();
        ctx.enter_list(ListKind::Unordered, None);
        assert_eq!(ctx.depth(), 4);
        let fourth = ctx.enter_item().unwrap();
        assert_eq!(fourth.level, 3);
        assert_eq!(fourth.kind, third.kind);
        assert_eq!(fourth.style_name(), third.style_name());
        assert_eq!(fourth.style_name(), "List Number 3");
        ctx.exit_list();
        assert_eq!(ctx.depth(), 3);
    }

    #[test]
    fn bullets_and_styles_by_level() {
        let mut ctx = ListContext::default();
        let mut items = Vec::new();
        for _ in 0..3 {
            ctx.enter_list(ListKind::Unordered, None);
            items.push(ctx.enter_item().unwrap());
        }
        let glyphs: Vec<&str> = items.iter().map(ListItem::glyph).collect();
        assert_eq!(glyphs, vec!["\u{2022}", "\u{25E6}", "\u{25AA}"]);
        assert_eq!(items[0].style_name(), "List Bullet");
        assert_eq!(items[1].style_name(), "List Bullet 2");
        assert_eq!(items[0].number, None);
    }

    #[test]
    fn item_outside_list() {
        let mut ctx = ListContext::default();
        assert!(ctx.enter_item().is_none());
        let item = ctx.synthesize_item();
        assert_eq!(item.level, 1);
        assert_eq!(item.glyph(), "\u{2022}");
        ctx.exit_list();
        assert!(ctx.is_empty());
    }

    #[test]
    fn restart_marks_fresh_lists_only() {
        let mut ctx = ListContext::default();
        ctx.enter_list(ListKind::Ordered, None);
        ctx.enter_item();
        ctx.enter_list(ListKind::Ordered, None);
        assert!(ctx.enter_item().unwrap().restart);
        ctx.exit_list();
        ctx.enter_list(ListKind::Ordered, None);
        let resumed = ctx.enter_item().unwrap();
        assert!(!resumed.restart);
        assert_eq!(resumed.number, Some(2));
    }

    #[test]
    fn unbalanced_exit_is_ignored() {
        let mut ctx = ListContext::default();
        ctx.exit_list();
        assert_eq!(ctx.depth(), 0);
    }
}
