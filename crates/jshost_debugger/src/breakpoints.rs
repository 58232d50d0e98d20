use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::source::SourceContext;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Breakpoint {
    pub breakpoint_id: u32,
    pub context_id: SourceContext,
    /// 1-based
    pub line: u32,
    /// 1-based; `None` matches any column on the line
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
}

impl Breakpoint {
    fn matches(&self, context: SourceContext, line: u32, column: u32) -> bool {
        self.context_id == context
            && self.line == line
            && self.column.is_none_or(|c| c == column)
    }
}

/// Breakpoints of one protocol handler, keyed by id.
#[derive(Debug, Default)]
pub struct BreakpointTable {
    next_id: u32,
    by_id: BTreeMap<u32, Breakpoint>,
}

impl BreakpointTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a breakpoint. Setting the same location twice returns the
    /// existing entry.
    pub fn add(&mut self, context: SourceContext, line: u32, column: Option<u32>) -> Breakpoint {
        if let Some(existing) = self
            .by_id
            .values()
            .find(|bp| bp.context_id == context && bp.line == line && bp.column == column)
        {
            return existing.clone();
        }

        self.next_id += 1;
        let breakpoint = Breakpoint {
            breakpoint_id: self.next_id,
            context_id: context,
            line,
            column,
        };
        self.by_id.insert(breakpoint.breakpoint_id, breakpoint.clone());
        breakpoint
    }

    pub fn remove(&mut self, id: u32) -> bool {
        self.by_id.remove(&id).is_some()
    }

    /// First breakpoint covering the given location
    pub fn hit(&self, context: SourceContext, line: u32, column: u32) -> Option<&Breakpoint> {
        self.by_id
            .values()
            .find(|bp| bp.matches(context, line, column))
    }

    pub fn list(&self) -> Vec<Breakpoint> {
        self.by_id.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn clear(&mut self) {
        self.by_id.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(raw: u32) -> SourceContext {
        SourceContext::from_raw(raw)
    }

    #[test]
    fn test_ids_increase_and_are_not_reused() {
        let mut table = BreakpointTable::new();
        let a = table.add(ctx(0), 3, None);
        let b = table.add(ctx(0), 4, None);
        assert!(table.remove(a.breakpoint_id));
        let c = table.add(ctx(0), 5, None);

        assert_eq!(a.breakpoint_id, 1);
        assert_eq!(b.breakpoint_id, 2);
        assert_eq!(c.breakpoint_id, 3);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_same_location_is_deduplicated() {
        let mut table = BreakpointTable::new();
        let a = table.add(ctx(1), 10, Some(4));
        let b = table.add(ctx(1), 10, Some(4));
        assert_eq!(a, b);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_hit_respects_context_line_and_column() {
        let mut table = BreakpointTable::new();
        table.add(ctx(1), 10, None);
        table.add(ctx(2), 7, Some(5));

        assert!(table.hit(ctx(1), 10, 42).is_some());
        assert!(table.hit(ctx(2), 10, 1).is_none());
        assert!(table.hit(ctx(2), 7, 5).is_some());
        assert!(table.hit(ctx(2), 7, 6).is_none());
    }

    #[test]
    fn test_remove_unknown_is_false() {
        let mut table = BreakpointTable::new();
        assert!(!table.remove(99));
        assert!(table.is_empty());
    }
}
