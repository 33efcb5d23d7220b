use std::fmt;

use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdKind {
    Schema,
    Field,
    Item,
    Task,
    Activity,
}

impl IdKind {
    pub fn prefix(self) -> &'static str {
        match self {
            IdKind::Schema => "S",
            IdKind::Field => "F",
            IdKind::Item => "I",
            IdKind::Task => "T",
            IdKind::Activity => "L",
        }
    }
}

impl fmt::Display for IdKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            IdKind::Schema => "schema",
            IdKind::Field => "field",
            IdKind::Item => "item",
            IdKind::Task => "task",
            IdKind::Activity => "activity entry",
        };
        f.write_str(label)
    }
}

/// Source of globally unique opaque ids.
pub trait IdAllocator {
    fn allocate(&self, kind: IdKind) -> String;
}

/// Time-ordered ids, so sorting by id follows creation order.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidAllocator;

impl IdAllocator for UuidAllocator {
    fn allocate(&self, kind: IdKind) -> String {
        format!("{}-{}", kind.prefix(), Uuid::now_v7().simple())
    }
}

/// Trailing characters of an id, enough to tell rows apart in a table.
pub fn display_id(id: &str) -> &str {
    let (_, suffix) = id.rsplit_once('-').unwrap_or(("", id));
    let start = suffix.len().saturating_sub(8);
    suffix.get(start..).unwrap_or(suffix)
}

#[cfg(test)]
mod tests {
    use super::{display_id, IdAllocator, IdKind, UuidAllocator};

    #[test]
    fn allocated_ids_carry_kind_prefix() {
        let ids = UuidAllocator;
        let first = ids.allocate(IdKind::Item);
        let second = ids.allocate(IdKind::Item);
        assert!(first.starts_with("I-"));
        assert_eq!(first.len(), 2 + 32);
        assert_ne!(first, second);
        assert!(ids.allocate(IdKind::Schema).starts_with("S-"));
        assert!(ids.allocate(IdKind::Activity).starts_with("L-"));
    }

    #[test]
    fn display_id_keeps_the_tail() {
        assert_eq!(display_id("I-0190a1b2c3d4e5f6a7b8c9d0e1f2a3b4"), "e1f2a3b4");
        assert_eq!(display_id("short"), "short");
        assert_eq!(display_id("T-abc"), "abc");
    }
}
