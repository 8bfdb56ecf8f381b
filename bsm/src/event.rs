use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};

/// What an audit event means for the provenance graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventCategory {
    Exit,
    Fork,
    OpenRead,
    OpenWrite,
    Rename,
}

// AUE_EXIT, AUE_FORK, AUE_VFORK, AUE_FORK1 and the open(2) family from audit_kevents.h
const EVENT_TABLE: &[(u32, EventCategory)] = &[
    (1, EventCategory::Exit),
    (2, EventCategory::Fork),
    (25, EventCategory::Fork),
    (241, EventCategory::Fork),
    (72, EventCategory::OpenRead),
    (73, EventCategory::OpenWrite),
    (74, EventCategory::OpenWrite),
    (75, EventCategory::OpenWrite),
    (76, EventCategory::OpenWrite),
    (77, EventCategory::OpenWrite),
    (78, EventCategory::OpenWrite),
    (79, EventCategory::OpenWrite),
    (80, EventCategory::OpenWrite),
    (81, EventCategory::OpenWrite),
    (82, EventCategory::OpenWrite),
    (83, EventCategory::OpenWrite),
    (42, EventCategory::Rename),
];

lazy_static! {
    static ref CATEGORIES: HashMap<u32, EventCategory> = EVENT_TABLE.iter().copied().collect();
}

impl EventCategory {
    pub fn from_event_id(event_id: u32) -> Option<Self> {
        CATEGORIES.get(&event_id).copied()
    }

    pub fn as_str(self) -> &'static str {
        use EventCategory::*;
        match self {
            Exit => "exit",
            Fork => "fork",
            OpenRead => "open_read",
            OpenWrite => "open_write",
            Rename => "rename",
        }
    }
}

impl Display for EventCategory {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
