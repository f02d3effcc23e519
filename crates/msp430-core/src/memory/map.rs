//! Page handlers and construction of the page table from a [`CoreConfig`].

use crate::CoreConfig;

/// Bytes per page.
pub const PAGE_SIZE: u32 = 0x100;
/// Shift converting an address to its page index.
pub const PAGE_SHIFT: u32 = 8;

/// What backs a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Segment {
    /// No backing; any access faults.
    Unmapped,
    /// Read/write storage.
    Ram,
    /// Storage that is written only while flash is writable.
    Flash,
    /// Routed to the I/O unit registry.
    Io,
}

/// Per-page dispatch entry, optionally decorated with watchpoint notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageHandler {
    /// Plain dispatch to the segment.
    Direct(Segment),
    /// Dispatch to the segment with watchpoint callbacks around it.
    Watched(Segment),
}

impl PageHandler {
    /// Underlying segment.
    #[must_use]
    pub const fn segment(self) -> Segment {
        match self {
            Self::Direct(segment) | Self::Watched(segment) => segment,
        }
    }

    /// Returns `true` when the watch decorator is installed.
    #[must_use]
    pub const fn is_watched(self) -> bool {
        matches!(self, Self::Watched(_))
    }

    /// Handler with the watch decorator installed.
    #[must_use]
    pub const fn watched(self) -> Self {
        Self::Watched(self.segment())
    }

    /// Handler with the watch decorator removed.
    #[must_use]
    pub const fn unwatched(self) -> Self {
        Self::Direct(self.segment())
    }
}

/// Builds one handler per page; expects a validated configuration.
#[must_use]
pub fn build_page_table(config: &CoreConfig) -> Vec<PageHandler> {
    let pages = (config.max_memory >> PAGE_SHIFT) as usize;
    let mut table = vec![PageHandler::Direct(Segment::Unmapped); pages];
    let mut assign = |start: u32, size: u32, segment: Segment| {
        let first = (start >> PAGE_SHIFT) as usize;
        let count = (size >> PAGE_SHIFT) as usize;
        for handler in table.iter_mut().skip(first).take(count) {
            *handler = PageHandler::Direct(segment);
        }
    };
    assign(0, config.io_size, Segment::Io);
    assign(config.ram_start, config.ram_size, Segment::Ram);
    assign(config.flash_start, config.flash_size, Segment::Flash);
    table
}
