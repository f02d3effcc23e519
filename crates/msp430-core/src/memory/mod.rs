//! Paged memory dispatch over a single flat arena.
//!
//! Each 256-byte page carries a [`PageHandler`]. RAM and flash pages read
//! and write the arena directly, I/O pages go through the [`IoRegistry`],
//! and unmapped pages fault. 20-bit accesses are split into a low word cell
//! at `address` and a high word cell at `address + 2` holding bits 19:16.

/// Access widths, intents and cell helpers.
pub mod access;
/// Page handlers and page table construction.
pub mod map;

use std::collections::BTreeMap;
use std::fmt;

pub use access::{AccessIntent, AccessWidth};
pub use map::{build_page_table, PageHandler, Segment, PAGE_SHIFT, PAGE_SIZE};

use crate::{
    CoreConfig, CoreContext, EmulationError, FaultCode, IoRegistry, MonitorId, WarningKind,
};

/// Observer of accesses to a watched address.
pub trait MemoryMonitor {
    /// Called before a read reaches its segment.
    fn read_before(&mut self, _address: u32, _width: AccessWidth, _intent: AccessIntent) {}
    /// Called with the value a read produced.
    fn read_after(&mut self, _address: u32, _width: AccessWidth, _value: u32) {}
    /// Called with the value about to be written.
    fn write_before(&mut self, _address: u32, _width: AccessWidth, _value: u32) {}
    /// Called after a write was dispatched.
    fn write_after(&mut self, _address: u32, _width: AccessWidth, _value: u32) {}
}

type Watchers = Vec<(MonitorId, Box<dyn MemoryMonitor>)>;

/// Address space: arena, page table, watchpoints, flash state and I/O units.
pub struct Memory {
    bytes: Box<[u8]>,
    pages: Vec<PageHandler>,
    watchers: BTreeMap<u32, Watchers>,
    next_monitor: u32,
    io: IoRegistry,
    flash_writable: bool,
    flash_blocking: bool,
}

impl fmt::Debug for Memory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memory")
            .field("size", &self.bytes.len())
            .field("watched_addresses", &self.watchers.len())
            .field("io", &self.io)
            .field("flash_writable", &self.flash_writable)
            .field("flash_blocking", &self.flash_blocking)
            .finish_non_exhaustive()
    }
}

impl Memory {
    /// Allocates a zeroed address space laid out per `config`.
    #[must_use]
    pub fn new(config: &CoreConfig) -> Self {
        Self {
            bytes: vec![0; config.max_memory as usize].into_boxed_slice(),
            pages: build_page_table(config),
            watchers: BTreeMap::new(),
            next_monitor: 0,
            io: IoRegistry::new(config.io_size),
            flash_writable: false,
            flash_blocking: false,
        }
    }

    /// Size of the address space in bytes.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn size(&self) -> u32 {
        self.bytes.len() as u32
    }

    /// Handler currently installed for the page holding `address`.
    #[must_use]
    pub fn page_handler(&self, address: u32) -> Option<PageHandler> {
        self.pages.get((address >> PAGE_SHIFT) as usize).copied()
    }

    /// I/O unit registry.
    #[must_use]
    pub const fn io(&self) -> &IoRegistry {
        &self.io
    }

    /// Mutable I/O unit registry.
    pub const fn io_mut(&mut self) -> &mut IoRegistry {
        &mut self.io
    }

    /// Allows or forbids stores to flash pages.
    pub const fn set_flash_writable(&mut self, writable: bool) {
        self.flash_writable = writable;
    }

    /// Returns `true` while stores to flash are allowed.
    #[must_use]
    pub const fn flash_writable(&self) -> bool {
        self.flash_writable
    }

    /// Marks the flash controller as holding the CPU.
    pub const fn set_flash_blocking(&mut self, blocking: bool) {
        self.flash_blocking = blocking;
    }

    /// Returns `true` while the flash controller holds the CPU.
    #[must_use]
    pub const fn flash_blocking(&self) -> bool {
        self.flash_blocking
    }

    /// Dispatched read.
    ///
    /// # Errors
    ///
    /// Faults with [`FaultCode::AddressOutOfRange`] or
    /// [`FaultCode::UnmappedAccess`], or propagates an escalated warning.
    pub fn read(
        &mut self,
        address: u32,
        width: AccessWidth,
        intent: AccessIntent,
        ctx: &mut CoreContext,
    ) -> Result<u32, EmulationError> {
        if width.is_misaligned(address) {
            ctx.warn(WarningKind::MisalignedAccess, address)?;
        }
        match width {
            AccessWidth::Word20 => {
                let low = self.read_cell(address, AccessWidth::Word, intent, ctx)?;
                let high = self.read_cell(address.wrapping_add(2), AccessWidth::Word, intent, ctx)?;
                Ok(low | (high & 0xF) << 16)
            }
            _ => self.read_cell(address, width, intent, ctx),
        }
    }

    /// Dispatched write.
    ///
    /// # Errors
    ///
    /// Faults with [`FaultCode::AddressOutOfRange`] or
    /// [`FaultCode::UnmappedAccess`], or propagates an escalated warning.
    pub fn write(
        &mut self,
        address: u32,
        value: u32,
        width: AccessWidth,
        ctx: &mut CoreContext,
    ) -> Result<(), EmulationError> {
        if width.is_misaligned(address) {
            ctx.warn(WarningKind::MisalignedAccess, address)?;
        }
        match width {
            AccessWidth::Word20 => {
                self.write_cell(address, value & 0xFFFF, AccessWidth::Word, ctx)?;
                self.write_cell(
                    address.wrapping_add(2),
                    (value >> 16) & 0xF,
                    AccessWidth::Word,
                    ctx,
                )
            }
            _ => self.write_cell(address, value & width.mask(), width, ctx),
        }
    }

    fn locate(
        &self,
        address: u32,
        width: AccessWidth,
        ctx: &CoreContext,
    ) -> Result<PageHandler, EmulationError> {
        let end = u64::from(address) + u64::from(width.bytes());
        if end > self.bytes.len() as u64 {
            return Err(ctx.fault(FaultCode::AddressOutOfRange, address));
        }
        Ok(self.pages[(address >> PAGE_SHIFT) as usize])
    }

    /// A misaligned word cell whose second byte lies on the next page.
    const fn crosses_page(address: u32, width: AccessWidth) -> bool {
        width.bytes() > 1 && (address >> PAGE_SHIFT) != (address.wrapping_add(1) >> PAGE_SHIFT)
    }

    fn read_cell(
        &mut self,
        address: u32,
        width: AccessWidth,
        intent: AccessIntent,
        ctx: &mut CoreContext,
    ) -> Result<u32, EmulationError> {
        let handler = self.locate(address, width, ctx)?;
        if Self::crosses_page(address, width) {
            let low = self.read_cell(address, AccessWidth::Byte, intent, ctx)?;
            let high = self.read_cell(address + 1, AccessWidth::Byte, intent, ctx)?;
            return Ok(low | high << 8);
        }
        if handler.is_watched() {
            self.notify(address, width, |monitor, at| {
                monitor.read_before(at, width, intent);
            });
        }
        let value = match handler.segment() {
            Segment::Unmapped => return Err(ctx.fault(FaultCode::UnmappedAccess, address)),
            Segment::Ram | Segment::Flash => {
                access::load_cell(&self.bytes, address as usize, width)
            }
            Segment::Io => self.io.read(address, width, ctx)?,
        };
        if handler.is_watched() {
            self.notify(address, width, |monitor, at| {
                monitor.read_after(at, width, value);
            });
        }
        Ok(value)
    }

    fn write_cell(
        &mut self,
        address: u32,
        value: u32,
        width: AccessWidth,
        ctx: &mut CoreContext,
    ) -> Result<(), EmulationError> {
        let handler = self.locate(address, width, ctx)?;
        if Self::crosses_page(address, width) {
            self.write_cell(address, value & 0xFF, AccessWidth::Byte, ctx)?;
            return self.write_cell(address + 1, (value >> 8) & 0xFF, AccessWidth::Byte, ctx);
        }
        match handler.segment() {
            Segment::Unmapped => return Err(ctx.fault(FaultCode::UnmappedAccess, address)),
            Segment::Flash if !self.flash_writable => {
                return ctx.warn(WarningKind::FlashWriteViolation, address);
            }
            _ => {}
        }
        if handler.is_watched() {
            self.notify(address, width, |monitor, at| {
                monitor.write_before(at, width, value);
            });
        }
        match handler.segment() {
            Segment::Ram | Segment::Flash => {
                access::store_cell(&mut self.bytes, address as usize, value, width);
            }
            Segment::Io => self.io.write(address, value, width, ctx)?,
            Segment::Unmapped => {}
        }
        if handler.is_watched() {
            self.notify(address, width, |monitor, at| {
                monitor.write_after(at, width, value);
            });
        }
        Ok(())
    }

    fn notify(
        &mut self,
        address: u32,
        width: AccessWidth,
        mut call: impl FnMut(&mut dyn MemoryMonitor, u32),
    ) {
        let end = address.saturating_add(width.bytes().min(2));
        for (at, watchers) in self.watchers.range_mut(address..end) {
            for (_, monitor) in watchers.iter_mut() {
                call(monitor.as_mut(), *at);
            }
        }
    }

    /// Raw read without dispatch or notification; 0 outside the arena.
    #[must_use]
    pub fn get(&self, address: u32, width: AccessWidth) -> u32 {
        let cell = |at: u32, cell_width: AccessWidth| {
            let end = u64::from(at) + u64::from(cell_width.bytes().min(2));
            if end > self.bytes.len() as u64 {
                0
            } else {
                access::load_cell(&self.bytes, at as usize, cell_width)
            }
        };
        match width {
            AccessWidth::Word20 => {
                cell(address, AccessWidth::Word)
                    | (cell(address.wrapping_add(2), AccessWidth::Word) & 0xF) << 16
            }
            _ => cell(address, width),
        }
    }

    /// Raw store without dispatch or notification.
    ///
    /// Returns `false` when any byte falls outside the arena; nothing is
    /// written then.
    pub fn set(&mut self, address: u32, value: u32, width: AccessWidth) -> bool {
        let end = u64::from(address) + u64::from(width.bytes());
        if end > self.bytes.len() as u64 {
            return false;
        }
        match width {
            AccessWidth::Word20 => {
                access::store_cell(&mut self.bytes, address as usize, value, AccessWidth::Word);
                access::store_cell(
                    &mut self.bytes,
                    address as usize + 2,
                    (value >> 16) & 0xF,
                    AccessWidth::Word,
                );
            }
            _ => access::store_cell(&mut self.bytes, address as usize, value, width),
        }
        true
    }

    /// Copies a firmware image into the arena at `address`.
    ///
    /// # Errors
    ///
    /// Returns [`FaultCode::AddressOutOfRange`] when the image does not fit.
    pub fn load_image(&mut self, address: u32, image: &[u8]) -> Result<(), FaultCode> {
        let start = address as usize;
        let end = start
            .checked_add(image.len())
            .filter(|end| *end <= self.bytes.len())
            .ok_or(FaultCode::AddressOutOfRange)?;
        self.bytes[start..end].copy_from_slice(image);
        Ok(())
    }

    /// Installs a watchpoint at `address`.
    ///
    /// # Errors
    ///
    /// Returns [`FaultCode::AddressOutOfRange`] for addresses outside the
    /// arena.
    pub fn add_watchpoint(
        &mut self,
        address: u32,
        monitor: Box<dyn MemoryMonitor>,
    ) -> Result<MonitorId, FaultCode> {
        let page = (address >> PAGE_SHIFT) as usize;
        let handler = self
            .pages
            .get_mut(page)
            .ok_or(FaultCode::AddressOutOfRange)?;
        *handler = handler.watched();

        let id = MonitorId::new(self.next_monitor);
        self.next_monitor = self.next_monitor.wrapping_add(1);
        self.watchers.entry(address).or_default().push((id, monitor));
        Ok(id)
    }

    /// Removes a watchpoint; returns `false` when `id` is not at `address`.
    ///
    /// The page's watch decorator is removed with its last watchpoint.
    pub fn remove_watchpoint(&mut self, address: u32, id: MonitorId) -> bool {
        let Some(watchers) = self.watchers.get_mut(&address) else {
            return false;
        };
        let before = watchers.len();
        watchers.retain(|(existing, _)| *existing != id);
        if watchers.len() == before {
            return false;
        }
        if watchers.is_empty() {
            self.watchers.remove(&address);
        }

        let page_start = address & !(PAGE_SIZE - 1);
        let page_still_watched = self
            .watchers
            .range(page_start..page_start + PAGE_SIZE)
            .next()
            .is_some();
        if !page_still_watched {
            let page = (address >> PAGE_SHIFT) as usize;
            if let Some(handler) = self.pages.get_mut(page) {
                *handler = handler.unwatched();
            }
        }
        true
    }
}
