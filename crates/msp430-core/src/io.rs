//! Peripheral contract and the address-keyed unit registry.

use std::fmt;

use crate::{AccessWidth, ConfigError, CoreContext, EmulationError, ResetReason, WarningKind};

/// Registration token identifying an I/O unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct UnitId(u16);

impl UnitId {
    /// Token for interrupts and events raised by the host rather than a unit.
    pub const HOST: Self = Self(u16::MAX);

    pub(crate) const fn new(raw: u16) -> Self {
        Self(raw)
    }

    const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::HOST {
            f.write_str("host")
        } else {
            write!(f, "unit#{}", self.0)
        }
    }
}

/// A memory-mapped peripheral.
///
/// Accesses arrive as byte or word cells; 20-bit accesses are split into two
/// word cells before they reach the unit.
pub trait IoUnit {
    /// Name used in logs and lookups.
    fn name(&self) -> &str;

    /// Called once after registration with the unit's token.
    fn attach(&mut self, _id: UnitId, _ctx: &mut CoreContext) {}

    /// Restores power-on state.
    fn reset(&mut self, reason: ResetReason, ctx: &mut CoreContext);

    /// Reads a byte or word cell.
    fn read(&mut self, address: u32, width: AccessWidth, ctx: &mut CoreContext) -> u16;

    /// Writes a byte or word cell.
    fn write(&mut self, address: u32, value: u16, width: AccessWidth, ctx: &mut CoreContext);

    /// Called when the CPU enters an interrupt this unit raised.
    fn interrupt_serviced(&mut self, _vector: usize, _ctx: &mut CoreContext) {}

    /// Called when an event created with [`crate::EventAction::Unit`] fires.
    fn time_event(&mut self, _tag: u32, _time: u64, _ctx: &mut CoreContext) {}
}

struct Registered {
    unit: Box<dyn IoUnit>,
    start: u32,
    end: u32,
}

/// Owns the I/O units and maps every I/O address to at most one of them.
pub struct IoRegistry {
    units: Vec<Registered>,
    owners: Vec<Option<UnitId>>,
}

impl fmt::Debug for IoRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(
                self.units
                    .iter()
                    .map(|entry| (entry.unit.name(), entry.start, entry.end)),
            )
            .finish()
    }
}

impl IoRegistry {
    /// Creates an empty registry covering `0..io_size`.
    #[must_use]
    pub fn new(io_size: u32) -> Self {
        Self {
            units: Vec::new(),
            owners: vec![None; io_size as usize],
        }
    }

    /// Size of the I/O region.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn io_size(&self) -> u32 {
        self.owners.len() as u32
    }

    /// Claims `start..=end` for `unit` and attaches it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::IoOutOfRange`] or [`ConfigError::IoOverlap`]
    /// when the claim cannot be honoured; nothing is registered then.
    #[allow(clippy::cast_possible_truncation)]
    pub fn register(
        &mut self,
        start: u32,
        end: u32,
        mut unit: Box<dyn IoUnit>,
        ctx: &mut CoreContext,
    ) -> Result<UnitId, ConfigError> {
        let io_size = self.io_size();
        if start > end || end >= io_size {
            tracing::warn!(unit = unit.name(), start, end, io_size, "io claim outside io region");
            return Err(ConfigError::IoOutOfRange {
                name: unit.name().to_owned(),
                start,
                end,
                io_size,
            });
        }
        let claim = start as usize..=end as usize;
        if let Some(owner) = self.owners[claim.clone()].iter().flatten().next() {
            let owner = self.units[owner.index()].unit.name().to_owned();
            tracing::warn!(unit = unit.name(), %owner, start, end, "overlapping io claim");
            return Err(ConfigError::IoOverlap {
                name: unit.name().to_owned(),
                owner,
                start,
                end,
            });
        }

        let id = UnitId::new(self.units.len() as u16);
        self.owners[claim].iter_mut().for_each(|slot| *slot = Some(id));
        tracing::debug!(unit = unit.name(), %id, start, end, "io unit registered");
        unit.attach(id, ctx);
        self.units.push(Registered { unit, start, end });
        Ok(id)
    }

    /// Unit owning `address`.
    #[must_use]
    pub fn owner(&self, address: u32) -> Option<UnitId> {
        self.owners.get(address as usize).copied().flatten()
    }

    /// Looks a unit up by name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<UnitId> {
        self.units
            .iter()
            .position(|entry| entry.unit.name() == name)
            .and_then(|index| u16::try_from(index).ok())
            .map(UnitId::new)
    }

    /// Borrow of a registered unit.
    #[must_use]
    pub fn unit(&self, id: UnitId) -> Option<&dyn IoUnit> {
        self.units.get(id.index()).map(|entry| entry.unit.as_ref())
    }

    /// Mutable borrow of a registered unit.
    pub fn unit_mut(&mut self, id: UnitId) -> Option<&mut (dyn IoUnit + 'static)> {
        self.units
            .get_mut(id.index())
            .map(|entry| entry.unit.as_mut())
    }

    /// Address range claimed by `id`.
    #[must_use]
    pub fn range(&self, id: UnitId) -> Option<(u32, u32)> {
        self.units.get(id.index()).map(|entry| (entry.start, entry.end))
    }

    /// Number of registered units.
    #[must_use]
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Returns `true` when no unit is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Dispatches a cell read; unowned addresses read as 0.
    ///
    /// # Errors
    ///
    /// Propagates an escalated [`WarningKind::VoidIoAccess`].
    pub fn read(
        &mut self,
        address: u32,
        width: AccessWidth,
        ctx: &mut CoreContext,
    ) -> Result<u32, EmulationError> {
        match self.owner(address) {
            Some(id) => {
                let value = self.units[id.index()].unit.read(address, width, ctx);
                Ok(u32::from(value) & width.mask())
            }
            None => {
                ctx.warn(WarningKind::VoidIoAccess, address)?;
                Ok(0)
            }
        }
    }

    /// Dispatches a cell write; writes to unowned addresses are dropped.
    ///
    /// # Errors
    ///
    /// Propagates an escalated [`WarningKind::VoidIoAccess`].
    #[allow(clippy::cast_possible_truncation)]
    pub fn write(
        &mut self,
        address: u32,
        value: u32,
        width: AccessWidth,
        ctx: &mut CoreContext,
    ) -> Result<(), EmulationError> {
        match self.owner(address) {
            Some(id) => {
                let value = (value & width.mask()) as u16;
                self.units[id.index()].unit.write(address, value, width, ctx);
                Ok(())
            }
            None => ctx.warn(WarningKind::VoidIoAccess, address),
        }
    }

    /// Resets every unit in registration order.
    pub fn reset_all(&mut self, reason: ResetReason, ctx: &mut CoreContext) {
        for entry in &mut self.units {
            entry.unit.reset(reason, ctx);
        }
    }

    /// Notifies `owner` that `vector` is being serviced.
    pub fn interrupt_serviced(&mut self, owner: UnitId, vector: usize, ctx: &mut CoreContext) {
        if let Some(entry) = self.units.get_mut(owner.index()) {
            entry.unit.interrupt_serviced(vector, ctx);
        }
    }

    /// Delivers a fired event to `unit`.
    pub fn time_event(&mut self, unit: UnitId, tag: u32, time: u64, ctx: &mut CoreContext) {
        match self.units.get_mut(unit.index()) {
            Some(entry) => entry.unit.time_event(tag, time, ctx),
            None => tracing::debug!(%unit, tag, "event for unknown unit dropped"),
        }
    }
}
