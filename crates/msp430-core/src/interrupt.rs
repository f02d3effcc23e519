//! Interrupt priority tracking.
//!
//! A higher vector index has higher priority. The highest index is the reset
//! vector: it is non-maskable and abandons whatever is being serviced.

use crate::UnitId;

/// Pending sources, highest pending vector and the vector in service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterruptController {
    sources: Vec<Option<UnitId>>,
    max: Option<usize>,
    serviced: Option<usize>,
}

impl InterruptController {
    /// Creates a controller for vectors `0..=reset_vector`.
    #[must_use]
    pub fn new(reset_vector: usize) -> Self {
        Self {
            sources: vec![None; reset_vector + 1],
            max: None,
            serviced: None,
        }
    }

    /// Index of the reset vector.
    #[must_use]
    pub fn reset_vector(&self) -> usize {
        self.sources.len() - 1
    }

    /// Raises or lowers `vector` on behalf of `owner`.
    ///
    /// Lowering only takes effect when `owner` raised the vector.
    pub fn flag(&mut self, vector: usize, owner: UnitId, on: bool) {
        let Some(slot) = self.sources.get_mut(vector) else {
            tracing::warn!(vector, "interrupt vector out of range ignored");
            return;
        };
        if on {
            *slot = Some(owner);
            if self.max.is_none_or(|max| vector > max) {
                self.max = Some(vector);
            }
            if vector == self.reset_vector() {
                self.serviced = None;
            }
        } else if *slot == Some(owner) {
            *slot = None;
            self.max = self.sources.iter().rposition(Option::is_some);
        }
    }

    /// Highest pending vector.
    #[must_use]
    pub const fn pending(&self) -> Option<usize> {
        self.max
    }

    /// Vector currently being serviced.
    #[must_use]
    pub const fn serviced(&self) -> Option<usize> {
        self.serviced
    }

    /// Owner that raised `vector`.
    #[must_use]
    pub fn owner(&self, vector: usize) -> Option<UnitId> {
        self.sources.get(vector).copied().flatten()
    }

    /// Returns `true` when the reset vector is pending.
    #[must_use]
    pub fn reset_pending(&self) -> bool {
        self.max == Some(self.reset_vector())
    }

    /// Returns `true` when the CPU should enter an interrupt now.
    #[must_use]
    pub fn should_service(&self, gie: bool) -> bool {
        self.reset_pending() || (gie && self.serviced.is_none() && self.max.is_some())
    }

    /// Marks `vector` as being serviced and returns its owner.
    pub fn begin_service(&mut self, vector: usize) -> Option<UnitId> {
        self.serviced = Some(vector);
        self.owner(vector)
    }

    /// Marks the current service as finished.
    pub const fn end_service(&mut self) {
        self.serviced = None;
    }

    /// Drops every pending source and the in-progress service.
    pub fn clear(&mut self) {
        self.sources.iter_mut().for_each(|slot| *slot = None);
        self.max = None;
        self.serviced = None;
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::InterruptController;
    use crate::UnitId;

    const TIMER: UnitId = UnitId::new(0);
    const UART: UnitId = UnitId::new(1);

    #[test]
    fn highest_vector_wins() {
        let mut controller = InterruptController::new(15);
        controller.flag(3, TIMER, true);
        controller.flag(9, UART, true);
        controller.flag(5, TIMER, true);
        assert_eq!(controller.pending(), Some(9));

        controller.flag(9, UART, false);
        assert_eq!(controller.pending(), Some(5));
    }

    #[test]
    fn only_the_raising_owner_can_lower() {
        let mut controller = InterruptController::new(15);
        controller.flag(7, TIMER, true);
        controller.flag(7, UART, false);
        assert_eq!(controller.pending(), Some(7));
        assert_eq!(controller.owner(7), Some(TIMER));

        controller.flag(7, TIMER, false);
        assert_eq!(controller.pending(), None);
    }

    #[rstest]
    #[case(true, None, true)]
    #[case(false, None, false)]
    #[case(true, Some(2), false)]
    fn maskable_service_needs_gie_and_idle_controller(
        #[case] gie: bool,
        #[case] serviced: Option<usize>,
        #[case] expected: bool,
    ) {
        let mut controller = InterruptController::new(15);
        if let Some(vector) = serviced {
            controller.begin_service(vector);
        }
        controller.flag(4, TIMER, true);
        assert_eq!(controller.should_service(gie), expected);
    }

    #[test]
    fn reset_is_forced_and_abandons_service() {
        let mut controller = InterruptController::new(15);
        controller.flag(4, TIMER, true);
        controller.begin_service(4);
        controller.flag(15, UnitId::HOST, true);

        assert!(controller.reset_pending());
        assert_eq!(controller.serviced(), None);
        assert!(controller.should_service(false));
    }

    #[test]
    fn out_of_range_vector_is_ignored_and_clear_resets_everything() {
        let mut controller = InterruptController::new(15);
        controller.flag(16, TIMER, true);
        assert_eq!(controller.pending(), None);

        controller.flag(2, TIMER, true);
        controller.begin_service(2);
        controller.clear();
        assert_eq!(controller.pending(), None);
        assert_eq!(controller.serviced(), None);
        assert_eq!(controller.owner(2), None);
    }
}
