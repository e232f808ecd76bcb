/// Document-scoped object id source.
///
/// Ids start at 1 and only ever grow. Nothing is cached or handed back, so an
/// id that was issued for an object that later disappeared stays burned.
#[derive(Debug, Default)]
pub struct IdAllocator {
    last: u32,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Continue numbering after `max_unit_id`, e.g. the `MaxUnitID` of a package
    /// being extended.
    pub fn starting_after(max_unit_id: u32) -> Self {
        Self { last: max_unit_id }
    }

    pub fn next_id(&mut self) -> u32 {
        self.last += 1;
        self.last
    }

    /// Largest id issued so far (0 when none).
    pub fn max_unit_id(&self) -> u32 {
        self.last
    }
}
