//! Aggregate root trait.

/// Aggregate root: the consistency boundary for a cluster of entities.
///
/// Implementors own their invariants. `check_invariants` must hold for every
/// state reachable through the aggregate's public operations, and is also run
/// when state is rehydrated from storage.
pub trait AggregateRoot {
    /// Strongly-typed aggregate identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Error reported when the state is structurally invalid.
    type Error: core::fmt::Debug;

    /// Returns the aggregate identifier.
    fn id(&self) -> &Self::Id;

    /// Number of lifecycle operations committed to this instance.
    ///
    /// Diagnostic only; stores do not use it for concurrency control.
    fn version(&self) -> u64;

    /// Validate every structural invariant of the current state.
    fn check_invariants(&self) -> Result<(), Self::Error>;
}
