/// Locker grid module
///
/// This module handles:
/// - Hydrating raw records into display rows (hydrator.rs)
/// - Reload, add, delete and view operations (synchronizer.rs)
/// - The rows, selection and copy feedback shown by the grid (model.rs)

pub mod hydrator;
pub mod model;
pub mod synchronizer;

pub use model::{CopiedCell, GridModel};
pub use synchronizer::{EntryDetails, NewEntryForm, ReloadOutcome};
