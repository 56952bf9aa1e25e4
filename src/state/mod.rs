/// State management module
///
/// This module handles all locker state, including:
/// - Database connections and queries (library.rs)
/// - Shared data structures (data.rs)
/// - Lookup filters for the grid (filter.rs)
/// - Which grid row is selected (selection.rs)

pub mod data;
pub mod filter;
pub mod library;
pub mod selection;
