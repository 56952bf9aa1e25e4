/// User interface pieces that don't belong in `main.rs`
///
/// - `grid.rs` - the locker grid rows
/// - `entry_view.rs` - the entry view panel
/// - `dialogs.rs` - native confirmation dialogs
/// - `clipboard.rs` - image clipboard writes

pub mod clipboard;
pub mod dialogs;
pub mod entry_view;
pub mod grid;
