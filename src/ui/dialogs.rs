use rfd::{MessageButtons, MessageDialog, MessageDialogResult, MessageLevel};

/// Ask the operator to confirm a delete. Blocks until answered.
pub fn confirm_delete() -> bool {
    let answer = MessageDialog::new()
        .set_title("Confirm")
        .set_description("Are you sure you want to delete this entry?")
        .set_level(MessageLevel::Info)
        .set_buttons(MessageButtons::YesNo)
        .show();

    matches!(answer, MessageDialogResult::Yes)
}
