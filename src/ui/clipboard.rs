use arboard::{Clipboard, ImageData};
use std::borrow::Cow;

use crate::state::data::RowImage;

/// Put a decoded image on the system clipboard.
/// iced's clipboard only carries text, so this goes through arboard.
pub fn copy_image(image: &RowImage) -> Result<(), arboard::Error> {
    let mut clipboard = Clipboard::new()?;
    clipboard.set_image(ImageData {
        width: image.width as usize,
        height: image.height as usize,
        bytes: Cow::Borrowed(image.rgba.as_slice()),
    })
}
