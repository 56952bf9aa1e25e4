/// Entry view panel, shown in place of the grid for the selected entry
use iced::widget::{button, column, image, row, scrollable, text};
use iced::{Element, Length};

use crate::grid::EntryDetails;
use crate::Message;

pub fn view(details: &EntryDetails) -> Element<Message> {
    let mut facts = column![text(&details.information).size(16)].spacing(6);

    if let Some(user) = &details.user {
        facts = facts.push(text(format!(
            "Current username: {} ({} entries)",
            user.username, user.total_dirt_count
        )));
    }

    if let Some(attachment) = &details.attachment {
        facts = facts
            .push(text(format!("Attachment URL: {}", attachment.attachment_url)))
            .push(text(format!(
                "Content type: {}    Size: {}",
                attachment.content_type,
                format_size(attachment.size)
            )));
    }

    let mut pictures = row![].spacing(16);
    for picture in [&details.avatar, &details.content].into_iter().flatten() {
        pictures = pictures.push(
            image(picture.handle.clone())
                .width(Length::Fixed(picture.width as f32))
                .height(Length::Fixed(picture.height as f32)),
        );
    }

    scrollable(
        column![
            row![
                text(format!("Entry {}", details.record.indexation_id))
                    .size(24)
                    .width(Length::Fill),
                button("Close").on_press(Message::CloseDetails),
            ],
            facts,
            pictures,
        ]
        .spacing(16),
    )
    .height(Length::Fill)
    .into()
}

/// Human readable byte count
fn format_size(bytes: i64) -> String {
    match bytes {
        b if b >= 1024 * 1024 => format!("{:.1} MB", b as f64 / 1024.0 / 1024.0),
        b if b >= 1024 => format!("{:.1} KB", b as f64 / 1024.0),
        b if b > 0 => format!("{} B", b),
        _ => String::from("unknown"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "unknown");
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.0 MB");
    }
}
