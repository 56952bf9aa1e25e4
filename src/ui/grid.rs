/// The locker grid: one 100px row per entry
///
/// Columns: indexation id, user id, avatar, information, dirt picture.
/// Clicking the information or picture cell copies it; clicking anywhere
/// else on the row selects it.
use iced::widget::{column, container, image, mouse_area, row, scrollable, text, Space};
use iced::{Alignment, Background, Color, Element, Length, Theme};

use crate::grid::{CopiedCell, GridModel};
use crate::state::data::{DisplayRow, RowImage};
use crate::storage::thumbnail::ROW_IMAGE_SIZE;
use crate::Message;

const ROW_HEIGHT: f32 = ROW_IMAGE_SIZE as f32;
const SELECTED: Color = Color {
    r: 0.94,
    g: 0.90,
    b: 0.55,
    a: 1.0,
}; // khaki

pub fn view(grid: &GridModel) -> Element<Message> {
    if grid.is_reloading() {
        return container(text("Loading entries...").size(18))
            .center_x(Length::Fill)
            .center_y(Length::Fill)
            .into();
    }

    let header = row![
        text("Indexation ID").width(Length::FillPortion(2)),
        text("User ID").width(Length::FillPortion(2)),
        text("Avatar").width(Length::Fixed(ROW_HEIGHT)),
        text("Information").width(Length::FillPortion(4)),
        text("Dirt").width(Length::Fixed(ROW_HEIGHT)),
    ]
    .spacing(10);

    let rows = grid
        .rows()
        .iter()
        .fold(column![].spacing(4), |rows, display| {
            rows.push(grid_row(grid, display))
        });

    column![header, scrollable(rows).height(Length::Fill)]
        .spacing(6)
        .into()
}

fn grid_row<'a>(grid: &GridModel, display: &'a DisplayRow) -> Element<'a, Message> {
    let id = display.indexation_id();

    let information: Element<Message> = if grid.is_copied(id, CopiedCell::Information) {
        text("Copied to Clipboard").into()
    } else {
        text(&display.information).size(13).into()
    };

    let picture: Element<Message> = if grid.is_copied(id, CopiedCell::Content) {
        container(text("Copied"))
            .center_x(Length::Fixed(ROW_HEIGHT))
            .center_y(Length::Fixed(ROW_HEIGHT))
            .into()
    } else {
        row_image(display.content.as_ref())
    };

    let cells = row![
        text(id).width(Length::FillPortion(2)),
        text(&display.record.user_id).width(Length::FillPortion(2)),
        row_image(display.avatar.as_ref()),
        mouse_area(container(information).width(Length::FillPortion(4)))
            .on_press(Message::CopyInformation(id.to_string())),
        mouse_area(picture).on_press(Message::CopyImage(id.to_string())),
    ]
    .spacing(10)
    .height(Length::Fixed(ROW_HEIGHT))
    .align_y(Alignment::Center);

    let selected = grid.is_selected(id);
    let styled = container(cells)
        .width(Length::Fill)
        .padding(2)
        .style(move |_theme: &Theme| container::Style {
            background: selected.then_some(Background::Color(SELECTED)),
            ..container::Style::default()
        });

    mouse_area(styled)
        .on_press(Message::RowClicked(id.to_string()))
        .into()
}

fn row_image(image_data: Option<&RowImage>) -> Element<'static, Message> {
    match image_data {
        Some(data) => image(data.handle.clone())
            .width(Length::Fixed(ROW_HEIGHT))
            .height(Length::Fixed(ROW_HEIGHT))
            .into(),
        None => Space::new(Length::Fixed(ROW_HEIGHT), Length::Fixed(ROW_HEIGHT)).into(),
    }
}
