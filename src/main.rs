use iced::widget::{button, column, container, row, text, text_input};
use iced::{Alignment, Element, Length, Task, Theme};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod error;
mod grid;
mod remote;
mod state;
mod storage;
#[cfg(test)]
mod testing;
mod ui;

use config::{AppConfig, AppContext};
use error::{AddEntryError, AddField};
use grid::synchronizer;
use grid::{CopiedCell, EntryDetails, GridModel, NewEntryForm, ReloadOutcome};
use state::data::{DeletedEntry, DisplayRow, InfoFormat};
use state::filter::FilterSet;

/// Lookup field being edited
#[derive(Debug, Clone, Copy)]
enum FilterField {
    IndexationId,
    Username,
    UserId,
    Notes,
}

/// Add-form field being edited
#[derive(Debug, Clone, Copy)]
enum FormField {
    UserId,
    AttachmentUrl,
    Notes,
}

/// Main application state
struct DirtLocker {
    ctx: Arc<AppContext>,
    grid: GridModel,
    filters: FilterSet,
    form: NewEntryForm,
    /// Field-level message from the last rejected add
    form_error: Option<(Option<AddField>, String)>,
    adding: bool,
    /// Entry view panel, replaces the grid while open
    details: Option<EntryDetails>,
    status: String,
}

/// Application messages (events)
#[derive(Debug, Clone)]
enum Message {
    FilterChanged(FilterField, String),
    /// Apply Filters button and the Reload action
    ApplyFilters,
    ReloadComplete(Result<ReloadOutcome, String>),
    FormChanged(FormField, String),
    AddEntry,
    AddComplete(Result<DisplayRow, (Option<AddField>, String)>),
    RowClicked(String),
    ViewEntry,
    DetailsLoaded(Result<EntryDetails, String>),
    CloseDetails,
    DeleteEntry,
    DeleteComplete(Result<DeletedEntry, String>),
    CopyInformation(String),
    CopyImage(String),
    CopyFeedbackExpired(String, CopiedCell),
}

impl DirtLocker {
    /// Create the application and kick off the first grid load
    fn new(ctx: Arc<AppContext>) -> (Self, Task<Message>) {
        (
            DirtLocker {
                ctx,
                grid: GridModel::new(),
                filters: FilterSet::default(),
                form: NewEntryForm::default(),
                form_error: None,
                adding: false,
                details: None,
                status: String::from("Loading entries..."),
            },
            Task::done(Message::ApplyFilters),
        )
    }

    /// Handle application messages and update state
    fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::FilterChanged(field, value) => {
                match field {
                    FilterField::IndexationId => self.filters.indexation_id = value,
                    FilterField::Username => self.filters.username = value,
                    FilterField::UserId => self.filters.user_id = value,
                    FilterField::Notes => self.filters.notes = value,
                }
                Task::none()
            }
            Message::ApplyFilters => {
                // A pending add patches the grid when it lands; let it finish first
                if self.adding || !self.grid.begin_reload() {
                    return Task::none();
                }

                self.details = None;
                self.status = String::from("Loading...");

                let ctx = self.ctx.clone();
                let filter = self.filters.clone();
                Task::perform(
                    async move {
                        synchronizer::reload(&ctx, filter)
                            .await
                            .map_err(|e| e.to_string())
                    },
                    Message::ReloadComplete,
                )
            }
            Message::ReloadComplete(Ok(outcome)) => {
                if outcome.failed > 0 {
                    warn!(failed = outcome.failed, "Some rows were loaded without images");
                }
                self.grid.finish_reload(outcome.rows);
                self.status = self.grid.count_label();
                Task::none()
            }
            Message::ReloadComplete(Err(e)) => {
                error!(error = %e, "❌ Reload failed");
                self.grid.abort_reload();
                self.status = format!("Could not load entries: {}", e);
                Task::none()
            }
            Message::FormChanged(field, value) => {
                match field {
                    FormField::UserId => self.form.user_id = value,
                    FormField::AttachmentUrl => self.form.attachment_url = value,
                    FormField::Notes => self.form.notes = value,
                }
                Task::none()
            }
            Message::AddEntry => {
                // The reload's snapshot would overwrite the new row
                if self.busy() {
                    return Task::none();
                }

                self.adding = true;
                self.form_error = None;

                let ctx = self.ctx.clone();
                let form = self.form.clone();
                Task::perform(
                    async move {
                        synchronizer::add_entry(&ctx, form)
                            .await
                            .map_err(|e| {
                                let field = e.field();
                                match e {
                                    AddEntryError::Invalid { message, .. } => (field, message),
                                    AddEntryError::Failed(e) => (field, e.to_string()),
                                }
                            })
                    },
                    Message::AddComplete,
                )
            }
            Message::AddComplete(Ok(row)) => {
                info!(indexation_id = %row.indexation_id(), "➕ Entry added");
                self.adding = false;
                self.form = NewEntryForm::default();
                self.grid.insert_top(row);
                self.status = self.grid.count_label();
                Task::none()
            }
            Message::AddComplete(Err(rejection)) => {
                self.adding = false;
                self.form_error = Some(rejection);
                Task::none()
            }
            Message::RowClicked(indexation_id) => {
                self.grid.click_row(&indexation_id);
                Task::none()
            }
            Message::ViewEntry => {
                let Some(selected) = self.grid.selected() else {
                    return Task::none();
                };

                let ctx = self.ctx.clone();
                let indexation_id = selected.indexation_id().to_string();
                Task::perform(
                    async move {
                        synchronizer::load_details(&ctx, &indexation_id)
                            .await
                            .map_err(|e| e.to_string())
                    },
                    Message::DetailsLoaded,
                )
            }
            Message::DetailsLoaded(Ok(details)) => {
                self.details = Some(details);
                Task::none()
            }
            Message::DetailsLoaded(Err(e)) => {
                error!(error = %e, "Could not open entry");
                self.status = format!("Could not open entry: {}", e);
                Task::none()
            }
            Message::CloseDetails => {
                self.details = None;
                Task::none()
            }
            Message::DeleteEntry => {
                let Some(selected) = self.grid.selected() else {
                    return Task::none();
                };
                let indexation_id = selected.indexation_id().to_string();

                if !ui::dialogs::confirm_delete() {
                    return Task::none();
                }

                let ctx = self.ctx.clone();
                Task::perform(
                    async move {
                        synchronizer::delete_entry(&ctx, &indexation_id)
                            .await
                            .map_err(|e| e.to_string())
                    },
                    Message::DeleteComplete,
                )
            }
            Message::DeleteComplete(Ok(deleted)) => {
                self.grid.remove(&deleted.indexation_id);
                if self
                    .details
                    .as_ref()
                    .is_some_and(|details| details.record.indexation_id == deleted.indexation_id)
                {
                    self.details = None;
                }
                self.status = self.grid.count_label();
                Task::none()
            }
            Message::DeleteComplete(Err(e)) => {
                error!(error = %e, "❌ Delete failed");
                self.status = format!("Could not delete entry: {}", e);
                Task::none()
            }
            Message::CopyInformation(indexation_id) => {
                let Some(row) = self.grid.row(&indexation_id) else {
                    return Task::none();
                };
                let information = row.record.information_string(InfoFormat::Discord);

                if !self.grid.mark_copied(&indexation_id, CopiedCell::Information) {
                    return Task::none();
                }

                Task::batch([
                    iced::clipboard::write(information),
                    self.expire_copied(indexation_id, CopiedCell::Information),
                ])
            }
            Message::CopyImage(indexation_id) => {
                let Some(image) = self
                    .grid
                    .row(&indexation_id)
                    .and_then(|row| row.content.clone())
                else {
                    return Task::none();
                };

                if !self.grid.mark_copied(&indexation_id, CopiedCell::Content) {
                    return Task::none();
                }

                if let Err(e) = ui::clipboard::copy_image(&image) {
                    warn!(error = %e, "⚠️  Could not copy image");
                }
                self.expire_copied(indexation_id, CopiedCell::Content)
            }
            Message::CopyFeedbackExpired(indexation_id, cell) => {
                self.grid.clear_copied(&indexation_id, cell);
                Task::none()
            }
        }
    }

    /// An add or a reload is in flight
    fn busy(&self) -> bool {
        self.adding || self.grid.is_reloading()
    }

    /// Revert a copied cell once the feedback delay has passed
    fn expire_copied(&self, indexation_id: String, cell: CopiedCell) -> Task<Message> {
        let delay = self.ctx.config.copy_feedback();
        Task::perform(tokio::time::sleep(delay), move |_| {
            Message::CopyFeedbackExpired(indexation_id.clone(), cell)
        })
    }

    /// Build the user interface
    fn view(&self) -> Element<Message> {
        let body = match &self.details {
            Some(details) => ui::entry_view::view(details),
            None => ui::grid::view(&self.grid),
        };

        let content = column![
            self.filter_bar(),
            self.actions_bar(),
            container(body).height(Length::Fill),
            self.add_form(),
        ]
        .spacing(12)
        .padding(16);

        container(content)
            .width(Length::Fill)
            .height(Length::Fill)
            .into()
    }

    fn filter_bar(&self) -> Element<Message> {
        let apply = if self.busy() {
            button("Loading...")
        } else {
            button("Apply Filters").on_press(Message::ApplyFilters)
        };

        row![
            text_input("Indexation ID", &self.filters.indexation_id)
                .on_input(|v| Message::FilterChanged(FilterField::IndexationId, v)),
            text_input("Username", &self.filters.username)
                .on_input(|v| Message::FilterChanged(FilterField::Username, v)),
            text_input("User ID", &self.filters.user_id)
                .on_input(|v| Message::FilterChanged(FilterField::UserId, v)),
            text_input("Notes", &self.filters.notes)
                .on_input(|v| Message::FilterChanged(FilterField::Notes, v))
                .on_submit(Message::ApplyFilters),
            apply,
        ]
        .spacing(8)
        .align_y(Alignment::Center)
        .into()
    }

    fn actions_bar(&self) -> Element<Message> {
        let has_selection = self.grid.selected().is_some();

        row![
            text(&self.status).size(16).width(Length::Fill),
            button("Reload").on_press_maybe(
                (!self.busy()).then_some(Message::ApplyFilters)
            ),
            button("View").on_press_maybe(has_selection.then_some(Message::ViewEntry)),
            button("Delete").on_press_maybe(has_selection.then_some(Message::DeleteEntry)),
        ]
        .spacing(8)
        .align_y(Alignment::Center)
        .into()
    }

    /// Message under a form field, or under the whole form for `None`
    fn field_error(&self, field: Option<AddField>) -> Element<Message> {
        match &self.form_error {
            Some((f, message)) if *f == field => text(message).size(14).into(),
            _ => column![].into(),
        }
    }

    fn add_form(&self) -> Element<Message> {
        let add: Element<Message> = if self.busy() {
            text("Adding...").into()
        } else {
            button("Add").on_press(Message::AddEntry).into()
        };

        column![
            row![
                column![
                    text_input("User ID", &self.form.user_id)
                        .on_input(|v| Message::FormChanged(FormField::UserId, v)),
                    self.field_error(Some(AddField::UserId)),
                ]
                .spacing(4),
                column![
                    text_input("Attachment URL", &self.form.attachment_url)
                        .on_input(|v| Message::FormChanged(FormField::AttachmentUrl, v)),
                    self.field_error(Some(AddField::AttachmentUrl)),
                ]
                .spacing(4),
                text_input("Notes", &self.form.notes)
                    .on_input(|v| Message::FormChanged(FormField::Notes, v)),
                add,
            ]
            .spacing(8),
            self.field_error(None),
        ]
        .spacing(4)
        .into()
    }

    /// Set the application theme
    fn theme(&self) -> Theme {
        Theme::Light
    }
}

fn main() -> iced::Result {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("dirt_locker=info")),
        )
        .init();

    // The app cannot function without its configuration and cache
    let ctx = match AppConfig::load().and_then(AppContext::new) {
        Ok(ctx) => Arc::new(ctx),
        Err(e) => {
            error!(error = %e, "❌ Failed to start. Check permissions and the configuration file.");
            std::process::exit(1);
        }
    };
    info!(database = %ctx.database_path().display(), "🗄️  Dirt Locker starting");

    iced::application("Dirt Locker", DirtLocker::update, DirtLocker::view)
        .theme(DirtLocker::theme)
        .centered()
        .run_with(move || DirtLocker::new(ctx))
}
