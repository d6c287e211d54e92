//! The pages every dashboard entity shares: a list, a form and a delete confirmation.
//!
//! Rallies, stages and timing points only differ in their columns and inputs, so each of them
//! describes its pages with a [`ListPage`] or [`FormPage`] and renders through the same two
//! templates.

use std::fmt::Display;

use rocket::request::FlashMessage;
use rocket_dyn_templates::{context, Template};
use serde::Serialize;

use super::Area;
use crate::{
    map::MapSlot,
    routes::{
        forms::{attach_errors, FieldView, FormSection},
        FlashView,
    },
    session::Session,
    validation::FieldErrors,
};

/// Value/label pairs for a select input, labels capitalized.
pub fn choices<T: Display>(all: &[T]) -> Vec<(String, String)> {
    all.iter()
        .map(|value| {
            let value = value.to_string();
            let mut label = value.clone();
            if let Some(first) = label.get_mut(0..1) {
                first.make_ascii_uppercase();
            }
            (value, label)
        })
        .collect()
}

#[derive(Clone, Debug, Serialize)]
pub struct Link {
    pub label: String,
    pub url: String,
}

impl Link {
    #[must_use]
    pub fn new(label: &str, url: String) -> Self {
        Self {
            label: label.to_string(),
            url,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ListRow {
    pub cells: Vec<String>,
    pub links: Vec<Link>,
}

#[derive(Debug, Serialize)]
pub struct ListPage {
    pub title: String,
    pub columns: Vec<&'static str>,
    pub rows: Vec<ListRow>,
    pub new_link: Option<Link>,
    pub back: Option<Link>,
    pub empty_message: &'static str,
    pub map: Option<MapSlot>,
}

impl ListPage {
    #[must_use]
    pub fn new(title: String, columns: Vec<&'static str>, rows: Vec<ListRow>) -> Self {
        Self {
            title,
            columns,
            rows,
            new_link: None,
            back: None,
            empty_message: "Nothing here yet.",
            map: None,
        }
    }

    pub fn render(
        self,
        area: Area,
        flash: Option<FlashMessage<'_>>,
        session: &Session,
    ) -> Template {
        Template::render(
            "crud-list",
            context! {
                area,
                flash: FlashView::from_flash(flash),
                session,
                page: self,
            },
        )
    }
}

#[derive(Debug, Serialize)]
pub struct FormPage {
    pub title: String,
    pub action: String,
    pub submit_label: &'static str,
    pub sections: Vec<FormSection>,
    pub cancel_url: String,
    pub map: Option<MapSlot>,
    pub danger: bool,
}

impl FormPage {
    #[must_use]
    pub fn new(
        title: String,
        action: String,
        sections: Vec<FormSection>,
        cancel_url: String,
    ) -> Self {
        Self {
            title,
            action,
            submit_label: "Save",
            sections,
            cancel_url,
            map: None,
            danger: false,
        }
    }

    /// The confirmation page in front of a delete.
    #[must_use]
    pub fn delete_confirmation(what: &str, action: String, cancel_url: String) -> Self {
        let mut page = Self::new(
            format!("Delete {what}"),
            action,
            vec![FormSection::new(
                "This can't be undone",
                vec![FieldView::checkbox(
                    "confirm",
                    &format!("Yes, permanently delete {what}"),
                    false,
                )],
            )],
            cancel_url,
        );
        page.submit_label = "Delete";
        page.danger = true;
        page
    }

    #[must_use]
    pub fn with_map(mut self, map: MapSlot) -> Self {
        self.map = Some(map);
        self
    }

    pub fn render(
        mut self,
        area: Area,
        errors: &FieldErrors,
        flash: Option<FlashMessage<'_>>,
        session: &Session,
    ) -> Template {
        attach_errors(&mut self.sections, errors);
        Template::render(
            "crud-form",
            context! {
                area,
                flash: FlashView::from_flash(flash),
                session,
                has_errors: !errors.is_empty(),
                page: self,
            },
        )
    }
}

/// The form in front of a delete. Without the box ticked nothing is deleted.
#[derive(Debug, FromForm)]
pub struct DeleteConfirmation {
    pub confirm: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql_interface::PointType;

    #[test]
    fn choices_are_labelled() {
        assert_eq!(
            choices(PointType::ALL),
            [
                ("start".to_string(), "Start".to_string()),
                ("split".to_string(), "Split".to_string()),
                ("finish".to_string(), "Finish".to_string()),
            ]
        );
    }

    #[test]
    fn delete_confirmation_starts_unchecked() {
        let page = FormPage::delete_confirmation(
            "stage ES1",
            "/organizer/stages/1/delete".to_string(),
            "/organizer/rallies/1/stages".to_string(),
        );
        assert!(page.danger);
        assert_eq!(page.sections[0].fields[0].name, "confirm");
        assert!(!page.sections[0].fields[0].checked);
    }
}
