//! Form descriptions handed to the templates.
//!
//! Pages don't hardcode their inputs. Handlers describe each input as a [`FieldView`] and the
//! generic form partial renders it, together with the error message of the field if there is
//! one.

use serde::Serialize;

use crate::validation::FieldErrors;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Email,
    Tel,
    Password,
    Textarea,
    Number,
    Date,
    DateTime,
    Checkbox,
    Select,
    Hidden,
}

impl FieldKind {
    /// The `type` attribute of the `<input>` element.
    #[must_use]
    pub fn input_type(self) -> &'static str {
        match self {
            FieldKind::Text | FieldKind::Textarea | FieldKind::Select => "text",
            FieldKind::Email => "email",
            FieldKind::Tel => "tel",
            FieldKind::Password => "password",
            FieldKind::Number => "number",
            FieldKind::Date => "date",
            FieldKind::DateTime => "datetime-local",
            FieldKind::Checkbox => "checkbox",
            FieldKind::Hidden => "hidden",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
    pub selected: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FieldView {
    pub name: String,
    pub label: String,
    pub kind: FieldKind,
    pub input_type: &'static str,
    pub value: String,
    pub checked: bool,
    pub required: bool,
    /// The `step` attribute of number inputs.
    pub step: Option<&'static str>,
    pub options: Vec<SelectOption>,
    pub error: Option<String>,
}

impl FieldView {
    #[must_use]
    pub fn new(kind: FieldKind, name: &str, label: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            kind,
            input_type: kind.input_type(),
            value: value.to_string(),
            checked: false,
            required: false,
            step: None,
            options: Vec::new(),
            error: None,
        }
    }

    #[must_use]
    pub fn text(name: &str, label: &str, value: &str) -> Self {
        Self::new(FieldKind::Text, name, label, value)
    }

    #[must_use]
    pub fn checkbox(name: &str, label: &str, checked: bool) -> Self {
        let mut field = Self::new(FieldKind::Checkbox, name, label, "true");
        field.checked = checked;
        field
    }

    #[must_use]
    pub fn select(
        name: &str,
        label: &str,
        choices: impl IntoIterator<Item = (String, String)>,
        selected: &str,
    ) -> Self {
        let mut field = Self::new(FieldKind::Select, name, label, selected);
        field.options = choices
            .into_iter()
            .map(|(value, label)| SelectOption {
                selected: value == selected,
                value,
                label,
            })
            .collect();
        field
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub fn step(mut self, step: &'static str) -> Self {
        self.step = Some(step);
        self
    }

    /// The value as shown on a read-only summary.
    #[must_use]
    pub fn display_value(&self) -> String {
        match self.kind {
            FieldKind::Checkbox if self.checked => "Yes".to_string(),
            FieldKind::Checkbox => "No".to_string(),
            FieldKind::Password => "••••••••".to_string(),
            FieldKind::Select => self
                .options
                .iter()
                .find(|option| option.selected)
                .map_or_else(|| self.value.clone(), |option| option.label.clone()),
            _ => self.value.clone(),
        }
    }
}

/// A titled group of inputs, rendered as a fieldset.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FormSection {
    pub title: String,
    pub fields: Vec<FieldView>,
}

impl FormSection {
    #[must_use]
    pub fn new(title: &str, fields: Vec<FieldView>) -> Self {
        Self {
            title: title.to_string(),
            fields,
        }
    }
}

/// One line of a read-only summary.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SummaryEntry {
    pub label: String,
    pub value: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SummarySection {
    pub title: String,
    pub entries: Vec<SummaryEntry>,
}

impl From<FormSection> for SummarySection {
    fn from(section: FormSection) -> Self {
        Self {
            entries: section
                .fields
                .iter()
                .filter(|field| field.kind != FieldKind::Hidden)
                .map(|field| SummaryEntry {
                    label: field.label.clone(),
                    value: field.display_value(),
                })
                .collect(),
            title: section.title,
        }
    }
}

/// Puts the error messages next to the fields they belong to.
pub fn attach_errors(sections: &mut [FormSection], errors: &FieldErrors) {
    for field in sections.iter_mut().flat_map(|section| section.fields.iter_mut()) {
        field.error = errors.get(&field.name).map(str::to_string);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_land_on_their_fields() {
        let mut sections = vec![FormSection::new(
            "Driver",
            vec![
                FieldView::text("driver.first_name", "First name", "J"),
                FieldView::text("driver.last_name", "Last name", "Dupont"),
            ],
        )];
        let mut errors = FieldErrors::new();
        errors.add("driver.first_name", "must be at least 2 characters");

        attach_errors(&mut sections, &errors);
        assert_eq!(
            sections[0].fields[0].error.as_deref(),
            Some("must be at least 2 characters")
        );
        assert!(sections[0].fields[1].error.is_none());
    }

    #[test]
    fn summaries_show_labels_not_raw_values() {
        let section = FormSection::new(
            "Safety",
            vec![
                FieldView::checkbox("roll_cage", "Roll cage", true),
                FieldView::select(
                    "status",
                    "Status",
                    [
                        ("planned".to_string(), "Planned".to_string()),
                        ("active".to_string(), "Active".to_string()),
                    ],
                    "active",
                ),
            ],
        );
        let summary = SummarySection::from(section);
        assert_eq!(summary.entries[0].value, "Yes");
        assert_eq!(summary.entries[1].value, "Active");
        assert_eq!(FieldKind::DateTime.input_type(), "datetime-local");
    }
}
