use serde::{Deserialize, Serialize};

use super::{RegistrationDraft, Step, StepPayload, WizardError};
use crate::validation::{self, FieldErrors};

/// Identity, license and contact data of one crew member.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromForm)]
pub struct CrewMember {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub license_number: String,
    pub license_category: String,
}

impl CrewMember {
    fn validate(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        errors.check("first_name", validation::name(&self.first_name));
        errors.check("last_name", validation::name(&self.last_name));
        errors.check("email", validation::email(&self.email));
        errors.check("phone", validation::phone(&self.phone));
        errors.check("license_number", validation::required(&self.license_number));
        errors.check("license_category", validation::required(&self.license_category));
        errors
    }

    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
    }
}

/// Step 1: who drives.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromForm)]
pub struct PersonalInfo {
    pub driver: CrewMember,
    pub co_driver: CrewMember,
}

/// Step 2: what is driven.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromForm)]
pub struct VehicleInfo {
    pub make: String,
    pub model: String,
    /// Exactly four digits.
    pub year: String,
    pub registration_number: String,
    pub chassis_number: String,
    pub engine_number: String,
    pub engine_capacity: String,
    pub homologation_number: String,
    pub technical_passport: String,
    pub category: String,
    pub group: String,
    pub class: String,
}

/// A piece of homologated safety gear.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromForm)]
pub struct Homologated {
    pub brand: String,
    pub homologation: String,
    pub expiration: String,
}

impl Homologated {
    fn validate(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        errors.check("brand", validation::required(&self.brand));
        errors.check("homologation", validation::required(&self.homologation));
        errors.check("expiration", validation::required(&self.expiration));
        errors
    }
}

/// Step 3: what keeps the crew alive.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, FromForm)]
pub struct EquipmentInfo {
    pub driver_helmet: Homologated,
    pub driver_suit: Homologated,
    pub co_driver_helmet: Homologated,
    pub co_driver_suit: Homologated,
    pub seats: Homologated,
    pub belts: Homologated,
    pub hans_device: bool,
    pub fire_extinguisher: bool,
    pub roll_cage: bool,
    pub first_aid_kit: bool,
}

impl Default for EquipmentInfo {
    /// Safety equipment is pre-checked.
    fn default() -> Self {
        Self {
            driver_helmet: <Homologated as Default>::default(),
            driver_suit: <Homologated as Default>::default(),
            co_driver_helmet: <Homologated as Default>::default(),
            co_driver_suit: <Homologated as Default>::default(),
            seats: <Homologated as Default>::default(),
            belts: <Homologated as Default>::default(),
            hans_device: true,
            fire_extinguisher: true,
            roll_cage: true,
            first_aid_kit: true,
        }
    }
}

impl EquipmentInfo {
    /// The gear entries together with their input name prefix.
    #[must_use]
    pub fn gear(&self) -> [(&'static str, &Homologated); 6] {
        [
            ("driver_helmet", &self.driver_helmet),
            ("driver_suit", &self.driver_suit),
            ("co_driver_helmet", &self.co_driver_helmet),
            ("co_driver_suit", &self.co_driver_suit),
            ("seats", &self.seats),
            ("belts", &self.belts),
        ]
    }

    /// The safety flags together with their input name.
    #[must_use]
    pub fn flags(&self) -> [(&'static str, bool); 4] {
        [
            ("hans_device", self.hans_device),
            ("fire_extinguisher", self.fire_extinguisher),
            ("roll_cage", self.roll_cage),
            ("first_aid_kit", self.first_aid_kit),
        ]
    }
}

/// A form collecting the data of one wizard step.
///
/// Every step form is validated as a whole on submit. Only a valid form reaches the wizard,
/// an invalid one leaves the draft untouched.
pub trait StepForm: Sized + Default + Clone {
    const STEP: Step;

    /// Field errors keyed by the input names of the form.
    fn validate(&self) -> FieldErrors;

    fn into_payload(self) -> StepPayload;

    /// What the form shows when it is opened: the previously submitted data, or the defaults.
    fn initial_data(draft: &RegistrationDraft) -> Self;

    /// Validates the form and, only if valid, hands it to the wizard which then advances.
    fn submit(self, draft: &mut RegistrationDraft) -> Result<Step, StepRejected> {
        let errors = self.validate();
        if !errors.is_empty() {
            return Err(StepRejected::Invalid(errors));
        }
        draft
            .submit_step(self.into_payload())
            .map_err(StepRejected::Wizard)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum StepRejected {
    Invalid(FieldErrors),
    Wizard(WizardError),
}

impl StepForm for PersonalInfo {
    const STEP: Step = Step::Personal;

    fn validate(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        errors.merge_prefixed("driver", self.driver.validate());
        errors.merge_prefixed("co_driver", self.co_driver.validate());
        errors
    }

    fn into_payload(self) -> StepPayload {
        StepPayload::Personal(self)
    }

    fn initial_data(draft: &RegistrationDraft) -> Self {
        draft.personal_info().cloned().unwrap_or_default()
    }
}

impl StepForm for VehicleInfo {
    const STEP: Step = Step::Vehicle;

    fn validate(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        errors.check("make", validation::required(&self.make));
        errors.check("model", validation::required(&self.model));
        errors.check("year", validation::year(&self.year));
        for (field, value) in [
            ("registration_number", &self.registration_number),
            ("chassis_number", &self.chassis_number),
            ("engine_number", &self.engine_number),
            ("engine_capacity", &self.engine_capacity),
            ("homologation_number", &self.homologation_number),
            ("technical_passport", &self.technical_passport),
            ("category", &self.category),
            ("group", &self.group),
            ("class", &self.class),
        ] {
            errors.check(field, validation::required(value));
        }
        errors
    }

    fn into_payload(self) -> StepPayload {
        StepPayload::Vehicle(self)
    }

    fn initial_data(draft: &RegistrationDraft) -> Self {
        draft.vehicle_info().cloned().unwrap_or_default()
    }
}

impl StepForm for EquipmentInfo {
    const STEP: Step = Step::Equipment;

    fn validate(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        for (prefix, gear) in self.gear() {
            errors.merge_prefixed(prefix, gear.validate());
        }
        errors
    }

    fn into_payload(self) -> StepPayload {
        StepPayload::Equipment(self)
    }

    fn initial_data(draft: &RegistrationDraft) -> Self {
        draft.equipment_info().cloned().unwrap_or_default()
    }
}
