//! The registration wizard: personal info → vehicle → equipment → summary.
//!
//! [`RegistrationDraft`] is the whole state of one wizard session. Data of a step is only ever
//! stored after that step's form was validly submitted, and going back never discards it.

mod steps;
#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use steps::{
    CrewMember, EquipmentInfo, Homologated, PersonalInfo, StepForm, StepRejected, VehicleInfo,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Step {
    Personal,
    Vehicle,
    Equipment,
    Summary,
}

impl Step {
    pub const ALL: [Step; 4] = [Step::Personal, Step::Vehicle, Step::Equipment, Step::Summary];

    /// The 1-based number shown in the step indicator.
    #[must_use]
    pub fn number(self) -> u8 {
        match self {
            Step::Personal => 1,
            Step::Vehicle => 2,
            Step::Equipment => 3,
            Step::Summary => 4,
        }
    }

    #[must_use]
    pub fn from_number(number: u8) -> Option<Step> {
        Step::ALL.into_iter().find(|step| step.number() == number)
    }

    #[must_use]
    pub fn next(self) -> Option<Step> {
        Step::from_number(self.number() + 1)
    }

    #[must_use]
    pub fn previous(self) -> Option<Step> {
        self.number().checked_sub(1).and_then(Step::from_number)
    }

    #[must_use]
    pub fn title(self) -> &'static str {
        match self {
            Step::Personal => "Personal information",
            Step::Vehicle => "Vehicle",
            Step::Equipment => "Safety equipment",
            Step::Summary => "Summary",
        }
    }
}

/// The validated data of one step, tagged with the step it belongs to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", content = "data")]
pub enum StepPayload {
    Personal(PersonalInfo),
    Vehicle(VehicleInfo),
    Equipment(EquipmentInfo),
}

impl StepPayload {
    #[must_use]
    pub fn step(&self) -> Step {
        match self {
            StepPayload::Personal(_) => Step::Personal,
            StepPayload::Vehicle(_) => Step::Vehicle,
            StepPayload::Equipment(_) => Step::Equipment,
        }
    }
}

#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum WizardError {
    #[error("Data for step {} submitted while at step {}", .submitted.number(), .current.number())]
    NotCurrentStep { submitted: Step, current: Step },
    #[error("Cannot jump ahead to step {} from step {}", .target.number(), .current.number())]
    ForwardJump { target: Step, current: Step },
    #[error("Already at the first step")]
    AtFirstStep,
    #[error("Step {} has not been completed yet", .0.number())]
    Incomplete(Step),
}

/// All data of a finished wizard, ready to be stored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteRegistration {
    pub personal_info: PersonalInfo,
    pub vehicle_info: VehicleInfo,
    pub equipment_info: EquipmentInfo,
}

/// The state of one wizard session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationDraft {
    /// The rally the registration is meant for. Kept across restarts.
    pub rally_id: Option<i64>,
    personal_info: Option<PersonalInfo>,
    vehicle_info: Option<VehicleInfo>,
    equipment_info: Option<EquipmentInfo>,
    current_step: Step,
}

impl Default for RegistrationDraft {
    fn default() -> Self {
        Self::new(None)
    }
}

impl RegistrationDraft {
    #[must_use]
    pub fn new(rally_id: Option<i64>) -> Self {
        Self {
            rally_id,
            personal_info: None,
            vehicle_info: None,
            equipment_info: None,
            current_step: Step::Personal,
        }
    }

    #[must_use]
    pub fn current_step(&self) -> Step {
        self.current_step
    }

    #[must_use]
    pub fn personal_info(&self) -> Option<&PersonalInfo> {
        self.personal_info.as_ref()
    }

    #[must_use]
    pub fn vehicle_info(&self) -> Option<&VehicleInfo> {
        self.vehicle_info.as_ref()
    }

    #[must_use]
    pub fn equipment_info(&self) -> Option<&EquipmentInfo> {
        self.equipment_info.as_ref()
    }

    /// Whether the data of `step` has been validly submitted at some point.
    #[must_use]
    pub fn is_completed(&self, step: Step) -> bool {
        match step {
            Step::Personal => self.personal_info.is_some(),
            Step::Vehicle => self.vehicle_info.is_some(),
            Step::Equipment => self.equipment_info.is_some(),
            Step::Summary => false,
        }
    }

    /// Stores the payload of the current step and moves on to the next one.
    ///
    /// Payloads of any other step are refused, so steps can only be completed in order.
    pub fn submit_step(&mut self, payload: StepPayload) -> Result<Step, WizardError> {
        let submitted = payload.step();
        if submitted != self.current_step {
            return Err(WizardError::NotCurrentStep {
                submitted,
                current: self.current_step,
            });
        }

        match payload {
            StepPayload::Personal(info) => self.personal_info = Some(info),
            StepPayload::Vehicle(info) => self.vehicle_info = Some(info),
            StepPayload::Equipment(info) => self.equipment_info = Some(info),
        }

        // submittable steps always have a successor, the summary at the latest
        if let Some(next) = submitted.next() {
            self.current_step = next;
        }
        Ok(self.current_step)
    }

    /// Goes back one step, keeping all data.
    pub fn previous(&mut self) -> Result<Step, WizardError> {
        let previous = self.current_step.previous().ok_or(WizardError::AtFirstStep)?;
        self.current_step = previous;
        Ok(previous)
    }

    /// Moves to `target` if it is not ahead of the current step.
    pub fn jump_to(&mut self, target: Step) -> Result<Step, WizardError> {
        if target > self.current_step {
            return Err(WizardError::ForwardJump {
                target,
                current: self.current_step,
            });
        }
        self.current_step = target;
        Ok(target)
    }

    /// Clears all data and goes back to the first step.
    pub fn restart(&mut self) {
        *self = Self::new(self.rally_id);
    }

    /// Collects the data of all steps. Only possible from the summary.
    pub fn assemble(&self) -> Result<CompleteRegistration, WizardError> {
        if self.current_step != Step::Summary {
            return Err(WizardError::Incomplete(self.current_step));
        }
        Ok(CompleteRegistration {
            personal_info: self
                .personal_info
                .clone()
                .ok_or(WizardError::Incomplete(Step::Personal))?,
            vehicle_info: self
                .vehicle_info
                .clone()
                .ok_or(WizardError::Incomplete(Step::Vehicle))?,
            equipment_info: self
                .equipment_info
                .clone()
                .ok_or(WizardError::Incomplete(Step::Equipment))?,
        })
    }
}
