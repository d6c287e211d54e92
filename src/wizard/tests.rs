use super::*;

fn jean() -> CrewMember {
    CrewMember {
        first_name: "Jean".to_string(),
        last_name: "Dupont".to_string(),
        email: "jean@example.com".to_string(),
        phone: "0600000000".to_string(),
        license_number: "12345".to_string(),
        license_category: "Nationale".to_string(),
    }
}

fn marie() -> CrewMember {
    CrewMember {
        first_name: "Marie".to_string(),
        last_name: "Martin".to_string(),
        email: "marie@example.com".to_string(),
        phone: "0611111111".to_string(),
        license_number: "67890".to_string(),
        license_category: "Nationale".to_string(),
    }
}

fn personal() -> PersonalInfo {
    PersonalInfo {
        driver: jean(),
        co_driver: marie(),
    }
}

fn vehicle() -> VehicleInfo {
    VehicleInfo {
        make: "Peugeot".to_string(),
        model: "208".to_string(),
        year: "2022".to_string(),
        registration_number: "AA-123-BB".to_string(),
        chassis_number: "CH123".to_string(),
        engine_number: "EN123".to_string(),
        engine_capacity: "1600cc".to_string(),
        homologation_number: "H123".to_string(),
        technical_passport: "P123".to_string(),
        category: "rally2".to_string(),
        group: "Rally2".to_string(),
        class: "R5".to_string(),
    }
}

fn gear(brand: &str) -> Homologated {
    Homologated {
        brand: brand.to_string(),
        homologation: "FIA 8860-2018".to_string(),
        expiration: "2030-12-31".to_string(),
    }
}

fn equipment() -> EquipmentInfo {
    EquipmentInfo {
        driver_helmet: gear("Stilo"),
        driver_suit: gear("Sparco"),
        co_driver_helmet: gear("Bell"),
        co_driver_suit: gear("OMP"),
        seats: gear("Recaro"),
        belts: gear("Sabelt"),
        ..EquipmentInfo::default()
    }
}

#[test]
fn happy_path_reaches_summary_with_all_values() {
    let mut draft = RegistrationDraft::new(Some(7));
    assert_eq!(draft.current_step(), Step::Personal);

    assert_eq!(personal().submit(&mut draft), Ok(Step::Vehicle));
    assert_eq!(vehicle().submit(&mut draft), Ok(Step::Equipment));
    assert_eq!(equipment().submit(&mut draft), Ok(Step::Summary));

    let complete = draft.assemble().unwrap();
    assert_eq!(complete.personal_info, personal());
    assert_eq!(complete.vehicle_info, vehicle());
    assert_eq!(complete.equipment_info, equipment());
    assert!(complete
        .equipment_info
        .flags()
        .iter()
        .all(|(_, checked)| *checked));
}

#[test]
fn going_back_keeps_submitted_data() {
    let mut draft = RegistrationDraft::default();
    personal().submit(&mut draft).unwrap();
    vehicle().submit(&mut draft).unwrap();

    assert_eq!(draft.previous(), Ok(Step::Vehicle));
    assert_eq!(VehicleInfo::initial_data(&draft), vehicle());
    assert_eq!(draft.previous(), Ok(Step::Personal));
    assert_eq!(PersonalInfo::initial_data(&draft), personal());
    assert_eq!(draft.previous(), Err(WizardError::AtFirstStep));

    // returning forward redisplays everything captured before
    personal().submit(&mut draft).unwrap();
    assert_eq!(draft.current_step(), Step::Vehicle);
    assert_eq!(draft.vehicle_info(), Some(&vehicle()));
}

#[test]
fn invalid_step_never_touches_the_draft() {
    let mut draft = RegistrationDraft::default();
    let before = draft.clone();

    let mut incomplete = personal();
    incomplete.co_driver.email = "not-an-email".to_string();
    incomplete.driver.first_name = "J".to_string();

    match incomplete.submit(&mut draft) {
        Err(StepRejected::Invalid(errors)) => {
            assert_eq!(errors.get("co_driver.email"), Some("must be a valid email address"));
            assert_eq!(
                errors.get("driver.first_name"),
                Some("must be at least 2 characters")
            );
            assert_eq!(errors.len(), 2);
        }
        other => panic!("expected field errors, got {other:?}"),
    }
    assert_eq!(draft, before);
}

#[test]
fn vehicle_year_must_be_four_digits() {
    for year in ["202", "20203", "abcd"] {
        let mut draft = RegistrationDraft::default();
        personal().submit(&mut draft).unwrap();

        let mut info = vehicle();
        info.year = year.to_string();
        let Err(StepRejected::Invalid(errors)) = info.submit(&mut draft) else {
            panic!("year {year:?} was accepted");
        };
        assert_eq!(errors.get("year"), Some("must be a 4-digit year"));
        assert_eq!(draft.current_step(), Step::Vehicle);
        assert!(draft.vehicle_info().is_none());
    }
}

#[test]
fn equipment_requires_every_gear_field() {
    let mut info = equipment();
    info.belts.expiration = String::new();
    info.driver_helmet.brand = "  ".to_string();

    let errors = info.validate();
    assert_eq!(errors.get("belts.expiration"), Some("this field is required"));
    assert_eq!(errors.get("driver_helmet.brand"), Some("this field is required"));
    assert_eq!(errors.len(), 2);
}

#[test]
fn safety_flags_default_to_checked() {
    let defaults = EquipmentInfo::initial_data(&RegistrationDraft::default());
    assert!(defaults.flags().iter().all(|(_, checked)| *checked));
}

#[test]
fn steps_cannot_be_skipped() {
    let mut draft = RegistrationDraft::default();
    assert_eq!(
        draft.submit_step(StepPayload::Vehicle(vehicle())),
        Err(WizardError::NotCurrentStep {
            submitted: Step::Vehicle,
            current: Step::Personal,
        })
    );
    assert_eq!(
        draft.jump_to(Step::Equipment),
        Err(WizardError::ForwardJump {
            target: Step::Equipment,
            current: Step::Personal,
        })
    );
    assert!(matches!(draft.assemble(), Err(WizardError::Incomplete(Step::Personal))));
}

#[test]
fn jumping_back_through_the_indicator() {
    let mut draft = RegistrationDraft::default();
    personal().submit(&mut draft).unwrap();
    vehicle().submit(&mut draft).unwrap();
    equipment().submit(&mut draft).unwrap();

    assert_eq!(draft.jump_to(Step::Personal), Ok(Step::Personal));
    assert!(draft.is_completed(Step::Equipment));
    // from step 1 the later steps are ahead again
    assert!(draft.jump_to(Step::Summary).is_err());
}

#[test]
fn restart_clears_everything_but_the_rally() {
    let mut draft = RegistrationDraft::new(Some(3));
    personal().submit(&mut draft).unwrap();
    vehicle().submit(&mut draft).unwrap();

    draft.restart();
    assert_eq!(draft, RegistrationDraft::new(Some(3)));
    assert!(draft.personal_info().is_none());
}

#[test]
fn draft_survives_serialization() {
    let mut draft = RegistrationDraft::new(Some(1));
    personal().submit(&mut draft).unwrap();

    let stored = serde_json::to_string(&draft).unwrap();
    let restored: RegistrationDraft = serde_json::from_str(&stored).unwrap();
    assert_eq!(restored, draft);

    let payload = serde_json::to_value(StepPayload::Vehicle(vehicle())).unwrap();
    assert_eq!(payload["step"], "Vehicle");
    assert_eq!(payload["data"]["year"], "2022");
}
