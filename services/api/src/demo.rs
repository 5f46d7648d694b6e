use crate::infra::{
    demo_workflow_config, InMemoryAllotmentStore, InMemoryNotificationSink, StaticDirectory,
};
use chrono::{Duration, Local};
use clap::Args;
use donorbank::error::AppError;
use donorbank::identity::{CallerIdentity, CredentialVerifier};
use donorbank::workflows::allotment::domain::{
    BloodGroup, CriteriaRange, DonorRegistration, Gender, MaritalStatus, RequestSubmission,
};
use donorbank::workflows::allotment::repository::RequestView;
use donorbank::workflows::allotment::service::AllotmentService;
use std::sync::Arc;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Print each participant's notification feed at the end of the run.
    #[arg(long)]
    pub(crate) show_notifications: bool,
}

type DemoService =
    AllotmentService<InMemoryAllotmentStore, StaticDirectory, InMemoryNotificationSink>;

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let directory = StaticDirectory::demo();
    let service = DemoService::new(
        Arc::new(InMemoryAllotmentStore::default()),
        directory.clone(),
        Arc::new(InMemoryNotificationSink::default()),
        demo_workflow_config(),
    );

    let Some(admin) = directory.verify("admin-token") else {
        println!("demo directory is missing the admin account");
        return Ok(());
    };
    let Some(doctor) = directory.verify("doctor-token") else {
        println!("demo directory is missing the doctor account");
        return Ok(());
    };
    let Some(staff) = directory.verify("staff-token") else {
        println!("demo directory is missing the staff account");
        return Ok(());
    };

    println!("Donor allotment walkthrough");

    println!("\nStaff registers the donor pool");
    let mut donors = Vec::new();
    for registration in demo_donor_pool() {
        let name = registration.name.clone();
        match service.register_donor(&staff, registration) {
            Ok(donor) => {
                println!(
                    "- {} registered as {} ({}, age {})",
                    donor.name,
                    donor.donor_code,
                    donor.blood_group.label(),
                    donor.age
                );
                donors.push(donor);
            }
            Err(err) => {
                println!("- registration for {} rejected: {err}", name);
                return Ok(());
            }
        }
    }

    println!("\nDoctor files a donor request");
    let first_request = match service.create_request(&doctor, demo_submission(&doctor)) {
        Ok(view) => {
            describe_request(&view);
            view.request.id
        }
        Err(err) => {
            println!("- request rejected: {err}");
            return Ok(());
        }
    };

    println!("\nMatching donors for {}", first_request.0);
    match service.matching_donors(&first_request) {
        Ok(outcome) => {
            println!(
                "- {} candidate(s) via the {} pass",
                outcome.total,
                outcome.pass.label()
            );
            for donor in &outcome.donors {
                println!(
                    "  - {} ({}, {}, age {})",
                    donor.name,
                    donor.donor_code,
                    donor.blood_group.label(),
                    donor.age
                );
            }
        }
        Err(err) => {
            println!("- matching unavailable: {err}");
            return Ok(());
        }
    }

    let first_donor = donors[0].id.clone();
    println!("\nAdmin allots {} to the request", donors[0].donor_code);
    match service.allot(&admin, &first_request, &first_donor) {
        Ok(view) => describe_request(&view),
        Err(err) => {
            println!("- allotment failed: {err}");
            return Ok(());
        }
    }

    println!("\nDoctor rejects the candidate; the donor returns to the pool");
    match service.reject_donor(&doctor, &first_request) {
        Ok(view) => describe_request(&view),
        Err(err) => {
            println!("- rejection failed: {err}");
            return Ok(());
        }
    }

    println!("\nAdmin allots the same donor again and the doctor accepts");
    if let Err(err) = service.allot(&admin, &first_request, &first_donor) {
        println!("- re-allotment failed: {err}");
        return Ok(());
    }
    match service.accept_donor(&doctor, &first_request) {
        Ok(view) => describe_request(&view),
        Err(err) => {
            println!("- acceptance failed: {err}");
            return Ok(());
        }
    }

    println!("\nA second request goes through the cancellation path");
    let second_request = match service.create_request(&doctor, demo_submission(&doctor)) {
        Ok(view) => view.request.id,
        Err(err) => {
            println!("- request rejected: {err}");
            return Ok(());
        }
    };
    match service.matching_donors(&second_request) {
        Ok(outcome) => {
            println!(
                "- {} candidate(s) remain now that {} is committed",
                outcome.total, donors[0].donor_code
            );
        }
        Err(err) => {
            println!("- matching unavailable: {err}");
            return Ok(());
        }
    }
    let second_donor = donors[1].id.clone();
    if let Err(err) = service.allot(&admin, &second_request, &second_donor) {
        println!("- allotment failed: {err}");
        return Ok(());
    }
    match service.cancel_allotment(&staff, &second_request) {
        Ok(view) => describe_request(&view),
        Err(err) => {
            println!("- cancellation failed: {err}");
            return Ok(());
        }
    }

    println!("\nCommitted donors cannot be allotted elsewhere");
    match service.allot(&admin, &second_request, &first_donor) {
        Ok(_) => println!("- unexpected: the allotment went through"),
        Err(err) => println!("- correctly refused: {err}"),
    }

    if args.show_notifications {
        print_feed(&service, "doctor", &doctor);
        print_feed(&service, "admin", &admin);
    }

    Ok(())
}

fn describe_request(view: &RequestView) {
    println!(
        "- {} at {} is {} (allotted: {})",
        view.request.id.0,
        view.hospital.name,
        view.request.status.label(),
        match &view.donor {
            Some(donor) => donor.donor_code.as_str(),
            None => "nobody",
        }
    );
}

fn print_feed(service: &DemoService, label: &str, caller: &CallerIdentity) {
    println!("\nNotification feed for the {label} ({})", caller.user_id.0);
    match service.notifications_feed(caller) {
        Ok(feed) => {
            if feed.notifications.is_empty() {
                println!("- empty");
            }
            for notification in &feed.notifications {
                println!("- [{}] {}", notification.title, notification.message);
            }
            println!("  {} unread", feed.unread);
        }
        Err(err) => println!("- feed unavailable: {err}"),
    }
}

fn demo_donor_pool() -> Vec<DonorRegistration> {
    vec![
        demo_donor("Aisha Verma", "98200-11111", 27, BloodGroup::OPositive),
        demo_donor("Divya Kulkarni", "98200-22222", 29, BloodGroup::OPositive),
        demo_donor("Leela Nair", "98200-33333", 41, BloodGroup::BPositive),
    ]
}

fn demo_donor(name: &str, phone: &str, age: u32, blood_group: BloodGroup) -> DonorRegistration {
    DonorRegistration {
        name: name.to_string(),
        phone: phone.to_string(),
        gender: Gender::Female,
        age,
        marital_status: MaritalStatus::Married,
        blood_group,
        cast: "Sharma".to_string(),
        nationality: "Indian".to_string(),
        height: 162.0,
        weight: 58.0,
        skin_color: "Wheatish".to_string(),
        hair_color: "Black".to_string(),
        eye_color: "Brown".to_string(),
        donor_education: "Graduate".to_string(),
        medical_notes: None,
    }
}

fn demo_submission(doctor: &CallerIdentity) -> RequestSubmission {
    RequestSubmission {
        gender: Gender::Female,
        age_range: CriteriaRange { min: 25, max: 32 },
        marital_status: MaritalStatus::Married,
        cast: "Sharma".to_string(),
        blood_group: BloodGroup::OPositive,
        nationality: "Indian".to_string(),
        height_range: CriteriaRange {
            min: 150.0,
            max: 170.0,
        },
        weight_range: CriteriaRange {
            min: 45.0,
            max: 70.0,
        },
        skin_color: "Wheatish".to_string(),
        hair_color: "Black".to_string(),
        eye_color: "Brown".to_string(),
        donor_education: "Graduate".to_string(),
        doctor_id: doctor.user_id.clone(),
        required_by_date: Local::now().date_naive() + Duration::days(60),
    }
}
