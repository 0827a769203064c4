use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use clap::{Parser, Subcommand};
use dosewise_core::*;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "dosewise")]
#[command(about = "Medication schedule and reminder tracker", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Read configuration from this file instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Profile name or id (defaults to the configured profile)
    #[arg(long, global = true)]
    profile: Option<String>,

    /// Evaluate as if the current time were this RFC 3339 instant
    #[arg(long, global = true, value_parser = parse_instant)]
    now: Option<DateTime<Utc>>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a profile
    Init {
        #[arg(long)]
        name: Option<String>,

        /// IANA timezone, e.g. Europe/Berlin
        #[arg(long)]
        timezone: Option<String>,
    },

    /// Add a medication
    Add {
        name: String,

        /// Daily clock times, e.g. 08:00,20:00
        #[arg(long, value_delimiter = ',')]
        times: Vec<String>,

        /// Weekdays for a weekly schedule (0 = Monday .. 6 = Sunday)
        #[arg(long, value_delimiter = ',', requires = "times")]
        weekdays: Vec<u8>,

        /// Minutes between doses for an interval schedule
        #[arg(long, conflicts_with_all = ["times", "prn"])]
        interval: Option<u32>,

        /// First dose of an interval schedule (RFC 3339)
        #[arg(long, requires = "interval", value_parser = parse_instant)]
        anchor: Option<DateTime<Utc>>,

        /// As needed only
        #[arg(long, conflicts_with = "times")]
        prn: bool,

        /// Dose amount, e.g. 1 or 1/2
        #[arg(long)]
        dose: Option<String>,

        /// Dose unit (defaults to the form's unit)
        #[arg(long)]
        unit: Option<String>,

        /// Dosage form, e.g. tablet, inhaler, nasal_spray
        #[arg(long, default_value = "tablet", value_parser = parse_form)]
        form: DosageForm,

        /// First active date (YYYY-MM-DD)
        #[arg(long)]
        start: Option<NaiveDate>,

        /// Last active date (YYYY-MM-DD)
        #[arg(long)]
        end: Option<NaiveDate>,

        /// Grace period in minutes
        #[arg(long)]
        grace: Option<u32>,
    },

    /// Show every medication's next dose and status (default)
    Status {
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Mark the pending dose as taken
    Take {
        /// Medication name or id
        medication: String,

        /// Dose actually taken, if different
        #[arg(long)]
        dose: Option<String>,
    },

    /// Log an as-needed intake
    Prn {
        medication: String,

        #[arg(long)]
        dose: Option<String>,

        #[arg(long)]
        note: Option<String>,
    },

    /// Snooze the pending reminder
    Snooze {
        medication: String,

        #[arg(long)]
        minutes: Option<u32>,
    },

    /// Skip the pending dose
    Skip {
        medication: String,

        #[arg(long)]
        reason: Option<String>,
    },

    /// Remove a medication
    Remove { medication: String },

    /// Show recent log entries for a medication
    Log {
        medication: String,

        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Print reminders that are due now, honoring quiet hours
    Remind,

    /// List supported dosage forms
    Forms,
}

/// Shared state for one command invocation
struct App {
    config: Config,
    store: ProfileStore,
    service: MedicationService<FixedClock>,
    profile: String,
}

fn main() -> Result<()> {
    // Initialize logging
    dosewise_core::logging::init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    // Determine data directory
    let mut data = config.data.clone();
    if let Some(dir) = cli.data_dir {
        data.data_dir = dir;
    }

    tracing::debug!("Using store {:?}", data.store_path());

    let app = App {
        store: ProfileStore::new(data.store_path()),
        service: MedicationService::with_clock(FixedClock(cli.now.unwrap_or_else(Utc::now))),
        profile: cli
            .profile
            .unwrap_or_else(|| config.profile.name.clone()),
        config,
    };

    match cli.command {
        Some(Commands::Init { name, timezone }) => cmd_init(&app, name, timezone),
        Some(Commands::Add {
            name,
            times,
            weekdays,
            interval,
            anchor,
            prn,
            dose,
            unit,
            form,
            start,
            end,
            grace,
        }) => {
            let kind = if prn {
                ScheduleKind::AsNeeded
            } else if interval.is_some() {
                ScheduleKind::Interval
            } else if !weekdays.is_empty() {
                ScheduleKind::Weekly
            } else if !times.is_empty() {
                ScheduleKind::TimesPerDay
            } else {
                return Err(Error::Validation(
                    "Specify one of --times, --weekdays with --times, --interval or --prn".into(),
                ));
            };

            let unit = unit.unwrap_or_else(|| dosage_form_info(form).default_unit.to_string());
            let default_dose = dose
                .map(|amount| DoseQuantity::parse(&amount, unit.as_str()))
                .transpose()?
                .or_else(|| Some(DoseQuantity::whole(1, unit.as_str())));

            let command = AddMedicationCommand {
                times,
                weekdays,
                interval_minutes: interval,
                anchor,
                default_dose,
                form,
                start_date: start,
                end_date: end,
                ..AddMedicationCommand::new(name, kind)
            };
            cmd_add(&app, command, grace)
        }
        Some(Commands::Status { json }) => cmd_status(&app, json),
        Some(Commands::Take { medication, dose }) => cmd_take(&app, &medication, dose),
        Some(Commands::Prn {
            medication,
            dose,
            note,
        }) => cmd_prn(&app, &medication, dose, note),
        Some(Commands::Snooze {
            medication,
            minutes,
        }) => cmd_snooze(&app, &medication, minutes),
        Some(Commands::Skip { medication, reason }) => cmd_skip(&app, &medication, reason),
        Some(Commands::Remove { medication }) => cmd_remove(&app, &medication),
        Some(Commands::Log { medication, limit }) => cmd_log(&app, &medication, limit),
        Some(Commands::Remind) => cmd_remind(&app),
        Some(Commands::Forms) => {
            cmd_forms();
            Ok(())
        }
        None => {
            // Default to "status" command
            cmd_status(&app, false)
        }
    }
}

fn parse_instant(value: &str) -> std::result::Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("expected an RFC 3339 instant: {}", e))
}

fn parse_form(value: &str) -> std::result::Result<DosageForm, String> {
    DosageForm::from_name(value).ok_or_else(|| format!("unknown dosage form {:?}", value))
}

/// Load the store, run `f` on the selected profile and save the result
fn with_profile<T>(app: &App, f: impl FnOnce(&mut Profile) -> Result<T>) -> Result<T> {
    app.store.update(|document| {
        let profile = document.profile_mut(&app.profile).ok_or_else(|| {
            Error::ProfileNotFound(format!("{} (run `dosewise init` first)", app.profile))
        })?;
        f(profile)
    })
}

fn medication_id(profile: &Profile, query: &str) -> Result<String> {
    profile
        .find_medication(query)
        .map(|m| m.medication_id.clone())
        .ok_or_else(|| Error::MedicationNotFound(query.to_string()))
}

/// Unit used when a dose is given on the command line without one
fn dose_unit(medication: &Medication) -> String {
    medication
        .state
        .next_dose
        .as_ref()
        .or(medication.schedule.default_dose.as_ref())
        .map(|d| d.unit().to_string())
        .unwrap_or_else(|| dosage_form_info(medication.form).default_unit.to_string())
}

fn format_local(instant: DateTime<Utc>, tz: &Tz) -> String {
    instant.with_timezone(tz).format("%Y-%m-%d %H:%M %Z").to_string()
}

fn cmd_init(app: &App, name: Option<String>, timezone: Option<String>) -> Result<()> {
    let name = name.unwrap_or_else(|| app.profile.clone());
    let timezone = timezone.unwrap_or_else(|| app.config.profile.timezone.clone());

    app.store.update(|document| {
        if let Some(existing) = document.profile(&name) {
            println!(
                "Profile {} already exists ({})",
                existing.name, existing.profile_id
            );
            return Ok(());
        }

        let profile = Profile::create(name.as_str(), timezone.as_str(), app.config.policy.clone())?;
        println!("✓ Created profile {} ({})", profile.name, profile.timezone);
        println!("  Id: {}", profile.profile_id);
        document.add_profile(profile);
        Ok(())
    })
}

fn cmd_add(app: &App, mut command: AddMedicationCommand, grace: Option<u32>) -> Result<()> {
    with_profile(app, |profile| {
        if let Some(grace_minutes) = grace {
            command.policy = Some(ReminderPolicy {
                grace_minutes,
                ..profile.default_policy.clone()
            });
        }

        let tz = profile.tz()?;
        let medication = app.service.add_medication(profile, command)?;

        println!("✓ Added {}", medication.display_name);
        println!("  Id: {}", medication.medication_id);
        println!("  Schedule: {}", medication.schedule.describe());
        if let Some(next_due) = medication.state.next_due {
            println!("  Next dose: {}", format_local(next_due, &tz));
        }
        Ok(())
    })
}

fn cmd_status(app: &App, json: bool) -> Result<()> {
    with_profile(app, |profile| {
        app.service.recompute_all_states(profile)?;
        let tz = profile.tz()?;

        if json {
            let rows: Vec<serde_json::Value> = profile
                .medications
                .values()
                .map(|medication| {
                    let state = &medication.state;
                    let occurrence = state.occurrence();
                    serde_json::json!({
                        "medication_id": medication.medication_id,
                        "display_name": medication.display_name,
                        "status": state.status,
                        "next_due": state.next_due,
                        "next_dose": state.next_dose,
                        "slot_key": state.next_slot_key,
                        "snooze_until": state.snooze_until,
                        "effective_next_due": compute_effective_next_due(
                            occurrence.as_ref(),
                            state.snooze_until,
                            state.status,
                        ),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
            return Ok(());
        }

        if profile.medications.is_empty() {
            println!("No medications in profile {}.", profile.name);
            return Ok(());
        }

        println!("{} ({})", profile.name, profile.timezone);
        for medication in profile.medications.values() {
            let state = &medication.state;
            let detail = match (state.next_due, &state.next_dose) {
                (Some(next_due), Some(dose)) => {
                    format!("{} at {}", dose, format_local(next_due, &tz))
                }
                _ => medication.schedule.describe(),
            };
            println!(
                "  {:<20} {:<8} {}",
                medication.display_name, state.status, detail
            );
            if let (MedicationStatus::Snoozed, Some(until)) = (state.status, state.snooze_until) {
                println!("  {:<20} {:<8} until {}", "", "", format_local(until, &tz));
            }
        }
        Ok(())
    })
}

fn cmd_take(app: &App, query: &str, dose: Option<String>) -> Result<()> {
    with_profile(app, |profile| {
        let id = medication_id(profile, query)?;
        let dose_override = match (dose, profile.medication(&id)) {
            (Some(amount), Some(medication)) => {
                Some(DoseQuantity::parse(&amount, dose_unit(medication))?)
            }
            _ => None,
        };

        let record = app.service.take(
            profile,
            TakeCommand {
                medication_id: id.clone(),
                taken_at: None,
                dose_override,
            },
        )?;

        print_outcome(profile, &id, "Took", record.dose.as_ref())
    })
}

fn cmd_prn(app: &App, query: &str, dose: Option<String>, note: Option<String>) -> Result<()> {
    with_profile(app, |profile| {
        let id = medication_id(profile, query)?;
        let Some(medication) = profile.medication(&id) else {
            return Err(Error::MedicationNotFound(query.to_string()));
        };
        let dose = match dose {
            Some(amount) => DoseQuantity::parse(&amount, dose_unit(medication))?,
            None => medication
                .schedule
                .default_dose
                .clone()
                .unwrap_or_else(|| DoseQuantity::whole(1, dose_unit(medication))),
        };

        let record = app.service.prn_take(
            profile,
            PrnTakeCommand {
                medication_id: id.clone(),
                dose,
                taken_at: None,
                note,
            },
        )?;

        print_outcome(profile, &id, "Took as needed", record.dose.as_ref())
    })
}

fn cmd_snooze(app: &App, query: &str, minutes: Option<u32>) -> Result<()> {
    with_profile(app, |profile| {
        let id = medication_id(profile, query)?;
        let until = app.service.snooze(
            profile,
            SnoozeCommand {
                medication_id: id.clone(),
                minutes,
                until: None,
            },
        )?;

        let tz = profile.tz()?;
        let name = profile
            .medication(&id)
            .map(|m| m.display_name.as_str())
            .unwrap_or(query);
        println!("✓ Snoozed {} until {}", name, format_local(until, &tz));
        Ok(())
    })
}

fn cmd_skip(app: &App, query: &str, reason: Option<String>) -> Result<()> {
    with_profile(app, |profile| {
        let id = medication_id(profile, query)?;
        let record = app.service.skip(
            profile,
            SkipCommand {
                medication_id: id.clone(),
                reason,
            },
        )?;

        print_outcome(profile, &id, "Skipped", record.dose.as_ref())
    })
}

fn cmd_remove(app: &App, query: &str) -> Result<()> {
    with_profile(app, |profile| {
        let id = medication_id(profile, query)?;
        let removed = app
            .service
            .remove_medication(profile, &id)
            .ok_or_else(|| Error::MedicationNotFound(query.to_string()))?;
        println!("✓ Removed {}", removed.display_name);
        Ok(())
    })
}

fn cmd_log(app: &App, query: &str, limit: usize) -> Result<()> {
    let document = app.store.load()?;
    let profile = document
        .profile(&app.profile)
        .ok_or_else(|| Error::ProfileNotFound(app.profile.clone()))?;
    let id = medication_id(profile, query)?;
    let tz = profile.tz()?;

    let records = profile.logs_for_medication(&id, Some(limit));
    if records.is_empty() {
        println!("No log entries.");
        return Ok(());
    }

    for record in records {
        let dose = record
            .dose
            .as_ref()
            .map(|d| d.to_string())
            .unwrap_or_default();
        let slot = record.slot_key.as_deref().unwrap_or("-");
        println!(
            "  {}  {:<10} {:<12} {}",
            format_local(record.taken_at, &tz),
            record.action,
            dose,
            slot
        );
    }
    Ok(())
}

fn cmd_remind(app: &App) -> Result<()> {
    with_profile(app, |profile| {
        app.service.recompute_all_states(profile)?;
        let tz = profile.tz()?;
        let now = app.service.now();

        let mut reminders = Vec::new();
        for medication in profile.medications.values() {
            let state = &medication.state;
            if state.status != MedicationStatus::Due {
                continue;
            }
            if is_in_quiet_hours(now, &tz, &medication.policy) {
                println!("  {} is due (quiet hours, not notifying)", medication.display_name);
                continue;
            }

            let send = if state.notification_count == 0 {
                should_send_notification(&medication.policy, state, now)
            } else {
                should_repeat_notification(
                    &medication.policy,
                    state,
                    now,
                    state.notification_count,
                )
            };
            if send {
                reminders.push(medication.medication_id.clone());
            }
        }

        if reminders.is_empty() {
            println!("No reminders.");
            return Ok(());
        }

        for id in reminders {
            app.service.record_notification(profile, &id)?;
            if let Some(medication) = profile.medication(&id) {
                let dose = medication
                    .state
                    .next_dose
                    .as_ref()
                    .map(|d| d.to_string())
                    .unwrap_or_default();
                let scheduled = medication
                    .state
                    .next_due
                    .map(|at| format_local(at, &tz))
                    .unwrap_or_default();
                println!(
                    "🔔 Time to take {} of {} (scheduled {})",
                    dose, medication.display_name, scheduled
                );
            }
        }
        Ok(())
    })
}

fn cmd_forms() {
    for form in DosageForm::ALL {
        let info = dosage_form_info(form);
        println!(
            "  {:<12} {:<12} units: {}",
            info.id,
            info.display_name,
            info.compatible_units.join(", ")
        );
    }
}

fn print_outcome(
    profile: &Profile,
    id: &str,
    verb: &str,
    dose: Option<&DoseQuantity>,
) -> Result<()> {
    let tz = profile.tz()?;
    let Some(medication) = profile.medication(id) else {
        return Err(Error::MedicationNotFound(id.to_string()));
    };

    match dose {
        Some(dose) => println!("✓ {} {} of {}", verb, dose, medication.display_name),
        None => println!("✓ {} {}", verb, medication.display_name),
    }
    match medication.state.next_due {
        Some(next_due) => println!("  Next dose: {}", format_local(next_due, &tz)),
        None => println!("  No upcoming scheduled dose"),
    }
    Ok(())
}
