use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use track4health_core::app::{api_client, AppState};
use track4health_core::classify::{self, AgeUnit};
use track4health_core::forms::{self, AttendeeInput, AwarenessDraft, ChildInput, ScreeningDraft};
use track4health_core::location::{LocationSource, LocationTracker};
use track4health_core::sync::{self, ApiClient};
use track4health_core::*;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "t4h")]
#[command(about = "Track4Health field data for community health workers", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Read configuration from this file instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Treat the network as unavailable
    #[arg(long, global = true)]
    offline: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in (falls back to cached users when offline)
    Login {
        username: String,

        /// Password; prompted for when omitted
        #[arg(long)]
        password: Option<String>,
    },

    /// Sign out
    Logout,

    /// Show the signed-in user
    Whoami {
        #[arg(long)]
        json: bool,
    },

    /// Awareness sessions and their attendees
    #[command(subcommand)]
    Awareness(AwarenessCommand),

    /// Child screening sessions and screened children
    #[command(subcommand)]
    Screening(ScreeningCommand),

    /// Classify a MUAC measurement
    Classify {
        /// Mid-upper arm circumference in centimeters
        #[arg(long)]
        muac: f64,
    },

    /// Convert between date of birth and age
    Age {
        /// Date of birth (YYYY-MM-DD)
        #[arg(long, conflicts_with = "age", required_unless_present = "age")]
        dob: Option<String>,

        /// Age to turn into an approximate date of birth
        #[arg(long)]
        age: Option<u32>,

        #[arg(long, value_enum, default_value_t = UnitArg::Years)]
        unit: UnitArg,
    },

    /// Dashboard totals
    Stats {
        #[command(flatten)]
        filter: FilterArgs,

        #[arg(long)]
        json: bool,
    },

    /// Remote user administration
    #[command(subcommand)]
    Users(UsersCommand),

    /// Report the current position
    #[command(subcommand)]
    Location(LocationCommand),

    /// GPS-tagged photos
    #[command(subcommand)]
    Photo(PhotoCommand),

    /// Exchange records with the server
    #[command(subcommand)]
    Sync(SyncCommand),

    /// Check whether the server is reachable
    Probe,
}

#[derive(Subcommand)]
enum AwarenessCommand {
    /// Submit a session with its attendees from a JSON draft
    Submit { file: PathBuf },
    List {
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(long)]
        json: bool,
    },
    Show {
        id: Uuid,
        #[arg(long)]
        json: bool,
    },
    /// Replace session details from a JSON file
    Update { id: Uuid, file: PathBuf },
    Delete { id: Uuid },
    /// Add an attendee from a JSON file
    AddAttendee { session_id: Uuid, file: PathBuf },
    /// Replace an attendee's fields from a JSON file
    UpdateAttendee {
        session_id: Uuid,
        attendee_id: Uuid,
        file: PathBuf,
    },
    RemoveAttendee { session_id: Uuid, attendee_id: Uuid },
}

#[derive(Subcommand)]
enum ScreeningCommand {
    /// Submit a screening with its children from a JSON draft
    Submit { file: PathBuf },
    List {
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(long)]
        json: bool,
    },
    Show {
        id: Uuid,
        #[arg(long)]
        json: bool,
    },
    /// Replace session details from a JSON file
    Update { id: Uuid, file: PathBuf },
    Delete { id: Uuid },
    /// Add a child from a JSON file
    AddChild { session_id: Uuid, file: PathBuf },
    /// Replace a child's fields from a JSON file; status is re-derived from MUAC
    UpdateChild {
        session_id: Uuid,
        child_id: Uuid,
        file: PathBuf,
    },
    RemoveChild { session_id: Uuid, child_id: Uuid },
}

#[derive(Subcommand)]
enum UsersCommand {
    List {
        #[arg(long)]
        json: bool,
    },
    Add {
        username: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        name: String,
        /// developer, master, fmt or socialMobilizer
        #[arg(long)]
        role: Role,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        designation: Option<String>,
        #[arg(long)]
        district: Option<String>,
    },
    Delete { id: String },
}

#[derive(Subcommand)]
enum LocationCommand {
    Set {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
    },
    /// Read "lat,lon" fixes from stdin and report the last one
    Track,
}

#[derive(Subcommand)]
enum PhotoCommand {
    Add {
        /// File path or data URL of the image
        #[arg(long)]
        image: String,
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
        #[arg(long)]
        address: Option<String>,
    },
    List {
        #[arg(long)]
        json: bool,
    },
    Delete { id: Uuid },
}

#[derive(Subcommand)]
enum SyncCommand {
    /// Send every local record to the server
    Push,
    /// Merge the server's copies into local records
    Pull,
}

#[derive(Args, Default)]
struct FilterArgs {
    /// Earliest session date (YYYY-MM-DD)
    #[arg(long)]
    from: Option<NaiveDate>,
    /// Latest session date (YYYY-MM-DD)
    #[arg(long)]
    to: Option<NaiveDate>,
    #[arg(long)]
    village: Option<String>,
    #[arg(long)]
    uc: Option<String>,
}

impl From<FilterArgs> for RecordFilter {
    fn from(args: FilterArgs) -> Self {
        RecordFilter {
            from: args.from,
            to: args.to,
            village: args.village,
            uc: args.uc,
            created_by: None,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum UnitArg {
    Years,
    Months,
}

impl From<UnitArg> for AgeUnit {
    fn from(unit: UnitArg) -> Self {
        match unit {
            UnitArg::Years => AgeUnit::Years,
            UnitArg::Months => AgeUnit::Months,
        }
    }
}

type State = AppState<FileStore>;
type Api = ApiClient<HttpTransport, StaticConnectivity>;

fn main() {
    // Initialize logging
    track4health_core::logging::init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = match cli.config {
        Some(ref path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(dir) = cli.data_dir {
        config.data.data_dir = dir;
    }

    let api = api_client(&config, cli.offline)?;
    let mut state = AppState::open(config);

    match cli.command {
        Commands::Login { username, password } => cmd_login(&mut state, &api, &username, password),
        Commands::Logout => {
            state.logout()?;
            println!("Logged out");
            Ok(())
        }
        Commands::Whoami { json } => cmd_whoami(&state, json),
        Commands::Awareness(command) => cmd_awareness(&mut state, &api, command),
        Commands::Screening(command) => cmd_screening(&mut state, &api, command),
        Commands::Classify { muac } => cmd_classify(&state.config, muac),
        Commands::Age { dob, age, unit } => cmd_age(dob, age, unit.into()),
        Commands::Stats { filter, json } => cmd_stats(&state, filter, json),
        Commands::Users(command) => cmd_users(&state, &api, command),
        Commands::Location(LocationCommand::Set { lat, lon }) => {
            report_location(&mut state, &api, Location::new(lat, lon)?)
        }
        Commands::Location(LocationCommand::Track) => cmd_track(&mut state, &api),
        Commands::Photo(command) => cmd_photo(&mut state, command),
        Commands::Sync(command) => cmd_sync(&mut state, &api, command),
        Commands::Probe => {
            if api.probe() {
                println!("online");
            } else {
                println!("offline");
            }
            Ok(())
        }
    }
}

fn cmd_login(state: &mut State, api: &Api, username: &str, password: Option<String>) -> Result<()> {
    let password = match password {
        Some(p) => p,
        None => prompt("Password: ")?,
    };

    match state.login(api, username, &password)? {
        Some(user) => {
            println!("✓ Logged in as {} ({})", user.name, user.role);
            if !user.is_online {
                println!("  Offline: signed in from the cached account");
            }
            Ok(())
        }
        None => Err(Error::Permission("Invalid username or password".into())),
    }
}

fn cmd_whoami(state: &State, json: bool) -> Result<()> {
    match state.auth.current_user() {
        Some(user) if json => print_json(user),
        Some(user) => {
            println!("{} ({})", user.username, user.role);
            println!("  Name: {}", user.name);
            if let Some(location) = user.location {
                println!("  Location: {:.5}, {:.5}", location.latitude, location.longitude);
            }
            Ok(())
        }
        None => {
            println!("Not logged in");
            Ok(())
        }
    }
}

fn cmd_awareness(state: &mut State, api: &Api, command: AwarenessCommand) -> Result<()> {
    let today = classify::today();
    match command {
        AwarenessCommand::Submit { file } => {
            let creator = state.auth.require_user()?.username.clone();
            let mut draft: AwarenessDraft = read_json(&file)?;
            draft.details.created_by = creator;
            let count = draft.attendees.len();
            let id = forms::submit_awareness(&mut state.records, draft, today)?;
            println!("✓ Saved awareness session {} ({} attendees)", id, count);
            Ok(())
        }
        AwarenessCommand::List { filter, json } => {
            state.auth.require_user()?;
            let filter = state.visible_filter(filter.into());
            let sessions = filter.apply(state.records.awareness_sessions());
            if json {
                return print_json(&sessions);
            }
            if sessions.is_empty() {
                println!("No awareness sessions");
            }
            for session in sessions {
                print_summary(session.id, &session.details, session.attendees.len(), "attendees");
            }
            Ok(())
        }
        AwarenessCommand::Show { id, json } => {
            state.auth.require_user()?;
            let session = state
                .records
                .awareness(id)
                .filter(|s| visible(state, &s.details))
                .ok_or_else(|| Error::NotFound(format!("awareness session {}", id)))?;
            if json {
                return print_json(session);
            }
            print_details(session.id, &session.details);
            for attendee in &session.attendees {
                println!(
                    "  - {} / {}, {} yrs, {:?}, children under five: {} [{}]",
                    attendee.name,
                    attendee.father_husband_name,
                    attendee.age,
                    attendee.gender,
                    attendee.children_under_five,
                    attendee.id
                );
            }
            Ok(())
        }
        AwarenessCommand::Update { id, file } => {
            let user = state.auth.require_user()?.clone();
            ensure_visible(state, SessionKind::Awareness, id)?;
            let mut details: SessionDetails = read_json(&file)?;
            details.created_by = owner_of(state, SessionKind::Awareness, id, &user);
            let updated =
                forms::update_session_checked(&mut state.records, SessionKind::Awareness, id, &details)?;
            report(updated, "Updated awareness session", id);
            Ok(())
        }
        AwarenessCommand::Delete { id } => {
            state
                .auth
                .require_role(Role::can_delete_records, "delete records")?;
            let deleted = state.records.delete_session(SessionKind::Awareness, id)?;
            if deleted {
                remote_best_effort(api, "delete awareness session", |api| {
                    api.delete_awareness_session(id)
                });
            }
            report(deleted, "Deleted awareness session", id);
            Ok(())
        }
        AwarenessCommand::AddAttendee { session_id, file } => {
            state.auth.require_user()?;
            ensure_visible(state, SessionKind::Awareness, session_id)?;
            let input: AttendeeInput = read_json(&file)?;
            let attendee = forms::add_attendee_checked(&mut state.records, session_id, input, today)?;
            println!("✓ Added attendee {} [{}]", attendee.name, attendee.id);
            Ok(())
        }
        AwarenessCommand::UpdateAttendee {
            session_id,
            attendee_id,
            file,
        } => {
            state.auth.require_user()?;
            ensure_visible(state, SessionKind::Awareness, session_id)?;
            let input: AttendeeInput = read_json(&file)?;
            let attendee = forms::update_attendee_checked(
                &mut state.records,
                session_id,
                attendee_id,
                input,
                today,
            )?;
            println!("✓ Updated attendee {} [{}]", attendee.name, attendee.id);
            Ok(())
        }
        AwarenessCommand::RemoveAttendee {
            session_id,
            attendee_id,
        } => {
            state
                .auth
                .require_role(Role::can_delete_records, "delete records")?;
            let removed =
                state
                    .records
                    .delete_entry(SessionKind::Awareness, session_id, attendee_id)?;
            report(removed, "Removed attendee", attendee_id);
            Ok(())
        }
    }
}

fn cmd_screening(state: &mut State, api: &Api, command: ScreeningCommand) -> Result<()> {
    let today = classify::today();
    let thresholds = state.config.classification;
    match command {
        ScreeningCommand::Submit { file } => {
            let creator = state.auth.require_user()?.username.clone();
            let mut draft: ScreeningDraft = read_json(&file)?;
            draft.details.created_by = creator;
            let count = draft.children.len();
            let id = forms::submit_screening(&mut state.records, draft, &thresholds, today)?;
            println!("✓ Saved child screening {} ({} children)", id, count);
            Ok(())
        }
        ScreeningCommand::List { filter, json } => {
            state.auth.require_user()?;
            let filter = state.visible_filter(filter.into());
            let screenings = filter.apply(state.records.child_screenings());
            if json {
                return print_json(&screenings);
            }
            if screenings.is_empty() {
                println!("No child screenings");
            }
            for screening in screenings {
                print_summary(
                    screening.id,
                    &screening.details,
                    screening.children.len(),
                    "children",
                );
            }
            Ok(())
        }
        ScreeningCommand::Show { id, json } => {
            state.auth.require_user()?;
            let screening = state
                .records
                .screening(id)
                .filter(|s| visible(state, &s.details))
                .ok_or_else(|| Error::NotFound(format!("child screening {}", id)))?;
            if json {
                return print_json(screening);
            }
            print_details(screening.id, &screening.details);
            for child in &screening.children {
                println!(
                    "  - {} / {}, {} months, MUAC {:.1} cm: {} [{}]",
                    child.name,
                    child.father_name,
                    child.age_months,
                    child.muac_cm,
                    child.nutrition_status,
                    child.id
                );
            }
            Ok(())
        }
        ScreeningCommand::Update { id, file } => {
            let user = state.auth.require_user()?.clone();
            ensure_visible(state, SessionKind::Screening, id)?;
            let mut details: SessionDetails = read_json(&file)?;
            details.created_by = owner_of(state, SessionKind::Screening, id, &user);
            let updated =
                forms::update_session_checked(&mut state.records, SessionKind::Screening, id, &details)?;
            report(updated, "Updated child screening", id);
            Ok(())
        }
        ScreeningCommand::Delete { id } => {
            state
                .auth
                .require_role(Role::can_delete_records, "delete records")?;
            let deleted = state.records.delete_session(SessionKind::Screening, id)?;
            if deleted {
                remote_best_effort(api, "delete child screening", |api| api.delete_screening(id));
            }
            report(deleted, "Deleted child screening", id);
            Ok(())
        }
        ScreeningCommand::AddChild { session_id, file } => {
            state.auth.require_user()?;
            ensure_visible(state, SessionKind::Screening, session_id)?;
            let input: ChildInput = read_json(&file)?;
            let child =
                forms::add_child_checked(&mut state.records, session_id, input, &thresholds, today)?;
            println!(
                "✓ Added child {} ({}) [{}]",
                child.name, child.nutrition_status, child.id
            );
            Ok(())
        }
        ScreeningCommand::UpdateChild {
            session_id,
            child_id,
            file,
        } => {
            state.auth.require_user()?;
            ensure_visible(state, SessionKind::Screening, session_id)?;
            let input: ChildInput = read_json(&file)?;
            let child = forms::update_child_checked(
                &mut state.records,
                session_id,
                child_id,
                input,
                &thresholds,
                today,
            )?;
            println!(
                "✓ Updated child {} ({}) [{}]",
                child.name, child.nutrition_status, child.id
            );
            Ok(())
        }
        ScreeningCommand::RemoveChild {
            session_id,
            child_id,
        } => {
            state
                .auth
                .require_role(Role::can_delete_records, "delete records")?;
            let removed = state
                .records
                .delete_entry(SessionKind::Screening, session_id, child_id)?;
            report(removed, "Removed child", child_id);
            Ok(())
        }
    }
}

fn cmd_classify(config: &Config, muac: f64) -> Result<()> {
    if !muac.is_finite() || muac <= 0.0 || muac > forms::MAX_MUAC_CM {
        return Err(Error::Validation(format!(
            "MUAC must be between 0 and {} cm",
            forms::MAX_MUAC_CM
        )));
    }
    println!("{}", config.classification.classify(muac));
    Ok(())
}

fn cmd_age(dob: Option<String>, age: Option<u32>, unit: AgeUnit) -> Result<()> {
    match (dob, age) {
        (Some(dob), _) => {
            let dob = classify::parse_dob(&dob)?;
            println!("{}", classify::age_from_dob_now(dob, unit));
        }
        (None, Some(age)) => {
            println!("{}", classify::dob_from_age_now(age, unit).format("%Y-%m-%d"));
        }
        (None, None) => {
            return Err(Error::Validation("Pass --dob or --age".into()));
        }
    }
    Ok(())
}

fn cmd_stats(state: &State, filter: FilterArgs, json: bool) -> Result<()> {
    state.auth.require_user()?;
    let filter = state.visible_filter(filter.into());
    let stats = DashboardStats::compute(&state.records, &filter);
    if json {
        return print_json(&stats);
    }

    println!("Awareness sessions:   {}", stats.awareness_sessions);
    println!("  Attendees:          {}", stats.attendees);
    println!("  Children under 5:   {}", stats.children_under_five_reached);
    println!("  Vaccine due:        {}", stats.vaccine_due_attendees);
    println!("Child screenings:     {}", stats.screening_sessions);
    println!("  Children screened:  {}", stats.children_screened);
    println!(
        "  SAM / MAM / Normal: {} / {} / {}",
        stats.sam, stats.mam, stats.normal
    );
    println!("  Vaccine due:        {}", stats.vaccine_due_children);
    for (uc, count) in &stats.sessions_by_uc {
        println!("UC {}: {} sessions", uc, count);
    }
    Ok(())
}

fn cmd_users(state: &State, api: &Api, command: UsersCommand) -> Result<()> {
    state
        .auth
        .require_role(Role::can_manage_users, "manage users")?;
    match command {
        UsersCommand::List { json } => {
            let users = api.get_users()?;
            if json {
                return print_json(&users);
            }
            for user in users {
                let status = if user.is_online { "online" } else { "offline" };
                println!("{}  {} ({}) {} [{}]", user.id, user.username, user.role, user.name, status);
            }
            Ok(())
        }
        UsersCommand::Add {
            username,
            password,
            name,
            role,
            email,
            phone,
            designation,
            district,
        } => {
            let id = api.add_user(&NewUser {
                username,
                password,
                name,
                role,
                email,
                phone,
                designation,
                district,
            })?;
            println!("✓ Created user {}", id);
            Ok(())
        }
        UsersCommand::Delete { id } => {
            api.delete_user(&id)?;
            println!("✓ Deleted user {}", id);
            Ok(())
        }
    }
}

fn report_location(state: &mut State, api: &Api, location: Location) -> Result<()> {
    match state.update_location(api, location) {
        Ok(_) => println!("✓ Location reported"),
        Err(Error::Offline) => println!("Location saved locally; server not reachable"),
        Err(e) => return Err(e),
    }
    Ok(())
}

/// Re-reports the last position the tracker applied, starting from the stored one
struct LastKnown(Arc<Mutex<Option<Location>>>);

impl LocationSource for LastKnown {
    fn current_fix(&mut self) -> Option<Location> {
        self.0.lock().ok().and_then(|slot| *slot)
    }
}

fn cmd_track(state: &mut State, api: &Api) -> Result<()> {
    let last = Arc::new(Mutex::new(state.auth.require_user()?.location));
    let interval = Duration::from_secs(state.config.location.poll_interval_secs);
    let applied = Arc::clone(&last);
    let handle = LocationTracker::start_with(LastKnown(last), interval, move |fix| {
        tracing::debug!(
            "{:?} fix: {:.5}, {:.5}",
            fix.origin,
            fix.location.latitude,
            fix.location.longitude
        );
        if let Ok(mut slot) = applied.lock() {
            *slot = Some(fix.location);
        }
    });

    let watch = handle.watch_sender();
    for line in io::stdin().lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        watch.push(parse_fix(&line)?);
    }

    match handle.stop() {
        Some(fix) => report_location(state, api, fix.location),
        None => {
            println!("No position received");
            Ok(())
        }
    }
}

fn parse_fix(line: &str) -> Result<Location> {
    let parts: Vec<&str> = line
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .collect();
    let coordinate = |raw: &str| {
        raw.parse::<f64>()
            .map_err(|_| Error::Validation(format!("Not a coordinate: '{}'", raw)))
    };
    match parts.as_slice() {
        [lat, lon] => Location::new(coordinate(lat)?, coordinate(lon)?),
        _ => Err(Error::Validation(format!(
            "Expected 'lat,lon', got '{}'",
            line.trim()
        ))),
    }
}

fn cmd_photo(state: &mut State, command: PhotoCommand) -> Result<()> {
    match command {
        PhotoCommand::Add {
            image,
            lat,
            lon,
            address,
        } => {
            let creator = state.auth.require_user()?.username.clone();
            let photo = GpsPhoto {
                id: Uuid::new_v4(),
                captured_at: Utc::now(),
                location: Location::new(lat, lon)?,
                address,
                image,
                created_by: creator,
            };
            let id = photo.id;
            state.records.add_photo(photo)?;
            println!("✓ Saved photo {}", id);
            Ok(())
        }
        PhotoCommand::List { json } => {
            let user = state.auth.require_user()?;
            let photos: Vec<&GpsPhoto> = state
                .records
                .photos()
                .iter()
                .filter(|p| {
                    user.role.can_view_all_records()
                        || p.created_by.eq_ignore_ascii_case(&user.username)
                })
                .collect();
            if json {
                return print_json(&photos);
            }
            if photos.is_empty() {
                println!("No photos");
            }
            for photo in photos {
                println!(
                    "{}  {}  {:.5}, {:.5}  {}",
                    photo.id,
                    photo.captured_at.format("%Y-%m-%d %H:%M"),
                    photo.location.latitude,
                    photo.location.longitude,
                    photo.address.as_deref().unwrap_or("")
                );
            }
            Ok(())
        }
        PhotoCommand::Delete { id } => {
            state
                .auth
                .require_role(Role::can_delete_records, "delete records")?;
            let deleted = state.records.delete_photo(id)?;
            report(deleted, "Deleted photo", id);
            Ok(())
        }
    }
}

fn cmd_sync(state: &mut State, api: &Api, command: SyncCommand) -> Result<()> {
    let user_id = state.auth.require_user()?.id.clone();
    match command {
        SyncCommand::Push => {
            sync::push_all(api, &state.records, Some(&user_id))?;
            println!(
                "✓ Pushed {} awareness sessions and {} screenings",
                state.records.awareness_sessions().len(),
                state.records.child_screenings().len()
            );
        }
        SyncCommand::Pull => {
            let (awareness, screenings) = sync::pull_all(api, &mut state.records)?;
            println!(
                "✓ Pulled {} awareness sessions and {} screenings",
                awareness, screenings
            );
        }
    }
    Ok(())
}

/// Keep the recorded creator when editing someone else's session
fn owner_of(state: &State, kind: SessionKind, id: Uuid, user: &User) -> String {
    state
        .records
        .session_details(kind, id)
        .map(|d| d.created_by.clone())
        .filter(|creator| !creator.is_empty())
        .unwrap_or_else(|| user.username.clone())
}

fn visible(state: &State, details: &SessionDetails) -> bool {
    state.visible_filter(RecordFilter::default()).matches(details)
}

/// Treat sessions the signed-in user may not see as missing
fn ensure_visible(state: &State, kind: SessionKind, id: Uuid) -> Result<()> {
    match state.records.session_details(kind, id) {
        Some(details) if !visible(state, details) => {
            Err(Error::NotFound(format!("{} {}", kind, id)))
        }
        _ => Ok(()),
    }
}

fn remote_best_effort<F>(api: &Api, action: &str, call: F)
where
    F: FnOnce(&Api) -> Result<()>,
{
    if !api.is_online() {
        return;
    }
    if let Err(e) = call(api) {
        tracing::warn!("Could not {} on the server: {}", action, e);
        eprintln!("Warning: could not {} on the server: {}", action, e);
    }
}

fn report(changed: bool, action: &str, id: Uuid) {
    if changed {
        println!("✓ {} {}", action, id);
    } else {
        println!("Nothing to do: {} not found", id);
    }
}

fn print_summary(id: Uuid, details: &SessionDetails, count: usize, noun: &str) {
    println!(
        "{}  {}  {} ({})  #{}  {} {}",
        id, details.date, details.village_name, details.uc_name, details.session_number, count, noun
    );
}

fn print_details(id: Uuid, details: &SessionDetails) {
    println!("{}", id);
    println!("  Date:         {}", details.date);
    println!("  Village / UC: {} / {}", details.village_name, details.uc_name);
    println!(
        "  Conducted by: {} ({})",
        details.conducted_by, details.designation
    );
    println!("  Session #:    {}", details.session_number);
    if let Some(location) = details.location {
        println!(
            "  Location:     {:.5}, {:.5}",
            location.latitude, location.longitude
        );
    }
    println!("  Created by:   {}", details.created_by);
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim_end_matches(['\r', '\n']).to_string())
}
