use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::{config::ConfigArgs, state::Theme};

/// Command line front end for the campus ride-sharing service.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    #[command(flatten)]
    pub args: ConfigArgs,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Sign in and remember the session.
    Login {
        #[arg(long)]
        username: String,
        #[arg(long, env = "CAMPUS_RIDES_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Create an account and sign in.
    Signup {
        #[arg(long)]
        username: String,
        #[arg(long)]
        fullname: String,
        #[arg(long)]
        email: String,
        #[arg(long, env = "CAMPUS_RIDES_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Forget the stored session.
    Logout,
    /// Show the signed-in user and unread counters.
    Whoami,
    /// Change the account password.
    Password {
        #[arg(long)]
        old: String,
        #[arg(long)]
        new: String,
    },
    /// Email verification by one-time code.
    Verify {
        #[command(subcommand)]
        command: VerifyCommand,
    },
    /// Browse and manage ride posts.
    Rides {
        #[command(subcommand)]
        command: RidesCommand,
    },
    /// Conversations and messages.
    Chat {
        #[command(subcommand)]
        command: ChatCommand,
    },
    /// Notification feed.
    Notifications {
        #[command(subcommand)]
        command: NotificationsCommand,
    },
    /// Look up places by name.
    Places { query: String },
    /// Driving distance and time between two places.
    Route {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
    },
    /// Other users' profiles, ratings and complaints.
    Profile {
        #[command(subcommand)]
        command: ProfileCommand,
    },
    /// Local preferences.
    Settings {
        #[command(subcommand)]
        command: SettingsCommand,
    },
    /// Upload a new profile picture.
    Upload { path: PathBuf },
    /// Print real-time events until interrupted.
    Watch,
}

#[derive(Subcommand, Debug)]
pub enum VerifyCommand {
    /// Mail a code to the address.
    Send { email: String },
    /// Confirm the code received by mail.
    Confirm { email: String, code: String },
}

#[derive(Subcommand, Debug)]
pub enum RidesCommand {
    /// Open rides from other users.
    List {
        /// Show only rides I posted.
        #[arg(long)]
        mine: bool,
    },
    Show { id: String },
    /// Post a ride. Places are resolved with the geocoder.
    Create {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        #[arg(long)]
        cost: String,
        #[arg(long, default_value = "1")]
        seats: String,
        /// RFC 3339 departure time.
        #[arg(long)]
        departure: String,
    },
    Accept { id: String },
    Cancel { id: String },
    /// Change the asking price of one of my rides.
    Fare { id: String, cost: String },
}

#[derive(Subcommand, Debug)]
pub enum ChatCommand {
    List,
    /// Print a conversation and mark it seen.
    Show { conversation: String },
    Send { conversation: String, text: String },
}

#[derive(Subcommand, Debug)]
pub enum NotificationsCommand {
    List,
    Read { id: String },
    ReadAll,
}

#[derive(Subcommand, Debug)]
pub enum ProfileCommand {
    Show { username: String },
    Search { query: String },
    Rate {
        user: String,
        ride: String,
        score: u8,
        #[arg(long)]
        comment: Option<String>,
    },
    Complain {
        user: String,
        description: String,
        #[arg(long)]
        ride: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum SettingsCommand {
    /// Show or set the colour theme.
    Theme { theme: Option<Theme> },
    /// Turn notification alerts on or off. Toggles when no value is given.
    Notifications { state: Option<Switch> },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Switch {
    On,
    Off,
}
