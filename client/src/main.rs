use std::{sync::Arc, time::Duration};

use anyhow::{bail, Context as _, Result};
use clap::Parser;
use ride_api::{ComplaintRequest, Location, ProfileUpdate, RatingRequest, ServerEvent};
use tokio::sync::{broadcast::error::RecvError, watch};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use campus_rides::{
    chat::{ChatThread, ConversationList},
    cli::{
        ChatCommand, Cli, Command, NotificationsCommand, ProfileCommand, RidesCommand,
        SettingsCommand, Switch, VerifyCommand,
    },
    config::Config,
    forms::{ChangePasswordForm, LoginForm, SignupForm},
    geo,
    notifications::NotificationFeed,
    profile::{self, ProfileView},
    rides::{RideBoard, RideDetail, RideForm},
    session::SessionStatus,
    upload::UploadProgress,
    view::Loadable,
    Context,
};

const RENEW_EVERY: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = Config::load(&cli.args)?;
    let level = if cfg.logging_enabled { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();

    let ctx = Context::new(cfg).await?;
    let status = match cli.command {
        Command::Watch => ctx.start().await,
        _ => ctx.resume().await,
    };
    info!(?status, "session");
    run(&ctx, cli.command).await
}

async fn run(ctx: &Arc<Context>, command: Command) -> Result<()> {
    match command {
        Command::Login { username, password } => {
            let user = ctx
                .session
                .login(&LoginForm { username, password })
                .await?;
            println!("signed in as {} ({})", user.username, user.fullname);
        }
        Command::Signup {
            username,
            fullname,
            email,
            password,
        } => {
            let user = ctx
                .session
                .signup(&SignupForm {
                    username,
                    fullname,
                    email,
                    confirm_password: password.clone(),
                    password,
                })
                .await?;
            println!("account created for {}", user.username);
        }
        Command::Logout => {
            ctx.logout().await?;
            println!("signed out");
        }
        Command::Whoami => {
            let me = ctx.me()?;
            let counters = ctx.ui.counters();
            println!("{} ({})", me.username, me.fullname);
            println!(
                "unread: {} messages, {} notifications",
                counters.unread_messages, counters.unread_notifications
            );
            println!(
                "theme: {}, alerts: {}",
                ctx.ui.theme(),
                on_off(ctx.ui.notifications_enabled())
            );
        }
        Command::Password { old, new } => {
            ctx.session
                .change_password(&ChangePasswordForm {
                    old_password: old,
                    confirm_password: new.clone(),
                    new_password: new,
                })
                .await?;
            println!("password changed");
        }
        Command::Verify { command } => match command {
            VerifyCommand::Send { email } => {
                ctx.session.send_otp(&email).await?;
                println!("code sent to {email}");
            }
            VerifyCommand::Confirm { email, code } => {
                ctx.session.verify_otp(&email, &code).await?;
                println!("{email} verified");
            }
        },
        Command::Rides { command } => rides(ctx, command).await?,
        Command::Chat { command } => chat(ctx, command).await?,
        Command::Notifications { command } => notifications(ctx, command).await?,
        Command::Places { query } => {
            let search = ctx.place_search();
            search.input(&query).await;
            for place in ready(search.results())? {
                print_place(&place);
            }
        }
        Command::Route { from, to } => {
            let from = resolve_place(ctx, &from).await?;
            let to = resolve_place(ctx, &to).await?;
            match geo::route(ctx.api.http(), &ctx.config.routing_url, &from, &to).await? {
                Some(r) => println!("{:.1} km, about {:.0} min", r.distance_km(), r.duration_min()),
                None => println!("no driving route found"),
            }
        }
        Command::Profile { command } => profile(ctx, command).await?,
        Command::Settings { command } => match command {
            SettingsCommand::Theme { theme: Some(theme) } => {
                ctx.ui.set_theme(theme).await?;
                println!("theme: {theme}");
            }
            SettingsCommand::Theme { theme: None } => println!("theme: {}", ctx.ui.theme()),
            SettingsCommand::Notifications { state } => {
                let enabled = match state {
                    Some(s) => {
                        let enabled = s == Switch::On;
                        ctx.ui.set_notifications_enabled(enabled).await?;
                        enabled
                    }
                    None => ctx.ui.toggle_notifications().await?,
                };
                println!("alerts: {}", on_off(enabled));
            }
        },
        Command::Upload { path } => {
            ctx.me()?;
            let (tx, mut rx) = watch::channel(UploadProgress::default());
            let reporter = tokio::spawn(async move {
                while rx.changed().await.is_ok() {
                    let p = *rx.borrow();
                    eprint!("\ruploading {:>3}%", p.percent());
                }
                eprintln!();
            });
            let url = ctx.uploader().upload_file(&path, tx).await;
            let _ = reporter.await;
            let url = url?;
            profile::update_me(
                &ctx.session,
                &ProfileUpdate {
                    profile_picture: Some(url.clone()),
                    ..Default::default()
                },
            )
            .await?;
            println!("profile picture: {url}");
        }
        Command::Watch => watch_events(ctx).await?,
    }
    Ok(())
}

async fn rides(ctx: &Context, command: RidesCommand) -> Result<()> {
    let me = ctx.me()?;
    match command {
        RidesCommand::List { mine } => {
            let board = RideBoard::new();
            board.reload(&ctx.api).await;
            ready(board.snapshot())?;
            let list = if mine {
                board.posted_by(&me.id)
            } else {
                board.open_for(&me.id)
            };
            if list.is_empty() {
                println!("no rides");
            }
            for r in list {
                println!(
                    "{:<26} {} -> {}  {:.2}  seats {}  {}",
                    r.id, r.pickup.name, r.dropoff.name, r.cost, r.seats, r.departure_time
                );
            }
        }
        RidesCommand::Show { id } => {
            let detail = RideDetail::new(id);
            detail.load(&ctx.api).await;
            let r = ready(detail.snapshot())?;
            println!("{} posted by {}", r.id, r.poster.username);
            println!("from {}", r.pickup.name);
            println!("to   {}", r.dropoff.name);
            println!("cost {:.2}, seats {}, leaves {}", r.cost, r.seats, r.departure_time);
            println!("accepted: {}", if r.accepted { "yes" } else { "no" });
        }
        RidesCommand::Create {
            from,
            to,
            cost,
            seats,
            departure,
        } => {
            let form = RideForm {
                pickup: Some(resolve_place(ctx, &from).await?),
                dropoff: Some(resolve_place(ctx, &to).await?),
                cost,
                seats,
                departure,
            };
            let post = form.submit(&ctx.api).await?;
            println!("ride {} posted", post.id);
        }
        RidesCommand::Accept { id } => {
            let detail = RideDetail::new(id);
            detail.load(&ctx.api).await;
            ready(detail.snapshot())?;
            let ride = detail.accept(&ctx.api, &me.id).await?;
            println!("ride {} accepted", ride.id);
        }
        RidesCommand::Cancel { id } => {
            let ride = RideDetail::new(id).cancel(&ctx.api).await?;
            println!("ride {} cancelled", ride.id);
        }
        RidesCommand::Fare { id, cost } => {
            let ride = RideDetail::new(id).update_fare(&ctx.api, &cost).await?;
            println!("ride {} now costs {:.2}", ride.id, ride.cost);
        }
    }
    Ok(())
}

async fn chat(ctx: &Context, command: ChatCommand) -> Result<()> {
    let me = ctx.me()?;
    match command {
        ChatCommand::List => {
            let inbox = ConversationList::new();
            inbox.reload(&ctx.api).await;
            for c in ready(inbox.snapshot())? {
                let peer = c.peer(&me.id).map(|u| u.username.as_str()).unwrap_or("?");
                let last = c.last_message.as_ref().map(|m| m.text.as_str()).unwrap_or("");
                let marker = if c.unread_count > 0 { "*" } else { " " };
                println!("{marker} {:<26} {:<16} {}", c.id, peer, last);
            }
        }
        ChatCommand::Show { conversation } => {
            let inbox = ConversationList::new();
            let thread = ChatThread::new(conversation);
            tokio::join!(inbox.reload(&ctx.api), thread.open(&ctx.api, &ctx.ui));
            let shown = show_thread(ctx, &thread, &inbox, &me.id).await;
            thread.close(&ctx.ui);
            shown?;
        }
        ChatCommand::Send { conversation, text } => {
            let thread = ChatThread::new(conversation);
            let msg = thread.send(&ctx.api, &me.id, &text).await?;
            println!("sent {}", msg.id);
        }
    }
    Ok(())
}

async fn show_thread(
    ctx: &Context,
    thread: &ChatThread,
    inbox: &ConversationList,
    me: &str,
) -> Result<()> {
    ready(thread.status())?;
    for m in thread.messages() {
        let who: &str = if m.sender_id == me { "me" } else { &m.sender_id };
        println!("[{}] {}: {}", m.created_at, who, m.text);
    }
    thread.mark_read(&ctx.api, &ctx.ui, inbox, me).await?;
    Ok(())
}

async fn notifications(ctx: &Context, command: NotificationsCommand) -> Result<()> {
    ctx.me()?;
    let feed = NotificationFeed::new();
    match command {
        NotificationsCommand::List => {
            feed.reload(&ctx.api).await;
            for n in ready(feed.snapshot())? {
                let marker = if n.read { " " } else { "*" };
                println!("{marker} {:<26} {}  {}", n.id, n.created_at, n.message);
            }
        }
        NotificationsCommand::Read { id } => {
            feed.read(&ctx.api, &ctx.ui, &id).await?;
            println!("marked {id} read");
        }
        NotificationsCommand::ReadAll => {
            feed.read_all(&ctx.api, &ctx.ui).await?;
            println!("all notifications read");
        }
    }
    Ok(())
}

async fn profile(ctx: &Context, command: ProfileCommand) -> Result<()> {
    ctx.me()?;
    match command {
        ProfileCommand::Show { username } => {
            let view = ProfileView::new(username);
            view.load(&ctx.api).await;
            let u = ready(view.snapshot())?;
            println!("{} ({})", u.username, u.fullname);
            if u.is_driver {
                println!("driver");
            }
            if let Some(r) = u.rating {
                println!("rating {r:.1}");
            }
            println!("online: {}", if ctx.ui.is_online(&u.id) { "yes" } else { "no" });
        }
        ProfileCommand::Search { query } => {
            let search = ctx.user_search();
            search.input(&ctx.api, &query).await;
            for u in ready(search.results())? {
                println!("{:<16} {}", u.username, u.fullname);
            }
        }
        ProfileCommand::Rate {
            user,
            ride,
            score,
            comment,
        } => {
            profile::rate_user(
                &ctx.api,
                &RatingRequest {
                    user_id: user,
                    ride_id: ride,
                    score,
                    comment,
                },
            )
            .await?;
            println!("thanks for rating");
        }
        ProfileCommand::Complain {
            user,
            description,
            ride,
        } => {
            profile::file_complaint(
                &ctx.api,
                &ComplaintRequest {
                    against_user_id: user,
                    ride_id: ride,
                    description,
                },
            )
            .await?;
            println!("complaint filed");
        }
    }
    Ok(())
}

async fn watch_events(ctx: &Arc<Context>) -> Result<()> {
    if ctx.session.status() != SessionStatus::Authenticated {
        bail!("sign in first");
    }
    if !ctx.realtime.is_connected() {
        bail!("real-time channel is not available");
    }
    let mut rx = ctx.realtime.subscribe();
    let mut renew = tokio::time::interval(RENEW_EVERY);
    println!("watching, press Ctrl+C to stop");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = renew.tick() => {
                ctx.fresh_api().await;
            }
            ev = rx.recv() => match ev {
                Ok(ServerEvent::NewMessage(m)) => println!("message from {}: {}", m.sender_id, m.text),
                Ok(ServerEvent::NewNotification(n)) => {
                    if ctx.ui.notifications_enabled() {
                        println!("notification: {}", n.message);
                    }
                }
                Ok(ServerEvent::OnlineUsers(ids)) => println!("{} users online", ids.len()),
                Err(RecvError::Lagged(n)) => warn!(skipped = n, "missed events"),
                Err(RecvError::Closed) => break,
            },
        }
    }
    ctx.realtime.disconnect().await;
    Ok(())
}

async fn resolve_place(ctx: &Context, query: &str) -> Result<Location> {
    let hits = geo::geocode(ctx.api.http(), &ctx.config.geocode_url, query).await?;
    hits.into_iter()
        .next()
        .with_context(|| format!("no place matches '{query}'"))
}

fn ready<T>(state: Loadable<T>) -> Result<T> {
    match state {
        Loadable::Ready(v) => Ok(v),
        Loadable::Failed(e) => bail!(e),
        Loadable::Idle | Loadable::Loading => bail!("nothing loaded"),
    }
}

fn print_place(place: &Location) {
    println!("{:>10.5} {:>10.5}  {}", place.lat, place.lng, place.name);
}

fn on_off(v: bool) -> &'static str {
    if v {
        "on"
    } else {
        "off"
    }
}
