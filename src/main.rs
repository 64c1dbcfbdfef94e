use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use sqlx::SqlitePool;

use planetgate::cache::NodeCache;
use planetgate::config::{Config, DEFAULT_LOG_FILTER};
use planetgate::db::{self, SqliteStore};
use planetgate::error::AppError;
use planetgate::models::channel::CreateChannel;
use planetgate::models::node::{NodeKey, PermissionNode};
use planetgate::models::permission::{chat, planet, ChannelKind, PermissionState, VIEW_VALUE};
use planetgate::models::planet::CreatePlanet;
use planetgate::models::role::CreateRole;
use planetgate::models::DataResponse;
use planetgate::position::ChannelPosition;
use planetgate::resolver::PermissionResolver;
use planetgate::store::PermissionStore;

const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_SHA"), ")");

#[derive(Parser)]
#[command(
    name = "planetgate",
    version = VERSION,
    about = "Resolve member permissions on planet channels"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check one channel permission for a member.
    Check {
        #[arg(long)]
        member: i64,
        #[arg(long)]
        channel: i64,
        /// Permission name of the channel's kind (e.g. "post_messages").
        #[arg(long)]
        permission: String,
    },

    /// Print the member's effective permissions on a channel.
    Flatten {
        #[arg(long)]
        member: i64,
        #[arg(long)]
        channel: i64,
    },

    /// List the channels a member can see.
    Access {
        #[arg(long)]
        member: i64,
    },

    /// Check a planet-wide permission and report the member's authority.
    PlanetCheck {
        #[arg(long)]
        member: i64,
        /// Planet permission name (e.g. "kick").
        #[arg(long)]
        permission: String,
    },

    /// Show a planet's members with their role indices.
    Members {
        #[arg(long)]
        planet: i64,
        /// Only the member for this user.
        #[arg(long)]
        user: Option<i64>,
    },

    /// Show the permission nodes stored on a channel.
    Nodes {
        #[arg(long)]
        channel: i64,
    },

    /// Decode a raw channel position (decimal or 0x-prefixed hex).
    Position { raw: String },

    /// Create a small demo planet owned by `owner`.
    Seed {
        #[arg(long, default_value_t = 1)]
        owner: i64,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = Config::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(&config.log_filter)
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli.command, &config).await {
        Ok(data) => {
            print_json(&DataResponse::new(data));
            ExitCode::SUCCESS
        }
        Err(e) => {
            print_json(&e.to_response());
            ExitCode::FAILURE
        }
    }
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(e) => eprintln!("failed to encode output: {e}"),
    }
}

type Resolver = PermissionResolver<Arc<dyn PermissionStore>>;

async fn open(config: &Config) -> Result<(SqlitePool, Resolver), AppError> {
    let pool = db::create_pool(&config.database_url, config.max_connections).await?;
    let sqlite = SqliteStore::new(pool.clone());
    let store: Arc<dyn PermissionStore> = if config.node_cache {
        Arc::new(NodeCache::new(sqlite))
    } else {
        Arc::new(sqlite)
    };
    Ok((pool, PermissionResolver::new(store)))
}

async fn run(command: Command, config: &Config) -> Result<serde_json::Value, AppError> {
    match command {
        Command::Check {
            member,
            channel,
            permission,
        } => {
            let (pool, resolver) = open(config).await?;
            let target = db::channels::get_channel(&pool, channel).await?;
            let permission = target.kind.permission(&permission).ok_or_else(|| {
                AppError::BadRequest(format!(
                    "{} channels have no permission named {permission}",
                    target.kind
                ))
            })?;
            let allowed = resolver.has_permission(member, channel, permission).await?;
            Ok(json!({
                "member_id": member,
                "channel_id": channel,
                "permission": permission.name,
                "allowed": allowed,
            }))
        }
        Command::Flatten { member, channel } => {
            let (_, resolver) = open(config).await?;
            let node = resolver.flatten_permissions(member, channel).await?;
            Ok(json!({
                "node": node,
                "states": describe(&node),
            }))
        }
        Command::Access { member } => {
            let (_, resolver) = open(config).await?;
            let channels = resolver.accessible_channels(member).await?;
            serde_json::to_value(channels).map_err(|e| AppError::Internal(e.to_string()))
        }
        Command::PlanetCheck { member, permission } => {
            let (_, resolver) = open(config).await?;
            let permission = planet::find(&permission).ok_or_else(|| {
                AppError::BadRequest(format!("no planet permission named {permission}"))
            })?;
            let allowed = resolver.has_planet_permission(member, permission).await?;
            let authority = resolver.authority(member).await?;
            Ok(json!({
                "member_id": member,
                "permission": permission.name,
                "allowed": allowed,
                "authority": authority,
            }))
        }
        Command::Members { planet, user } => {
            let (pool, _) = open(config).await?;
            let planet = db::planets::get_planet(&pool, planet).await?;
            let members = match user {
                Some(user_id) => vec![db::members::get_member_by_user(&pool, planet.id, user_id).await?],
                None => db::members::list_members(&pool, planet.id).await?,
            };
            let members: Vec<_> = members
                .iter()
                .map(|m| {
                    json!({
                        "id": m.id,
                        "user_id": m.user_id,
                        "role_indices": m.role_membership.role_ids().collect::<Vec<_>>(),
                    })
                })
                .collect();
            Ok(json!({ "planet": planet, "members": members }))
        }
        Command::Nodes { channel } => {
            let (pool, _) = open(config).await?;
            let nodes = db::nodes::list_nodes_for_target(&pool, channel).await?;
            let nodes: Vec<_> = nodes
                .iter()
                .map(|node| json!({ "node": node, "states": describe(node) }))
                .collect();
            Ok(json!(nodes))
        }
        Command::Position { raw } => decode_position(&raw),
        Command::Seed { owner } => {
            let (pool, _) = open(config).await?;
            seed(&pool, owner).await
        }
    }
}

fn describe(node: &PermissionNode) -> serde_json::Map<String, serde_json::Value> {
    node.target_kind
        .permissions()
        .iter()
        .map(|p| (p.name.to_string(), json!(node.state(*p))))
        .collect()
}

fn decode_position(raw: &str) -> Result<serde_json::Value, AppError> {
    let value = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => raw.parse(),
    }
    .map_err(|e| AppError::BadRequest(format!("invalid position {raw}: {e}")))?;

    let position = ChannelPosition::from_raw(value)?;
    let bounds = position
        .descendant_bounds()
        .map(|(lower, upper)| json!({ "lower": lower.raw(), "upper": upper.raw() }));
    Ok(json!({
        "raw": position.raw(),
        "path": position.to_string(),
        "depth": position.depth(),
        "local_position": position.local_position(),
        "parent": position.parent().raw(),
        "ancestors": position.ancestors().map(|p| p.raw()).collect::<Vec<_>>(),
        "descendant_bounds": bounds,
        "direct_child_mask": position.direct_child_mask(),
    }))
}

async fn seed(pool: &SqlitePool, owner: i64) -> Result<serde_json::Value, AppError> {
    let (planet, default_role) = db::planets::create_planet(
        pool,
        &CreatePlanet {
            name: "Demo".to_string(),
            owner_id: owner,
        },
    )
    .await?;

    let mut moderator = CreateRole::named("moderator");
    moderator.chat_permissions = Some(chat::DEFAULT | chat::MANAGE_MESSAGES.value);
    let moderator = db::roles::create_role(pool, planet.id, &moderator).await?;

    let general = db::channels::create_channel(
        pool,
        planet.id,
        &CreateChannel {
            is_default: Some(true),
            ..CreateChannel::new("general", ChannelKind::Chat)
        },
    )
    .await?;
    let staff = db::channels::create_channel(
        pool,
        planet.id,
        &CreateChannel::new("staff", ChannelKind::Category),
    )
    .await?;
    let staff_chat = db::channels::create_channel(
        pool,
        planet.id,
        &CreateChannel::new("staff-chat", ChannelKind::Chat).under(staff.id),
    )
    .await?;

    // Hide the staff category, and the channels inheriting from it, from
    // everyone but moderators.
    for kind in [ChannelKind::Category, ChannelKind::Chat] {
        for (role_id, state) in [
            (default_role.id, PermissionState::Deny),
            (moderator.id, PermissionState::Allow),
        ] {
            let mut node = PermissionNode::empty(NodeKey::new(staff.id, role_id, kind));
            node.set_state_of(VIEW_VALUE, state);
            db::nodes::upsert_node(pool, &node).await?;
        }
    }

    let owner_member = db::members::add_member(pool, planet.id, owner).await?;
    let regular = db::members::add_member(pool, planet.id, owner + 1).await?;
    let staffer = db::members::add_member(pool, planet.id, owner + 2).await?;
    db::members::grant_role(pool, staffer.id, moderator.id).await?;

    tracing::info!(planet_id = planet.id, "seeded demo planet");
    Ok(json!({
        "planet_id": planet.id,
        "roles": { "default": default_role.id, "moderator": moderator.id },
        "channels": { "general": general.id, "staff": staff.id, "staff_chat": staff_chat.id },
        "members": { "owner": owner_member.id, "regular": regular.id, "moderator": staffer.id },
    }))
}
