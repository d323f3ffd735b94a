use std::str::FromStr;

use async_trait::async_trait;
use poise::serenity_prelude::{
    ChannelId, CreateMessage, GuildId, Http, MessageId, PermissionOverwrite,
    PermissionOverwriteType, Permissions, RoleId, UserId,
};

use crate::config::Config;
use crate::database::models::StaffRole;
use crate::BotError;

/// The chat platform as this subsystem sees it.
///
/// Everything behind this trait is a thin call to Discord: capability
/// checks over a member's role set, channel permission grants, plain
/// message traffic, and resolution of opaque user ids into display text.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Whether `user_ref` may take the given staffing slot.
    async fn can_staff(&self, user_ref: &str, role: StaffRole) -> Result<bool, BotError>;

    /// Resolves an opaque user id to a display name.
    async fn display_name(&self, user_ref: &str) -> Result<String, BotError>;

    /// Grants read/write access on a ticket channel to an assigned staffer.
    async fn grant_channel_access(&self, channel_ref: &str, user_ref: &str)
        -> Result<(), BotError>;

    /// Sends a message, returning its id so callers can delete it later.
    async fn send_message(&self, channel_ref: &str, text: &str) -> Result<String, BotError>;

    async fn delete_message(&self, channel_ref: &str, message_ref: &str) -> Result<(), BotError>;

    fn mention(&self, user_ref: &str) -> String {
        format!("<@{}>", user_ref)
    }
}

/// Production implementation over the serenity HTTP client.
pub struct DiscordApi {
    http: Http,
    guild_id: GuildId,
    judge_roles: Vec<RoleId>,
    recorder_roles: Vec<RoleId>,
    organizer_roles: Vec<RoleId>,
}

impl DiscordApi {
    pub fn new(token: &str, config: &Config) -> Result<Self, BotError> {
        Ok(Self {
            http: Http::new(token),
            guild_id: GuildId::from_str(&config.guild_id)?,
            judge_roles: parse_roles(&config.judge_role_ids)?,
            recorder_roles: parse_roles(&config.recorder_role_ids)?,
            organizer_roles: parse_roles(&config.organizer_role_ids)?,
        })
    }
}

fn parse_roles(ids: &[String]) -> Result<Vec<RoleId>, BotError> {
    ids.iter()
        .map(|id| RoleId::from_str(id).map_err(Into::into))
        .collect()
}

#[async_trait]
impl ChatPlatform for DiscordApi {
    async fn can_staff(&self, user_ref: &str, role: StaffRole) -> Result<bool, BotError> {
        let user_id = UserId::from_str(user_ref)?;
        let member = self.http.get_member(self.guild_id, user_id).await?;

        // Organizer-tier roles may take either slot.
        let allowed = match role {
            StaffRole::Judge => &self.judge_roles,
            StaffRole::Recorder => &self.recorder_roles,
        };
        Ok(member
            .roles
            .iter()
            .any(|r| allowed.contains(r) || self.organizer_roles.contains(r)))
    }

    async fn display_name(&self, user_ref: &str) -> Result<String, BotError> {
        let user = UserId::from_str(user_ref)?.to_user(&self.http).await?;
        Ok(user.global_name.unwrap_or(user.name))
    }

    async fn grant_channel_access(
        &self,
        channel_ref: &str,
        user_ref: &str,
    ) -> Result<(), BotError> {
        let channel = ChannelId::from_str(channel_ref)?;
        let overwrite = PermissionOverwrite {
            allow: Permissions::VIEW_CHANNEL
                | Permissions::SEND_MESSAGES
                | Permissions::EMBED_LINKS
                | Permissions::ATTACH_FILES,
            deny: Permissions::empty(),
            kind: PermissionOverwriteType::Member(UserId::from_str(user_ref)?),
        };
        channel.create_permission(&self.http, overwrite).await?;
        Ok(())
    }

    async fn send_message(&self, channel_ref: &str, text: &str) -> Result<String, BotError> {
        let channel = ChannelId::from_str(channel_ref)?;
        let message = channel
            .send_message(&self.http, CreateMessage::default().content(text))
            .await?;
        Ok(message.id.to_string())
    }

    async fn delete_message(&self, channel_ref: &str, message_ref: &str) -> Result<(), BotError> {
        let channel = ChannelId::from_str(channel_ref)?;
        let message = MessageId::from_str(message_ref)?;
        channel.delete_message(&self.http, message).await?;
        Ok(())
    }
}
