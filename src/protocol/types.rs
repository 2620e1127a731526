//! Message catalogue: the closed set of `type` tags and typed request params.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use super::envelope::Envelope;

// ═══════════════════════════════════════════════════════════════════════════
// Type tags
// ═══════════════════════════════════════════════════════════════════════════

/// Every `type` tag the agent knows about. Tags outside this set map to
/// `Unknown` and are ignored, so newer servers can add message kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    // Requests (server → agent)
    ListFiles,
    ReadFile,
    WriteFile,
    DeleteFile,
    CreateFile,
    RenameFile,
    ExecuteCommand,
    Broadcast,
    KickPlayer,
    ToggleWhitelist,
    GetWorlds,
    SetGamerule,
    GetPlugins,
    EnablePlugin,
    DisablePlugin,
    // Informational (server → agent, never answered)
    Welcome,
    HeartbeatAck,
    // Agent → server
    Response,
    Error,
    FileChunk,
    Heartbeat,
    MetricsBatch,
    ConsoleBatch,
    PlayerEvent,
    EconomySnapshot,
    PerformanceData,
    Unknown,
}

impl MessageType {
    /// Parse a wire tag.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "LIST_FILES" => Self::ListFiles,
            "READ_FILE" => Self::ReadFile,
            "WRITE_FILE" => Self::WriteFile,
            "DELETE_FILE" => Self::DeleteFile,
            "CREATE_FILE" => Self::CreateFile,
            "RENAME_FILE" => Self::RenameFile,
            "EXECUTE_COMMAND" => Self::ExecuteCommand,
            "BROADCAST" => Self::Broadcast,
            "KICK_PLAYER" => Self::KickPlayer,
            "TOGGLE_WHITELIST" => Self::ToggleWhitelist,
            "GET_WORLDS" => Self::GetWorlds,
            "SET_GAMERULE" => Self::SetGamerule,
            "GET_PLUGINS" => Self::GetPlugins,
            "ENABLE_PLUGIN" => Self::EnablePlugin,
            "DISABLE_PLUGIN" => Self::DisablePlugin,
            "WELCOME" => Self::Welcome,
            "HEARTBEAT_ACK" => Self::HeartbeatAck,
            "RESPONSE" => Self::Response,
            "ERROR" => Self::Error,
            "FILE_CHUNK" => Self::FileChunk,
            "HEARTBEAT" => Self::Heartbeat,
            "METRICS_BATCH" => Self::MetricsBatch,
            "CONSOLE_BATCH" => Self::ConsoleBatch,
            "PLAYER_EVENT" => Self::PlayerEvent,
            "ECONOMY_SNAPSHOT" => Self::EconomySnapshot,
            "PERFORMANCE_DATA" => Self::PerformanceData,
            _ => Self::Unknown,
        }
    }

    /// Wire tag. `Unknown` has no tag of its own and renders as `UNKNOWN`.
    pub fn as_tag(&self) -> &'static str {
        match self {
            Self::ListFiles => "LIST_FILES",
            Self::ReadFile => "READ_FILE",
            Self::WriteFile => "WRITE_FILE",
            Self::DeleteFile => "DELETE_FILE",
            Self::CreateFile => "CREATE_FILE",
            Self::RenameFile => "RENAME_FILE",
            Self::ExecuteCommand => "EXECUTE_COMMAND",
            Self::Broadcast => "BROADCAST",
            Self::KickPlayer => "KICK_PLAYER",
            Self::ToggleWhitelist => "TOGGLE_WHITELIST",
            Self::GetWorlds => "GET_WORLDS",
            Self::SetGamerule => "SET_GAMERULE",
            Self::GetPlugins => "GET_PLUGINS",
            Self::EnablePlugin => "ENABLE_PLUGIN",
            Self::DisablePlugin => "DISABLE_PLUGIN",
            Self::Welcome => "WELCOME",
            Self::HeartbeatAck => "HEARTBEAT_ACK",
            Self::Response => "RESPONSE",
            Self::Error => "ERROR",
            Self::FileChunk => "FILE_CHUNK",
            Self::Heartbeat => "HEARTBEAT",
            Self::MetricsBatch => "METRICS_BATCH",
            Self::ConsoleBatch => "CONSOLE_BATCH",
            Self::PlayerEvent => "PLAYER_EVENT",
            Self::EconomySnapshot => "ECONOMY_SNAPSHOT",
            Self::PerformanceData => "PERFORMANCE_DATA",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Server-initiated messages that are logged but never answered.
    pub fn is_informational(&self) -> bool {
        matches!(self, Self::Welcome | Self::HeartbeatAck)
    }
}

/// Telemetry push kinds (sent without a `requestId`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PushKind {
    Metrics,
    Console,
    PlayerEvent,
    Economy,
    Performance,
}

impl PushKind {
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::Metrics => MessageType::MetricsBatch,
            Self::Console => MessageType::ConsoleBatch,
            Self::PlayerEvent => MessageType::PlayerEvent,
            Self::Economy => MessageType::EconomySnapshot,
            Self::Performance => MessageType::PerformanceData,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Request params
// ═══════════════════════════════════════════════════════════════════════════

/// LIST_FILES params
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListFilesParams {
    #[serde(default = "default_directory")]
    pub directory: String,
    #[serde(default)]
    pub offset: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_directory() -> String {
    "plugins/".to_string()
}

fn default_limit() -> usize {
    crate::files::DEFAULT_LIST_LIMIT
}

/// READ_FILE / DELETE_FILE params
#[derive(Debug, Deserialize)]
pub struct PathParams {
    pub path: String,
}

/// WRITE_FILE params
#[derive(Debug, Deserialize)]
pub struct WriteFileParams {
    pub path: String,
    pub content: String,
}

/// CREATE_FILE params
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFileParams {
    pub path: String,
    #[serde(default)]
    pub is_directory: bool,
}

/// RENAME_FILE params
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameFileParams {
    pub old_path: String,
    pub new_path: String,
}

/// EXECUTE_COMMAND params
#[derive(Debug, Deserialize)]
pub struct CommandParams {
    pub command: String,
}

/// BROADCAST params
#[derive(Debug, Deserialize)]
pub struct BroadcastParams {
    pub message: String,
}

/// KICK_PLAYER params
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KickPlayerParams {
    pub player_name: String,
    #[serde(default = "default_kick_reason")]
    pub reason: String,
}

fn default_kick_reason() -> String {
    "Kicked by server admin".to_string()
}

/// TOGGLE_WHITELIST params
#[derive(Debug, Deserialize)]
pub struct ToggleWhitelistParams {
    pub enabled: bool,
}

/// SET_GAMERULE params
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetGameruleParams {
    pub world_name: String,
    pub rule: String,
    /// Servers send booleans and numbers as-is; the console wants text.
    #[serde(deserialize_with = "scalar_as_string")]
    pub value: String,
}

/// ENABLE_PLUGIN / DISABLE_PLUGIN params
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginParams {
    pub plugin_name: String,
}

fn scalar_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a string, number or boolean, got {}",
            other
        ))),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Requests
// ═══════════════════════════════════════════════════════════════════════════

/// A recognized inbound request with its decoded params.
#[derive(Debug)]
pub enum Request {
    ListFiles(ListFilesParams),
    ReadFile(PathParams),
    WriteFile(WriteFileParams),
    DeleteFile(PathParams),
    CreateFile(CreateFileParams),
    RenameFile(RenameFileParams),
    ExecuteCommand(CommandParams),
    Broadcast(BroadcastParams),
    KickPlayer(KickPlayerParams),
    ToggleWhitelist(ToggleWhitelistParams),
    GetWorlds,
    SetGamerule(SetGameruleParams),
    GetPlugins,
    EnablePlugin(PluginParams),
    DisablePlugin(PluginParams),
}

impl Request {
    /// Decode the request carried by `envelope`.
    ///
    /// Returns `Ok(None)` for informational and unrecognized types; params that
    /// don't match the expected shape are an error.
    pub fn parse(envelope: &Envelope) -> Result<Option<Self>, serde_json::Error> {
        let data = Value::Object(envelope.data_object());

        let request = match envelope.message_type() {
            MessageType::ListFiles => Self::ListFiles(params(data)?),
            MessageType::ReadFile => Self::ReadFile(params(data)?),
            MessageType::WriteFile => Self::WriteFile(params(data)?),
            MessageType::DeleteFile => Self::DeleteFile(params(data)?),
            MessageType::CreateFile => Self::CreateFile(params(data)?),
            MessageType::RenameFile => Self::RenameFile(params(data)?),
            MessageType::ExecuteCommand => Self::ExecuteCommand(params(data)?),
            MessageType::Broadcast => Self::Broadcast(params(data)?),
            MessageType::KickPlayer => Self::KickPlayer(params(data)?),
            MessageType::ToggleWhitelist => Self::ToggleWhitelist(params(data)?),
            MessageType::GetWorlds => Self::GetWorlds,
            MessageType::SetGamerule => Self::SetGamerule(params(data)?),
            MessageType::GetPlugins => Self::GetPlugins,
            MessageType::EnablePlugin => Self::EnablePlugin(params(data)?),
            MessageType::DisablePlugin => Self::DisablePlugin(params(data)?),
            _ => return Ok(None),
        };

        Ok(Some(request))
    }
}

fn params<T: DeserializeOwned>(data: Value) -> Result<T, serde_json::Error> {
    serde_json::from_value(data)
}
