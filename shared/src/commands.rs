use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::storage::{LAST_WAYPOINT_KEY, SettingsStorage, StorageError};

pub const MIN_UPDATE_INTERVAL: u32 = 1;
pub const MAX_UPDATE_INTERVAL: u32 = 60;

/// `POST /send_callback` body: command name, target side and group, plus
/// command-specific arguments at the top level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub command: String,
    pub side: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(flatten)]
    pub args: Map<String, Value>,
}

impl CommandEnvelope {
    pub fn new(command: &str, side: &str) -> Self {
        Self {
            command: command.to_string(),
            side: side.to_string(),
            group: None,
            args: Map::new(),
        }
    }

    pub fn with_group(mut self, group: &str) -> Self {
        self.group = Some(group.to_string());
        self
    }

    pub fn with_arg(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.args.insert(key.to_string(), value.into());
        self
    }
}

/// Response of the command proxy endpoints.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CommandResponse {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub id: Option<i64>,
}

impl CommandResponse {
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

/// Group AI commands.
#[derive(Debug, Clone, PartialEq)]
pub enum AiCommand {
    SetBehaviour(String),
    SetCombatMode(String),
    SetFormation(String),
    SetSpeedMode(String),
    EnableAttack(bool),
    SetFormDir(u16),
}

impl AiCommand {
    pub fn command_name(&self) -> &'static str {
        match self {
            AiCommand::SetBehaviour(_) => "set_behaviour",
            AiCommand::SetCombatMode(_) => "set_combat_mode",
            AiCommand::SetFormation(_) => "set_formation",
            AiCommand::SetSpeedMode(_) => "set_speed_mode",
            AiCommand::EnableAttack(_) => "enable_attack",
            AiCommand::SetFormDir(_) => "set_form_dir",
        }
    }

    /// Build a command from its wire name and a textual value, as picked in a form.
    pub fn from_parts(name: &str, value: &str) -> Option<Self> {
        let value = value.trim();
        match name {
            "set_behaviour" => Some(AiCommand::SetBehaviour(value.to_string())),
            "set_combat_mode" => Some(AiCommand::SetCombatMode(value.to_string())),
            "set_formation" => Some(AiCommand::SetFormation(value.to_string())),
            "set_speed_mode" => Some(AiCommand::SetSpeedMode(value.to_string())),
            "enable_attack" => match value.to_ascii_lowercase().as_str() {
                "true" | "on" | "1" => Some(AiCommand::EnableAttack(true)),
                "false" | "off" | "0" => Some(AiCommand::EnableAttack(false)),
                _ => None,
            },
            "set_form_dir" => value.parse().ok().map(AiCommand::SetFormDir),
            _ => None,
        }
    }

    /// Envelope addressed to a whole side, or to one group of it.
    pub fn envelope(&self, side: &str, group: Option<&str>) -> CommandEnvelope {
        let mut base = CommandEnvelope::new(self.command_name(), side);
        if let Some(group) = group {
            base = base.with_group(group);
        }
        match self {
            AiCommand::SetBehaviour(v) | AiCommand::SetCombatMode(v) => base.with_arg("mode", v.as_str()),
            AiCommand::SetFormation(v) => base.with_arg("formation", v.as_str()),
            AiCommand::SetSpeedMode(v) => base.with_arg("speed", v.as_str()),
            // Sent as text, the way the mission script reads it
            AiCommand::EnableAttack(v) => base.with_arg("enable", v.to_string()),
            AiCommand::SetFormDir(deg) => base.with_arg("direction", u64::from(*deg % 360)),
        }
    }
}

/// Parameters of a waypoint, remembered between additions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WaypointParams {
    #[serde(rename = "type")]
    pub kind: String,
    pub behaviour: String,
    pub combat_mode: String,
    pub speed: String,
    pub formation: String,
}

impl Default for WaypointParams {
    fn default() -> Self {
        Self {
            kind: "MOVE".to_string(),
            behaviour: String::new(),
            combat_mode: String::new(),
            speed: String::new(),
            formation: String::new(),
        }
    }
}

impl WaypointParams {
    /// Last used parameters, or defaults.
    pub fn load(storage: &dyn SettingsStorage) -> Self {
        storage
            .read(LAST_WAYPOINT_KEY)
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default()
    }

    pub fn save(&self, storage: &mut dyn SettingsStorage) -> Result<(), StorageError> {
        let json = serde_json::to_string(self).map_err(|e| StorageError::Write {
            key: LAST_WAYPOINT_KEY.to_string(),
            message: e.to_string(),
        })?;
        storage.write(LAST_WAYPOINT_KEY, &json)
    }

    /// Adds `type` and every non-empty optional parameter.
    fn apply_to(&self, envelope: CommandEnvelope) -> CommandEnvelope {
        let optional = [
            ("behaviour", &self.behaviour),
            ("combatMode", &self.combat_mode),
            ("speed", &self.speed),
            ("formation", &self.formation),
        ];
        optional
            .into_iter()
            .filter(|(_, value)| !value.trim().is_empty())
            .fold(envelope.with_arg("type", self.kind.as_str()), |env, (key, value)| {
                env.with_arg(key, value.as_str())
            })
    }
}

/// Waypoint position as the proxy expects it: a JSON array string with
/// rounded meters, `"[x,y,0]"`.
pub fn waypoint_position(x: f64, y: f64) -> String {
    format!("[{},{},0]", x.round() as i64, y.round() as i64)
}

pub fn add_waypoint(side: &str, group: &str, params: &WaypointParams, x: f64, y: f64) -> CommandEnvelope {
    params.apply_to(
        CommandEnvelope::new("add_waypoint", side)
            .with_group(group)
            .with_arg("position", waypoint_position(x, y)),
    )
}

pub fn edit_waypoint(
    side: &str,
    group: &str,
    number: usize,
    params: &WaypointParams,
    x: f64,
    y: f64,
) -> CommandEnvelope {
    params.apply_to(
        CommandEnvelope::new("edit_waypoint", side)
            .with_group(group)
            .with_arg("waypointNumber", number as u64)
            .with_arg("position", waypoint_position(x, y)),
    )
}

pub fn delete_waypoint(side: &str, group: &str, number: usize) -> CommandEnvelope {
    CommandEnvelope::new("delete_waypoint", side)
        .with_group(group)
        .with_arg("waypointNumber", number as u64)
}

/// `POST /set_update_interval` body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateInterval {
    pub interval: u32,
}

impl UpdateInterval {
    pub fn clamped(seconds: u32) -> Self {
        Self {
            interval: seconds.clamp(MIN_UPDATE_INTERVAL, MAX_UPDATE_INTERVAL),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{
        AiCommand, CommandEnvelope, CommandResponse, UpdateInterval, WaypointParams, add_waypoint,
        delete_waypoint, edit_waypoint, waypoint_position,
    };
    use crate::storage::MemoryStorage;

    #[test]
    fn envelope_flattens_args() {
        let env = AiCommand::SetBehaviour("COMBAT".to_string()).envelope("OPFOR", Some("Alpha 1-1"));
        assert_eq!(
            serde_json::to_value(&env).unwrap(),
            json!({ "command": "set_behaviour", "side": "OPFOR", "group": "Alpha 1-1", "mode": "COMBAT" })
        );
        let env = AiCommand::SetSpeedMode("LIMITED".to_string()).envelope("BLUFOR", None);
        assert_eq!(
            serde_json::to_value(&env).unwrap(),
            json!({ "command": "set_speed_mode", "side": "BLUFOR", "speed": "LIMITED" })
        );
    }

    #[test]
    fn group_is_omitted_when_absent() {
        let env = CommandEnvelope::new("status", "BLUFOR");
        assert_eq!(
            serde_json::to_value(&env).unwrap(),
            json!({ "command": "status", "side": "BLUFOR" })
        );
    }

    #[test]
    fn form_dir_wraps_degrees() {
        let env = AiCommand::SetFormDir(450).envelope("OPFOR", Some("A"));
        assert_eq!(env.args["direction"], json!(90));
        let env = AiCommand::EnableAttack(false).envelope("OPFOR", Some("A"));
        assert_eq!(env.args["enable"], json!("false"));
    }

    #[test]
    fn commands_from_form_values() {
        assert_eq!(
            AiCommand::from_parts("set_speed_mode", " FULL "),
            Some(AiCommand::SetSpeedMode("FULL".to_string()))
        );
        assert_eq!(
            AiCommand::from_parts("enable_attack", "off"),
            Some(AiCommand::EnableAttack(false))
        );
        assert_eq!(
            AiCommand::from_parts("set_form_dir", "270"),
            Some(AiCommand::SetFormDir(270))
        );
        assert_eq!(AiCommand::from_parts("set_form_dir", "north"), None);
        assert_eq!(AiCommand::from_parts("self_destruct", "now"), None);
    }

    #[test]
    fn waypoint_position_is_rounded_json_string() {
        assert_eq!(waypoint_position(1234.4, 5678.6), "[1234,5679,0]");
        let env = add_waypoint("OPFOR", "A", &WaypointParams::default(), 10.2, 20.7);
        assert_eq!(env.args["position"], json!("[10,21,0]"));
        assert_eq!(env.args["type"], json!("MOVE"));
        // Unset optional parameters stay off the wire
        assert!(!env.args.contains_key("behaviour"));

        let params = WaypointParams {
            combat_mode: "RED".to_string(),
            ..WaypointParams::default()
        };
        let env = add_waypoint("OPFOR", "A", &params, 0.0, 0.0);
        assert_eq!(env.args["combatMode"], json!("RED"));
        assert!(!env.args.contains_key("speed"));
    }

    #[test]
    fn edit_and_delete_carry_waypoint_number() {
        let env = edit_waypoint("OPFOR", "A", 3, &WaypointParams::default(), 0.0, 0.0);
        assert_eq!(env.command, "edit_waypoint");
        assert_eq!(env.args["waypointNumber"], json!(3));
        let env = delete_waypoint("OPFOR", "A", 2);
        assert_eq!(env.args.len(), 1);
        assert_eq!(env.args["waypointNumber"], json!(2));
    }

    #[test]
    fn last_waypoint_values_round_trip_through_storage() {
        let mut storage = MemoryStorage::new();
        assert_eq!(WaypointParams::load(&storage), WaypointParams::default());

        let params = WaypointParams {
            kind: "SAD".to_string(),
            speed: "FULL".to_string(),
            ..WaypointParams::default()
        };
        params.save(&mut storage).unwrap();
        assert_eq!(WaypointParams::load(&storage), params);
    }

    #[test]
    fn interval_is_clamped() {
        assert_eq!(UpdateInterval::clamped(0).interval, 1);
        assert_eq!(UpdateInterval::clamped(30).interval, 30);
        assert_eq!(UpdateInterval::clamped(600).interval, 60);
    }

    #[test]
    fn response_parses_optional_fields() {
        let ok: CommandResponse = serde_json::from_value(json!({ "status": "success", "id": 12 })).unwrap();
        assert!(ok.is_success());
        assert_eq!(ok.id, Some(12));
        let err: CommandResponse =
            serde_json::from_value(json!({ "status": "error", "message": "Invalid parameters" })).unwrap();
        assert!(!err.is_success());
        assert_eq!(err.message.as_deref(), Some("Invalid parameters"));
    }
}
