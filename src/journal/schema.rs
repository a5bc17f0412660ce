//! Typed payloads for the commonly consumed event kinds.
//!
//! Records are decoded on demand with [`Event::decode`]; fields the game adds
//! in later versions are ignored. Optional fields are those the game omits in
//! some contexts (e.g. station data when not docked).

use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::event::{Event, EventKind};
use crate::galaxy::Coordinates;

/// Star position as written by the game: `[x, y, z]` in light years.
pub type StarPos = [f64; 3];

fn coordinates(pos: &StarPos) -> Coordinates {
    Coordinates::new(pos[0], pos[1], pos[2])
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub struct Fileheader {
    pub part: u32,
    pub language: String,
    pub gameversion: String,
    pub build: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LoadGame {
    pub commander: String,
    pub ship: String,
    #[serde(rename = "Ship_Localised")]
    pub ship_localised: Option<String>,
    #[serde(rename = "ShipID")]
    pub ship_id: u64,
    pub ship_ident: Option<String>,
    pub ship_name: Option<String>,
    #[serde(default)]
    pub start_landed: bool,
    #[serde(default)]
    pub start_dead: bool,
    pub fuel_capacity: Option<f64>,
    pub fuel_level: Option<f64>,
    pub game_mode: Option<String>,
    pub credits: i64,
    pub loan: i64,
    pub horizons: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FactionInfo {
    pub name: String,
    pub faction_state: Option<String>,
    pub government: Option<String>,
    pub influence: Option<f64>,
    pub allegiance: Option<String>,
}

/// Fields shared by `Location` and `FSDJump`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SystemInfo {
    pub star_system: String,
    pub system_address: Option<u64>,
    pub star_pos: StarPos,
    pub system_allegiance: Option<String>,
    pub system_economy: Option<String>,
    #[serde(rename = "SystemEconomy_Localised")]
    pub system_economy_localised: Option<String>,
    pub system_second_economy: Option<String>,
    pub system_government: Option<String>,
    #[serde(rename = "SystemGovernment_Localised")]
    pub system_government_localised: Option<String>,
    pub system_security: Option<String>,
    #[serde(rename = "SystemSecurity_Localised")]
    pub system_security_localised: Option<String>,
    pub system_faction: Option<String>,
    pub faction_state: Option<String>,
    pub population: Option<u64>,
    #[serde(default)]
    pub powers: Vec<String>,
    pub powerplay_state: Option<String>,
    #[serde(default)]
    pub factions: Vec<FactionInfo>,
}

impl SystemInfo {
    pub fn position(&self) -> Coordinates {
        coordinates(&self.star_pos)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Location {
    #[serde(flatten)]
    pub system: SystemInfo,
    pub docked: bool,
    pub station_name: Option<String>,
    pub station_type: Option<String>,
    #[serde(rename = "MarketID")]
    pub market_id: Option<u64>,
    pub body: Option<String>,
    #[serde(rename = "BodyID")]
    pub body_id: Option<u64>,
    pub body_type: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FsdJump {
    #[serde(flatten)]
    pub system: SystemInfo,
    pub jump_dist: f64,
    pub fuel_used: f64,
    pub fuel_level: f64,
    pub boost_used: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StartJump {
    /// `Hyperspace` or `Supercruise`.
    pub jump_type: String,
    /// Only present for hyperspace jumps.
    pub star_system: Option<String>,
    pub star_class: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SupercruiseEntry {
    pub star_system: String,
    pub system_address: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SupercruiseExit {
    pub star_system: String,
    pub system_address: Option<u64>,
    pub body: String,
    #[serde(rename = "BodyID")]
    pub body_id: Option<u64>,
    pub body_type: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Docked {
    pub station_name: String,
    pub station_type: String,
    #[serde(rename = "MarketID")]
    pub market_id: Option<u64>,
    pub star_system: String,
    pub system_address: Option<u64>,
    pub station_faction: Option<String>,
    pub station_government: Option<String>,
    pub station_allegiance: Option<String>,
    pub station_economy: Option<String>,
    #[serde(default)]
    pub station_services: Vec<String>,
    #[serde(rename = "DistFromStarLS")]
    pub dist_from_star_ls: Option<f64>,
    #[serde(default)]
    pub cockpit_breach: bool,
    #[serde(default)]
    pub wanted: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Undocked {
    pub station_name: String,
    pub station_type: Option<String>,
    #[serde(rename = "MarketID")]
    pub market_id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ReceiveText {
    /// `local`, `npc`, `direct`, `player`, `wing` or `voicechat`.
    pub channel: String,
    pub from: Option<String>,
    #[serde(rename = "From_Localised")]
    pub from_localised: Option<String>,
    pub message: String,
    #[serde(rename = "Message_Localised")]
    pub message_localised: Option<String>,
}

impl ReceiveText {
    /// Localised text when the game provides one.
    pub fn display_message(&self) -> &str {
        self.message_localised.as_deref().unwrap_or(&self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SendText {
    pub to: String,
    #[serde(rename = "To_Localised")]
    pub to_localised: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BountyReward {
    pub faction: String,
    pub reward: i64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Bounty {
    pub target: String,
    pub victim_faction: String,
    #[serde(rename = "VictimFaction_Localised")]
    pub victim_faction_localised: Option<String>,
    pub reward: Option<i64>,
    pub total_reward: Option<i64>,
    pub shared_with_others: Option<u32>,
    pub faction: Option<String>,
    #[serde(default)]
    pub rewards: Vec<BountyReward>,
}

impl Bounty {
    pub fn total(&self) -> i64 {
        self.total_reward.or(self.reward).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FuelScoop {
    pub scooped: f64,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HullDamage {
    pub health: f64,
    pub player_pilot: bool,
    #[serde(default)]
    pub fighter: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Interdicted {
    pub submitted: bool,
    pub interdictor: String,
    #[serde(rename = "Interdictor_Localised")]
    pub interdictor_localised: Option<String>,
    pub is_player: bool,
    pub combat_rank: Option<u8>,
    pub faction: Option<String>,
    pub power: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CommitCrime {
    pub crime_type: String,
    pub faction: String,
    pub victim: Option<String>,
    #[serde(rename = "Victim_Localised")]
    pub victim_localised: Option<String>,
    pub bounty: Option<i64>,
    pub fine: Option<i64>,
}

/// `Touchdown` and `Liftoff` share a payload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Landing {
    pub player_controlled: bool,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

pub type Touchdown = Landing;
pub type Liftoff = Landing;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CargoItem {
    pub name: String,
    #[serde(rename = "Name_Localised")]
    pub name_localised: Option<String>,
    pub count: u32,
    #[serde(default)]
    pub stolen: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Cargo {
    #[serde(default)]
    pub inventory: Vec<CargoItem>,
}

/// Bit flags of `Status.json`'s `Flags` field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct StatusFlags(pub u32);

impl StatusFlags {
    pub const DOCKED: u32 = 1;
    pub const LANDED: u32 = 1 << 1;
    pub const LANDING_GEAR: u32 = 1 << 2;
    pub const SHIELDS: u32 = 1 << 3;
    pub const SUPERCRUISE: u32 = 1 << 4;
    pub const FLIGHT_ASSIST_OFF: u32 = 1 << 5;
    pub const HARDPOINTS_DEPLOYED: u32 = 1 << 6;
    pub const IN_WING: u32 = 1 << 7;
    pub const LIGHTS: u32 = 1 << 8;
    pub const CARGO_SCOOP: u32 = 1 << 9;
    pub const SILENT_RUNNING: u32 = 1 << 10;
    pub const FUEL_SCOOPING: u32 = 1 << 11;
    pub const SRV_HANDBRAKE: u32 = 1 << 12;
    pub const SRV_TURRET: u32 = 1 << 13;
    pub const SRV_UNDER_SHIP: u32 = 1 << 14;
    pub const SRV_DRIVE_ASSIST: u32 = 1 << 15;
    pub const FSD_MASS_LOCKED: u32 = 1 << 16;
    pub const FSD_CHARGING: u32 = 1 << 17;
    pub const FSD_COOLDOWN: u32 = 1 << 18;
    pub const LOW_FUEL: u32 = 1 << 19;
    pub const OVERHEATING: u32 = 1 << 20;
    pub const HAS_LAT_LONG: u32 = 1 << 21;
    pub const IS_IN_DANGER: u32 = 1 << 22;
    pub const BEING_INTERDICTED: u32 = 1 << 23;
    pub const IN_MAIN_SHIP: u32 = 1 << 24;
    pub const IN_FIGHTER: u32 = 1 << 25;
    pub const IN_SRV: u32 = 1 << 26;

    pub fn contains(self, flag: u32) -> bool {
        self.0 & flag == flag
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Status {
    #[serde(default)]
    pub flags: StatusFlags,
    /// Half-pips for systems, engines and weapons.
    pub pips: Option<[u8; 3]>,
    #[serde(alias = "Firegroup")]
    pub fire_group: Option<u32>,
    /// 0 = no focus, 6 = galaxy map, 7 = system map.
    pub gui_focus: Option<u8>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude: Option<f64>,
    pub heading: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MarketItem {
    #[serde(alias = "name")]
    pub name: String,
    pub buy_price: i64,
    pub sell_price: i64,
    pub mean_price: Option<i64>,
    pub stock: i64,
    pub demand: i64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Market {
    #[serde(rename = "MarketID")]
    pub market_id: u64,
    pub star_system: String,
    pub station_name: String,
    #[serde(default)]
    pub items: Vec<MarketItem>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ShipPrice {
    pub ship_type: String,
    #[serde(rename = "ShipType_Localised")]
    pub ship_type_localised: Option<String>,
    pub ship_price: i64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Shipyard {
    #[serde(rename = "MarketID")]
    pub market_id: u64,
    pub star_system: String,
    pub station_name: String,
    pub horizons: Option<bool>,
    #[serde(default)]
    pub price_list: Vec<ShipPrice>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OutfittingItem {
    pub name: String,
    pub buy_price: i64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Outfitting {
    #[serde(rename = "MarketID")]
    pub market_id: u64,
    pub star_system: String,
    pub station_name: String,
    pub horizons: Option<bool>,
    #[serde(default)]
    pub items: Vec<OutfittingItem>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ModuleInfo {
    pub slot: String,
    pub item: String,
    pub power: Option<f64>,
    pub priority: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ModulesInfo {
    #[serde(default)]
    pub modules: Vec<ModuleInfo>,
}

/// Position carried by a `Location` or `FSDJump` event.
pub fn event_position(event: &Event) -> Option<Coordinates> {
    match event.kind() {
        EventKind::Location | EventKind::FsdJump => {
            let pos: StarPos = serde_json::from_value(event.get("StarPos")?.clone()).ok()?;
            Some(coordinates(&pos))
        }
        _ => None,
    }
}

fn check<T: DeserializeOwned>(event: &Event) -> Result<(), serde_json::Error> {
    event.decode::<T>().map(|_| ())
}

/// Decode an event into its typed payload, discarding the value.
///
/// Returns `None` for kinds without a typed payload.
pub fn validate(event: &Event) -> Option<Result<(), serde_json::Error>> {
    let result = match event.kind() {
        EventKind::Fileheader => check::<Fileheader>(event),
        EventKind::LoadGame => check::<LoadGame>(event),
        EventKind::Location => check::<Location>(event),
        EventKind::FsdJump => check::<FsdJump>(event),
        EventKind::StartJump => check::<StartJump>(event),
        EventKind::SupercruiseEntry => check::<SupercruiseEntry>(event),
        EventKind::SupercruiseExit => check::<SupercruiseExit>(event),
        EventKind::Docked => check::<Docked>(event),
        EventKind::Undocked => check::<Undocked>(event),
        EventKind::ReceiveText => check::<ReceiveText>(event),
        EventKind::SendText => check::<SendText>(event),
        EventKind::Bounty => check::<Bounty>(event),
        EventKind::FuelScoop => check::<FuelScoop>(event),
        EventKind::HullDamage => check::<HullDamage>(event),
        EventKind::Interdicted => check::<Interdicted>(event),
        EventKind::CommitCrime => check::<CommitCrime>(event),
        EventKind::Touchdown => check::<Touchdown>(event),
        EventKind::Liftoff => check::<Liftoff>(event),
        EventKind::Cargo => check::<Cargo>(event),
        EventKind::Status => check::<Status>(event),
        EventKind::Market => check::<Market>(event),
        EventKind::Shipyard => check::<Shipyard>(event),
        EventKind::Outfitting => check::<Outfitting>(event),
        EventKind::ModulesInfo => check::<ModulesInfo>(event),
        _ => return None,
    };
    Some(result)
}
