//! Typed journal events.
//!
//! `EventKind` is a closed catalog of every discriminator the companion
//! recognizes, with `Unknown` as the forward-compatible fallback. Payload
//! fields stay as JSON until a consumer asks for a typed view via
//! [`Event::decode`].

use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use super::decoder::RawRecord;
use super::{JournalError, Result};

macro_rules! event_kinds {
    ($($variant:ident => $tag:literal),+ $(,)?) => {
        /// Journal event discriminator.
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub enum EventKind {
            $($variant,)+
            /// A discriminator missing from the catalog.
            Unknown(String),
        }

        impl EventKind {
            /// Every catalogued kind.
            pub const KNOWN: &'static [EventKind] = &[$(EventKind::$variant),+];

            /// The on-disk `event` tag.
            pub fn as_str(&self) -> &str {
                match self {
                    $(EventKind::$variant => $tag,)+
                    EventKind::Unknown(tag) => tag,
                }
            }

            pub fn from_tag(tag: &str) -> Self {
                match tag {
                    $($tag => EventKind::$variant,)+
                    other => EventKind::Unknown(other.to_string()),
                }
            }
        }
    };
}

event_kinds! {
    AfmuRepairs => "AfmuRepairs",
    ApproachBody => "ApproachBody",
    ApproachSettlement => "ApproachSettlement",
    Bounty => "Bounty",
    BuyAmmo => "BuyAmmo",
    BuyDrones => "BuyDrones",
    BuyExplorationData => "BuyExplorationData",
    BuyTradeData => "BuyTradeData",
    CapShipBond => "CapShipBond",
    Cargo => "Cargo",
    CargoDepot => "CargoDepot",
    ChangeCrewRole => "ChangeCrewRole",
    ClearSavedGame => "ClearSavedGame",
    CockpitBreached => "CockpitBreached",
    CollectCargo => "CollectCargo",
    Commander => "Commander",
    CommitCrime => "CommitCrime",
    CommunityGoalDiscard => "CommunityGoalDiscard",
    CommunityGoalJoin => "CommunityGoalJoin",
    CommunityGoalReward => "CommunityGoalReward",
    CrewAssign => "CrewAssign",
    CrewHire => "CrewHire",
    CrewLaunchFighter => "CrewLaunchFighter",
    CrewMemberJoins => "CrewMemberJoins",
    CrewMemberQuits => "CrewMemberQuits",
    CrewMemberRoleChange => "CrewMemberRoleChange",
    DataScanned => "DataScanned",
    DatalinkScan => "DatalinkScan",
    DatalinkVoucher => "DatalinkVoucher",
    Died => "Died",
    DiscoveryScan => "DiscoveryScan",
    DockFighter => "DockFighter",
    DockSrv => "DockSRV",
    Docked => "Docked",
    DockingCancelled => "DockingCancelled",
    DockingDenied => "DockingDenied",
    DockingGranted => "DockingGranted",
    DockingRequested => "DockingRequested",
    DockingTimeout => "DockingTimeout",
    EjectCargo => "EjectCargo",
    EndCrewSession => "EndCrewSession",
    EngineerApply => "EngineerApply",
    EngineerContribution => "EngineerContribution",
    EngineerCraft => "EngineerCraft",
    EngineerProgress => "EngineerProgress",
    EscapeInterdiction => "EscapeInterdiction",
    FactionKillBond => "FactionKillBond",
    FetchRemoteModule => "FetchRemoteModule",
    FighterDestroyed => "FighterDestroyed",
    FighterRebuilt => "FighterRebuilt",
    Fileheader => "Fileheader",
    Friends => "Friends",
    FsdJump => "FSDJump",
    FuelScoop => "FuelScoop",
    HeatDamage => "HeatDamage",
    HeatWarning => "HeatWarning",
    HullDamage => "HullDamage",
    Interdicted => "Interdicted",
    Interdiction => "Interdiction",
    JetConeBoost => "JetConeBoost",
    JetConeDamage => "JetConeDamage",
    JoinACrew => "JoinACrew",
    KickCrewMember => "KickCrewMember",
    LaunchDrone => "LaunchDrone",
    LaunchFighter => "LaunchFighter",
    LaunchSrv => "LaunchSRV",
    LeaveBody => "LeaveBody",
    Liftoff => "Liftoff",
    LoadGame => "LoadGame",
    Loadout => "Loadout",
    Location => "Location",
    Market => "Market",
    MarketBuy => "MarketBuy",
    MarketSell => "MarketSell",
    MassModuleStore => "MassModuleStore",
    MaterialCollected => "MaterialCollected",
    MaterialDiscarded => "MaterialDiscarded",
    MaterialDiscovered => "MaterialDiscovered",
    MaterialTrade => "MaterialTrade",
    Materials => "Materials",
    MiningRefined => "MiningRefined",
    MissionAbandoned => "MissionAbandoned",
    MissionAccepted => "MissionAccepted",
    MissionCompleted => "MissionCompleted",
    MissionFailed => "MissionFailed",
    MissionRedirected => "MissionRedirected",
    Missions => "Missions",
    ModuleBuy => "ModuleBuy",
    ModuleInfo => "ModuleInfo",
    ModuleRetrieve => "ModuleRetrieve",
    ModuleSell => "ModuleSell",
    ModuleSellRemote => "ModuleSellRemote",
    ModuleStore => "ModuleStore",
    ModuleSwap => "ModuleSwap",
    ModulesInfo => "ModulesInfo",
    Music => "Music",
    NavBeaconScan => "NavBeaconScan",
    NewCommander => "NewCommander",
    NpcCrewPaidWage => "NpcCrewPaidWage",
    NpcCrewRank => "NpcCrewRank",
    Outfitting => "Outfitting",
    Passengers => "Passengers",
    PayBounties => "PayBounties",
    PayFines => "PayFines",
    PayLegacyFines => "PayLegacyFines",
    Powerplay => "Powerplay",
    PowerplayJoin => "PowerplayJoin",
    PowerplaySalary => "PowerplaySalary",
    PowerplayVoucher => "PowerplayVoucher",
    Progress => "Progress",
    Promotion => "Promotion",
    PvpKill => "PVPKill",
    QuitACrew => "QuitACrew",
    Rank => "Rank",
    RebootRepair => "RebootRepair",
    ReceiveText => "ReceiveText",
    RedeemVoucher => "RedeemVoucher",
    RefuelAll => "RefuelAll",
    RefuelPartial => "RefuelPartial",
    Repair => "Repair",
    RepairAll => "RepairAll",
    RepairDrone => "RepairDrone",
    Reputation => "Reputation",
    RestockVehicle => "RestockVehicle",
    Resurrect => "Resurrect",
    Scan => "Scan",
    Scanned => "Scanned",
    Screenshot => "Screenshot",
    SelfDestruct => "SelfDestruct",
    SellDrones => "SellDrones",
    SellExplorationData => "SellExplorationData",
    SendText => "SendText",
    SetUserShipName => "SetUserShipName",
    ShieldState => "ShieldState",
    ShipTargeted => "ShipTargeted",
    Shipyard => "Shipyard",
    ShipyardBuy => "ShipyardBuy",
    ShipyardNew => "ShipyardNew",
    ShipyardSell => "ShipyardSell",
    ShipyardSwap => "ShipyardSwap",
    ShipyardTransfer => "ShipyardTransfer",
    Shutdown => "Shutdown",
    StartJump => "StartJump",
    Statistics => "Statistics",
    Status => "Status",
    StoredModules => "StoredModules",
    StoredShips => "StoredShips",
    SupercruiseEntry => "SupercruiseEntry",
    SupercruiseExit => "SupercruiseExit",
    Synthesis => "Synthesis",
    SystemsShutdown => "SystemsShutdown",
    TechnologyBroker => "TechnologyBroker",
    Touchdown => "Touchdown",
    UnderAttack => "UnderAttack",
    Undocked => "Undocked",
    UssDrop => "USSDrop",
    VehicleSwitch => "VehicleSwitch",
    WingAdd => "WingAdd",
    WingInvite => "WingInvite",
    WingJoin => "WingJoin",
    WingLeave => "WingLeave",
}

impl EventKind {
    pub fn is_known(&self) -> bool {
        !matches!(self, EventKind::Unknown(_))
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for EventKind {
    fn from(tag: &str) -> Self {
        EventKind::from_tag(tag)
    }
}

/// A decoded journal record with a parsed timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    timestamp: DateTime<Utc>,
    kind: EventKind,
    fields: Map<String, Value>,
}

impl Event {
    /// Build an event from a raw record.
    ///
    /// Fails if the timestamp is not RFC 3339.
    pub fn from_raw(raw: RawRecord) -> Result<Self> {
        let timestamp = DateTime::parse_from_rfc3339(&raw.timestamp)
            .map_err(|e| {
                JournalError::InvalidRecord(format!(
                    "{} has invalid timestamp '{}': {}",
                    raw.event, raw.timestamp, e
                ))
            })?
            .with_timezone(&Utc);

        Ok(Self {
            timestamp,
            kind: EventKind::from_tag(&raw.event),
            fields: raw.fields,
        })
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn kind(&self) -> &EventKind {
        &self.kind
    }

    /// The on-disk `event` tag.
    pub fn tag(&self) -> &str {
        self.kind.as_str()
    }

    /// Kind-specific fields (everything except `timestamp` and `event`).
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Decode the fields into a typed payload from [`super::schema`].
    pub fn decode<T: DeserializeOwned>(&self) -> std::result::Result<T, serde_json::Error> {
        serde_json::from_value(Value::Object(self.fields.clone()))
    }
}

/// Distinct uncatalogued tags, in first-seen order.
pub fn unknown_kinds<'a>(events: impl IntoIterator<Item = &'a Event>) -> Vec<String> {
    let mut unknown: Vec<String> = Vec::new();
    for event in events {
        if let EventKind::Unknown(tag) = event.kind() {
            if !unknown.iter().any(|t| t == tag) {
                unknown.push(tag.clone());
            }
        }
    }
    unknown
}
