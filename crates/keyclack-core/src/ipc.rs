use crate::loader::ReloadReport;
use keyclack_ports::storage::KeyBindings;
use keyclack_ports::types::Volume01;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ControlCommand {
    SetVolume { volume: Volume01 },
    Reload { bindings: KeyBindings },
    Start,
    Stop,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload")]
pub enum EngineEvent {
    Started,
    Stopped,
    VolumeChanged { volume: Volume01 },
    Reloaded { report: ReloadReport },
}
