use std::fmt;

use serde::{Deserialize, Serialize};

use crate::player::Player;

/// 对局事件名称，序列化为线上使用的字符串
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameEventName {
    #[serde(rename = "game:started")]
    MatchStarted,
    #[serde(rename = "game:player:added")]
    PlayerAdded,
    #[serde(rename = "game:player:removed")]
    PlayerRemoved,
    #[serde(rename = "game:player:near")]
    PlayerNearTarget,
    #[serde(rename = "game:target:reached")]
    TargetCaught,
    #[serde(rename = "game:target:win")]
    TargetEscaped,
    #[serde(rename = "game:player:last")]
    LastPlayerRemaining,
    #[serde(rename = "game:empty")]
    NoPlayersRemaining,
    /// 对局进行中有猎人离开，且仍有两名以上玩家
    #[serde(rename = "game:player:loose")]
    PlayerRanAway,
    #[serde(rename = "game:nothing")]
    Nothing,
}

impl GameEventName {
    pub fn as_str(&self) -> &'static str {
        match self {
            GameEventName::MatchStarted => "game:started",
            GameEventName::PlayerAdded => "game:player:added",
            GameEventName::PlayerRemoved => "game:player:removed",
            GameEventName::PlayerNearTarget => "game:player:near",
            GameEventName::TargetCaught => "game:target:reached",
            GameEventName::TargetEscaped => "game:target:win",
            GameEventName::LastPlayerRemaining => "game:player:last",
            GameEventName::NoPlayersRemaining => "game:empty",
            GameEventName::PlayerRanAway => "game:player:loose",
            GameEventName::Nothing => "game:nothing",
        }
    }

    /// 结束对局的事件
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            GameEventName::TargetCaught
                | GameEventName::TargetEscaped
                | GameEventName::LastPlayerRemaining
                | GameEventName::NoPlayersRemaining
        )
    }
}

impl fmt::Display for GameEventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 引擎产生的事件，只被消费一次，不持久化
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameEvent {
    pub name: GameEventName,
    pub player: Player,
}

impl GameEvent {
    pub fn new(name: GameEventName, player: Player) -> Self {
        Self { name, player }
    }

    pub fn nothing(player: Player) -> Self {
        Self::new(GameEventName::Nothing, player)
    }
}
