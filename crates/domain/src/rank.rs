use serde::{Deserialize, Serialize};

use crate::player::{Player, Role};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRank {
    pub player: String,
    pub points: i64,
}

/// 对局排名快照，按玩家ID排序
///
/// 越接近目标得分越高：`round(100 * (max_dist - dist) / max_dist)`，
/// 其中`max_dist`为所有猎人到目标的最大距离加1；目标自身距离视为0，
/// 已出局的玩家得0分。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rank {
    pub game: String,
    pub points_per_player: Vec<PlayerRank>,
}

impl Rank {
    pub fn compute(game: &str, players: &[Player]) -> Self {
        let max_dist = players
            .iter()
            .filter(|p| p.role != Role::Target)
            .map(|p| p.dist_to_target)
            .fold(0.0_f64, f64::max)
            + 1.0;

        let mut points_per_player: Vec<PlayerRank> = players
            .iter()
            .map(|p| {
                let points = if p.lose {
                    0
                } else {
                    let dist = if p.role == Role::Target {
                        0.0
                    } else {
                        p.dist_to_target
                    };
                    (100.0 * (max_dist - dist) / max_dist).round() as i64
                };
                PlayerRank {
                    player: p.id.clone(),
                    points,
                }
            })
            .collect();
        points_per_player.sort_by(|a, b| a.player.cmp(&b.player));

        Self {
            game: game.to_string(),
            points_per_player,
        }
    }

    pub fn points_of(&self, player: &str) -> Option<i64> {
        self.points_per_player
            .iter()
            .find(|r| r.player == player)
            .map(|r| r.points)
    }
}
