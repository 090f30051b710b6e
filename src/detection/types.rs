/// 陀螺追踪数据结构定义
/// Data structures shared by the detection-to-track engine
use serde::{Deserialize, Serialize};

// ========== 数据结构 ==========

/// 单帧检测结果 (无身份)
///
/// 由轮廓外接矩形构造: `pos` 为外接矩形中心, `area` 为外接矩形面积
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub pos: (i32, i32),
    pub shape: (u32, u32),
    pub area: u32,

    /// 所属帧序号 (注册时写入)
    pub frame: Option<u64>,
}

impl Detection {
    pub fn new(pos: (i32, i32), shape: (u32, u32)) -> Self {
        Self {
            pos,
            shape,
            area: shape.0 * shape.1,
            frame: None,
        }
    }

    /// 两个检测中心之间的欧氏距离
    pub fn distance_to(&self, other: &Detection) -> f32 {
        distance(self.pos, other.pos)
    }
}

/// 碰撞事件
///
/// `members` 是同一帧轨迹列表中两个参与者的下标, 不复制轨迹数据
#[derive(Clone, Debug, PartialEq)]
pub struct Hit {
    pub members: (usize, usize),

    /// 去重标签: (较小ID, 较大ID)
    pub tag: (u32, u32),
    pub pos: (i32, i32),
    pub shape: (u32, u32),
    pub is_new: bool,
}

impl Hit {
    pub fn snapshot(&self) -> HitSnapshot {
        HitSnapshot {
            pos: self.pos,
            shape: self.shape,
            participant_ids: self.tag,
            is_new: self.is_new,
        }
    }
}

// ========== 输出快照 (供UI/网络序列化) ==========

/// 轨迹快照
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackSnapshot {
    pub id: u32,
    pub pos: (i32, i32),
    pub velocity: (f32, f32),
    pub raw_velocity: (f32, f32),
    pub acceleration: (f32, f32),
    pub shape: (u32, u32),
    pub frame: u64,
}

/// 碰撞快照
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HitSnapshot {
    pub pos: (i32, i32),
    pub shape: (u32, u32),
    pub participant_ids: (u32, u32),
    pub is_new: bool,
}

/// 单帧处理结果 (引擎 → 调用方)
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameOutput {
    pub frame: u64,
    pub tracks: Vec<TrackSnapshot>,
    pub hits: Vec<HitSnapshot>,
}

impl FrameOutput {
    /// 只保留新碰撞
    pub fn new_hits(&self) -> impl Iterator<Item = &HitSnapshot> {
        self.hits.iter().filter(|hit| hit.is_new)
    }

    /// 文本消息: `"{frame}, beys:(id, x, y)..., hits:(x, y)..."`
    ///
    /// 游戏引擎端按此格式解析, 碰撞部分只包含新碰撞
    pub fn to_message(&self) -> String {
        let mut message = format!("{}, beys:", self.frame);
        for track in &self.tracks {
            message.push_str(&format!("({}, {}, {})", track.id, track.pos.0, track.pos.1));
        }
        message.push_str(", hits:");
        for hit in self.new_hits() {
            message.push_str(&format!("({}, {})", hit.pos.0, hit.pos.1));
        }
        message
    }
}

// ========== 工具函数 ==========

pub fn distance(a: (i32, i32), b: (i32, i32)) -> f32 {
    let dx = (a.0 - b.0) as f32;
    let dy = (a.1 - b.1) as f32;
    (dx * dx + dy * dy).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(id: u32, pos: (i32, i32)) -> TrackSnapshot {
        TrackSnapshot {
            id,
            pos,
            velocity: (0.0, 0.0),
            raw_velocity: (0.0, 0.0),
            acceleration: (0.0, 0.0),
            shape: (20, 20),
            frame: 7,
        }
    }

    #[test]
    fn test_message_lists_tracks_and_new_hits_only() {
        let output = FrameOutput {
            frame: 7,
            tracks: vec![snapshot(1, (100, 100)), snapshot(2, (120, 104))],
            hits: vec![
                HitSnapshot {
                    pos: (110, 102),
                    shape: (40, 8),
                    participant_ids: (1, 2),
                    is_new: true,
                },
                HitSnapshot {
                    pos: (5, 5),
                    shape: (2, 2),
                    participant_ids: (3, 4),
                    is_new: false,
                },
            ],
        };

        assert_eq!(
            output.to_message(),
            "7, beys:(1, 100, 100)(2, 120, 104), hits:(110, 102)"
        );
    }

    #[test]
    fn test_snapshot_json_field_names() {
        let output = FrameOutput {
            frame: 3,
            tracks: vec![snapshot(1, (10, 20))],
            hits: vec![HitSnapshot {
                pos: (1, 2),
                shape: (3, 4),
                participant_ids: (1, 2),
                is_new: true,
            }],
        };
        let json: serde_json::Value = serde_json::to_value(&output).unwrap();

        let track = &json["tracks"][0];
        for key in ["id", "pos", "velocity", "raw_velocity", "acceleration", "shape", "frame"] {
            assert!(track.get(key).is_some(), "missing track field {}", key);
        }
        let hit = &json["hits"][0];
        for key in ["pos", "shape", "participant_ids", "is_new"] {
            assert!(hit.get(key).is_some(), "missing hit field {}", key);
        }
        assert_eq!(track["pos"], serde_json::json!([10, 20]));
    }

    #[test]
    fn test_detection_area_from_shape() {
        let det = Detection::new((5, 5), (20, 30));
        assert_eq!(det.area, 600);
        assert!((det.distance_to(&Detection::new((8, 9), (1, 1))) - 5.0).abs() < 1e-6);
    }
}
