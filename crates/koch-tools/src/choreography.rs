//! # 编舞文件
//!
//! 姿态库 + 命名序列，TOML 格式：
//!
//! ```toml
//! [poses]
//! home = [0, 0, 0, 0, 0, 0]
//! tall = [0, 400, -250, 0, 0, 0]
//!
//! [sequences]
//! stretch = [
//!     { pose = "tall", duration_secs = 2.0 },
//!     { pose = "home", duration_secs = 3.0 },
//! ]
//! ```

use crate::ChoreographyError;
use crate::pose::PoseLibrary;
use crate::sequence::{Sequence, ValidationReport};
use koch_protocol::JointVector;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::debug;

/// 编舞（姿态库 + 序列）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Choreography {
    #[serde(default)]
    pub poses: PoseLibrary,
    #[serde(default)]
    pub sequences: BTreeMap<String, Sequence>,
}

impl Choreography {
    /// 内置编舞
    pub fn builtin() -> Self {
        let poses: PoseLibrary = [
            ("home", [0, 0, 0, 0, 0, 0]),
            ("uncollapse_1", [0, 100, 0, 0, 0, 0]),
            ("uncollapse_2", [0, 200, -50, 0, 0, 0]),
            ("uncollapse_3", [0, 300, -150, 0, 0, 0]),
            ("tall", [0, 400, -250, 0, 0, 0]),
            ("wave_left", [150, 400, -250, 0, 0, 0]),
            ("wave_right", [-150, 400, -250, 0, 0, 0]),
            ("extend", [0, 250, 150, -100, 0, 0]),
            ("dramatic", [100, 450, -300, -80, 150, 100]),
            ("point_up", [0, 500, -350, 0, 0, 0]),
            ("gripper_open", [0, 0, 0, 0, 0, 150]),
            ("gripper_closed", [0, 0, 0, 0, 0, -150]),
            ("wrist_spin", [0, 300, -150, 0, 200, 0]),
        ]
        .into_iter()
        .map(|(name, offset)| (name, JointVector::new(offset)))
        .collect();

        let mut sequences = BTreeMap::new();
        let mut add = |name: &str, steps: &[(&str, f64)]| {
            sequences.insert(name.to_string(), steps.iter().copied().collect::<Sequence>());
        };

        add(
            "uncollapse",
            &[
                ("uncollapse_1", 3.0),
                ("uncollapse_2", 3.0),
                ("uncollapse_3", 3.0),
                ("tall", 3.0),
                ("home", 3.0),
            ],
        );
        add(
            "wave",
            &[
                ("uncollapse_3", 3.0),
                ("tall", 2.0),
                ("wave_left", 2.0),
                ("wave_right", 2.0),
                ("wave_left", 2.0),
                ("wave_right", 2.0),
                ("tall", 2.0),
                ("uncollapse_1", 3.0),
                ("home", 3.0),
            ],
        );
        add(
            "grab_demo",
            &[
                ("uncollapse_3", 3.0),
                ("extend", 3.0),
                ("gripper_open", 2.0),
                ("gripper_closed", 2.0),
                ("uncollapse_2", 3.0),
                ("uncollapse_1", 3.0),
                ("home", 3.0),
            ],
        );
        add(
            "dramatic_pose",
            &[
                ("uncollapse_3", 3.0),
                ("tall", 3.0),
                ("dramatic", 4.0),
                ("tall", 3.0),
                ("uncollapse_2", 3.0),
                ("uncollapse_1", 3.0),
                ("home", 3.0),
            ],
        );
        add(
            "all_joints",
            &[
                ("uncollapse_1", 3.0),
                ("uncollapse_2", 3.0),
                ("uncollapse_3", 3.0),
                ("tall", 3.0),
                ("wave_left", 3.0),
                ("wave_right", 3.0),
                ("point_up", 3.0),
                ("tall", 3.0),
                ("wrist_spin", 3.0),
                ("tall", 3.0),
                ("extend", 3.0),
                ("gripper_open", 2.0),
                ("gripper_closed", 2.0),
                ("gripper_open", 2.0),
                ("tall", 3.0),
                ("dramatic", 4.0),
                ("tall", 3.0),
                ("uncollapse_3", 3.0),
                ("uncollapse_2", 3.0),
                ("uncollapse_1", 3.0),
                ("home", 3.0),
            ],
        );
        add(
            "dance",
            &[
                ("uncollapse_3", 3.0),
                ("tall", 2.0),
                ("wave_left", 1.5),
                ("wave_right", 1.5),
                ("point_up", 2.0),
                ("wrist_spin", 2.0),
                ("dramatic", 3.0),
                ("tall", 2.0),
                ("home", 3.0),
            ],
        );

        Self { poses, sequences }
    }

    /// 从 TOML 文件加载
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ChoreographyError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ChoreographyError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let choreography = Self::from_toml_str(&content)?;
        debug!(
            path = %path.display(),
            poses = choreography.poses.len(),
            sequences = choreography.sequences.len(),
            "Loaded choreography"
        );
        Ok(choreography)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ChoreographyError> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml_string(&self) -> Result<String, ChoreographyError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// 保存到 TOML 文件
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ChoreographyError> {
        let path = path.as_ref();
        let content = self.to_toml_string()?;
        fs::write(path, content).map_err(|source| ChoreographyError::Io {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn sequence_names(&self) -> impl Iterator<Item = &str> {
        self.sequences.keys().map(String::as_str)
    }

    /// 按名称选择序列，未知名称返回包含可用序列列表的错误
    pub fn sequence(&self, name: &str) -> Result<&Sequence, ChoreographyError> {
        self.sequences
            .get(name)
            .ok_or_else(|| ChoreographyError::UnknownSequence {
                name: name.to_string(),
                available: self.sequence_names().collect::<Vec<_>>().join(", "),
            })
    }

    /// 选择并校验序列，有违规时返回错误
    pub fn checked_sequence(&self, name: &str) -> Result<(&Sequence, ValidationReport), ChoreographyError> {
        let sequence = self.sequence(name)?;
        let report = sequence.validate(&self.poses);
        if !report.is_ok() {
            return Err(ChoreographyError::InvalidSequence {
                name: name.to_string(),
                details: report
                    .violations
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; "),
            });
        }
        Ok((sequence, report))
    }

    /// 校验全部序列
    pub fn validate_all(&self) -> Vec<(&str, ValidationReport)> {
        self.sequences
            .iter()
            .map(|(name, seq)| (name.as_str(), seq.validate(&self.poses)))
            .collect()
    }
}
