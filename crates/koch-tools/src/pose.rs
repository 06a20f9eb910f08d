//! # 姿态库
//!
//! 姿态 = 名称 → 相对于 [`BasePosition`] 的关节偏移量。
//! 目标位置 = 基准位置 + 偏移量。

use koch_protocol::JointVector;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::warn;

/// 基准位置
///
/// 会话开始时从总线读取一次，之后不再改变，也不持久化。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BasePosition(JointVector);

impl BasePosition {
    pub const fn new(positions: JointVector) -> Self {
        Self(positions)
    }

    pub const fn vector(&self) -> &JointVector {
        &self.0
    }
}

impl From<JointVector> for BasePosition {
    fn from(positions: JointVector) -> Self {
        Self(positions)
    }
}

impl fmt::Display for BasePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// 校验警告（不阻止执行）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationWarning {
    /// 未知姿态名称，按零偏移处理
    UnknownPose { name: String },
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationWarning::UnknownPose { name } => {
                write!(f, "Unknown pose '{}', using zero offset", name)
            },
        }
    }
}

/// 姿态解析结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub position: JointVector,
    pub warning: Option<ValidationWarning>,
}

/// 姿态库
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PoseLibrary {
    poses: BTreeMap<String, JointVector>,
}

impl PoseLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加或替换姿态，返回旧的偏移量
    pub fn insert(&mut self, name: impl Into<String>, offset: JointVector) -> Option<JointVector> {
        self.poses.insert(name.into(), offset)
    }

    pub fn offset(&self, name: &str) -> Option<&JointVector> {
        self.poses.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.poses.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.poses.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &JointVector)> {
        self.poses.iter().map(|(name, offset)| (name.as_str(), offset))
    }

    pub fn len(&self) -> usize {
        self.poses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.poses.is_empty()
    }

    /// 解析姿态名称为目标位置
    ///
    /// 未知名称返回基准位置本身，并附带一个 [`ValidationWarning::UnknownPose`]。
    pub fn resolve(&self, name: &str, base: &BasePosition) -> Resolution {
        match self.poses.get(name) {
            Some(offset) => Resolution {
                position: base.vector().offset_by(offset),
                warning: None,
            },
            None => {
                warn!(pose = name, "Unknown pose, using zero offset");
                Resolution {
                    position: *base.vector(),
                    warning: Some(ValidationWarning::UnknownPose {
                        name: name.to_string(),
                    }),
                }
            },
        }
    }
}

impl<S: Into<String>> FromIterator<(S, JointVector)> for PoseLibrary {
    fn from_iter<I: IntoIterator<Item = (S, JointVector)>>(iter: I) -> Self {
        Self {
            poses: iter.into_iter().map(|(name, offset)| (name.into(), offset)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use koch_protocol::Joint;

    fn base() -> BasePosition {
        BasePosition::new(JointVector::new([2028, 1609, 3139, 3148, 1009, 2507]))
    }

    #[test]
    fn test_resolve_known_pose() {
        let library: PoseLibrary = [("tall", JointVector::new([0, 400, -250, 0, 0, 0]))]
            .into_iter()
            .collect();

        let resolution = library.resolve("tall", &base());
        assert_eq!(
            resolution.position,
            JointVector::new([2028, 2009, 2889, 3148, 1009, 2507])
        );
        assert!(resolution.warning.is_none());
    }

    #[test]
    fn test_resolve_unknown_pose_uses_base() {
        let library = PoseLibrary::new();
        let resolution = library.resolve("moonwalk", &base());
        assert_eq!(resolution.position, *base().vector());
        assert_eq!(
            resolution.warning,
            Some(ValidationWarning::UnknownPose {
                name: "moonwalk".to_string()
            })
        );
    }

    #[test]
    fn test_insert_replaces() {
        let mut library = PoseLibrary::new();
        assert!(library.insert("grip", JointVector::ZERO).is_none());
        let old = library.insert("grip", JointVector::ZERO.with(Joint::Gripper, 150));
        assert_eq!(old, Some(JointVector::ZERO));
        assert_eq!(library.len(), 1);
        assert_eq!(library.offset("grip").map(|o| o[Joint::Gripper]), Some(150));
    }

    #[test]
    fn test_warning_display() {
        let warning = ValidationWarning::UnknownPose {
            name: "moonwalk".to_string(),
        };
        assert_eq!(warning.to_string(), "Unknown pose 'moonwalk', using zero offset");
    }
}
