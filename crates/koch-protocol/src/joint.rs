//! 关节索引和关节向量
//!
//! 提供编译期安全的关节索引，防止越界和索引错误。
//!
//! # 示例
//!
//! ```rust
//! use koch_protocol::{Joint, JointVector};
//!
//! let base = JointVector::new([2028, 1609, 3139, 3148, 1009, 2507]);
//! let offset = JointVector::new([0, 400, -250, 0, 0, 0]);
//!
//! let target = base.offset_by(&offset);
//! assert_eq!(target[Joint::ShoulderLift], 2009);
//! assert_eq!(target[Joint::ElbowFlex], 2889);
//! ```

use crate::ProtocolError;
use std::fmt;
use std::ops::{Index, IndexMut};
use std::str::FromStr;

/// 关节数量（所有已知配置均为 6 个）
pub const JOINT_COUNT: usize = 6;

/// 关节枚举
///
/// 表示 Koch 机械臂的 6 个关节，顺序与电机 ID 1-6 一致。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum Joint {
    /// 基座左右旋转
    ShoulderPan = 0,
    /// 肩部抬升
    ShoulderLift = 1,
    /// 肘部俯仰
    ElbowFlex = 2,
    /// 腕部俯仰
    WristFlex = 3,
    /// 腕部旋转
    WristRoll = 4,
    /// 夹爪开合
    Gripper = 5,
}

impl Joint {
    /// 所有关节（按序号排列）
    pub const ALL: [Joint; JOINT_COUNT] = [
        Joint::ShoulderPan,
        Joint::ShoulderLift,
        Joint::ElbowFlex,
        Joint::WristFlex,
        Joint::WristRoll,
        Joint::Gripper,
    ];

    /// 获取关节序号（0-5）
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// 从序号创建关节（范围检查）
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// 关节名称（与电机表中的名称一致）
    pub const fn name(self) -> &'static str {
        match self {
            Joint::ShoulderPan => "shoulder_pan",
            Joint::ShoulderLift => "shoulder_lift",
            Joint::ElbowFlex => "elbow_flex",
            Joint::WristFlex => "wrist_flex",
            Joint::WristRoll => "wrist_roll",
            Joint::Gripper => "gripper",
        }
    }
}

impl fmt::Display for Joint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Joint {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        Joint::ALL
            .iter()
            .copied()
            .find(|joint| joint.name().eq_ignore_ascii_case(needle))
            .ok_or_else(|| ProtocolError::UnknownJoint(needle.to_string()))
    }
}

/// 关节向量
///
/// 每个关节一个整数位置（电机原始刻度），按关节序号排列。
/// 用于当前位置快照、目标位置以及姿态偏移量。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(transparent)
)]
pub struct JointVector([i32; JOINT_COUNT]);

impl JointVector {
    /// 全零向量（零偏移）
    pub const ZERO: JointVector = JointVector([0; JOINT_COUNT]);

    pub const fn new(values: [i32; JOINT_COUNT]) -> Self {
        Self(values)
    }

    /// 所有关节填充同一个值
    pub const fn splat(value: i32) -> Self {
        Self([value; JOINT_COUNT])
    }

    /// 从切片创建（长度必须等于关节数）
    pub fn from_slice(values: &[i32]) -> Result<Self, ProtocolError> {
        let array: [i32; JOINT_COUNT] =
            values.try_into().map_err(|_| ProtocolError::LengthMismatch {
                expected: JOINT_COUNT,
                actual: values.len(),
            })?;
        Ok(Self(array))
    }

    pub const fn as_array(&self) -> &[i32; JOINT_COUNT] {
        &self.0
    }

    pub fn into_array(self) -> [i32; JOINT_COUNT] {
        self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = &i32> {
        self.0.iter()
    }

    /// 按关节迭代 `(Joint, value)`
    pub fn joints(&self) -> impl Iterator<Item = (Joint, i32)> + '_ {
        Joint::ALL.iter().copied().zip(self.0.iter().copied())
    }

    /// 逐元素加上偏移量（饱和加法，不会溢出）
    pub fn offset_by(&self, offset: &JointVector) -> JointVector {
        let mut out = self.0;
        for (value, delta) in out.iter_mut().zip(offset.0.iter()) {
            *value = value.saturating_add(*delta);
        }
        JointVector(out)
    }

    /// 返回修改了单个关节后的新向量
    pub fn with(mut self, joint: Joint, value: i32) -> JointVector {
        self.0[joint.index()] = value;
        self
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|v| *v == 0)
    }
}

impl From<[i32; JOINT_COUNT]> for JointVector {
    fn from(values: [i32; JOINT_COUNT]) -> Self {
        Self(values)
    }
}

impl Index<Joint> for JointVector {
    type Output = i32;

    #[inline]
    fn index(&self, joint: Joint) -> &Self::Output {
        &self.0[joint.index()]
    }
}

impl IndexMut<Joint> for JointVector {
    #[inline]
    fn index_mut(&mut self, joint: Joint) -> &mut Self::Output {
        &mut self.0[joint.index()]
    }
}

impl Index<usize> for JointVector {
    type Output = i32;

    #[inline]
    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

impl fmt::Display for JointVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, value) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", value)?;
        }
        write!(f, "]")
    }
}
