//! # 动作序列
//!
//! 有序的 `(姿态名称, 保持时长)` 列表。

use crate::pose::{PoseLibrary, ValidationWarning};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// 序列中的一步
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceStep {
    pub pose: String,
    /// 保持时长（秒，必须 > 0）
    pub duration_secs: f64,
}

impl SequenceStep {
    pub fn new(pose: impl Into<String>, duration_secs: f64) -> Self {
        Self {
            pose: pose.into(),
            duration_secs,
        }
    }

    /// 保持时长；非法时长（非有限、非正）返回 `None`
    pub fn duration(&self) -> Option<Duration> {
        if self.duration_secs.is_finite() && self.duration_secs > 0.0 {
            Duration::try_from_secs_f64(self.duration_secs).ok()
        } else {
            None
        }
    }
}

/// 校验错误（阻止执行）
#[derive(Debug, Clone, PartialEq)]
pub enum Violation {
    NonPositiveDuration { step: usize, duration_secs: f64 },
    NonFiniteDuration { step: usize },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::NonPositiveDuration {
                step,
                duration_secs,
            } => write!(
                f,
                "step {}: duration must be positive, got {}",
                step + 1,
                duration_secs
            ),
            Violation::NonFiniteDuration { step } => {
                write!(f, "step {}: duration is not a finite number", step + 1)
            },
        }
    }
}

/// 校验报告
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    pub violations: Vec<Violation>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationReport {
    /// 没有违规即可执行（警告不影响）
    pub fn is_ok(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn is_clean(&self) -> bool {
        self.violations.is_empty() && self.warnings.is_empty()
    }
}

/// 动作序列
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sequence {
    steps: Vec<SequenceStep>,
}

impl Sequence {
    pub fn new(steps: Vec<SequenceStep>) -> Self {
        Self { steps }
    }

    pub fn steps(&self) -> &[SequenceStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn push(&mut self, pose: impl Into<String>, duration_secs: f64) {
        self.steps.push(SequenceStep::new(pose, duration_secs));
    }

    /// 所有步骤的保持时长之和（秒）
    pub fn total_duration_secs(&self) -> f64 {
        self.steps.iter().map(|s| s.duration_secs).sum()
    }

    /// 校验时长，并把未知姿态列为警告
    pub fn validate(&self, library: &PoseLibrary) -> ValidationReport {
        let mut report = ValidationReport::default();

        for (step, entry) in self.steps.iter().enumerate() {
            if !entry.duration_secs.is_finite() {
                report.violations.push(Violation::NonFiniteDuration { step });
            } else if entry.duration_secs <= 0.0 {
                report.violations.push(Violation::NonPositiveDuration {
                    step,
                    duration_secs: entry.duration_secs,
                });
            }

            if !library.contains(&entry.pose) {
                let warning = ValidationWarning::UnknownPose {
                    name: entry.pose.clone(),
                };
                if !report.warnings.contains(&warning) {
                    report.warnings.push(warning);
                }
            }
        }

        report
    }
}

impl<S: Into<String>> FromIterator<(S, f64)> for Sequence {
    fn from_iter<I: IntoIterator<Item = (S, f64)>>(iter: I) -> Self {
        Self {
            steps: iter
                .into_iter()
                .map(|(pose, secs)| SequenceStep::new(pose, secs))
                .collect(),
        }
    }
}
