//! 安全确认
//!
//! 力矩使能前的两道提示：
//! 1. 摆放提示（"按回车继续"）
//! 2. 确认词（默认 "yes"），输入其他内容视为拒绝
//!
//! `--yes` 或配置中关闭确认时跳过全部提示。

use anyhow::{Context, Result, bail};
use koch_tools::ConfirmationSettings;
use std::io::IsTerminal;

/// 确认结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Accepted,
    Declined,
}

/// 力矩使能确认
pub struct TorqueGate {
    settings: ConfirmationSettings,
    assume_yes: bool,
}

impl TorqueGate {
    pub fn new(settings: ConfirmationSettings, assume_yes: bool) -> Self {
        Self {
            settings,
            assume_yes,
        }
    }

    fn skip(&self) -> bool {
        self.assume_yes || !self.settings.enabled
    }

    /// 显示将要执行的动作并请求确认
    pub fn confirm(&self, placement: &str, action: &str) -> Result<Confirmation> {
        if self.skip() {
            tracing::info!(action, "Confirmation skipped");
            return Ok(Confirmation::Accepted);
        }
        if !std::io::stdin().is_terminal() {
            bail!("需要操作员确认，但标准输入不是终端（使用 --yes 跳过确认）");
        }

        println!();
        println!("⚠️  {}", placement);
        inquire::Text::new("按回车继续...")
            .prompt()
            .context("无法读取操作员输入（非交互环境请使用 --yes）")?;

        println!("⚠️  即将使能力矩: {}", action);
        let answer = inquire::Text::new(&format!("输入 '{}' 确认:", self.settings.phrase))
            .prompt()
            .context("无法读取操作员输入（非交互环境请使用 --yes）")?;

        if self.settings.accepts(&answer) {
            println!("✅ 已确认");
            Ok(Confirmation::Accepted)
        } else {
            Ok(Confirmation::Declined)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assume_yes_skips_prompts() {
        let gate = TorqueGate::new(ConfirmationSettings::default(), true);
        assert_eq!(gate.confirm("place", "act").unwrap(), Confirmation::Accepted);
    }

    #[test]
    fn test_disabled_confirmation_skips_prompts() {
        let settings = ConfirmationSettings {
            enabled: false,
            ..Default::default()
        };
        let gate = TorqueGate::new(settings, false);
        assert_eq!(gate.confirm("place", "act").unwrap(), Confirmation::Accepted);
    }
}
