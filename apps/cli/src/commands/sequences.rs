//! 编舞浏览与校验

use super::AppContext;
use anyhow::{Result, bail};
use clap::Args;
use std::path::PathBuf;

/// 列出序列命令参数
#[derive(Args, Debug)]
pub struct SequencesCommand {
    /// 编舞文件（覆盖配置）
    #[arg(short, long)]
    pub choreography: Option<PathBuf>,

    /// 同时列出姿态库
    #[arg(long)]
    pub poses: bool,
}

impl SequencesCommand {
    pub fn execute(&self, ctx: &AppContext) -> Result<()> {
        let choreography = ctx.choreography(self.choreography.as_deref())?;

        println!("🎬 序列 ({}):", choreography.sequences.len());
        for (name, sequence) in &choreography.sequences {
            println!(
                "  {:<12} {:>3} 步  {:>6.1} 秒",
                name,
                sequence.len(),
                sequence.total_duration_secs()
            );
        }

        if self.poses {
            println!("🧍 姿态 ({}):", choreography.poses.len());
            for (name, offset) in choreography.poses.iter() {
                println!("  {:<12} {}", name, offset);
            }
        }
        Ok(())
    }
}

/// 校验编舞命令参数
#[derive(Args, Debug)]
pub struct ValidateCommand {
    /// 编舞文件（默认使用配置中的文件或内置编舞）
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// 把警告（未知姿态）也视为失败
    #[arg(long)]
    pub strict: bool,
}

impl ValidateCommand {
    pub fn execute(&self, ctx: &AppContext) -> Result<()> {
        let choreography = ctx.choreography(self.file.as_deref())?;

        let mut violations = 0;
        let mut warnings = 0;
        for (name, report) in choreography.validate_all() {
            if report.is_clean() {
                println!("✅ {}", name);
                continue;
            }
            let mark = if report.is_ok() { "⚠️ " } else { "❌" };
            println!("{} {}", mark, name);
            for violation in &report.violations {
                println!("    {}", violation);
            }
            for warning in &report.warnings {
                println!("    {}", warning);
            }
            violations += report.violations.len();
            warnings += report.warnings.len();
        }

        if violations > 0 {
            bail!("编舞校验失败: {} 个错误, {} 个警告", violations, warnings);
        }
        if self.strict && warnings > 0 {
            bail!("编舞校验失败（strict）: {} 个警告", warnings);
        }
        println!("✅ 编舞有效（{} 个警告）", warnings);
        Ok(())
    }
}
