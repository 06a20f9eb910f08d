//! 序列回放命令

use super::AppContext;
use crate::runtime;
use crate::safety::{Confirmation, TorqueGate};
use anyhow::{Context, Result};
use clap::Args;
use koch_client::control::{CancelToken, PlaybackConfig, PlaybackReport, SpinPacer, play_sequence};
use koch_client::{Outcome, supervise};
use koch_tools::BasePosition;
use std::path::PathBuf;
use std::time::Duration;

/// 序列回放命令参数
#[derive(Args, Debug, Clone)]
pub struct PlayCommand {
    /// 序列名称（如 wave）
    pub sequence: String,

    /// 编舞文件（覆盖配置）
    #[arg(short, long)]
    pub choreography: Option<PathBuf>,

    /// 开始前不回到基准位置
    #[arg(long)]
    pub no_home: bool,
}

impl PlayCommand {
    fn playback_config(&self, ctx: &AppContext) -> Result<PlaybackConfig> {
        let settings = &ctx.config.playback;
        Ok(PlaybackConfig {
            home_first: settings.home_first && !self.no_home,
            settle: Duration::try_from_secs_f64(settings.settle_secs).context("无效的 settle_secs")?,
            return_settle: Duration::try_from_secs_f64(settings.return_settle_secs)
                .context("无效的 return_settle_secs")?,
            ..Default::default()
        })
    }

    pub async fn execute(&self, ctx: &AppContext) -> Result<()> {
        let playback = self.playback_config(ctx)?;
        let cancel = runtime::cancel_on_ctrl_c();
        let ctx = ctx.clone();
        let cmd = self.clone();

        println!("💡 提示: 按 Ctrl+C 可随时停止");
        runtime::run_blocking(move || cmd.play_sync(&ctx, playback, cancel)).await
    }

    fn play_sync(&self, ctx: &AppContext, playback: PlaybackConfig, cancel: CancelToken) -> Result<()> {
        let choreography = ctx.choreography(self.choreography.as_deref())?;
        let (sequence, validation) = choreography.checked_sequence(&self.sequence)?;
        for warning in &validation.warnings {
            println!("⚠️  {}", warning);
        }

        let config = &ctx.config;
        let mut session = runtime::follower_session(config, Some(config.playback.profile_velocity))?;
        println!("🔌 连接从动臂 ({})...", config.follower.port);
        session.connect().context("连接从动臂失败")?;

        // 基准位置在使能前读取，失败时 session drop 负责 teardown
        let base = BasePosition::new(session.read_positions().context("读取基准位置失败")?);
        println!("📍 基准位置: {}", base);

        let gate = TorqueGate::new(config.safety.confirmation.clone(), ctx.assume_yes);
        let confirmation = gate.confirm(
            "确认 12V 电源已连接，机械臂周围没有障碍物",
            &format!(
                "回放序列 '{}'（{} 步，约 {:.1} 秒）",
                self.sequence,
                sequence.len(),
                sequence.total_duration_secs()
            ),
        )?;

        let supervised = supervise(&mut session, |session| {
            if confirmation == Confirmation::Declined {
                return Ok(Outcome::Declined);
            }
            session.enable()?;
            println!("🎬 开始回放 '{}'", self.sequence);

            play_sequence(
                session,
                &choreography.poses,
                &base,
                sequence,
                &playback,
                &mut SpinPacer::new(),
                &cancel,
                |progress| {
                    println!(
                        "  Step {}/{}: {} ({:.1}s)",
                        progress.step,
                        progress.total,
                        progress.pose,
                        progress.hold.as_secs_f64()
                    )
                },
            )
        });

        runtime::finish(supervised, print_report)
    }
}

fn print_report(report: &PlaybackReport) {
    println!(
        "📈 执行 {}/{} 步，保持 {:.1} 秒{}",
        report.steps_executed,
        report.steps_total,
        report.held.as_secs_f64(),
        if report.returned_to_base { "，已回到基准位置" } else { "" }
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CliConfig;

    fn context() -> AppContext {
        AppContext {
            config: CliConfig::default(),
            config_path: PathBuf::from("config.toml"),
            assume_yes: true,
        }
    }

    fn command(no_home: bool) -> PlayCommand {
        PlayCommand {
            sequence: "wave".to_string(),
            choreography: None,
            no_home,
        }
    }

    #[test]
    fn test_home_first_follows_config() {
        let ctx = context();
        assert!(command(false).playback_config(&ctx).unwrap().home_first);
        assert!(!command(true).playback_config(&ctx).unwrap().home_first);
    }

    #[test]
    fn test_invalid_settle_rejected() {
        let mut ctx = context();
        ctx.config.playback.settle_secs = -1.0;
        assert!(command(false).playback_config(&ctx).is_err());

        let mut ctx = context();
        ctx.config.playback.return_settle_secs = f64::NAN;
        assert!(command(false).playback_config(&ctx).is_err());
    }

    #[test]
    fn test_return_settle_from_config() {
        let mut ctx = context();
        ctx.config.playback.return_settle_secs = 0.5;
        let playback = command(false).playback_config(&ctx).unwrap();
        assert_eq!(playback.return_settle, Duration::from_millis(500));
    }
}
