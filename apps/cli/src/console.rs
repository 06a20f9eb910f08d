//! 单步模式控制台
//!
//! 专用输入线程 + crossbeam 通道：rustyline 的 `Editor` 在输入线程内创建，
//! 历史记录保存在配置文件旁边；执行引擎通过 [`CommandSource`] 逐行拉取命令。
//!
//! Ctrl+C（raw 模式下不会产生 SIGINT）触发取消并关闭通道，Ctrl+D 结束输入。

use anyhow::{Result, anyhow};
use crossbeam_channel::{Receiver, bounded};
use koch_client::control::{CancelToken, CommandSource, KeyBindings};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;

const HISTORY_FILE: &str = "step_history";

/// 单步历史文件：与配置文件同一目录
pub fn history_path(config_path: &Path) -> PathBuf {
    config_path.with_file_name(HISTORY_FILE)
}

/// 控制台输入
pub struct StepConsole {
    command_rx: Receiver<String>,
    _input_thread: thread::JoinHandle<Result<()>>,
}

impl StepConsole {
    pub fn spawn(bindings: &KeyBindings, history: PathBuf, cancel: CancelToken) -> Self {
        let (command_tx, command_rx) = bounded::<String>(10);
        let help = help_text(bindings);

        let input_thread = thread::spawn(move || {
            let mut rl = DefaultEditor::new()
                .map_err(|e| anyhow!("Failed to initialize readline: {}", e))?;
            rl.load_history(&history).ok(); // 首次运行没有历史文件

            println!("{}", help);

            loop {
                match rl.readline("step> ") {
                    Ok(line) => {
                        let line = line.trim().to_string();
                        if !line.is_empty() {
                            let _ = rl.add_history_entry(line.as_str());
                        }
                        if command_tx.send(line).is_err() {
                            break; // 执行引擎已退出
                        }
                    },
                    Err(ReadlineError::Interrupted) => {
                        println!("^C");
                        cancel.cancel();
                        break;
                    },
                    Err(ReadlineError::Eof) => break,
                    Err(err) => {
                        eprintln!("Error: {:?}", err);
                        break;
                    },
                }
            }

            if let Some(dir) = history.parent() {
                fs::create_dir_all(dir).ok();
            }
            rl.save_history(&history).ok();
            Ok(())
        });

        Self {
            command_rx,
            _input_thread: input_thread,
        }
    }
}

impl CommandSource for StepConsole {
    fn next_line(&mut self) -> Option<String> {
        // 输入线程退出后通道关闭，recv 返回 Err
        self.command_rx.recv().ok()
    }
}

/// 按键说明
pub fn help_text(bindings: &KeyBindings) -> String {
    let mut text = String::from("单步控制（每行一个命令）:\n");
    for (key, command) in bindings.iter() {
        text.push_str(&format!("  {:<4} {}\n", key, command));
    }
    text.push_str("  Ctrl+C 停止并失能");
    text
}
