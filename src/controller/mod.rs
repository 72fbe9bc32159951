// src/controller/mod.rs
// 模式状态机、命令表与终端交互
pub mod cli;
pub mod commands;
pub mod machine;
pub mod modes;
// 公开导出
pub use cli::CliOperator;
pub use machine::{CommandOutcome, ModeController, Operator};
pub use modes::Mode;
